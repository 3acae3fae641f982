//! Device-auth flow controller.
//!
//! Drives one sign-in attempt through `Starting → Waiting → Linking → Done`,
//! with `Error` reachable from any non-terminal phase. Cancellation is
//! cooperative: an in-flight step cannot be aborted mid-flight, but its
//! result is silently discarded on arrival (no state mutation, no terminal
//! event, no navigation signal).

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use strum::Display;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::bus::{EventBus, Subscription};
use crate::error::RecoveryAction;

use super::error::AuthError;
use super::link::LinkOpener;
use super::{AuthBackend, Profile};

/// Hard cap on the poll budget, independent of the session's own expiry.
const POLL_CAP_SECS: u64 = 600;

/// Phase of a sign-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AuthPhase {
    #[default]
    Starting,
    Waiting,
    Linking,
    Done,
    Error,
}

impl AuthPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, AuthPhase::Done | AuthPhase::Error)
    }
}

/// Terminal error classification for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// The device-code session expired; a one-click restart is appropriate.
    Expired,
    /// Anything else, including network trouble and provider denial.
    Generic,
}

/// Terminal error surfaced to consumers.
#[derive(Debug, Clone)]
pub struct FlowError {
    pub kind: AuthErrorKind,
    pub message: String,
    pub recovery: RecoveryAction,
}

/// Consumer-visible state of the flow, published on every transition and
/// countdown tick.
#[derive(Debug, Clone, Default)]
pub struct FlowSnapshot {
    pub phase: AuthPhase,
    pub user_code: Option<String>,
    pub verification_uri: Option<String>,
    /// Provider-supplied display text for the verification step.
    pub message: Option<String>,
    /// Visual countdown; never negative, stops at terminal phases.
    pub seconds_left: u64,
    pub expires_in_secs: u64,
    /// Whether the verification link opened in an external browser
    /// (affects wording only, never control flow).
    pub opened_externally: bool,
    pub profile: Option<Profile>,
    pub error: Option<FlowError>,
}

struct FlowState {
    epoch: u64,
    snapshot: FlowSnapshot,
    countdown: Option<JoinHandle<()>>,
}

struct FlowInner {
    state: Mutex<FlowState>,
    bus: EventBus<FlowSnapshot>,
}

impl FlowInner {
    fn lock(&self) -> MutexGuard<'_, FlowState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish the current snapshot while still holding the state lock, so
    /// no stale tick can interleave after a terminal transition.
    fn emit(&self, state: &FlowState) {
        self.bus.publish(state.snapshot.clone());
    }
}

/// Controller for the device-code sign-in flow.
///
/// At most one attempt is current per controller; starting a new attempt
/// (or cancelling) invalidates any attempt still in flight, whose pending
/// results are then discarded on arrival.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use ember::auth::{NoopLinkOpener, SignInFlow, SystemLinkOpener};
/// # async fn example(backend: Arc<dyn ember::auth::AuthBackend>) {
/// let flow = SignInFlow::new(backend, Arc::new(SystemLinkOpener), Arc::new(NoopLinkOpener));
/// let mut events = flow.subscribe();
/// let done = flow.run().await;
/// # }
/// ```
pub struct SignInFlow {
    backend: Arc<dyn AuthBackend>,
    opener: Arc<dyn LinkOpener>,
    fallback: Arc<dyn LinkOpener>,
    inner: Arc<FlowInner>,
}

impl SignInFlow {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        opener: Arc<dyn LinkOpener>,
        fallback: Arc<dyn LinkOpener>,
    ) -> Self {
        Self {
            backend,
            opener,
            fallback,
            inner: Arc::new(FlowInner {
                state: Mutex::new(FlowState {
                    epoch: 0,
                    snapshot: FlowSnapshot::default(),
                    countdown: None,
                }),
                bus: EventBus::new(),
            }),
        }
    }

    /// Subscribe to snapshot updates (every transition and countdown tick).
    pub fn subscribe(&self) -> Subscription<FlowSnapshot> {
        self.inner.bus.subscribe()
    }

    /// Current state of the flow.
    pub fn snapshot(&self) -> FlowSnapshot {
        self.inner.lock().snapshot.clone()
    }

    /// Cancel the current attempt.
    ///
    /// Sticky: any in-flight step's result is discarded on arrival. The
    /// countdown stops immediately and no further events are published for
    /// this attempt.
    pub fn cancel(&self) {
        let mut state = self.inner.lock();
        state.epoch += 1;
        stop_countdown(&mut state);
        debug!("sign-in flow cancelled");
    }

    /// Drive one full sign-in attempt.
    ///
    /// Calling this again after a terminal phase is the restart operation:
    /// all visible state is reset before any request is issued and a brand
    /// new device-code session is requested. Returns the snapshot current
    /// when the attempt left this controller's hands.
    pub async fn run(&self) -> FlowSnapshot {
        let epoch = self.begin_attempt();

        // Request a device code. Failure here is always Generic: no session
        // was ever created, so "expired" cannot apply.
        let session = match self.backend.begin_device_code().await {
            Ok(session) => session,
            Err(err) => {
                self.fail(epoch, &err);
                return self.snapshot();
            }
        };

        let recorded = self.update_if_current(epoch, |snapshot| {
            snapshot.user_code = Some(session.user_code.clone());
            snapshot.verification_uri = Some(session.verification_uri.clone());
            snapshot.message = Some(session.message.clone());
            snapshot.expires_in_secs = session.expires_in_secs;
            snapshot.seconds_left = session.expires_in_secs;
        });
        if !recorded {
            return self.snapshot();
        }

        let opened_externally = self.open_verification(&session.verification_uri).await;
        if !self.update_if_current(epoch, |snapshot| {
            snapshot.phase = AuthPhase::Waiting;
            snapshot.opened_externally = opened_externally;
        }) {
            return self.snapshot();
        }
        self.start_countdown(epoch);

        // The poll call owns its own retry loop and budget; this controller
        // treats it as atomic and never re-enters polling within an attempt.
        let timeout_secs = session.expires_in_secs.min(POLL_CAP_SECS);
        let polled = self
            .backend
            .poll_until_authorized(&session.device_code, session.interval_secs, timeout_secs)
            .await;
        if let Err(err) = polled {
            self.fail(epoch, &err);
            return self.snapshot();
        }

        if !self.update_if_current(epoch, |snapshot| {
            snapshot.phase = AuthPhase::Linking;
        }) {
            return self.snapshot();
        }

        match self.backend.fetch_profile_from_stored_refresh().await {
            Ok(profile) => self.finish(epoch, profile),
            Err(err) => self.fail(epoch, &err),
        }
        self.snapshot()
    }

    /// Reset visible state and invalidate any attempt still in flight.
    fn begin_attempt(&self) -> u64 {
        let mut state = self.inner.lock();
        state.epoch += 1;
        stop_countdown(&mut state);
        state.snapshot = FlowSnapshot::default();
        self.inner.emit(&state);
        state.epoch
    }

    /// Apply a mutation and publish, unless the attempt went stale.
    fn update_if_current(&self, epoch: u64, mutate: impl FnOnce(&mut FlowSnapshot)) -> bool {
        let mut state = self.inner.lock();
        if state.epoch != epoch {
            return false;
        }
        mutate(&mut state.snapshot);
        self.inner.emit(&state);
        true
    }

    fn fail(&self, epoch: u64, err: &AuthError) {
        let mut state = self.inner.lock();
        if state.epoch != epoch {
            debug!(error = %err, "discarding failure from a cancelled attempt");
            return;
        }
        stop_countdown(&mut state);
        let kind = if err.is_expiry() {
            AuthErrorKind::Expired
        } else {
            AuthErrorKind::Generic
        };
        state.snapshot.phase = AuthPhase::Error;
        state.snapshot.error = Some(FlowError {
            kind,
            message: err.to_string(),
            recovery: match kind {
                AuthErrorKind::Expired => RecoveryAction::Restart,
                AuthErrorKind::Generic => RecoveryAction::ReloadOrBack,
            },
        });
        self.inner.emit(&state);
    }

    fn finish(&self, epoch: u64, profile: Profile) {
        let mut state = self.inner.lock();
        if state.epoch != epoch {
            debug!("discarding sign-in success from a cancelled attempt");
            return;
        }
        stop_countdown(&mut state);
        state.snapshot.phase = AuthPhase::Done;
        state.snapshot.profile = Some(profile);
        self.inner.emit(&state);
    }

    async fn open_verification(&self, uri: &str) -> bool {
        match self.opener.open(uri).await {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "external open failed, falling back");
                let _ = self.fallback.open(uri).await;
                false
            }
        }
    }

    /// Spawn the 1 Hz visual countdown for this attempt.
    ///
    /// The tick task re-checks the attempt epoch and phase under the state
    /// lock, so it can never publish after cancellation or a terminal
    /// transition; the handle is additionally aborted whenever the attempt
    /// ends, so no timer outlives the flow.
    fn start_countdown(&self, epoch: u64) {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                let mut state = inner.lock();
                if state.epoch != epoch || state.snapshot.phase.is_terminal() {
                    break;
                }
                if state.snapshot.seconds_left == 0 {
                    break;
                }
                state.snapshot.seconds_left -= 1;
                inner.emit(&state);
                if state.snapshot.seconds_left == 0 {
                    break;
                }
            }
        });

        let mut state = self.inner.lock();
        if state.epoch == epoch {
            stop_countdown(&mut state);
            state.countdown = Some(handle);
        } else {
            handle.abort();
        }
    }
}

fn stop_countdown(state: &mut FlowState) {
    if let Some(handle) = state.countdown.take() {
        handle.abort();
    }
}

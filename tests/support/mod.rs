#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use ember::auth::link::{LinkOpenError, LinkOpener};
use ember::auth::{AuthBackend, AuthError, DeviceCodeSession, Profile};
use ember::vault::{SecretSource, VaultError};

/// Fixed in-memory device secret.
pub struct MemorySecretSource(pub &'static [u8]);

impl SecretSource for MemorySecretSource {
    fn device_secret(&self) -> Result<Vec<u8>, VaultError> {
        Ok(self.0.to_vec())
    }
}

pub fn session(expires_in_secs: u64, interval_secs: u64) -> DeviceCodeSession {
    DeviceCodeSession {
        user_code: "ABC-123".to_string(),
        device_code: "dev1".to_string(),
        verification_uri: "https://example.com/link".to_string(),
        expires_in_secs,
        interval_secs,
        message: "Enter the code".to_string(),
    }
}

pub fn profile() -> Profile {
    Profile {
        id: "uuid-1".to_string(),
        name: "Player".to_string(),
        skin_url: None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollArgs {
    pub device_code: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

/// Scripted [`AuthBackend`]: queued results per step, with an optional gate
/// that holds the poll step until released. An empty queue makes the step
/// pend forever, which stands in for a slow collaborator.
#[derive(Default)]
pub struct MockBackend {
    pub begin_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub poll_args: Mutex<Vec<PollArgs>>,
    begin_results: Mutex<VecDeque<Result<DeviceCodeSession, AuthError>>>,
    poll_results: Mutex<VecDeque<Result<(), AuthError>>>,
    profile_results: Mutex<VecDeque<Result<Profile, AuthError>>>,
    poll_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_begin(&self, result: Result<DeviceCodeSession, AuthError>) {
        self.begin_results.lock().unwrap().push_back(result);
    }

    pub fn push_poll(&self, result: Result<(), AuthError>) {
        self.poll_results.lock().unwrap().push_back(result);
    }

    pub fn push_profile(&self, result: Result<Profile, AuthError>) {
        self.profile_results.lock().unwrap().push_back(result);
    }

    /// Make the poll step wait for the returned notify before resolving.
    pub fn gate_poll(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.poll_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl AuthBackend for MockBackend {
    async fn begin_device_code(&self) -> Result<DeviceCodeSession, AuthError> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.begin_results.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    async fn poll_until_authorized(
        &self,
        device_code: &str,
        interval_secs: u64,
        timeout_secs: u64,
    ) -> Result<(), AuthError> {
        self.poll_args.lock().unwrap().push(PollArgs {
            device_code: device_code.to_string(),
            interval_secs,
            timeout_secs,
        });
        let gate = self.poll_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let next = self.poll_results.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    async fn fetch_profile_from_stored_refresh(&self) -> Result<Profile, AuthError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.profile_results.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

/// Link opener that records invocations.
#[derive(Default)]
pub struct RecordingOpener {
    pub calls: AtomicUsize,
}

#[async_trait]
impl LinkOpener for RecordingOpener {
    async fn open(&self, _uri: &str) -> Result<(), LinkOpenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Link opener that always fails.
pub struct FailingOpener;

#[async_trait]
impl LinkOpener for FailingOpener {
    async fn open(&self, uri: &str) -> Result<(), LinkOpenError> {
        Err(LinkOpenError(format!("no browser for {uri}")))
    }
}

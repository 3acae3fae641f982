//! Ember — launcher core SDK
//!
//! The headless core of a desktop game launcher: device-code sign-in
//! against Microsoft's identity platform, an encrypted-at-rest credential
//! vault unlocked by a device-bound secret, and a progress event stream
//! for long-running launch jobs.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember::auth::providers::microsoft::MicrosoftAuth;
//! use ember::auth::{NoopLinkOpener, SignInFlow, SystemLinkOpener};
//! use ember::config::EmberConfig;
//!
//! # async fn example() {
//! let config = EmberConfig::from_env();
//! let credentials = Arc::new(config.credential_service());
//! let backend = Arc::new(MicrosoftAuth::new(credentials));
//! let flow = SignInFlow::new(backend, Arc::new(SystemLinkOpener), Arc::new(NoopLinkOpener));
//!
//! let mut events = flow.subscribe();
//! let outcome = flow.run().await;
//! println!("signed in: {}", outcome.phase);
//! # }
//! ```

pub mod auth;
pub mod bus;
pub mod config;
pub mod credentials;
pub mod error;
pub mod launch;
pub mod prelude;
pub mod vault;

#[cfg(feature = "cli")]
pub mod cli;

//! Opening the verification link in an external surface.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("could not open link: {0}")]
pub struct LinkOpenError(pub String);

/// Best-effort opener for the verification URI.
///
/// A failure never aborts the sign-in flow; the controller falls back to a
/// secondary opener and records which surface was used (wording only).
#[async_trait]
pub trait LinkOpener: Send + Sync {
    async fn open(&self, uri: &str) -> Result<(), LinkOpenError>;
}

/// Opens the URI with the platform's default browser.
pub struct SystemLinkOpener;

#[async_trait]
impl LinkOpener for SystemLinkOpener {
    async fn open(&self, uri: &str) -> Result<(), LinkOpenError> {
        let uri = uri.to_string();
        tokio::task::spawn_blocking(move || open::that(&uri))
            .await
            .map_err(|err| LinkOpenError(err.to_string()))?
            .map_err(|err| LinkOpenError(err.to_string()))
    }
}

/// Fallback that accepts the link without opening anything.
///
/// Stands in for an in-process surface when the embedder does not provide
/// one; the flow continues and the user can still follow the displayed URI.
pub struct NoopLinkOpener;

#[async_trait]
impl LinkOpener for NoopLinkOpener {
    async fn open(&self, _uri: &str) -> Result<(), LinkOpenError> {
        Ok(())
    }
}

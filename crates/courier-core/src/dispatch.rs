//! Message-dispatch boundary.
//!
//! The core resolves the tenant and hands over the live link; interpreting
//! message content and issuing replies is entirely the handler's business.
//! Handler failures are caught at the per-message boundary by the manager,
//! so one faulty interaction can never take a session down.

use async_trait::async_trait;

use crate::connect::{ConnectionLink, InboundMessage};

/// Collaborator interface for inbound message handling.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one inbound message on the tenant's live connection.
    ///
    /// # Errors
    /// Any error is treated as a per-message failure: logged, reported back
    /// to the originating chat on a best-effort basis, and never propagated
    /// into the session lifecycle.
    async fn handle(
        &self,
        number: &str,
        link: &dyn ConnectionLink,
        message: &InboundMessage,
    ) -> anyhow::Result<()>;
}

/// Handler that ignores every message.
///
/// Used when the manager runs headless (tests, bare session hosting).
pub struct NoopHandler;

#[async_trait]
impl MessageHandler for NoopHandler {
    async fn handle(
        &self,
        _number: &str,
        _link: &dyn ConnectionLink,
        _message: &InboundMessage,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

//! Lifecycle state machine.
//!
//! Connection events are folded into a pure transition function so the
//! lifecycle rules are testable without a live connection. The manager
//! applies the returned status/health pair and executes the side effects
//! in order.
//!
//! States: `connecting → active → {disconnected | invalid | failed}`, with
//! `disconnected` able to return to `connecting` via a scheduled reconnect.
//! `invalid` (logged out) and `failed` (retry budget exhausted) are terminal
//! for the handle.

use crate::connect::{ConnectionEvent, CredentialSnapshot, InboundMessage};
use crate::store::{SessionHealth, SessionStatus};

/// Inputs the transition function needs beyond the event itself.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext {
    /// Consecutive retryable closes, counting the one being processed.
    /// The budget is exhausted once this reaches `max_attempts`.
    pub attempts: u32,
    /// Retry budget.
    pub max_attempts: u32,
}

/// Side effects the manager executes after applying a transition.
///
/// Ordering within a transition matters: effects are executed front to back.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    /// Clear the reconnection counter and cancel any pending reconnect timer.
    ResetAttempts,
    /// Persist the link's current credential snapshot (succeed or buffer).
    PersistSnapshot,
    /// Persist a snapshot carried by the event (succeed or buffer).
    PersistRotatedSnapshot(CredentialSnapshot),
    /// Run the on-open hooks (notify, auto-join, auto-subscribe).
    RunOpenHooks,
    /// Increment the reconnection counter (memory and durable mirror).
    IncrementAttempts,
    /// Write the new status/health to the durable record.
    PersistStatus,
    /// Schedule a flat-delay reconnect attempt (cancelable).
    ScheduleReconnect,
    /// Remove the handle from the session table.
    DropHandle,
    /// Remove the reconnection counter and cancel any pending timer.
    ClearAttempts,
    /// Delete the local credential workspace immediately.
    DeleteCredentials,
    /// Delete the durable record after the configured grace delay.
    ScheduleRecordDeletion,
    /// Surface an out-of-band pairing code.
    SurfacePairingCode(String),
    /// Hand an inbound message to the dispatch collaborator.
    Dispatch(InboundMessage),
}

/// Result of folding one event into the current state.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Status after the event.
    pub status: SessionStatus,
    /// Health after the event.
    pub health: SessionHealth,
    /// Side effects to execute, in order.
    pub effects: Vec<SideEffect>,
}

/// Folds a connection event into the session's current state.
pub fn transition(
    status: SessionStatus,
    health: SessionHealth,
    event: ConnectionEvent,
    ctx: TransitionContext,
) -> Transition {
    match event {
        ConnectionEvent::Opened => Transition {
            status: SessionStatus::Active,
            health: SessionHealth::Active,
            effects: vec![
                SideEffect::ResetAttempts,
                SideEffect::PersistSnapshot,
                SideEffect::RunOpenHooks,
            ],
        },

        ConnectionEvent::ClosedRetryable { .. } if ctx.attempts < ctx.max_attempts => Transition {
            status: SessionStatus::Disconnected,
            health: SessionHealth::Reconnecting,
            effects: vec![
                SideEffect::IncrementAttempts,
                SideEffect::PersistStatus,
                SideEffect::ScheduleReconnect,
            ],
        },

        // Retry budget exhausted: terminal until the reconnect sweep or an
        // explicit create revives the tenant.
        ConnectionEvent::ClosedRetryable { .. } => Transition {
            status: SessionStatus::Failed,
            health: SessionHealth::Disconnected,
            effects: vec![
                SideEffect::PersistStatus,
                SideEffect::ClearAttempts,
                SideEffect::DropHandle,
            ],
        },

        ConnectionEvent::ClosedLoggedOut => Transition {
            status: SessionStatus::Invalid,
            health: SessionHealth::Disconnected,
            effects: vec![
                SideEffect::PersistStatus,
                SideEffect::ClearAttempts,
                SideEffect::DeleteCredentials,
                SideEffect::ScheduleRecordDeletion,
                SideEffect::DropHandle,
            ],
        },

        // Key rotation is independent of open/close transitions and can
        // occur many times while a session is active.
        ConnectionEvent::CredentialsRotated(snapshot) => Transition {
            status,
            health,
            effects: vec![SideEffect::PersistRotatedSnapshot(snapshot)],
        },

        ConnectionEvent::PairingRequired { code } => Transition {
            status: SessionStatus::Waiting,
            health,
            effects: vec![SideEffect::PersistStatus, SideEffect::SurfacePairingCode(code)],
        },

        ConnectionEvent::Inbound(message) => Transition {
            status,
            health,
            effects: vec![SideEffect::Dispatch(message)],
        },
    }
}

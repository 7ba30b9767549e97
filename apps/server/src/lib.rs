//! Courier server library: the HTTP control plane over a session manager.
//!
//! Split from the `courierd` binary so the router can be exercised in tests
//! without binding a listener.

pub mod routes;

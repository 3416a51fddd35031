//! HTTP handlers. Each one unpacks its request, calls one service and maps the result.

pub mod auth;
pub mod invites;
pub mod metrics;

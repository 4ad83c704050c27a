//! HTTP handlers for the webhook engine's operational endpoints.

pub mod deliveries;
pub mod sweep;
pub mod test_dispatch;

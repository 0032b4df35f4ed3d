//! Outbound messaging: the channel port and the rate-limited dispatcher in front of it.

pub mod dispatcher;
pub mod port;
pub mod types;

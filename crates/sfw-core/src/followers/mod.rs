//! Follower listing: wire schema, the source port, and the paginated fetcher.

pub mod fetcher;
pub mod port;
pub mod types;

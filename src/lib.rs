//! Filtering proxy for RSS and Atom feeds.
//!
//! Each configured feed points at an upstream URL and carries an ordered rule
//! list. Readers subscribe to `/{feed_id}`; the proxy fetches the upstream,
//! drops, promotes or demotes entries according to the first matching rule,
//! and returns the rewritten document.

pub mod config;
pub mod filter;
pub mod model;
pub mod proxy;
pub mod server;
pub mod storage;
pub mod util;

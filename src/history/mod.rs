//! Delivered-notification history.
//!
//! The directory is authoritative. Locally the store keeps the last fetched
//! list in memory and mirrors it to disk for offline display.
//!
//! # Modules
//!
//! - [`store`] - fetch/delete with rollback ([`HistoryStore`])
//! - [`cache`] - JSON file mirror ([`HistoryCache`])

pub mod cache;
pub mod store;

pub use cache::HistoryCache;
pub use store::{HistoryStore, HistoryView};

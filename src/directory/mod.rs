//! Communication with the notification directory.
//!
//! The directory is the remote service that stores device records, tenant
//! routing ids, tenant interest catalogues and notification history.
//!
//! # Modules
//!
//! - [`client`] - async HTTP client ([`DirectoryClient`])
//! - [`types`] - request/response bodies

pub mod client;
pub mod types;

pub use client::DirectoryClient;
pub use types::{Delivery, HistoryEntry};

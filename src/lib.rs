//! Phonebook contact service: an authoritative in-memory contact store with
//! an append-only SQLite journal, a single-writer runtime, and a JSON HTTP API.
//!
//! # Examples
//!
//! In-memory usage with [`core::store::ContactStore`]:
//! ```
//! use phonebook::{contact::ContactDraft, core::store::ContactStore};
//!
//! let mut store = ContactStore::new();
//! let (contact, _op) = store
//!     .create(ContactDraft::new("Ada Lovelace", "09-1234567"))
//!     .expect("create");
//! assert_eq!(contact.id, 1);
//! assert!(store.create(ContactDraft::new("ada lovelace", "040-1234567")).is_err());
//! ```
//!
//! Runtime usage with SQLite sink:
//! ```no_run
//! use phonebook::{
//!     contact::ContactDraft,
//!     persist::sqlite::SqliteOpSink,
//!     runtime::handle::{spawn_phonebook, AckMode, RuntimeConfig},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sink = SqliteOpSink::open("phonebook.db").expect("open sqlite");
//! let store = sink.load_store().expect("replay");
//! let cfg = RuntimeConfig { ack_mode: AckMode::Durable, ..RuntimeConfig::default() };
//! let handle = spawn_phonebook(store, Some(Box::new(sink)), cfg);
//! let contact = handle
//!     .create(ContactDraft::new("Ada Lovelace", "09-1234567"))
//!     .await
//!     .expect("create");
//! assert!(handle.delete(contact.id).await.expect("delete"));
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![warn(missing_docs)]

/// Environment-driven configuration.
pub mod config;
/// Contact records, drafts, and validation.
pub mod contact;
/// Core in-memory store and index helpers.
pub mod core;
/// HTTP routes, payloads, and error mapping.
pub mod http;
/// Mutation op model and persistence wrapper types.
pub mod op;
/// Persistence abstraction and SQLite implementation.
pub mod persist;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Process lifecycle for the HTTP server.
pub mod server;
/// Shared primitive types.
pub mod types;

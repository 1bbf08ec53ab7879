//! Infrastructure layer: SQLite storage, HTTP delivery, scheduling, config.

pub mod config;
pub mod db;
pub mod http;
pub mod kv;
pub mod outbox;
pub mod scheduler;

pub use config::{ConfigError, SamplerConfig};
pub use db::{migrate, open_pool};
pub use http::{HttpTransport, TransportError};
pub use kv::SqliteKvStore;
pub use outbox::SqliteOutboxStore;
pub use scheduler::TokioScheduler;

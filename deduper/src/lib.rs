//! Deduplication relay for game-data pub/sub topics.
//!
//! Reporting clients publish market orders, gold prices and map data on ingest
//! topics, often several clients reporting the same thing. Each category is
//! normalized, fingerprinted and checked against a TTL-windowed cache; only the
//! first sighting inside the window is republished on the matching deduped topic.
//!
//! ## Error logging
//!
//! Log errors with `error = ?e` or `{e:#}` so the source chain is visible.

pub mod cache;
pub mod category;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod metrics_consts;
pub mod metrics_server;
pub mod normalizer;
pub mod router;
pub mod service;
pub mod transport;

pub use cache::{SeenCache, SeenStatus};
pub use category::{Category, TopicPair};
pub use engine::{DedupEngine, ProcessReport};
pub use error::DedupError;
pub use fingerprint::fingerprint;

//! revsweep-state: embedded collaborators for revsweep.
//!
//! Backed by [redb](https://docs.rs/redb), provides a persistent or
//! in-memory implementation of both contracts the cleanup engine needs:
//! object buckets ([`Bucket`], an `ObjectStore`) and a routing platform
//! ([`StateStore`] itself, a `RoutingPlatform`).
//!
//! # Architecture
//!
//! Objects are stored raw under `{bucket}/{key}`. Routing configurations
//! and revision records are JSON-serialized into `&[u8]` value columns,
//! keyed by service id and `{service_id}|{revision}` respectively.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across worker threads.

pub mod bucket;
pub mod error;
pub mod store;
pub mod tables;

pub use bucket::Bucket;
pub use error::{StateError, StateResult};
pub use store::StateStore;

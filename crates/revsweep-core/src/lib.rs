//! revsweep-core: shared types and contracts for the revision cleanup engine.
//!
//! Everything here is synchronous and free of I/O except config loading:
//! domain records, the dotted-version ordering, revision name normalization,
//! metadata object naming, and the two collaborator traits the engine is
//! written against.

pub mod config;
pub mod error;
pub mod naming;
pub mod store;
pub mod types;
pub mod version;

pub use config::Settings;
pub use error::{ConfigError, RoutingError, StoreError, ValidationError};
pub use naming::{metadata_key, normalize_revision, parse_metadata_key, tag_name};
pub use store::{ObjectStore, RoutingPlatform};
pub use types::*;
pub use version::compare_versions;

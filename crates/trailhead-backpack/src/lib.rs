//! Trailhead backpack data layer.
//!
//! - [`store`]: slug-scoped backpack mutations with normalization and
//!   local persistence
//! - [`sync`]: debounced, last-writer-wins push of backpack snapshots
//! - [`drops`]: the offline-first drop log with its bounded local cache
//! - [`remote`]: the backpack API, over HTTP or in memory
//! - [`storage`]: client-side key-value persistence
//! - [`normalize`]: repair of arbitrary stored JSON into a valid state
//!
//! Nothing here surfaces an error to the player. Remote and storage
//! failures are logged through `tracing` and the layer carries on with the
//! last known good local state.

pub mod drops;
pub mod error;
pub mod normalize;
pub mod remote;
pub mod storage;
pub mod store;
pub mod sync;

pub use drops::{DROP_CACHE_CAP, DropLog};
pub use error::{RemoteError, StorageError};
pub use normalize::{normalize, normalize_str, normalize_value};
pub use remote::{DropListing, DropRequest, HttpRemote, MemoryRemote, RemoteBackend};
pub use storage::{FileStore, KeyValueStore, MemoryStore, backpack_key, drops_key};
pub use store::BackpackStore;
pub use sync::{DEFAULT_DEBOUNCE, SyncEngine, SyncStats};

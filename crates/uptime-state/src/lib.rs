//! uptime-state — record store for the uptime worker.
//!
//! Records are untyped JSON objects addressed by `(collection, id)`. The
//! worker treats the `checks` collection as its universe of truth; typing
//! and validation happen downstream, so the store never rejects a record
//! for its shape.
//!
//! [`RecordStore`] is the contract the worker consumes. [`StateStore`] is
//! the embedded implementation, backed by [redb](https://docs.rs/redb),
//! with an in-memory variant for tests. It is `Clone` + `Send` + `Sync`
//! (backed by `Arc<Database>`) and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::{RecordStore, StateStore};

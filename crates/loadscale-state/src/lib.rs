//! loadscale-state — policy and scaling-event storage.
//!
//! The control loop and the lifecycle operations only see the
//! [`PolicyStore`] trait. [`StateStore`] is the bundled implementation,
//! backed by [redb](https://docs.rs/redb), with persistent and in-memory
//! backends.
//!
//! # Architecture
//!
//! Policies and events are JSON-serialized into redb's `&[u8]` value
//! columns. Events use composite keys (`{policy_id}:{event_id}`, both
//! zero-padded) so a prefix scan returns one policy's history in order.
//! Id sequences live in their own table and are bumped inside the same
//! write transaction that uses them.
//!
//! `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{PolicyStore, StateStore};
pub use types::*;

//! Local change store for whiteboard documents.
//!
//! This crate owns the reactive record store the editing surface draws from
//! and the sync engine reads and writes. Records are kind-prefixed ids over
//! opaque JSON bodies; every mutation flows through an origin-tagged atomic
//! batch so downstream consumers can tell local edits from applied remote
//! state.

pub mod record;
pub mod store;

pub use record::{Record, RecordId, RecordKind};
pub use store::{ChangeBatch, ChangeOrigin, ChangeStore, RecordUpdate};

//! Data layer for the live map viewer.
//!
//! This crate re-exports the records from `atlas_schema` and adds the logic
//! that operates on them: payload normalization, update classification and
//! the reconciliation store the viewer renders from.

pub use atlas_schema::*;

pub mod normalize;
pub mod raw;
pub mod sidebar;
pub mod store;
pub mod updates;

pub use normalize::{build_configuration, build_marker_sets, build_update_response, MessageBundle};
pub use sidebar::{SidebarState, SidebarStateError};
pub use store::{AtlasStore, MapRef, StoreError, PLAYER_BATCH_SIZE};
pub use updates::{classify_updates, ClassifiedUpdates};

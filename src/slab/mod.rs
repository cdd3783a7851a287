//! Slab formatting and the per-cache slab list state machine.

pub mod slab_cache;
pub mod slab_node;

// Re-export public types
pub use slab_cache::{SlabCache, SlabState};
pub use slab_node::SlabGeometry;

use glam::Vec3;
use thiserror::Error;

use crate::linear_octree::EntryId;

pub type Result<T, E = SpatialError> = std::result::Result<T, E>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpatialError {
    /// The requested depth is deeper than the index (or the Morton encoder) allows.
    /// Fatal for the index being built.
    #[error("octree depth {depth} exceeds the maximum of {max_depth}")]
    DepthExceedsMaximum { depth: u32, max_depth: u32 },

    /// A bounding volume lies partly or fully outside the indexed region.
    /// Coordinates are local to the region origin.
    #[error("bounds {min} - {max} lie outside the indexed region")]
    OutOfRange { min: Vec3, max: Vec3 },

    /// The computed slot is past the end of the cell array. This is a bug in
    /// the addressing, not a user error.
    #[error("slot {slot} overflows the cell array of {cell_count} slots")]
    SlotOverflow { slot: usize, cell_count: usize },

    #[error("world bounds {min} - {max} have no volume")]
    InvalidWorldBounds { min: Vec3, max: Vec3 },

    #[error("no live entry for {0:?}")]
    UnknownEntry(EntryId),

    /// The container has no object registered under the given handle.
    #[error("object is not tracked")]
    Untracked,
}

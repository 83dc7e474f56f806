//! Bit interleaving between 3D grid coordinates and Morton codes.

mod key;
pub use key::*;

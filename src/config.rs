use glam::Vec3;

use crate::linear_octree::DEFAULT_MAX_DEPTH;

/// Construction parameters for a [`LinearOctree`](crate::LinearOctree).
///
/// `max_depth` bounds `depth`; slot count grows as 8^depth, so depth 6 already
/// means ~300k slots and the encoder caps it at
/// [`MORTON_DEPTH_LIMIT`](crate::morton::MORTON_DEPTH_LIMIT).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OctreeConfig {
    pub depth: u32,
    pub max_depth: u32,
    pub world_min: Vec3,
    pub world_max: Vec3,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            depth: 1,
            max_depth: DEFAULT_MAX_DEPTH,
            world_min: Vec3::splat(-10.0),
            world_max: Vec3::splat(10.0),
        }
    }
}

/// How far, and how wide around its heading, an agent looks for peers.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NeighborParams {
    pub neighbor_distance: f32,
    /// Half-angle of the view cone in degrees.
    pub neighbor_fov: f32,
}

impl Default for NeighborParams {
    fn default() -> Self {
        Self {
            neighbor_distance: 1.0,
            neighbor_fov: 90.0,
        }
    }
}

impl NeighborParams {
    /// Cosine threshold a direction must exceed to be inside the view cone.
    #[inline]
    pub fn fov_cos(&self) -> f32 {
        self.neighbor_fov.to_radians().cos()
    }
}

#[test]
fn defaults_test() {
    let config = OctreeConfig::default();
    assert_eq!(config.depth, 1);
    assert_eq!(config.max_depth, 6);
    assert_eq!(config.world_max - config.world_min, Vec3::splat(20.0));
    assert!(NeighborParams::default().fov_cos().abs() < 1e-6);
}

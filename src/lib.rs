//! Dynamic spatial index for flocking agents.
//!
//! A [`LinearOctree`] subdivides a fixed world region into a complete octree
//! stored as a flat array of lazily created cells, addressed by Morton code.
//! Every tracked object sits in the coarsest cell that fully contains its
//! bounding box, in an intrusive list that survives moves in O(1).
//!
//! [`OctreeSystem`] wraps the index for a simulation: register bounds once per
//! tick, then ask for neighbours.
//!
//! ```
//! use morton_flock::{ Aabb, NeighborParams, OctreeConfig, OctreeSystem };
//! use morton_flock::glam::Vec3;
//!
//! let mut system = OctreeSystem::new(&OctreeConfig { depth: 3, ..Default::default() }).unwrap();
//! system.register_object(0u32, Aabb::point(Vec3::ZERO)).unwrap();
//! system.register_object(1u32, Aabb::point(Vec3::new(0.5, 0.0, 0.0))).unwrap();
//!
//! assert_eq!(system.neighbors(0, &NeighborParams::default(), None), vec![1]);
//! ```
#![warn(unused_extern_crates)]
pub use glam;

pub mod aabb;
pub use aabb::Aabb;

pub mod agent;
pub use agent::MortonAgent;

pub mod config;
pub use config::{ NeighborParams, OctreeConfig };

pub mod error;
pub use error::{ Result, SpatialError };

pub mod linear_octree;
pub use linear_octree::{ EntryId, LinearOctree };

pub mod morton;

pub mod system;
pub use system::OctreeSystem;

pub mod utils;

//! Application-side owner of a [`LinearOctree`].
//!
//! [`OctreeSystem`] tracks objects by a caller-chosen handle (an entity id,
//! an index into the flock, ...), keeps one [`MortonAgent`] per handle and
//! answers the neighbour queries a flocking step needs.

use std::hash::Hash;

use ahash::AHashMap;
use glam::Vec3;
use log::debug;
use ordered_float::OrderedFloat;

use crate::{
    aabb::Aabb,
    agent::MortonAgent,
    config::{ NeighborParams, OctreeConfig },
    error::{ Result, SpatialError },
    linear_octree::LinearOctree,
    utils,
};

#[derive(Debug)]
pub struct OctreeSystem<T> {
    tree: LinearOctree<T>,
    agents: AHashMap<T, MortonAgent>,
}

impl<T: Copy + Eq + Hash> OctreeSystem<T> {
    pub fn new(config: &OctreeConfig) -> Result<Self> {
        Ok(Self {
            tree: LinearOctree::from_config(config)?,
            agents: AHashMap::new(),
        })
    }

    pub fn tree(&self) -> &LinearOctree<T> {
        &self.tree
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn contains(&self, handle: T) -> bool {
        self.agents.contains_key(&handle)
    }

    pub fn bounds_of(&self, handle: T) -> Option<Aabb> {
        self.agents.get(&handle).map(MortonAgent::bounds)
    }

    /// Slot of the cell currently holding `handle`.
    pub fn cell_of(&self, handle: T) -> Option<usize> {
        let agent = self.agents.get(&handle)?;
        self.tree.entry_cell(agent.entry())
    }

    /// World-space box of the cell currently holding `handle`.
    pub fn cell_bounds_of(&self, handle: T) -> Option<Aabb> {
        self.tree.decode_slot_bounds(self.cell_of(handle)?).ok()
    }

    /// Starts tracking `handle`, or moves it if it is already tracked.
    ///
    /// The handle stays tracked even when the registration is rejected, so a
    /// later update back inside the region indexes it again.
    pub fn register_object(&mut self, handle: T, bounds: Aabb) -> Result<usize> {
        let tree = &mut self.tree;
        let agent = self
            .agents
            .entry(handle)
            .or_insert_with(|| MortonAgent::spawn(tree, handle, bounds));
        agent.update(tree, bounds)
    }

    /// Moves an already tracked object. Unlike
    /// [`register_object`](Self::register_object) this never starts tracking
    /// a new handle.
    pub fn update_object(&mut self, handle: T, bounds: Aabb) -> Result<usize> {
        let agent = self.agents.get_mut(&handle).ok_or(SpatialError::Untracked)?;
        agent.update(&mut self.tree, bounds)
    }

    /// Stops tracking `handle`. Returns false if it was not tracked.
    pub fn remove_object(&mut self, handle: T) -> bool {
        match self.agents.remove(&handle) {
            Some(agent) => agent.despawn(&mut self.tree).is_some(),
            None => false,
        }
    }

    /// Registers a whole simulation step worth of bounds. Returns how many
    /// objects were rejected.
    pub fn tick<I: IntoIterator<Item = (T, Aabb)>>(&mut self, objects: I) -> usize {
        let (mut updated, mut rejected) = (0usize, 0usize);
        for (handle, bounds) in objects {
            match self.register_object(handle, bounds) {
                Ok(_) => updated += 1,
                Err(_) => rejected += 1,
            }
        }
        debug!("octree tick: {updated} registered, {rejected} rejected");
        rejected
    }

    /// Every tracked object whose bounds centre lies within `radius` of
    /// `center`, nearest first.
    pub fn neighbors_within(&self, center: Vec3, radius: f32) -> Vec<(T, f32)> {
        let mut found: Vec<_> = self
            .candidates(center, radius)
            .into_iter()
            .map(|(handle, _, distance)| (handle, distance))
            .collect();
        found.sort_by_key(|&(_, distance)| OrderedFloat(distance));
        found
    }

    /// Peers of `handle` closer than `params.neighbor_distance`, nearest
    /// first. With a `heading`, only peers inside the view cone around it count.
    pub fn neighbors(&self, handle: T, params: &NeighborParams, heading: Option<Vec3>) -> Vec<T> {
        let Some(agent) = self.agents.get(&handle) else { return Vec::new() };
        let center = agent.bounds().center();
        let forward = heading.map(Vec3::normalize_or_zero);
        let fov_cos = params.fov_cos();

        let mut found: Vec<_> = self
            .candidates(center, params.neighbor_distance)
            .into_iter()
            .filter(|&(other, position, _)| {
                other != handle
                    && forward.map_or(true, |forward| {
                        forward.dot((position - center).normalize_or_zero()) > fov_cos
                    })
            })
            .map(|(other, _, distance)| (other, distance))
            .collect();
        found.sort_by_key(|&(_, distance)| OrderedFloat(distance));
        found.into_iter().map(|(other, _)| other).collect()
    }

    /// Runs [`neighbors`](Self::neighbors) for each `(handle, heading)` pair.
    #[cfg(feature = "multi-thread")]
    pub fn neighbors_batch(&self, queries: &[(T, Option<Vec3>)], params: &NeighborParams) -> Vec<Vec<T>>
    where
        T: Send + Sync,
    {
        use rayon::prelude::*;
        queries
            .par_iter()
            .map(|&(handle, heading)| self.neighbors(handle, params, heading))
            .collect()
    }

    /// Runs [`neighbors`](Self::neighbors) for each `(handle, heading)` pair.
    #[cfg(not(feature = "multi-thread"))]
    pub fn neighbors_batch(&self, queries: &[(T, Option<Vec3>)], params: &NeighborParams) -> Vec<Vec<T>> {
        queries
            .iter()
            .map(|&(handle, heading)| self.neighbors(handle, params, heading))
            .collect()
    }

    /// Leaf grid outline for debug drawing.
    pub fn grid_lines(&self) -> Vec<[Vec3; 2]> {
        utils::grid_lines(self.tree.world_bounds(), self.tree.depth())
    }

    /// Objects within `radius` of `center`, with their centre and distance.
    ///
    /// Only the node holding the (clipped) query box, its subtree and its
    /// ancestors can contain anything that overlaps the box.
    fn candidates(&self, center: Vec3, radius: f32) -> Vec<(T, Vec3, f32)> {
        if radius.is_nan() || radius <= 0.0 {
            return Vec::new();
        }
        let query = Aabb::from_radius(center, radius);
        let Some(clipped) = query.intersection(&self.tree.world_bounds()) else { return Vec::new() };
        let Ok(slot) = self.tree.slot_for(clipped.start, clipped.end) else { return Vec::new() };

        let mut found = Vec::new();
        let mut visit = |handle: &T| {
            let Some(agent) = self.agents.get(handle) else { return };
            let position = agent.bounds().center();
            let distance = position.distance(center);
            if distance < radius {
                found.push((*handle, position, distance));
            }
        };
        self.tree.for_each_under_slot(slot, &mut visit);
        self.tree.for_each_above_slot(slot, &mut visit);
        found
    }
}

#[cfg(test)]
fn test_system() -> OctreeSystem<u32> {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = OctreeConfig {
        depth: 3,
        world_min: Vec3::splat(-8.0),
        world_max: Vec3::splat(8.0),
        ..Default::default()
    };
    OctreeSystem::new(&config).unwrap()
}

#[test]
fn register_and_remove_test() {
    let mut system = test_system();
    assert_eq!(system.tree().cell_count(), 585);

    assert!(system.register_object(1, Aabb::point(Vec3::splat(-7.5))).is_ok());
    assert!(system.register_object(2, Aabb::point(Vec3::splat(7.5))).is_ok());
    assert_eq!(system.len(), 2);
    assert_eq!(system.cell_of(1), Some(73));
    assert_eq!(system.cell_bounds_of(1), Some(Aabb::new(Vec3::splat(-8.0), Vec3::splat(-6.0))));

    // Moving re-uses the same entry.
    assert!(system.register_object(1, Aabb::point(Vec3::splat(7.0))).is_ok());
    assert_eq!(system.len(), 2);
    assert_eq!(system.tree().len(), 2);
    assert_eq!(system.cell_of(1), system.cell_of(2));

    assert!(system.remove_object(1));
    assert!(!system.remove_object(1));
    assert!(!system.contains(1));
    assert_eq!(system.tree().len(), 1);
}

#[test]
fn out_of_range_object_stays_tracked() {
    let mut system = test_system();
    assert!(system.register_object(5, Aabb::point(Vec3::ZERO)).is_ok());
    assert!(system.register_object(5, Aabb::point(Vec3::splat(20.0))).is_err());
    assert!(system.contains(5));
    assert_eq!(system.cell_of(5), None);
    assert!(system.neighbors_within(Vec3::ZERO, 4.0).is_empty());

    assert!(system.register_object(5, Aabb::point(Vec3::ZERO)).is_ok());
    assert_eq!(system.neighbors_within(Vec3::ZERO, 4.0), vec![(5, 0.0)]);
}

#[test]
fn tick_counts_rejections() {
    let mut system = test_system();
    let rejected = system.tick([
        (0, Aabb::point(Vec3::ZERO)),
        (1, Aabb::point(Vec3::ONE)),
        (2, Aabb::point(Vec3::splat(100.0))),
        (3, Aabb::new(Vec3::splat(-9.0), Vec3::ZERO)),
    ]);
    assert_eq!(rejected, 2);
    assert_eq!(system.len(), 4);
}

#[test]
fn neighbors_within_matches_brute_force() {
    use rand::{ rngs::StdRng, Rng, SeedableRng };

    let mut rng = StdRng::seed_from_u64(42);
    let mut system = test_system();
    let mut positions = Vec::new();
    for handle in 0..200u32 {
        let position = Vec3::new(
            rng.random_range(-8.0..8.0),
            rng.random_range(-8.0..8.0),
            rng.random_range(-8.0..8.0),
        );
        // Mix of points and small boxes so some objects sit above the leaves.
        let bounds = Aabb::from_radius(position, rng.random_range(0.0..1.5)).intersection(&system.tree().world_bounds());
        let bounds = bounds.unwrap_or(Aabb::point(position));
        system.register_object(handle, bounds).unwrap();
        positions.push(bounds.center());
    }

    for _ in 0..50 {
        let center = Vec3::new(
            rng.random_range(-8.0..8.0),
            rng.random_range(-8.0..8.0),
            rng.random_range(-8.0..8.0),
        );
        let radius = rng.random_range(0.5f32..4.0);
        let found = system.neighbors_within(center, radius);

        let mut expected: Vec<u32> = positions
            .iter()
            .enumerate()
            .filter(|(_, position)| position.distance(center) < radius)
            .map(|(handle, _)| handle as u32)
            .collect();
        let mut actual: Vec<u32> = found.iter().map(|&(handle, _)| handle).collect();
        assert!(found.windows(2).all(|pair| pair[0].1 <= pair[1].1), "not sorted by distance");
        expected.sort();
        actual.sort();
        assert_eq!(actual, expected);
    }
}

#[test]
fn neighbors_respects_distance_and_fov() {
    let mut system = test_system();
    system.register_object(0, Aabb::point(Vec3::ZERO)).unwrap();
    system.register_object(1, Aabb::point(Vec3::new(0.5, 0.0, 0.0))).unwrap();
    system.register_object(2, Aabb::point(Vec3::new(-0.3, 0.0, 0.0))).unwrap();
    system.register_object(3, Aabb::point(Vec3::new(0.2, 3.0, 0.0))).unwrap();
    system.register_object(4, Aabb::point(Vec3::new(-0.2, 0.0, 3.5))).unwrap();

    let params = NeighborParams::default();
    assert_eq!(system.neighbors(0, &params, None), vec![2, 1]);
    // Facing +x, the peer behind drops out.
    assert_eq!(system.neighbors(0, &params, Some(Vec3::X)), vec![1]);

    let wide = NeighborParams { neighbor_distance: 5.0, ..params };
    assert_eq!(system.neighbors(0, &wide, None), vec![2, 1, 3, 4]);
    assert_eq!(system.neighbors(0, &wide, Some(Vec3::X)), vec![1, 3]);
    assert!(system.neighbors(42, &wide, None).is_empty());

    let batch = system.neighbors_batch(&[(0, Some(Vec3::X)), (3, None)], &wide);
    assert_eq!(batch, vec![vec![1, 3], vec![0, 1, 2, 4]]);
}

#[test]
fn update_object_requires_tracked_handle() {
    let mut system = test_system();
    assert_eq!(system.update_object(9, Aabb::point(Vec3::ZERO)), Err(SpatialError::Untracked));
    assert!(!system.contains(9));

    system.register_object(9, Aabb::point(Vec3::splat(-7.5))).unwrap();
    assert_eq!(system.update_object(9, Aabb::point(Vec3::splat(7.5))), Ok(584));
    assert_eq!(system.cell_of(9), Some(584));
    assert!(system.update_object(9, Aabb::point(Vec3::splat(9.0))).is_err());
    assert!(system.contains(9));
    assert_eq!(system.cell_of(9), None);
}

#[test]
fn grid_lines_cover_world() {
    let system = test_system();
    let lines = system.grid_lines();
    assert_eq!(lines.len(), 3 * 9 * 9);
    let world = system.tree().world_bounds();
    assert!(lines.iter().flatten().all(|&point| world.contains(point)));
}

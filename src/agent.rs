use log::warn;

use crate::{
    aabb::Aabb,
    error::{ Result, SpatialError },
    linear_octree::{ EntryId, LinearOctree },
};

/// Per-object adapter that keeps one tracked object's entry in step with its
/// bounds. Call [`MortonAgent::update`] once per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MortonAgent {
    entry: EntryId,
    bounds: Aabb,
}

impl MortonAgent {
    /// Creates the object's entry. The entry stays unlinked until the first
    /// [`update`](Self::update).
    pub fn spawn<T>(tree: &mut LinearOctree<T>, object: T, bounds: Aabb) -> Self {
        Self {
            entry: tree.create_entry(object),
            bounds,
        }
    }

    #[inline(always)]
    pub fn entry(&self) -> EntryId {
        self.entry
    }

    /// Bounds passed to the latest update.
    #[inline(always)]
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Re-registers the object under `bounds`.
    ///
    /// An object that has left the indexed region is unlinked so that queries
    /// stop reporting it from its old cell; it is picked up again on the first
    /// update back inside the region.
    pub fn update<T>(&mut self, tree: &mut LinearOctree<T>, bounds: Aabb) -> Result<usize> {
        self.bounds = bounds;
        match tree.register_aabb(bounds, self.entry) {
            Err(err @ SpatialError::OutOfRange { .. }) => {
                warn!("{:?} left the indexed region: {err}", self.entry);
                tree.remove_entry(self.entry);
                Err(err)
            }
            result => result,
        }
    }

    /// Unlinks and frees the entry, returning the wrapped object.
    pub fn despawn<T>(self, tree: &mut LinearOctree<T>) -> Option<T> {
        tree.destroy_entry(self.entry)
    }
}

#[test]
fn agent_lifecycle_test() {
    use glam::Vec3;

    let mut tree = LinearOctree::new(2, Vec3::ZERO, Vec3::splat(8.0)).unwrap();
    let mut agent = MortonAgent::spawn(&mut tree, "boid", Aabb::point(Vec3::ONE));
    assert_eq!(tree.entry_cell(agent.entry()), None);

    assert_eq!(agent.update(&mut tree, Aabb::point(Vec3::ONE)), Ok(9));
    assert_eq!(agent.update(&mut tree, Aabb::from_radius(Vec3::splat(7.0), 0.5)), Ok(72));
    assert_eq!(tree.entry_cell(agent.entry()), Some(72));

    // Leaving the region unlinks it.
    let outside = Aabb::point(Vec3::splat(9.0));
    assert!(matches!(agent.update(&mut tree, outside), Err(SpatialError::OutOfRange { .. })));
    assert_eq!(agent.bounds(), outside);
    assert_eq!(tree.entry_cell(agent.entry()), None);

    // Coming back re-links it.
    assert_eq!(agent.update(&mut tree, Aabb::point(Vec3::ONE)), Ok(9));
    assert_eq!(agent.despawn(&mut tree), Some("boid"));
    assert!(tree.is_empty());
    assert_eq!(tree.cell_objects(9).count(), 0);
}

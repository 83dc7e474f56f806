//! Linear (array-backed) octree over a fixed world region.
//!
//! Nodes live in a flat array addressed by level-prefixed Morton code (see
//! [`slot`]). An object is stored in the coarsest node that fully contains its
//! bounding box, found by comparing the Morton codes of the box's two corners.
//! Cells are created lazily, together with any missing ancestors, and are
//! never freed.

mod cell;
mod entry;
pub mod slot;

pub use cell::*;
pub use entry::*;

use glam::{ UVec3, Vec3, uvec3 };
use log::{ error, info, trace };

use crate::{
    aabb::Aabb,
    config::OctreeConfig,
    error::{ Result, SpatialError },
    morton::{ differing_groups, morton_code, MortonKey, MORTON_DEPTH_LIMIT },
};

/// Depth limit used by [`LinearOctree::new`].
pub const DEFAULT_MAX_DEPTH: u32 = 6;

pub struct LinearOctree<T> {
    depth: u32,
    max_depth: u32,
    origin: Vec3,
    extent: Vec3,
    cell_unit: Vec3,
    pub(crate) cells: Vec<Option<Cell>>,
    pub(crate) entries: Entries<T>,
}

impl<T> std::fmt::Debug for LinearOctree<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let materialized = self.cells.iter().filter(|cell| cell.is_some()).count();
        f.debug_struct("LinearOctree")
            .field("depth", &self.depth)
            .field("max_depth", &self.max_depth)
            .field("origin", &self.origin)
            .field("extent", &self.extent)
            .field("cell_count", &self.cells.len())
            .field("materialized", &materialized)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl<T> LinearOctree<T> {
    /// Builds an index subdividing `world_min..world_max` down to `depth`,
    /// with the depth capped at [`DEFAULT_MAX_DEPTH`].
    pub fn new(depth: u32, world_min: Vec3, world_max: Vec3) -> Result<Self> {
        Self::with_max_depth(DEFAULT_MAX_DEPTH, depth, world_min, world_max)
    }

    pub fn from_config(config: &OctreeConfig) -> Result<Self> {
        Self::with_max_depth(config.max_depth, config.depth, config.world_min, config.world_max)
    }

    /// Like [`LinearOctree::new`] with an explicit depth cap. The cap itself
    /// may not exceed [`MORTON_DEPTH_LIMIT`].
    pub fn with_max_depth(max_depth: u32, depth: u32, world_min: Vec3, world_max: Vec3) -> Result<Self> {
        if max_depth > MORTON_DEPTH_LIMIT {
            return Err(SpatialError::DepthExceedsMaximum { depth: max_depth, max_depth: MORTON_DEPTH_LIMIT });
        }
        if depth > max_depth {
            return Err(SpatialError::DepthExceedsMaximum { depth, max_depth });
        }
        // Written this way round so NaN corners are rejected too.
        if !world_max.cmpgt(world_min).all() {
            return Err(SpatialError::InvalidWorldBounds { min: world_min, max: world_max });
        }

        let cell_count = slot::cell_count(depth);
        let extent = world_max - world_min;
        let cell_unit = extent / (1u32 << depth) as f32;
        info!("linear octree: depth {depth}/{max_depth}, {cell_count} slots, region {world_min} - {world_max}");

        Ok(Self {
            depth,
            max_depth,
            origin: world_min,
            extent,
            cell_unit,
            cells: vec![None; cell_count],
            entries: Entries::new(),
        })
    }

    #[inline(always)]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline(always)]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    #[inline(always)]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Edge lengths of one leaf cell.
    #[inline(always)]
    pub fn cell_unit(&self) -> Vec3 {
        self.cell_unit
    }

    pub fn world_bounds(&self) -> Aabb {
        Aabb::new(self.origin, self.origin + self.extent)
    }

    /// Number of live entries, linked or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &Entries<T> {
        &self.entries
    }

    pub fn object(&self, id: EntryId) -> Option<&T> {
        self.entries.get(id).map(|entry| &entry.object)
    }

    /// Slot of the cell currently holding `id`.
    pub fn entry_cell(&self, id: EntryId) -> Option<usize> {
        self.entries.get(id).and_then(Entry::cell)
    }

    pub fn is_materialized(&self, slot: usize) -> bool {
        matches!(self.cells.get(slot), Some(Some(_)))
    }

    pub fn materialized_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(slot, cell)| cell.map(|_| slot))
    }

    /// Objects stored directly in `slot`, not in its descendants.
    pub fn cell_objects(&self, slot: usize) -> impl Iterator<Item = &T> + '_ {
        self.cells
            .get(slot)
            .copied()
            .flatten()
            .into_iter()
            .flat_map(move |cell| cell.iter(&self.entries))
    }

    /// Translates world-space bounds into index-local coordinates, rejecting
    /// anything that pokes out of the indexed region.
    pub fn offset_and_validate(&self, min: Vec3, max: Vec3) -> Result<(Vec3, Vec3)> {
        let (min, max) = (min - self.origin, max - self.origin);
        if !min.cmpge(Vec3::ZERO).all() || !max.cmple(self.extent).all() {
            return Err(SpatialError::OutOfRange { min, max });
        }
        Ok((min, max))
    }

    fn leaf_grid(&self, local: Vec3) -> UVec3 {
        // A corner lying exactly on the far boundary still belongs to the last leaf.
        let last = (1u32 << self.depth) - 1;
        let grid = local / self.cell_unit;
        uvec3(
            (grid.x as u32).min(last),
            (grid.y as u32).min(last),
            (grid.z as u32).min(last),
        )
    }

    /// Finds the coarsest node containing the local box `min..max`.
    ///
    /// ```text
    /// min code:  000 101 011
    /// max code:  000 110 010
    /// xor:       000 011 001   -> two groups differ, node is 2 levels above leaf
    /// ```
    pub fn morton_address(&self, min: Vec3, max: Vec3) -> MortonKey {
        let lo = self.leaf_grid(min);
        let hi = self.leaf_grid(max);
        let lo_code = morton_code(lo.x, lo.y, lo.z);
        let hi_code = morton_code(hi.x, hi.y, hi.z);

        let rise = differing_groups(lo_code ^ hi_code).min(self.depth);
        MortonKey {
            code: hi_code >> (rise * 3),
            level: self.depth - rise,
        }
    }

    /// Slot a world-space box would be registered into.
    pub fn slot_for(&self, min: Vec3, max: Vec3) -> Result<usize> {
        let (min, max) = self.offset_and_validate(min, max)?;
        let slot = self.morton_address(min, max).slot();
        if slot >= self.cell_count() {
            error!("slot {slot} overflows {} cells at depth {}", self.cell_count(), self.depth);
            return Err(SpatialError::SlotOverflow { slot, cell_count: self.cell_count() });
        }
        Ok(slot)
    }

    /// Wraps `object` in a new, unlinked entry.
    pub fn create_entry(&mut self, object: T) -> EntryId {
        self.entries.insert(object)
    }

    /// Classifies `id` by the world-space box `min..max` and moves it into the
    /// matching cell. Returns the slot it now lives in.
    ///
    /// On error nothing is mutated; the entry keeps its previous cell.
    pub fn register(&mut self, min: Vec3, max: Vec3, id: EntryId) -> Result<usize> {
        if !self.entries.contains(id) {
            return Err(SpatialError::UnknownEntry(id));
        }
        let slot = self.slot_for(min, max)?;
        if self.entry_cell(id) == Some(slot) {
            return Ok(slot);
        }

        self.materialize(slot);
        Cell::push(&mut self.cells, slot, id, &mut self.entries);
        Ok(slot)
    }

    #[inline]
    pub fn register_point(&mut self, point: Vec3, id: EntryId) -> Result<usize> {
        self.register(point, point, id)
    }

    pub fn register_aabb(&mut self, bounds: Aabb, id: EntryId) -> Result<usize> {
        self.register(bounds.start, bounds.end, id)
    }

    /// Creates `slot` and every missing ancestor, stopping at the first one
    /// that already exists.
    fn materialize(&mut self, slot: usize) {
        let mut current = Some(slot);
        while let Some(slot) = current {
            let Some(cell) = self.cells.get_mut(slot) else { break };
            if cell.is_some() {
                break;
            }
            *cell = Some(Cell::default());
            trace!("materialized cell {slot}");
            current = slot::parent(slot);
        }
    }

    /// Unlinks `id` from its cell but keeps the entry alive.
    pub fn remove_entry(&mut self, id: EntryId) -> bool {
        self.entries.detach(id, &mut self.cells)
    }

    /// Unlinks and frees `id`, returning the wrapped object.
    pub fn destroy_entry(&mut self, id: EntryId) -> Option<T> {
        self.entries.discard(id, &mut self.cells)
    }

    /// Calls `visit` on every object in the subtree rooted at `slot`.
    /// Unmaterialized or out-of-range slots hold nothing.
    pub fn for_each_under_slot<F: FnMut(&T)>(&self, slot: usize, mut visit: F) {
        let cell_count = self.cell_count();
        let mut stack = Vec::with_capacity(7 * self.depth as usize + 1);
        if self.is_materialized(slot) {
            stack.push(slot);
        }

        while let Some(slot) = stack.pop() {
            if let Some(cell) = &self.cells[slot] {
                cell.iter(&self.entries).for_each(&mut visit);
            }
            stack.extend(
                slot::children(slot, cell_count)
                    .into_iter()
                    .filter(|&child| self.cells[child].is_some()),
            );
        }
    }

    /// Calls `visit` on the objects held by the strict ancestors of `slot`.
    pub fn for_each_above_slot<F: FnMut(&T)>(&self, slot: usize, mut visit: F) {
        if slot >= self.cell_count() {
            return;
        }
        slot::ancestors(slot).for_each(|ancestor| {
            self.cell_objects(ancestor).for_each(&mut visit);
        });
    }

    /// World-space box of the node at `slot`. This is the same box `register`
    /// uses to classify objects into that slot.
    pub fn decode_slot_bounds(&self, slot: usize) -> Result<Aabb> {
        if slot >= self.cell_count() {
            return Err(SpatialError::SlotOverflow { slot, cell_count: self.cell_count() });
        }
        let key = MortonKey::from_slot(slot)
            .ok_or(SpatialError::SlotOverflow { slot, cell_count: self.cell_count() })?;
        let size = self.extent / (1u32 << key.level) as f32;
        let start = self.origin + key.grid().as_vec3() * size;
        Ok(Aabb::new(start, start + size))
    }
}

impl<T: Clone> LinearOctree<T> {
    /// Appends every object under `slot` (inclusive) to `out`. Order is unspecified.
    pub fn collect_under_slot(&self, slot: usize, out: &mut Vec<T>) {
        self.for_each_under_slot(slot, |object| out.push(object.clone()));
    }

    pub fn collect_ancestors(&self, slot: usize, out: &mut Vec<T>) {
        self.for_each_above_slot(slot, |object| out.push(object.clone()));
    }
}

#[cfg(test)]
fn check_integrity<T>(tree: &LinearOctree<T>) {
    entry::check_list(&tree.cells, &tree.entries);
    // Every materialized cell has a materialized parent.
    for slot in tree.materialized_slots() {
        if let Some(parent) = slot::parent(slot) {
            assert!(tree.is_materialized(parent), "orphan cell {slot}");
        }
    }
}

#[test]
fn depth_limit_test() {
    let min = Vec3::ZERO;
    let max = Vec3::ONE;
    assert!(LinearOctree::<u32>::new(6, min, max).is_ok());
    assert_eq!(
        LinearOctree::<u32>::new(7, min, max).unwrap_err(),
        SpatialError::DepthExceedsMaximum { depth: 7, max_depth: 6 }
    );
    assert_eq!(LinearOctree::<u32>::with_max_depth(4, 4, min, max).unwrap().cell_count(), 4681);
    assert!(LinearOctree::<u32>::with_max_depth(4, 5, min, max).is_err());
    assert!(LinearOctree::<u32>::with_max_depth(9, 1, min, max).is_err());
    assert!(matches!(
        LinearOctree::<u32>::new(1, max, min),
        Err(SpatialError::InvalidWorldBounds { .. })
    ));
}

#[test]
fn scenario_depth_two() {
    let mut tree = LinearOctree::new(2, Vec3::ZERO, Vec3::splat(8.0)).unwrap();
    assert_eq!(tree.cell_unit(), Vec3::splat(2.0));
    assert_eq!(tree.cell_count(), 73);

    let a = tree.create_entry("a");
    let b = tree.create_entry("b");
    assert_eq!(tree.register_point(Vec3::ONE, a), Ok(9));
    assert_eq!(tree.register_point(Vec3::splat(7.0), b), Ok(72));
    assert_eq!(tree.morton_address(Vec3::splat(7.0), Vec3::splat(7.0)), MortonKey { code: 63, level: 2 });

    // Ancestors were materialized along the way.
    assert_eq!(tree.materialized_slots().collect::<Vec<_>>(), vec![0, 1, 8, 9, 72]);

    let mut found = Vec::new();
    tree.collect_under_slot(0, &mut found);
    found.sort();
    assert_eq!(found, vec!["a", "b"]);

    found.clear();
    tree.collect_under_slot(8, &mut found);
    assert_eq!(found, vec!["b"]);

    found.clear();
    tree.collect_under_slot(2, &mut found);
    assert!(found.is_empty());
    tree.collect_under_slot(1000, &mut found);
    assert!(found.is_empty());

    check_integrity(&tree);
}

#[test]
fn belong_level_test() {
    let tree = LinearOctree::<()>::new(3, Vec3::ZERO, Vec3::splat(8.0)).unwrap();

    // Inside a single leaf.
    let key = tree.morton_address(Vec3::splat(1.1), Vec3::splat(1.9));
    assert_eq!(key.level, 3);
    assert_eq!(key.code, 7);

    // Whole region, including the far boundary.
    let key = tree.morton_address(Vec3::ZERO, Vec3::splat(8.0));
    assert_eq!(key, MortonKey::root());

    // Straddles the leaf boundary at x = 2 but stays inside one level 1 octant.
    let key = tree.morton_address(Vec3::new(1.5, 0.5, 0.5), Vec3::new(2.5, 0.5, 0.5));
    assert_eq!(key, MortonKey { code: 0, level: 1 });

    // Straddles the centre plane.
    let key = tree.morton_address(Vec3::new(3.5, 1.0, 1.0), Vec3::new(4.5, 1.0, 1.0));
    assert_eq!(key.level, 0);
}

#[test]
fn containment_monotonicity_random() {
    use rand::{ rngs::StdRng, Rng, SeedableRng };

    let mut rng = StdRng::seed_from_u64(7);
    for depth in 0..=6 {
        let tree = LinearOctree::<()>::new(depth, Vec3::splat(-4.0), Vec3::splat(4.0)).unwrap();
        let unit = tree.cell_unit();
        let side = 1u32 << depth;
        for _ in 0..200 {
            let leaf = uvec3(
                rng.random_range(0..side),
                rng.random_range(0..side),
                rng.random_range(0..side),
            );
            let start = leaf.as_vec3() * unit + unit * 0.25;
            let end = start + unit * rng.random_range(0.0f32..0.5);
            let key = tree.morton_address(start, end);
            assert_eq!(key.level, depth);
            assert_eq!(key.grid(), leaf);
        }
        assert_eq!(tree.morton_address(Vec3::ZERO, Vec3::splat(8.0)).level, 0);
    }
}

#[test]
fn decode_slot_bounds_matches_registration() {
    let mut tree = LinearOctree::new(3, Vec3::splat(-10.0), Vec3::splat(10.0)).unwrap();
    assert_eq!(
        tree.decode_slot_bounds(0),
        Ok(Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0)))
    );
    assert_eq!(
        tree.decode_slot_bounds(8),
        Ok(Aabb::new(Vec3::ZERO, Vec3::splat(10.0)))
    );
    assert!(matches!(tree.decode_slot_bounds(585), Err(SpatialError::SlotOverflow { .. })));

    let id = tree.create_entry(0);
    for slot in 0..tree.cell_count() {
        let bounds = tree.decode_slot_bounds(slot).unwrap();
        // A box slightly inside the node must classify back into it.
        let inset = bounds.size() * 0.01;
        assert_eq!(tree.register(bounds.start + inset, bounds.end - inset, id), Ok(slot));
        assert!(bounds.contains(bounds.center()));
    }
    check_integrity(&tree);
}

#[test]
fn child_bounds_tile_parent() {
    let tree: LinearOctree<()> = LinearOctree::new(3, Vec3::splat(-8.0), Vec3::splat(8.0)).unwrap();
    for parent in 0..slot::cell_count(2) {
        let outer = tree.decode_slot_bounds(parent).unwrap();
        let half = outer.size() * 0.5;
        for (corner, child) in slot::children(parent, tree.cell_count()).into_iter().enumerate() {
            let offset = Vec3::new(
                (corner & 1) as f32,
                ((corner >> 1) & 1) as f32,
                ((corner >> 2) & 1) as f32,
            );
            let start = outer.start + half * offset;
            let inner = tree.decode_slot_bounds(child).unwrap();
            assert_eq!(inner, Aabb::new(start, start + half));
            assert!(outer.contains_aabb(&inner));
        }
    }
}

#[test]
fn out_of_range_does_not_mutate() {
    let mut tree = LinearOctree::new(2, Vec3::ZERO, Vec3::splat(8.0)).unwrap();
    let id = tree.create_entry(1);

    let err = tree.register_point(Vec3::new(-0.1, 1.0, 1.0), id).unwrap_err();
    assert!(matches!(err, SpatialError::OutOfRange { .. }));
    assert!(tree.register(Vec3::ONE, Vec3::new(1.0, 8.5, 1.0), id).is_err());
    assert!(tree.register_point(Vec3::new(f32::NAN, 1.0, 1.0), id).is_err());
    assert_eq!(tree.materialized_slots().count(), 0);
    assert_eq!(tree.entry_cell(id), None);

    // A rejected move leaves the previous registration in place.
    assert_eq!(tree.register_point(Vec3::ONE, id), Ok(9));
    assert!(tree.register_point(Vec3::splat(9.0), id).is_err());
    assert_eq!(tree.entry_cell(id), Some(9));
}

#[test]
fn offset_and_validate_test() {
    let tree = LinearOctree::<()>::new(1, Vec3::splat(-10.0), Vec3::splat(10.0)).unwrap();
    assert_eq!(
        tree.offset_and_validate(Vec3::splat(-10.0), Vec3::splat(10.0)),
        Ok((Vec3::ZERO, Vec3::splat(20.0)))
    );
    assert!(tree.offset_and_validate(Vec3::splat(-10.5), Vec3::ZERO).is_err());
}

#[test]
fn reregister_moves_entry() {
    let mut tree = LinearOctree::new(2, Vec3::ZERO, Vec3::splat(8.0)).unwrap();
    let a = tree.create_entry('a');
    let b = tree.create_entry('b');
    let c = tree.create_entry('c');
    tree.register_point(Vec3::ONE, a).unwrap();
    tree.register_point(Vec3::ONE, b).unwrap();
    tree.register_point(Vec3::ONE, c).unwrap();

    // Moving the middle of the list must keep the other two linked.
    assert_eq!(tree.register_point(Vec3::splat(7.0), b), Ok(72));
    assert_eq!(tree.cell_objects(9).copied().collect::<String>(), "ca");
    assert_eq!(tree.cell_objects(72).copied().collect::<String>(), "b");

    // Same cell again is a no-op.
    assert_eq!(tree.register_point(Vec3::splat(6.5), b), Ok(72));
    assert_eq!(tree.cell_objects(72).count(), 1);
    check_integrity(&tree);

    assert!(tree.remove_entry(c));
    assert!(!tree.remove_entry(c));
    assert_eq!(tree.destroy_entry(a), Some('a'));
    assert_eq!(tree.cell_objects(9).count(), 0);
    // Emptied cells stay materialized.
    assert!(tree.is_materialized(9));
    assert_eq!(tree.register_point(Vec3::ONE, a), Err(SpatialError::UnknownEntry(a)));
    check_integrity(&tree);
}

#[test]
fn collect_ancestors_test() {
    let mut tree = LinearOctree::new(2, Vec3::ZERO, Vec3::splat(8.0)).unwrap();
    let whole = tree.create_entry("whole");
    let octant = tree.create_entry("octant");
    let leaf = tree.create_entry("leaf");
    assert_eq!(tree.register(Vec3::ZERO, Vec3::splat(8.0), whole), Ok(0));
    assert_eq!(tree.register(Vec3::splat(0.5), Vec3::splat(3.5), octant), Ok(1));
    assert_eq!(tree.register_point(Vec3::ONE, leaf), Ok(9));

    let mut found = Vec::new();
    tree.collect_ancestors(9, &mut found);
    found.sort();
    assert_eq!(found, vec!["octant", "whole"]);

    found.clear();
    tree.collect_under_slot(1, &mut found);
    found.sort();
    assert_eq!(found, vec!["leaf", "octant"]);
}

#[test]
fn list_integrity_random_ops() {
    use rand::{ rngs::StdRng, Rng, SeedableRng };

    let mut rng = StdRng::seed_from_u64(0xdecaf);
    let mut tree = LinearOctree::new(3, Vec3::ZERO, Vec3::splat(16.0)).unwrap();
    let mut ids: Vec<EntryId> = (0..32).map(|i| tree.create_entry(i)).collect();

    for step in 0..3000 {
        let pick = rng.random_range(0..ids.len());
        let id = ids[pick];
        match rng.random_range(0..10) {
            0..=5 => {
                let start = Vec3::new(
                    rng.random_range(-1.0..16.0),
                    rng.random_range(-1.0..16.0),
                    rng.random_range(-1.0..16.0),
                );
                let end = start + Vec3::splat(rng.random_range(0.0..4.0));
                let before = tree.entry_cell(id);
                match tree.register(start, end, id) {
                    Ok(slot) => assert_eq!(tree.entry_cell(id), Some(slot)),
                    Err(_) => assert_eq!(tree.entry_cell(id), before),
                }
            }
            6..=7 => {
                let linked = tree.entry_cell(id).is_some();
                assert_eq!(tree.remove_entry(id), linked);
            }
            8 => {
                tree.destroy_entry(id);
                ids[pick] = tree.create_entry(1000 + step);
            }
            _ => {
                let mut all = Vec::new();
                tree.collect_under_slot(0, &mut all);
                let linked = tree.entries().iter().filter(|(_, entry)| entry.is_linked()).count();
                assert_eq!(all.len(), linked);
            }
        }
        check_integrity(&tree);
    }
}

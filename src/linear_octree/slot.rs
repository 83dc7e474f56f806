//! Flat-array addressing of octree nodes.
//!
//! Every node of a complete octree gets one slot. Slots are laid out level by
//! level, and inside a level in Morton order:
//! ```text
//! level 0:  0
//! level 1:  1 ..= 8
//! level 2:  9 ..= 72
//! level 3: 73 ..= 584
//! ```
//! Parent and child slots are derived from the slot number alone, so the
//! cells never need to store links to each other.

use arrayvec::ArrayVec;

use crate::morton::MORTON_DEPTH_LIMIT;

/// Number of nodes on `level` (8^level), saturating at `usize::MAX`.
#[inline(always)]
pub fn level_width(level: u32) -> usize {
    1usize.checked_shl(level.saturating_mul(3)).unwrap_or(usize::MAX)
}

/// First slot of `level`, i.e. the number of nodes on all shallower levels.
#[inline(always)]
pub fn level_offset(level: u32) -> usize {
    (level_width(level) - 1) / 7
}

/// Total number of slots for a tree that subdivides down to `depth`.
#[inline(always)]
pub fn cell_count(depth: u32) -> usize {
    level_offset(depth + 1)
}

#[inline(always)]
pub fn to_linear_slot(code: u32, level: u32) -> usize {
    code as usize + level_offset(level)
}

/// Splits a slot back into its level and in-level Morton code. `None` when
/// the slot lies below the deepest level a Morton code can address.
pub fn level_and_code(slot: usize) -> Option<(u32, u32)> {
    let level = (0..=MORTON_DEPTH_LIMIT).find(|&level| slot < level_offset(level + 1))?;
    Some((level, (slot - level_offset(level)) as u32))
}

#[inline]
pub fn parent(slot: usize) -> Option<usize> {
    match slot {
        0 => None,
        _ => Some((slot - 1) >> 3),
    }
}

#[inline(always)]
pub fn child(slot: usize, corner: usize) -> usize {
    debug_assert!(corner < 8);
    slot * 8 + 1 + corner
}

/// Children of `slot` that fit inside an array of `cell_count` slots.
pub fn children(slot: usize, cell_count: usize) -> ArrayVec<usize, 8> {
    (0..8)
        .map(|corner| child(slot, corner))
        .take_while(|&child| child < cell_count)
        .collect()
}

/// Walks from `slot` up to the root, excluding `slot` itself.
pub fn ancestors(slot: usize) -> impl Iterator<Item = usize> {
    std::iter::successors(parent(slot), |&slot| parent(slot))
}

#[test]
fn cell_count_test() {
    assert_eq!(cell_count(0), 1);
    assert_eq!(cell_count(1), 9);
    assert_eq!(cell_count(2), 73);
    assert_eq!(cell_count(4), 4681);
    assert_eq!(cell_count(6), 299593);
}

#[test]
fn slot_round_trip() {
    for level in 0..=5 {
        for code in 0..level_width(level) as u32 {
            let slot = to_linear_slot(code, level);
            assert_eq!(level_and_code(slot), Some((level, code)));
        }
    }
}

#[test]
fn level_and_code_rejects_unaddressable_slots() {
    let last = cell_count(MORTON_DEPTH_LIMIT) - 1;
    assert_eq!(level_and_code(last), Some((MORTON_DEPTH_LIMIT, (level_width(MORTON_DEPTH_LIMIT) - 1) as u32)));
    assert_eq!(level_and_code(last + 1), None);
    assert_eq!(level_and_code(usize::MAX), None);
    assert_eq!(level_width(100), usize::MAX);
}

#[test]
fn parent_child_test() {
    assert_eq!(parent(0), None);
    for slot in 0..585 {
        for corner in 0..8 {
            assert_eq!(parent(child(slot, corner)), Some(slot));
        }
    }
    // Children of a leaf of a depth 1 tree are out of range.
    assert!(children(1, cell_count(1)).is_empty());
    assert_eq!(children(0, cell_count(1)).as_slice(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(ancestors(72).collect::<Vec<_>>(), vec![8, 0]);
    assert_eq!(ancestors(0).count(), 0);
}

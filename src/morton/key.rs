use bitvec::prelude::*;
use glam::{ UVec3, uvec3 };

use crate::linear_octree::slot;

/// Deepest level the 32 bit encoder can address. Each axis keeps 8 bits,
/// so 24 bits of the code are in use.
pub const MORTON_DEPTH_LIMIT: u32 = 8;

const AXIS_MASK: u32 = (1 << MORTON_DEPTH_LIMIT) - 1;

/// Spreads the low 8 bits of `n` so that bit `i` lands on bit `3 * i`.
/// ```text
/// 0b_b7_b6_b5_b4_b3_b2_b1_b0 -> 0b_b7_0_0_b6_0_0 ... b1_0_0_b0
/// ```
#[inline]
pub fn separate_bits(n: u32) -> u32 {
    let mut n = n & AXIS_MASK;
    n = (n | (n << 8)) & 0x0000f00f;
    n = (n | (n << 4)) & 0x000c30c3;
    (n | (n << 2)) & 0x00249249
}

/// Interleaves three grid coordinates into a Morton code. x occupies bit 0 of
/// every 3 bit group, y bit 1 and z bit 2.
#[inline]
pub fn morton_code(x: u32, y: u32, z: u32) -> u32 {
    separate_bits(x) | (separate_bits(y) << 1) | (separate_bits(z) << 2)
}

/// Recovers the grid coordinates of a code that was built at `depth`.
///
/// Groups are read from the most significant one (group `depth - 1`) down to
/// group 0, shifting one bit into each axis per group. Depths past the width
/// of the code read every whole group it holds.
pub fn decode_morton(code: u32, depth: u32) -> UVec3 {
    let depth = depth.min(u32::BITS / 3) as usize;
    let bits = code.view_bits::<Lsb0>();

    bits[..depth * 3]
        .chunks_exact(3)
        .rev()
        .fold(UVec3::ZERO, |acc, group| {
            uvec3(
                (acc.x << 1) | group[0] as u32,
                (acc.y << 1) | group[1] as u32,
                (acc.z << 1) | group[2] as u32,
            )
        })
}

/// Number of 3 bit groups, counted from the least significant end, that must
/// be dropped so that every set bit of `xor` is gone.
#[inline]
pub(crate) fn differing_groups(xor: u32) -> u32 {
    match xor.view_bits::<Lsb0>().last_one() {
        Some(bit) => bit as u32 / 3 + 1,
        None => 0,
    }
}

/// A Morton code tagged with the level it belongs to (root = 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MortonKey {
    pub code: u32,
    pub level: u32,
}

impl MortonKey {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_grid(grid: UVec3, level: u32) -> Self {
        Self {
            code: morton_code(grid.x, grid.y, grid.z),
            level,
        }
    }

    /// `None` when `slot` lies past the deepest encodable level.
    pub fn from_slot(slot: usize) -> Option<Self> {
        let (level, code) = slot::level_and_code(slot)?;
        Some(Self { code, level })
    }

    #[inline]
    pub fn slot(&self) -> usize {
        slot::to_linear_slot(self.code, self.level)
    }

    #[inline]
    pub fn grid(&self) -> UVec3 {
        decode_morton(self.code, self.level)
    }

    pub fn at_root(&self) -> bool {
        self.level == 0
    }

    /// Key of the enclosing node one level up.
    pub fn parent(&self) -> Option<Self> {
        if self.at_root() {
            return None;
        }
        Some(Self {
            code: self.code >> 3,
            level: self.level - 1,
        })
    }
}

#[test]
fn separate_bits_test() {
    assert_eq!(separate_bits(0b0001), 0b0000_0001);
    assert_eq!(separate_bits(0b0010), 0b0000_1000);
    assert_eq!(separate_bits(0b0011), 0b0000_1001);
    assert_eq!(separate_bits(0xff), 0x00249249);
    // Bits above the encoder width are ignored.
    assert_eq!(separate_bits(0x1ff), 0x00249249);
}

#[test]
fn morton_code_test() {
    assert_eq!(morton_code(0, 0, 0), 0);
    assert_eq!(morton_code(1, 0, 0), 0b001);
    assert_eq!(morton_code(0, 1, 0), 0b010);
    assert_eq!(morton_code(0, 0, 1), 0b100);
    assert_eq!(morton_code(3, 3, 3), 63);
    assert_eq!(morton_code(2, 0, 1), 0b001_100);
}

#[test]
fn decode_morton_inverts_morton_code() {
    for depth in 0..=MORTON_DEPTH_LIMIT {
        let side = 1u32 << depth;
        // Stride keeps the deep levels cheap while still touching the edges.
        let step = (side / 16).max(1);
        for x in (0..side).step_by(step as usize).chain([side - 1]) {
            for y in (0..side).step_by(step as usize).chain([side - 1]) {
                for z in (0..side).step_by(step as usize).chain([side - 1]) {
                    let code = morton_code(x, y, z);
                    assert_eq!(decode_morton(code, depth), uvec3(x, y, z), "depth {depth}");
                }
            }
        }
    }
}

#[test]
fn decode_morton_random_u16_inputs() {
    use rand::{ rngs::StdRng, Rng, SeedableRng };

    let mut rng = StdRng::seed_from_u64(0x6d6f72746f6e);
    for _ in 0..2000 {
        let depth = rng.random_range(0..=MORTON_DEPTH_LIMIT);
        let x: u16 = rng.random();
        let y: u16 = rng.random();
        let z: u16 = rng.random();
        let mask = (1u32 << depth) - 1;
        let (x, y, z) = (x as u32 & mask, y as u32 & mask, z as u32 & mask);
        assert_eq!(decode_morton(morton_code(x, y, z), depth), uvec3(x, y, z));
    }
}

#[test]
fn decode_morton_oversized_depth() {
    // Ten whole groups fit in 32 bits; deeper requests read the same ten.
    assert_eq!(decode_morton(u32::MAX, 40), decode_morton(u32::MAX, 10));
    assert_eq!(decode_morton(u32::MAX, u32::MAX), uvec3(1023, 1023, 1023));
    assert_eq!(decode_morton(morton_code(5, 6, 7), 12), uvec3(5, 6, 7));
}

#[test]
fn differing_groups_test() {
    assert_eq!(differing_groups(0), 0);
    assert_eq!(differing_groups(0b001), 1);
    assert_eq!(differing_groups(0b100), 1);
    assert_eq!(differing_groups(0b1000), 2);
    assert_eq!(differing_groups(0b111_000_000), 3);
}

#[test]
fn morton_key_slot_round_trip() {
    let key = MortonKey::from_grid(uvec3(3, 3, 3), 2);
    assert_eq!(key.code, 63);
    assert_eq!(key.slot(), 72);
    assert_eq!(MortonKey::from_slot(72), Some(key));
    assert_eq!(MortonKey::from_slot(usize::MAX), None);
    assert_eq!(key.parent(), Some(MortonKey { code: 7, level: 1 }));
    assert_eq!(MortonKey::root().parent(), None);
}

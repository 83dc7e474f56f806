use glam::{ Vec3, vec3 };

use crate::aabb::Aabb;

/// Line segments outlining every leaf cell of a `depth` grid over `world`.
///
/// Lines run along each of the three axes, one per grid intersection of the
/// other two, so the result holds `3 * (2^depth + 1)^2` segments.
pub fn grid_lines(world: Aabb, depth: u32) -> Vec<[Vec3; 2]> {
    let cells = 1u32 << depth;
    let unit = world.size() / cells as f32;
    let (min, max) = (world.start, world.end);
    let at = |axis: f32, i: u32, unit: f32| axis + unit * i as f32;

    let mut lines = Vec::with_capacity(3 * ((cells + 1) * (cells + 1)) as usize);
    for i in 0..=cells {
        for j in 0..=cells {
            // Along z, on the xy lattice.
            let (x, y) = (at(min.x, i, unit.x), at(min.y, j, unit.y));
            lines.push([vec3(x, y, min.z), vec3(x, y, max.z)]);
            // Along x, on the yz lattice.
            let (z, y) = (at(min.z, i, unit.z), at(min.y, j, unit.y));
            lines.push([vec3(min.x, y, z), vec3(max.x, y, z)]);
            // Along y, on the xz lattice.
            let (z, x) = (at(min.z, i, unit.z), at(min.x, j, unit.x));
            lines.push([vec3(x, min.y, z), vec3(x, max.y, z)]);
        }
    }
    lines
}

#[test]
fn grid_lines_test() {
    let world = Aabb::new(Vec3::splat(-1.0), Vec3::ONE);
    assert_eq!(grid_lines(world, 0).len(), 12);

    let lines = grid_lines(world, 1);
    assert_eq!(lines.len(), 27);
    assert!(lines.contains(&[vec3(0.0, 0.0, -1.0), vec3(0.0, 0.0, 1.0)]));
    for [from, to] in lines {
        assert!(world.contains(from) && world.contains(to));
        // Axis aligned: exactly one component changes.
        assert_eq!((to - from).cmpne(Vec3::ZERO).bitmask().count_ones(), 1);
    }
}

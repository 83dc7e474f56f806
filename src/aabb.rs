use glam::{ Vec3, vec3 };

/// Axis-aligned box given by its minimum (`start`) and maximum (`end`) corner.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb {
    pub start: Vec3,
    pub end: Vec3,
}

impl Aabb {
    #[inline]
    pub fn new(start: Vec3, end: Vec3) -> Self {
        Self { start, end }
    }

    /// Degenerate box around a single point.
    #[inline]
    pub fn point(pos: Vec3) -> Self {
        Self { start: pos, end: pos }
    }

    pub fn from_radius(pos: Vec3, radius: f32) -> Self {
        let radius_vec = vec3(radius, radius, radius);
        Self {
            start: pos - radius_vec,
            end: pos + radius_vec,
        }
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.end - self.start
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.start + self.end) * 0.5
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.start).all() && point.cmple(self.end).all()
    }

    pub fn contains_aabb(&self, other: &Aabb) -> bool {
        self.contains(other.start) && self.contains(other.end)
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.start.cmple(other.end).all() && other.start.cmple(self.end).all()
    }

    /// Overlap of both boxes, if any.
    pub fn intersection(&self, other: &Aabb) -> Option<Aabb> {
        self.intersects(other).then(|| Aabb {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }
}

#[test]
fn intersect_test() {
    let a = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
    let b = Aabb::new(Vec3::ONE, Vec3::splat(3.0));
    let c = Aabb::new(Vec3::splat(5.0), Vec3::splat(6.0));

    assert!(a.intersects(&b));
    assert!(!a.intersects(&c));
    assert_eq!(a.intersection(&b), Some(Aabb::new(Vec3::ONE, Vec3::splat(2.0))));
    assert_eq!(a.intersection(&c), None);
    assert!(a.contains(Vec3::splat(2.0)));
    assert!(!a.contains(vec3(2.1, 0.0, 0.0)));
    assert!(Aabb::from_radius(Vec3::ONE, 1.0).contains_aabb(&Aabb::point(Vec3::ONE)));
    assert_eq!(Aabb::from_radius(Vec3::ONE, 1.0).center(), Vec3::ONE);
}

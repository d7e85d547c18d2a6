// math.rs — vector / plane / bounds math shared by the render world crates

pub type Vec3 = [f32; 3];

/// Row-major 3x3 rotation. Row i is local axis i expressed in world space.
pub type Mat3 = [Vec3; 3];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

pub const MAT3_IDENTITY: Mat3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

// ============================================================
// Vector math
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

#[inline]
pub fn vector_negate(v: &Vec3) -> Vec3 {
    [-v[0], -v[1], -v[2]]
}

/// veca + scale * vecb
#[inline]
pub fn vector_ma(veca: &Vec3, scale: f32, vecb: &Vec3) -> Vec3 {
    [
        veca[0] + scale * vecb[0],
        veca[1] + scale * vecb[1],
        veca[2] + scale * vecb[2],
    ]
}

#[inline]
pub fn vector_compare(v1: &Vec3, v2: &Vec3) -> bool {
    v1[0] == v2[0] && v1[1] == v2[1] && v1[2] == v2[2]
}

#[inline]
pub fn vector_length(v: &Vec3) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

#[inline]
pub fn vector_length_squared(v: &Vec3) -> f32 {
    v[0] * v[0] + v[1] * v[1] + v[2] * v[2]
}

/// Normalize in place, returns original length.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if length != 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

pub fn cross_product(v1: &Vec3, v2: &Vec3) -> Vec3 {
    [
        v1[1] * v2[2] - v1[2] * v2[1],
        v1[2] * v2[0] - v1[0] * v2[2],
        v1[0] * v2[1] - v1[1] * v2[0],
    ]
}

// ============================================================
// Axis (rotation) transforms
// ============================================================

/// Rotate a direction from local space into world space.
#[inline]
pub fn axis_rotate(axis: &Mat3, dir: &Vec3) -> Vec3 {
    [
        dir[0] * axis[0][0] + dir[1] * axis[1][0] + dir[2] * axis[2][0],
        dir[0] * axis[0][1] + dir[1] * axis[1][1] + dir[2] * axis[2][1],
        dir[0] * axis[0][2] + dir[1] * axis[1][2] + dir[2] * axis[2][2],
    ]
}

/// Transform a local point into world space.
#[inline]
pub fn axis_transform(origin: &Vec3, axis: &Mat3, local: &Vec3) -> Vec3 {
    vector_add(origin, &axis_rotate(axis, local))
}

/// Project a world point into the local frame of origin/axis.
#[inline]
pub fn axis_project(origin: &Vec3, axis: &Mat3, world: &Vec3) -> Vec3 {
    let temp = vector_subtract(world, origin);
    [
        dot_product(&temp, &axis[0]),
        dot_product(&temp, &axis[1]),
        dot_product(&temp, &axis[2]),
    ]
}

/// Skinning matrix, three rows of a 3x4 transform with the translation in
/// the last column.
pub type JointMat = [[f32; 4]; 3];

#[inline]
pub fn joint_mat_translation(m: &JointMat) -> Vec3 {
    [m[0][3], m[1][3], m[2][3]]
}

// ============================================================
// Planes
// ============================================================

pub const SIDE_ON: i32 = 0;
pub const SIDE_FRONT: i32 = 1;
pub const SIDE_BACK: i32 = 2;
pub const SIDE_CROSS: i32 = 3;

pub const ON_EPSILON: f32 = 0.1;

#[derive(Debug, Clone, Copy, Default)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
}

impl Plane {
    pub fn new(normal: Vec3, dist: f32) -> Self {
        Self { normal, dist }
    }

    /// Plane through three points wound counter-clockwise, or None when degenerate.
    pub fn from_points(a: &Vec3, b: &Vec3, c: &Vec3) -> Option<Self> {
        let mut normal = cross_product(&vector_subtract(b, a), &vector_subtract(c, a));
        if vector_normalize(&mut normal) == 0.0 {
            return None;
        }
        let dist = dot_product(&normal, a);
        Some(Self { normal, dist })
    }

    #[inline]
    pub fn distance_to(&self, point: &Vec3) -> f32 {
        dot_product(&self.normal, point) - self.dist
    }

    /// SIDE_FRONT, SIDE_BACK, or SIDE_ON within epsilon.
    pub fn side(&self, point: &Vec3, epsilon: f32) -> i32 {
        let d = self.distance_to(point);
        if d > epsilon {
            SIDE_FRONT
        } else if d < -epsilon {
            SIDE_BACK
        } else {
            SIDE_ON
        }
    }

    pub fn flipped(&self) -> Plane {
        Plane {
            normal: vector_negate(&self.normal),
            dist: -self.dist,
        }
    }
}

/// Returns 1 (front), 2 (back), or 3 (crossing) for a box vs. plane test.
pub fn box_on_plane_side(emins: &Vec3, emaxs: &Vec3, p: &Plane) -> i32 {
    let mut corner_max = [0.0f32; 3];
    let mut corner_min = [0.0f32; 3];
    for i in 0..3 {
        if p.normal[i] < 0.0 {
            corner_max[i] = emins[i];
            corner_min[i] = emaxs[i];
        } else {
            corner_max[i] = emaxs[i];
            corner_min[i] = emins[i];
        }
    }

    let dist1 = dot_product(&p.normal, &corner_max) - p.dist;
    let dist2 = dot_product(&p.normal, &corner_min) - p.dist;

    let mut sides = 0;
    if dist1 >= 0.0 {
        sides = SIDE_FRONT;
    }
    if dist2 < 0.0 {
        sides |= SIDE_BACK;
    }
    sides
}

// ============================================================
// Bounds
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub mins: Vec3,
    pub maxs: Vec3,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            mins: VEC3_ORIGIN,
            maxs: VEC3_ORIGIN,
        }
    }
}

impl Bounds {
    pub fn new(mins: Vec3, maxs: Vec3) -> Self {
        Self { mins, maxs }
    }

    /// Inside-out bounds that any added point will reset.
    pub fn cleared() -> Self {
        Self {
            mins: [f32::INFINITY; 3],
            maxs: [f32::NEG_INFINITY; 3],
        }
    }

    pub fn is_cleared(&self) -> bool {
        self.mins[0] > self.maxs[0]
    }

    pub fn from_point(p: &Vec3) -> Self {
        Self { mins: *p, maxs: *p }
    }

    pub fn add_point(&mut self, p: &Vec3) {
        for i in 0..3 {
            if p[i] < self.mins[i] {
                self.mins[i] = p[i];
            }
            if p[i] > self.maxs[i] {
                self.maxs[i] = p[i];
            }
        }
    }

    pub fn add_bounds(&mut self, other: &Bounds) {
        self.add_point(&other.mins);
        self.add_point(&other.maxs);
    }

    pub fn expand(&self, r: f32) -> Bounds {
        Bounds {
            mins: [self.mins[0] - r, self.mins[1] - r, self.mins[2] - r],
            maxs: [self.maxs[0] + r, self.maxs[1] + r, self.maxs[2] + r],
        }
    }

    pub fn center(&self) -> Vec3 {
        vector_scale(&vector_add(&self.mins, &self.maxs), 0.5)
    }

    /// Distance from the center to the farthest corner.
    pub fn radius(&self) -> f32 {
        let e = vector_scale(&vector_subtract(&self.maxs, &self.mins), 0.5);
        vector_length(&e)
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.mins[0] <= other.maxs[0]
            && self.mins[1] <= other.maxs[1]
            && self.mins[2] <= other.maxs[2]
            && self.maxs[0] >= other.mins[0]
            && self.maxs[1] >= other.mins[1]
            && self.maxs[2] >= other.mins[2]
    }

    pub fn contains_point(&self, p: &Vec3) -> bool {
        p[0] >= self.mins[0]
            && p[1] >= self.mins[1]
            && p[2] >= self.mins[2]
            && p[0] <= self.maxs[0]
            && p[1] <= self.maxs[1]
            && p[2] <= self.maxs[2]
    }

    pub fn translated(&self, offset: &Vec3) -> Bounds {
        Bounds {
            mins: vector_add(&self.mins, offset),
            maxs: vector_add(&self.maxs, offset),
        }
    }

    /// World-space AABB of these local bounds placed at origin/axis.
    pub fn transformed(&self, origin: &Vec3, axis: &Mat3) -> Bounds {
        let local_center = self.center();
        let extents = vector_subtract(&self.maxs, &local_center);
        let world_center = axis_transform(origin, axis, &local_center);

        let mut world_extents = VEC3_ORIGIN;
        for i in 0..3 {
            world_extents[i] = extents[0] * axis[0][i].abs()
                + extents[1] * axis[1][i].abs()
                + extents[2] * axis[2][i].abs();
        }

        Bounds {
            mins: vector_subtract(&world_center, &world_extents),
            maxs: vector_add(&world_center, &world_extents),
        }
    }

    /// Slab test for a line segment against the box.
    pub fn intersects_segment(&self, start: &Vec3, end: &Vec3) -> bool {
        let dir = vector_subtract(end, start);
        let mut tmin = 0.0f32;
        let mut tmax = 1.0f32;

        for i in 0..3 {
            if dir[i].abs() < 1e-8 {
                if start[i] < self.mins[i] || start[i] > self.maxs[i] {
                    return false;
                }
                continue;
            }
            let inv = 1.0 / dir[i];
            let mut t1 = (self.mins[i] - start[i]) * inv;
            let mut t2 = (self.maxs[i] - start[i]) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            tmin = tmin.max(t1);
            tmax = tmax.min(t2);
            if tmin > tmax {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_vector_basics() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        assert_relative_eq!(dot_product(&a, &b), 32.0);
        assert_eq!(vector_subtract(&b, &a), [3.0, 3.0, 3.0]);
        assert_eq!(vector_ma(&a, 2.0, &b), [9.0, 12.0, 15.0]);

        let mut n = [3.0, 0.0, 4.0];
        let len = vector_normalize(&mut n);
        assert_relative_eq!(len, 5.0);
        assert_relative_eq!(vector_length(&n), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cross_product_right_handed() {
        let x = [1.0, 0.0, 0.0];
        let y = [0.0, 1.0, 0.0];
        assert_eq!(cross_product(&x, &y), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_axis_round_trip() {
        // 90 degree yaw: local x maps to world y
        let axis: Mat3 = [[0.0, 1.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let origin = [10.0, 0.0, 0.0];
        let local = [1.0, 2.0, 3.0];

        let world = axis_transform(&origin, &axis, &local);
        assert_relative_eq!(world[0], 8.0, epsilon = 1e-6);
        assert_relative_eq!(world[1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(world[2], 3.0, epsilon = 1e-6);

        let back = axis_project(&origin, &axis, &world);
        for i in 0..3 {
            assert_relative_eq!(back[i], local[i], epsilon = 1e-5);
        }
    }

    #[test]
    fn test_plane_from_points() {
        let p = Plane::from_points(&[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        assert_relative_eq!(p.normal[2], 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.dist, 0.0);
        assert_eq!(p.side(&[0.0, 0.0, 5.0], ON_EPSILON), SIDE_FRONT);
        assert_eq!(p.side(&[0.0, 0.0, -5.0], ON_EPSILON), SIDE_BACK);
        assert_eq!(p.side(&[7.0, 7.0, 0.0], ON_EPSILON), SIDE_ON);

        assert!(Plane::from_points(&[0.0; 3], &[1.0, 0.0, 0.0], &[2.0, 0.0, 0.0]).is_none());
    }

    #[test]
    fn test_box_on_plane_side() {
        let p = Plane::new([1.0, 0.0, 0.0], 0.0);
        assert_eq!(box_on_plane_side(&[1.0, -1.0, -1.0], &[2.0, 1.0, 1.0], &p), SIDE_FRONT);
        assert_eq!(box_on_plane_side(&[-2.0, -1.0, -1.0], &[-1.0, 1.0, 1.0], &p), SIDE_BACK);
        assert_eq!(box_on_plane_side(&[-1.0, -1.0, -1.0], &[1.0, 1.0, 1.0], &p), SIDE_CROSS);
    }

    #[test]
    fn test_bounds_accumulate() {
        let mut b = Bounds::cleared();
        assert!(b.is_cleared());
        b.add_point(&[1.0, 2.0, 3.0]);
        b.add_point(&[-1.0, 0.0, 5.0]);
        assert!(!b.is_cleared());
        assert_eq!(b.mins, [-1.0, 0.0, 3.0]);
        assert_eq!(b.maxs, [1.0, 2.0, 5.0]);
        assert_eq!(b.center(), [0.0, 1.0, 4.0]);
    }

    #[test]
    fn test_bounds_intersects() {
        let a = Bounds::new([0.0; 3], [10.0; 3]);
        let b = Bounds::new([5.0; 3], [15.0; 3]);
        let c = Bounds::new([11.0; 3], [12.0; 3]);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(b.intersects(&c));
    }

    #[test]
    fn test_bounds_transformed_rotation() {
        // unit box rotated 90 degrees around z keeps the same AABB
        let b = Bounds::new([-1.0, -2.0, -3.0], [1.0, 2.0, 3.0]);
        let axis: Mat3 = [[0.0, 1.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let t = b.transformed(&[0.0; 3], &axis);
        assert_relative_eq!(t.mins[0], -2.0, epsilon = 1e-5);
        assert_relative_eq!(t.mins[1], -1.0, epsilon = 1e-5);
        assert_relative_eq!(t.maxs[0], 2.0, epsilon = 1e-5);
        assert_relative_eq!(t.maxs[1], 1.0, epsilon = 1e-5);
        assert_relative_eq!(t.maxs[2], 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_segment_slab_test() {
        let b = Bounds::new([0.0; 3], [10.0; 3]);
        assert!(b.intersects_segment(&[-5.0, 5.0, 5.0], &[15.0, 5.0, 5.0]));
        assert!(b.intersects_segment(&[5.0, 5.0, 5.0], &[5.0, 5.0, 20.0]));
        assert!(!b.intersects_segment(&[-5.0, 20.0, 5.0], &[15.0, 20.0, 5.0]));
        assert!(!b.intersects_segment(&[-5.0, 5.0, 5.0], &[-1.0, 5.0, 5.0]));
    }
}

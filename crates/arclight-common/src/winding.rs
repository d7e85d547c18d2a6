// winding.rs — convex polygon math for portals and projected overlays

use crate::math::{
    cross_product, dot_product, vector_add, vector_length, vector_ma, vector_normalize,
    vector_scale, vector_subtract, Bounds, Plane, Vec3, SIDE_BACK, SIDE_FRONT, SIDE_ON,
};

/// A convex polygon, wound counter-clockwise when viewed from the front side
/// of its plane.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Winding {
    pub points: Vec<Vec3>,
}

impl Winding {
    pub fn new(points: Vec<Vec3>) -> Self {
        Self { points }
    }

    pub fn from_triangle(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self {
            points: vec![a, b, c],
        }
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.len() < 3
    }

    pub fn bounds(&self) -> Bounds {
        let mut b = Bounds::cleared();
        for p in &self.points {
            b.add_point(p);
        }
        b
    }

    pub fn center(&self) -> Vec3 {
        if self.points.is_empty() {
            return [0.0; 3];
        }
        let mut c = [0.0; 3];
        for p in &self.points {
            c = vector_add(&c, p);
        }
        vector_scale(&c, 1.0 / self.points.len() as f32)
    }

    pub fn area(&self) -> f32 {
        if self.points.len() < 3 {
            return 0.0;
        }
        let mut total = 0.0;
        for i in 1..self.points.len() - 1 {
            let d1 = vector_subtract(&self.points[i], &self.points[0]);
            let d2 = vector_subtract(&self.points[i + 1], &self.points[0]);
            total += 0.5 * vector_length(&cross_product(&d1, &d2));
        }
        total
    }

    /// Plane of the winding via Newell's method, or None when degenerate.
    pub fn plane(&self) -> Option<Plane> {
        if self.points.len() < 3 {
            return None;
        }
        let mut normal = [0.0f32; 3];
        for i in 0..self.points.len() {
            let p1 = &self.points[i];
            let p2 = &self.points[(i + 1) % self.points.len()];
            normal[0] += (p1[1] - p2[1]) * (p1[2] + p2[2]);
            normal[1] += (p1[2] - p2[2]) * (p1[0] + p2[0]);
            normal[2] += (p1[0] - p2[0]) * (p1[1] + p2[1]);
        }
        if vector_normalize(&mut normal) == 0.0 {
            return None;
        }
        let dist = dot_product(&normal, &self.center());
        Some(Plane::new(normal, dist))
    }

    /// Same polygon with reversed ordering, so the plane faces the other way.
    pub fn reversed(&self) -> Winding {
        Winding {
            points: self.points.iter().rev().copied().collect(),
        }
    }

    /// Keep the part of the winding on the front side of the plane.
    /// Returns false when nothing remains.
    pub fn clip_in_place(&mut self, split: &Plane, epsilon: f32) -> bool {
        let num = self.points.len();
        if num == 0 {
            return false;
        }

        let mut dists = Vec::with_capacity(num + 1);
        let mut sides = Vec::with_capacity(num + 1);
        let mut front = 0usize;
        let mut back = 0usize;

        for p in &self.points {
            let d = split.distance_to(p);
            dists.push(d);
            let side = if d > epsilon {
                front += 1;
                SIDE_FRONT
            } else if d < -epsilon {
                back += 1;
                SIDE_BACK
            } else {
                SIDE_ON
            };
            sides.push(side);
        }
        sides.push(sides[0]);
        dists.push(dists[0]);

        if front == 0 {
            self.points.clear();
            return false;
        }
        if back == 0 {
            return true;
        }

        let mut new_points: Vec<Vec3> = Vec::with_capacity(num + 4);
        for i in 0..num {
            let p1 = self.points[i];
            if sides[i] == SIDE_ON {
                new_points.push(p1);
                continue;
            }
            if sides[i] == SIDE_FRONT {
                new_points.push(p1);
            }
            if sides[i + 1] == SIDE_ON || sides[i + 1] == sides[i] {
                continue;
            }

            let p2 = self.points[(i + 1) % num];
            let t = dists[i] / (dists[i] - dists[i + 1]);
            let mid = vector_ma(&p1, t, &vector_subtract(&p2, &p1));
            new_points.push(mid);
        }

        self.points = new_points;
        self.points.len() >= 3
    }
}

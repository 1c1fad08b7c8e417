use crate::vec3::Vec3;
use crate::{Error, Float};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Closed set of volumetric primitives. Each variant is a point-inside
/// predicate plus a uniform position sampler; nothing in the crate
/// needs more geometry than that.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Box {
        origin: Vec3,
        size: Vec3,
    },
    Sphere {
        origin: Vec3,
        radius: Float,
    },
    Cylinder {
        axis_start: Vec3,
        axis_end: Vec3,
        radius: Float,
    },
    Tube {
        axis_start: Vec3,
        axis_end: Vec3,
        inner_radius: Float,
        outer_radius: Float,
    },
    /// Conical shell: both the inner and the outer radius vary linearly
    /// from the `start_*` pair at `axis_start` to the `end_*` pair at
    /// `axis_end`. A point is inside when its radial distance lies
    /// between the two interpolated radii.
    Cone {
        axis_start: Vec3,
        axis_end: Vec3,
        start_inner_radius: Float,
        start_outer_radius: Float,
        end_inner_radius: Float,
        end_outer_radius: Float,
    },
}

impl Shape {
    pub fn validate(&self) -> Result<(), Error> {
        let bad = |msg: &str| Err(Error::Config(msg.to_string()));
        match *self {
            Shape::Box { size, .. } => {
                if size.x <= 0.0 || size.y <= 0.0 || size.z <= 0.0 {
                    return bad("box size must be positive along every axis");
                }
            }
            Shape::Sphere { radius, .. } => {
                if radius <= 0.0 {
                    return bad("sphere radius must be positive");
                }
            }
            Shape::Cylinder {
                axis_start,
                axis_end,
                radius,
            } => {
                if radius <= 0.0 {
                    return bad("cylinder radius must be positive");
                }
                if (axis_end - axis_start).length() == 0.0 {
                    return bad("cylinder axis has zero length");
                }
            }
            Shape::Tube {
                axis_start,
                axis_end,
                inner_radius,
                outer_radius,
            } => {
                if inner_radius < 0.0 || outer_radius <= inner_radius {
                    return bad("tube radii must satisfy 0 <= inner < outer");
                }
                if (axis_end - axis_start).length() == 0.0 {
                    return bad("tube axis has zero length");
                }
            }
            Shape::Cone {
                axis_start,
                axis_end,
                start_inner_radius,
                start_outer_radius,
                end_inner_radius,
                end_outer_radius,
            } => {
                if start_inner_radius < 0.0
                    || end_inner_radius < 0.0
                    || start_outer_radius < start_inner_radius
                    || end_outer_radius < end_inner_radius
                {
                    return bad("cone radii must satisfy 0 <= inner <= outer at both ends");
                }
                if start_outer_radius + end_outer_radius == 0.0 {
                    return bad("cone outer radii must not both be zero");
                }
                if (axis_end - axis_start).length() == 0.0 {
                    return bad("cone axis has zero length");
                }
            }
        }
        Ok(())
    }

    pub fn is_point_inside(&self, point: Vec3) -> bool {
        match *self {
            Shape::Box { origin, size } => {
                point.x >= origin.x
                    && point.x <= origin.x + size.x
                    && point.y >= origin.y
                    && point.y <= origin.y + size.y
                    && point.z >= origin.z
                    && point.z <= origin.z + size.z
            }
            Shape::Sphere { origin, radius } => (point - origin).length() <= radius,
            Shape::Cylinder {
                axis_start,
                axis_end,
                radius,
            } => match radial_distance(point, axis_start, axis_end) {
                Some(r) => r <= radius,
                None => false,
            },
            Shape::Tube {
                axis_start,
                axis_end,
                inner_radius,
                outer_radius,
            } => match radial_distance(point, axis_start, axis_end) {
                Some(r) => r >= inner_radius && r <= outer_radius,
                None => false,
            },
            Shape::Cone {
                axis_start,
                axis_end,
                start_inner_radius,
                start_outer_radius,
                end_inner_radius,
                end_outer_radius,
            } => {
                let axis = axis_end - axis_start;
                let len = axis.length();
                let t = (point - axis_start).dot(axis) / (len * len);
                if !(0.0..=1.0).contains(&t) {
                    return false;
                }
                let on_axis = axis_start + axis * t;
                let r = (point - on_axis).length();
                let inner = start_inner_radius + (end_inner_radius - start_inner_radius) * t;
                let outer = start_outer_radius + (end_outer_radius - start_outer_radius) * t;
                r >= inner && r <= outer
            }
        }
    }

    /// Uniform sample from the shape's volume. Boxes sample directly;
    /// everything else rejection-samples from its bounding box, which
    /// terminates quickly since the primitives fill a decent fraction
    /// of their boxes.
    pub fn generate_uniform_random_position<R: Rng>(&self, rng: &mut R) -> Vec3 {
        if let Shape::Box { origin, size } = *self {
            return Vec3::new(
                origin.x + rng.gen::<Float>() * size.x,
                origin.y + rng.gen::<Float>() * size.y,
                origin.z + rng.gen::<Float>() * size.z,
            );
        }
        let (lo, hi) = self.bounding_box();
        let extent = hi - lo;
        loop {
            let candidate = Vec3::new(
                lo.x + rng.gen::<Float>() * extent.x,
                lo.y + rng.gen::<Float>() * extent.y,
                lo.z + rng.gen::<Float>() * extent.z,
            );
            if self.is_point_inside(candidate) {
                return candidate;
            }
        }
    }

    /// Axis-aligned bounding box as (min corner, max corner). Loose for
    /// the axis-based shapes, which is fine for rejection sampling.
    pub fn bounding_box(&self) -> (Vec3, Vec3) {
        match *self {
            Shape::Box { origin, size } => (origin, origin + size),
            Shape::Sphere { origin, radius } => {
                let r = Vec3::new(radius, radius, radius);
                (origin - r, origin + r)
            }
            Shape::Cylinder {
                axis_start,
                axis_end,
                radius,
            } => axis_aligned_box(axis_start, axis_end, radius),
            Shape::Tube {
                axis_start,
                axis_end,
                outer_radius,
                ..
            } => axis_aligned_box(axis_start, axis_end, outer_radius),
            Shape::Cone {
                axis_start,
                axis_end,
                start_outer_radius,
                end_outer_radius,
                ..
            } => axis_aligned_box(axis_start, axis_end, start_outer_radius.max(end_outer_radius)),
        }
    }
}

/// Distance from `point` to the segment's axis, or None when the
/// projection falls outside the segment.
fn radial_distance(point: Vec3, axis_start: Vec3, axis_end: Vec3) -> Option<Float> {
    let axis = axis_end - axis_start;
    let len = axis.length();
    let t = (point - axis_start).dot(axis) / (len * len);
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    let on_axis = axis_start + axis * t;
    Some((point - on_axis).length())
}

fn axis_aligned_box(a: Vec3, b: Vec3, radius: Float) -> (Vec3, Vec3) {
    let lo = Vec3::new(
        a.x.min(b.x) - radius,
        a.y.min(b.y) - radius,
        a.z.min(b.z) - radius,
    );
    let hi = Vec3::new(
        a.x.max(b.x) + radius,
        a.y.max(b.y) + radius,
        a.z.max(b.z) + radius,
    );
    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    #[test]
    fn box_contains_its_corners() {
        let shape = Shape::Box {
            origin: Vec3::new(1.0, 2.0, 3.0),
            size: Vec3::new(1.0, 1.0, 1.0),
        };
        assert!(shape.is_point_inside(Vec3::new(1.0, 2.0, 3.0)));
        assert!(shape.is_point_inside(Vec3::new(2.0, 3.0, 4.0)));
        assert!(!shape.is_point_inside(Vec3::new(2.1, 3.0, 4.0)));
    }

    #[test]
    fn sphere_boundary_is_inside() {
        let shape = Shape::Sphere {
            origin: Vec3::zero(),
            radius: 2.0,
        };
        assert!(shape.is_point_inside(Vec3::new(2.0, 0.0, 0.0)));
        assert!(!shape.is_point_inside(Vec3::new(2.0, 0.1, 0.0)));
    }

    #[test]
    fn tube_excludes_its_bore() {
        let shape = Shape::Tube {
            axis_start: Vec3::zero(),
            axis_end: Vec3::new(0.0, 0.0, 4.0),
            inner_radius: 1.0,
            outer_radius: 2.0,
        };
        assert!(!shape.is_point_inside(Vec3::new(0.5, 0.0, 2.0)));
        assert!(shape.is_point_inside(Vec3::new(1.5, 0.0, 2.0)));
        assert!(!shape.is_point_inside(Vec3::new(1.5, 0.0, 5.0)));
    }

    #[test]
    fn cone_narrows_along_its_axis() {
        // zero inner radii degenerate the shell into a solid frustum
        let shape = Shape::Cone {
            axis_start: Vec3::zero(),
            axis_end: Vec3::new(0.0, 0.0, 2.0),
            start_inner_radius: 0.0,
            start_outer_radius: 2.0,
            end_inner_radius: 0.0,
            end_outer_radius: 0.0,
        };
        assert!(shape.is_point_inside(Vec3::new(1.5, 0.0, 0.0)));
        assert!(!shape.is_point_inside(Vec3::new(1.5, 0.0, 1.5)));
    }

    #[test]
    fn cone_shell_excludes_its_tapering_bore() {
        let shape = Shape::Cone {
            axis_start: Vec3::zero(),
            axis_end: Vec3::new(0.0, 0.0, 2.0),
            start_inner_radius: 1.0,
            start_outer_radius: 2.0,
            end_inner_radius: 0.5,
            end_outer_radius: 1.0,
        };
        assert!(!shape.is_point_inside(Vec3::new(0.5, 0.0, 0.0)));
        assert!(shape.is_point_inside(Vec3::new(1.5, 0.0, 0.0)));
        // halfway along the axis the wall spans r in [0.75, 1.5]
        assert!(shape.is_point_inside(Vec3::new(1.0, 0.0, 1.0)));
        assert!(!shape.is_point_inside(Vec3::new(0.6, 0.0, 1.0)));
        assert!(!shape.is_point_inside(Vec3::new(1.6, 0.0, 1.0)));
    }

    #[test]
    fn sampled_positions_land_inside() {
        let shapes = [
            Shape::Sphere {
                origin: Vec3::new(1.0, 1.0, 1.0),
                radius: 0.5,
            },
            Shape::Cylinder {
                axis_start: Vec3::zero(),
                axis_end: Vec3::new(0.0, 3.0, 0.0),
                radius: 1.0,
            },
            Shape::Tube {
                axis_start: Vec3::zero(),
                axis_end: Vec3::new(2.0, 0.0, 0.0),
                inner_radius: 0.5,
                outer_radius: 1.0,
            },
            Shape::Cone {
                axis_start: Vec3::zero(),
                axis_end: Vec3::new(0.0, 0.0, 2.0),
                start_inner_radius: 0.5,
                start_outer_radius: 2.0,
                end_inner_radius: 0.25,
                end_outer_radius: 1.0,
            },
        ];
        let mut rng = Pcg64::seed_from_u64(7);
        for shape in &shapes {
            for _ in 0..200 {
                let p = shape.generate_uniform_random_position(&mut rng);
                assert!(shape.is_point_inside(p));
            }
        }
    }

    #[test]
    fn degenerate_shapes_fail_validation() {
        let shape = Shape::Sphere {
            origin: Vec3::zero(),
            radius: 0.0,
        };
        assert!(shape.validate().is_err());
        let shape = Shape::Tube {
            axis_start: Vec3::zero(),
            axis_end: Vec3::new(1.0, 0.0, 0.0),
            inner_radius: 1.0,
            outer_radius: 1.0,
        };
        assert!(shape.validate().is_err());
        let shape = Shape::Cone {
            axis_start: Vec3::zero(),
            axis_end: Vec3::new(1.0, 0.0, 0.0),
            start_inner_radius: 2.0,
            start_outer_radius: 1.0,
            end_inner_radius: 0.0,
            end_outer_radius: 1.0,
        };
        assert!(shape.validate().is_err());
    }
}

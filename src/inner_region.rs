use crate::geometry::Shape;
use crate::prtls::ParticleArray;
use crate::vec3::Vec3;
use crate::{Error, Float};
use serde::{Deserialize, Serialize};

/// A volumetric obstacle held at a fixed potential. Mesh nodes inside
/// it get identity rows in the field operator, and particles that
/// wander in are absorbed with their charge tallied. `inverted` flips
/// the predicate so the obstacle is everything outside the shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InnerRegion {
    pub name: String,
    pub shape: Shape,
    pub potential: Float,
    #[serde(default)]
    pub inverted: bool,
    #[serde(default)]
    pub total_absorbed_particles: u64,
    #[serde(default)]
    pub total_absorbed_charge: Float,
}

impl InnerRegion {
    pub fn new(name: String, shape: Shape, potential: Float, inverted: bool) -> Result<InnerRegion, Error> {
        shape.validate()?;
        Ok(InnerRegion {
            name,
            shape,
            potential,
            inverted,
            total_absorbed_particles: 0,
            total_absorbed_charge: 0.0,
        })
    }

    pub fn contains(&self, point: Vec3) -> bool {
        self.shape.is_point_inside(point) ^ self.inverted
    }

    /// Removes from `prtls` every particle inside the region and
    /// updates the absorption totals. Returns how many were absorbed.
    pub fn absorb_from(&mut self, prtls: &mut ParticleArray) -> usize {
        let shape = &self.shape;
        let inverted = self.inverted;
        let removed = prtls.remove_if(|p| shape.is_point_inside(p) ^ inverted);
        self.total_absorbed_particles += removed.len() as u64;
        self.total_absorbed_charge += removed.len() as Float * prtls.charge;
        removed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_sphere_region() -> InnerRegion {
        InnerRegion::new(
            "probe".to_string(),
            Shape::Sphere {
                origin: Vec3::zero(),
                radius: 1.0,
            },
            -3.0,
            false,
        )
        .unwrap()
    }

    #[test]
    fn absorption_updates_totals_and_shrinks_array() {
        let mut region = unit_sphere_region();
        let mut prtls = ParticleArray::new(
            vec![0, 1, 2],
            -2.0,
            1.0,
            vec![
                Vec3::new(0.1, 0.0, 0.0),
                Vec3::new(5.0, 5.0, 5.0),
                Vec3::new(0.0, 0.5, 0.0),
            ],
            vec![Vec3::zero(); 3],
        );
        let absorbed = region.absorb_from(&mut prtls);
        assert_eq!(absorbed, 2);
        assert_eq!(prtls.len(), 1);
        assert_eq!(prtls.ids, vec![1]);
        assert_eq!(region.total_absorbed_particles, 2);
        assert!((region.total_absorbed_charge - (-4.0)).abs() < 1e-14);
    }

    #[test]
    fn inverted_region_absorbs_the_outside() {
        let mut region = unit_sphere_region();
        region.inverted = true;
        assert!(!region.contains(Vec3::new(0.5, 0.0, 0.0)));
        assert!(region.contains(Vec3::new(3.0, 0.0, 0.0)));
        let mut prtls = ParticleArray::new(
            vec![7],
            1.0,
            1.0,
            vec![Vec3::new(3.0, 0.0, 0.0)],
            vec![Vec3::zero()],
        );
        region.absorb_from(&mut prtls);
        assert!(prtls.is_empty());
        assert_eq!(region.total_absorbed_particles, 1);
    }

    #[test]
    fn totals_accumulate_across_calls() {
        let mut region = unit_sphere_region();
        for _ in 0..3 {
            let mut prtls = ParticleArray::new(
                vec![0],
                1.0,
                1.0,
                vec![Vec3::zero()],
                vec![Vec3::zero()],
            );
            region.absorb_from(&mut prtls);
        }
        assert_eq!(region.total_absorbed_particles, 3);
        assert!((region.total_absorbed_charge - 3.0).abs() < 1e-14);
    }
}

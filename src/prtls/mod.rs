pub mod source;

use crate::vec3::Vec3;
use crate::{Float, PRTL_CHUNK_SIZE, SPEED_OF_LIGHT};
use itertools::izip;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A batch of macro-particles sharing one charge and mass, stored as
/// columns so the per-step passes stay tight loops over flat memory.
/// Removal compacts the columns in place; particles are never
/// soft-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticleArray {
    pub ids: Vec<u64>,
    pub charge: Float,
    pub mass: Float,
    pub positions: Vec<Vec3>,
    pub momentums: Vec<Vec3>,
    /// Leapfrog stagger guard: set once the momenta have been pulled
    /// back half a step, so a restart never shifts them twice.
    pub momentum_is_half_time_step_shifted: bool,
}

impl ParticleArray {
    pub fn new(
        ids: Vec<u64>,
        charge: Float,
        mass: Float,
        positions: Vec<Vec3>,
        momentums: Vec<Vec3>,
    ) -> ParticleArray {
        if !cfg!(feature = "unchecked") {
            assert!(mass > 0.0);
            assert_eq!(ids.len(), positions.len());
            assert_eq!(ids.len(), momentums.len());
        }
        ParticleArray {
            ids,
            charge,
            mass,
            positions,
            momentums,
            momentum_is_half_time_step_shifted: false,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The standard Boris rotation, one electric and one magnetic field
    /// sample per particle. The exact order of operations below is part
    /// of the contract: reordering changes the last bits and breaks
    /// reproducibility.
    pub fn boris_update_momentums(&mut self, dt: Float, e: &[Vec3], b: &[Vec3]) {
        if !cfg!(feature = "unchecked") {
            assert_eq!(e.len(), self.len());
            assert_eq!(b.len(), self.len());
        }
        let q_quote = dt * self.charge / (2.0 * self.mass);
        let mass = self.mass;
        (&mut self.momentums, e, b)
            .into_par_iter()
            .chunks(PRTL_CHUNK_SIZE)
            .for_each(|chunk| {
                for (momentum, e, b) in chunk {
                    let half_e = *e * q_quote;
                    let v_minus = *momentum * (1.0 / mass) + half_e;
                    let h = *b * (q_quote / SPEED_OF_LIGHT);
                    let s = h * (2.0 / (1.0 + h.dot(h)));
                    let v_prime = v_minus + v_minus.cross(h);
                    let v_plus = v_minus + v_prime.cross(s);
                    *momentum = (v_plus + half_e) * mass;
                }
            });
    }

    /// Zero-magnetic-field fast path: the rotation collapses to a bare
    /// electric kick, exactly.
    pub fn boris_update_momentum_no_mgn(&mut self, dt: Float, e: &[Vec3]) {
        if !cfg!(feature = "unchecked") {
            assert_eq!(e.len(), self.len());
        }
        let qdt = self.charge * dt;
        for (momentum, e) in izip!(&mut self.momentums, e) {
            *momentum += *e * qdt;
        }
    }

    /// Leapfrog drift: momenta live half a step ahead of positions.
    pub fn update_positions(&mut self, dt: Float) {
        let dt_over_mass = dt / self.mass;
        for (position, momentum) in izip!(&mut self.positions, &self.momentums) {
            *position += *momentum * dt_over_mass;
        }
    }

    /// Coulomb field of every particle in this array at `point`, used
    /// by the binary interaction model only. A particle coincident with
    /// `point` divides by zero and its term comes out NaN; such terms
    /// are the self-interaction exclusion and count as zero.
    pub fn field_at_point(&self, point: Vec3) -> Vec3 {
        let mut total = Vec3::zero();
        for position in &self.positions {
            let dist = point - *position;
            let r = dist.length();
            let term = dist * (self.charge / (r * r * r));
            if term.is_finite() {
                total += term;
            }
        }
        total
    }

    /// Removes every particle whose position satisfies `reject`,
    /// compacting all columns. Returns the removed (id, position) pairs
    /// so callers can do their own accounting.
    pub fn remove_if<F>(&mut self, mut reject: F) -> Vec<(u64, Vec3)>
    where
        F: FnMut(Vec3) -> bool,
    {
        let mut removed = Vec::new();
        let mut write = 0;
        for read in 0..self.len() {
            if reject(self.positions[read]) {
                removed.push((self.ids[read], self.positions[read]));
            } else {
                self.ids[write] = self.ids[read];
                self.positions[write] = self.positions[read];
                self.momentums[write] = self.momentums[read];
                write += 1;
            }
        }
        self.ids.truncate(write);
        self.positions.truncate(write);
        self.momentums.truncate(write);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_particle(momentum: Vec3) -> ParticleArray {
        ParticleArray::new(
            vec![0],
            1.0,
            2.0,
            vec![Vec3::new(1.0, 1.0, 1.0)],
            vec![momentum],
        )
    }

    #[test]
    fn pure_magnetic_push_preserves_momentum_magnitude() {
        let p0 = Vec3::new(3.0, -1.0, 0.5);
        let mut prtls = single_particle(p0);
        let e = vec![Vec3::zero()];
        let b = vec![Vec3::new(0.0, 0.0, 5.0e4)];
        prtls.boris_update_momentums(0.125, &e, &b);
        let p1 = prtls.momentums[0];
        assert!((p1.length() - p0.length()).abs() < 1e-12 * p0.length());
        assert!(p1 != p0); // it did rotate
    }

    #[test]
    fn zero_magnetic_field_matches_fast_path() {
        let p0 = Vec3::new(0.5, 0.25, -1.0);
        let e = vec![Vec3::new(2.0, -3.0, 1.0)];
        let b = vec![Vec3::zero()];
        let mut full = single_particle(p0);
        let mut fast = single_particle(p0);
        full.boris_update_momentums(0.25, &e, &b);
        fast.boris_update_momentum_no_mgn(0.25, &e);
        let (pf, pq) = (full.momentums[0], fast.momentums[0]);
        assert!((pf.x - pq.x).abs() < 1e-14);
        assert!((pf.y - pq.y).abs() < 1e-14);
        assert!((pf.z - pq.z).abs() < 1e-14);
    }

    #[test]
    fn position_update_is_reversible() {
        let start = Vec3::new(1.0, 1.0, 1.0);
        let mut prtls = single_particle(Vec3::new(0.7, -0.2, 0.9));
        prtls.update_positions(0.125);
        prtls.update_positions(-0.125);
        let end = prtls.positions[0];
        assert!((end - start).length() < 1e-14);
    }

    #[test]
    fn coincident_particle_contributes_nothing() {
        let prtls = ParticleArray::new(
            vec![0, 1],
            -2.0,
            1.0,
            vec![Vec3::new(2.0, 0.0, 0.0), Vec3::zero()],
            vec![Vec3::zero(); 2],
        );
        // the particle sitting exactly at the sample point drops out,
        // the other one is still felt
        let field = prtls.field_at_point(Vec3::new(2.0, 0.0, 0.0));
        assert!(field.is_finite());
        assert!((field.x - (-0.5)).abs() < 1e-14);
    }

    #[test]
    fn field_at_distant_point_follows_inverse_square() {
        let prtls = ParticleArray::new(
            vec![0],
            -2.0,
            1.0,
            vec![Vec3::zero()],
            vec![Vec3::zero()],
        );
        let field = prtls.field_at_point(Vec3::new(2.0, 0.0, 0.0));
        assert!((field.x - (-0.5)).abs() < 1e-14);
        assert_eq!(field.y, 0.0);
        assert_eq!(field.z, 0.0);
    }

    #[test]
    fn remove_if_compacts_and_reports() {
        let mut prtls = ParticleArray::new(
            vec![10, 11, 12],
            1.0,
            1.0,
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(5.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 1.0),
            ],
            vec![Vec3::zero(); 3],
        );
        let removed = prtls.remove_if(|p| p.x > 2.0);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].0, 11);
        assert_eq!(prtls.ids, vec![10, 12]);
        assert_eq!(prtls.len(), 2);
    }
}

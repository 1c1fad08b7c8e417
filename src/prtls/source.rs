use crate::geometry::Shape;
use crate::prtls::ParticleArray;
use crate::vec3::Vec3;
use crate::{Error, Float};
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

/// Emits macro-particles from a shape with a thermal momentum spread.
/// Each source carries its own generator so its output stream depends
/// only on its own seed, never on what any other part of the program
/// drew. The generator state rides along in checkpoints, which is what
/// makes restarted runs bit-identical to uninterrupted ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticleSource {
    pub name: String,
    pub shape: Shape,
    pub initial_number_of_particles: usize,
    pub particles_to_generate_each_step: usize,
    pub mean_momentum: Vec3,
    pub temperature: Float,
    pub charge: Float,
    pub mass: Float,
    rng: Pcg64,
    pub particle_arrays: Vec<ParticleArray>,
}

impl ParticleSource {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        shape: Shape,
        initial_number_of_particles: usize,
        particles_to_generate_each_step: usize,
        mean_momentum: Vec3,
        temperature: Float,
        charge: Float,
        mass: Float,
        seed: u64,
    ) -> Result<ParticleSource, Error> {
        shape.validate()?;
        if initial_number_of_particles == 0 {
            return Err(Error::Config(format!(
                "source '{}' must emit at least one initial particle",
                name
            )));
        }
        if temperature < 0.0 {
            return Err(Error::Config(format!(
                "source '{}' has negative temperature",
                name
            )));
        }
        if mass <= 0.0 {
            return Err(Error::Config(format!(
                "source '{}' has non-positive mass",
                name
            )));
        }
        Ok(ParticleSource {
            name,
            shape,
            initial_number_of_particles,
            particles_to_generate_each_step,
            mean_momentum,
            temperature,
            charge,
            mass,
            rng: Pcg64::seed_from_u64(seed),
            particle_arrays: Vec::new(),
        })
    }

    /// One thermal momentum sample: mean plus Gaussian noise with
    /// per-axis spread sqrt(mass * temperature).
    fn sample_momentum(&mut self) -> Vec3 {
        let sigma = (self.mass * self.temperature).sqrt();
        let nx: Float = StandardNormal.sample(&mut self.rng);
        let ny: Float = StandardNormal.sample(&mut self.rng);
        let nz: Float = StandardNormal.sample(&mut self.rng);
        self.mean_momentum + Vec3::new(nx, ny, nz) * sigma
    }

    /// Emits `count` particles as a fresh array, with ids allocated
    /// from the caller's counter. The new array's momenta are NOT yet
    /// half-step shifted; the stepping loop handles that.
    pub fn generate_num_of_particles(&mut self, count: usize, max_id: &mut u64) {
        if count == 0 {
            return;
        }
        let mut ids = Vec::with_capacity(count);
        let mut positions = Vec::with_capacity(count);
        let mut momentums = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(*max_id);
            *max_id += 1;
            let position = self.shape.generate_uniform_random_position(&mut self.rng);
            positions.push(position);
            momentums.push(self.sample_momentum());
        }
        self.particle_arrays.push(ParticleArray::new(
            ids,
            self.charge,
            self.mass,
            positions,
            momentums,
        ));
    }

    pub fn generate_initial_particles(&mut self, max_id: &mut u64) {
        let count = self.initial_number_of_particles;
        self.generate_num_of_particles(count, max_id);
    }

    pub fn generate_each_step(&mut self, max_id: &mut u64) {
        let count = self.particles_to_generate_each_step;
        self.generate_num_of_particles(count, max_id);
    }

    /// Drops arrays that have lost all their particles.
    pub fn prune_empty_arrays(&mut self) {
        self.particle_arrays.retain(|arr| !arr.is_empty());
    }

    pub fn total_particles(&self) -> usize {
        self.particle_arrays.iter().map(|arr| arr.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_source(seed: u64) -> ParticleSource {
        ParticleSource::new(
            "emitter".to_string(),
            Shape::Box {
                origin: Vec3::new(1.0, 1.0, 1.0),
                size: Vec3::new(2.0, 2.0, 2.0),
            },
            10,
            3,
            Vec3::new(0.0, 0.0, 5.0),
            2.5,
            -1.0,
            4.0,
            seed,
        )
        .unwrap()
    }

    #[test]
    fn initial_generation_allocates_sequential_ids() {
        let mut source = test_source(42);
        let mut max_id = 0;
        source.generate_initial_particles(&mut max_id);
        assert_eq!(max_id, 10);
        let arr = &source.particle_arrays[0];
        assert_eq!(arr.ids, (0..10).collect::<Vec<u64>>());
        for p in &arr.positions {
            assert!(source.shape.is_point_inside(*p));
        }
    }

    #[test]
    fn per_step_generation_appends_a_new_array() {
        let mut source = test_source(42);
        let mut max_id = 0;
        source.generate_initial_particles(&mut max_id);
        source.generate_each_step(&mut max_id);
        assert_eq!(source.particle_arrays.len(), 2);
        assert_eq!(source.particle_arrays[1].len(), 3);
        assert_eq!(max_id, 13);
        assert_eq!(source.total_particles(), 13);
    }

    #[test]
    fn same_seed_reproduces_the_same_particles() {
        let mut a = test_source(7);
        let mut b = test_source(7);
        let (mut id_a, mut id_b) = (0, 0);
        a.generate_initial_particles(&mut id_a);
        b.generate_initial_particles(&mut id_b);
        assert_eq!(a.particle_arrays[0].positions, b.particle_arrays[0].positions);
        assert_eq!(a.particle_arrays[0].momentums, b.particle_arrays[0].momentums);
    }

    #[test]
    fn zero_temperature_gives_exactly_the_mean_momentum() {
        let mut source = test_source(1);
        source.temperature = 0.0;
        let mut max_id = 0;
        source.generate_initial_particles(&mut max_id);
        for p in &source.particle_arrays[0].momentums {
            assert_eq!(*p, Vec3::new(0.0, 0.0, 5.0));
        }
    }

    #[test]
    fn pruning_drops_emptied_arrays() {
        let mut source = test_source(3);
        let mut max_id = 0;
        source.generate_initial_particles(&mut max_id);
        source.generate_each_step(&mut max_id);
        source.particle_arrays[0].remove_if(|_| true);
        source.prune_empty_arrays();
        assert_eq!(source.particle_arrays.len(), 1);
        assert_eq!(source.total_particles(), 3);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let shape = Shape::Sphere {
            origin: Vec3::zero(),
            radius: 1.0,
        };
        assert!(ParticleSource::new(
            "s".to_string(),
            shape.clone(),
            0,
            0,
            Vec3::zero(),
            1.0,
            1.0,
            1.0,
            0,
        )
        .is_err());
        assert!(ParticleSource::new(
            "s".to_string(),
            shape,
            1,
            0,
            Vec3::zero(),
            -1.0,
            1.0,
            1.0,
            0,
        )
        .is_err());
    }
}

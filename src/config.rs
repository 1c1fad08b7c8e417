use crate::vec3::Vec3;
use crate::Float;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Run configuration as it appears in the TOML file. Everything here
/// is plain data; `Simulation::new` turns it into live components and
/// does the cross-field validation.
#[derive(Deserialize)]
pub struct Config {
    pub time_grid: TimeGridConfig,
    pub spatial_mesh: SpatialMeshConfig,
    #[serde(default)]
    pub boundary_conditions: BoundaryConfig,
    #[serde(default)]
    pub particle_sources: Vec<ParticleSourceConfig>,
    #[serde(default)]
    pub inner_regions: Vec<InnerRegionConfig>,
    #[serde(default)]
    pub external_electric_fields: Vec<FieldConfig>,
    #[serde(default)]
    pub external_magnetic_fields: Vec<FieldConfig>,
    pub interaction_model: InteractionModelConfig,
    pub output: OutputConfig,
}

#[derive(Deserialize)]
pub struct TimeGridConfig {
    pub total_time: Float,
    pub time_step_size: Float,
    pub save_step: Float,
}

#[derive(Deserialize)]
pub struct SpatialMeshConfig {
    pub grid_size: Vec3,
    pub grid_step: Vec3,
    #[serde(default)]
    pub origin: Vec3,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    pub potential_x_min: Float,
    pub potential_x_max: Float,
    pub potential_y_min: Float,
    pub potential_y_max: Float,
    pub potential_z_min: Float,
    pub potential_z_max: Float,
}

impl Default for BoundaryConfig {
    fn default() -> BoundaryConfig {
        BoundaryConfig {
            potential_x_min: 0.0,
            potential_x_max: 0.0,
            potential_y_min: 0.0,
            potential_y_max: 0.0,
            potential_z_min: 0.0,
            potential_z_max: 0.0,
        }
    }
}

#[derive(Deserialize)]
pub struct ParticleSourceConfig {
    pub name: String,
    pub shape: crate::geometry::Shape,
    pub initial_number_of_particles: usize,
    #[serde(default)]
    pub particles_to_generate_each_step: usize,
    #[serde(default)]
    pub mean_momentum: Vec3,
    pub temperature: Float,
    pub charge: Float,
    pub mass: Float,
    /// Seeds this source's private generator. Runs differing only in
    /// unrelated sources still reproduce this source's output exactly.
    #[serde(default)]
    pub seed: u64,
}

#[derive(Deserialize)]
pub struct InnerRegionConfig {
    pub name: String,
    pub shape: crate::geometry::Shape,
    pub potential: Float,
    #[serde(default)]
    pub inverted: bool,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldConfig {
    Uniform {
        name: String,
        field: Vec3,
    },
    Expression {
        name: String,
        x: String,
        y: String,
        z: String,
    },
    TabulatedOnGrid {
        name: String,
        file: String,
    },
}

#[derive(Deserialize, Clone, Copy)]
pub struct InteractionModelConfig {
    pub model: crate::simulation::InteractionModel,
}

#[derive(Deserialize, Clone)]
pub struct OutputConfig {
    pub filename_prefix: String,
    pub filename_suffix: String,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Could not open the config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Could not parse the config file {}", path.display()))
    }
}

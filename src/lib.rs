use anyhow::Result;
use log::info;
use thiserror::Error as ThisError;

pub mod config;
pub mod external_field;
pub mod geometry;
pub mod inner_region;
pub mod mesh;
pub mod output;
pub mod prtls;
pub mod simulation;
pub mod solver;
pub mod time_grid;
pub mod vec3;

/// All arithmetic runs in double precision; single precision loses too
/// much in the Poisson residuals and the leapfrog stagger.
pub type Float = f64;

/// Speed of light in CGS units (cm/s); the Boris rotation is written in
/// the Gaussian system.
pub const SPEED_OF_LIGHT: Float = 2.99792458e10;

/// Work unit for the parallel momentum update.
pub const PRTL_CHUNK_SIZE: usize = 10_000;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("external field error: {0}")]
    Field(String),
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
    #[error("cannot restore state: {0}")]
    Restore(String),
}

/// A fresh run: build the simulation from a config, snapshot the
/// no-particle fields, populate the sources and step to the end.
pub fn run(cfg: config::Config) -> Result<()> {
    let mut sim = simulation::Simulation::new(cfg)?;
    output::write_fields_without_particles(&sim)?;
    sim.generate_initial_particles()?;
    output::write_checkpoint(&sim)?;
    step_to_end(&mut sim)
}

/// Resume a checkpointed run. The output prefix and suffix come from
/// the caller, not the checkpoint, so a resumed run can write
/// somewhere new.
pub fn continue_run(
    checkpoint_path: &str,
    filename_prefix: Option<String>,
    filename_suffix: Option<String>,
) -> Result<()> {
    let mut sim = output::read_checkpoint(checkpoint_path)?;
    if let Some(prefix) = filename_prefix {
        sim.output_filename_prefix = prefix;
    }
    if let Some(suffix) = filename_suffix {
        sim.output_filename_suffix = suffix;
    }
    step_to_end(&mut sim)
}

fn step_to_end(sim: &mut simulation::Simulation) -> Result<()> {
    while !sim.time_grid.is_finished() {
        sim.advance_one_time_step()?;
        if sim.time_grid.should_save_now() {
            output::write_checkpoint(sim)?;
        }
    }
    info!(
        "run finished at node {} with {} particles alive",
        sim.time_grid.current_node,
        sim.total_particles()
    );
    Ok(())
}

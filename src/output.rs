use crate::simulation::Simulation;
use crate::Error;
use log::info;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Checkpoint name for a time node, e.g. `out_0000005.json`.
pub fn checkpoint_file_name(prefix: &str, node: u64, suffix: &str) -> String {
    format!("{}{:07}{}", prefix, node, suffix)
}

/// Name of the one-off field snapshot taken before any particles exist.
pub fn fields_without_particles_file_name(prefix: &str, suffix: &str) -> String {
    format!("{}fieldsWithoutParticles{}", prefix, suffix)
}

pub fn write_checkpoint(sim: &Simulation) -> Result<(), Error> {
    let name = checkpoint_file_name(
        &sim.output_filename_prefix,
        sim.time_grid.current_node,
        &sim.output_filename_suffix,
    );
    write_state(sim, &name)
}

pub fn write_fields_without_particles(sim: &Simulation) -> Result<(), Error> {
    let name = fields_without_particles_file_name(
        &sim.output_filename_prefix,
        &sim.output_filename_suffix,
    );
    write_state(sim, &name)
}

/// A checkpoint that cannot be written is a hard error: continuing
/// would let the run claim progress that was never saved.
fn write_state(sim: &Simulation, name: &str) -> Result<(), Error> {
    info!("saving state to {}", name);
    let file = File::create(name).map_err(|e| {
        Error::Checkpoint(format!(
            "cannot open '{}' for writing: {}; check the output filename prefix \
             and make sure the target directory exists",
            name, e
        ))
    })?;
    serde_json::to_writer(BufWriter::new(file), sim)
        .map_err(|e| Error::Checkpoint(format!("cannot write '{}': {}", name, e)))
}

/// Reloads a checkpoint. Anything unrecognized in the file (unknown
/// shape or field tags, missing components) aborts the restart.
pub fn read_checkpoint<P: AsRef<Path>>(path: P) -> Result<Simulation, Error> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        Error::Checkpoint(format!("cannot open checkpoint '{}': {}", path.display(), e))
    })?;
    let sim: Simulation = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        Error::Restore(format!("malformed checkpoint '{}': {}", path.display(), e))
    })?;
    sim.time_grid.validate_derived()?;
    info!(
        "resuming from {} at node {} (t = {:.6e})",
        path.display(),
        sim.time_grid.current_node,
        sim.time_grid.current_time
    );
    Ok(sim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_names_pad_the_node_to_seven_digits() {
        assert_eq!(checkpoint_file_name("out_", 5, ".h5"), "out_0000005.h5");
        assert_eq!(
            checkpoint_file_name("run/", 1234567, ".json"),
            "run/1234567.json"
        );
    }

    #[test]
    fn initial_snapshot_has_its_fixed_name() {
        assert_eq!(
            fields_without_particles_file_name("out_", ".json"),
            "out_fieldsWithoutParticles.json"
        );
    }
}

use crate::{Error, Float};
use log::info;
use serde::{Deserialize, Serialize};

/// Uniform time axis of the run. `total_nodes` counts time nodes
/// including the one at t = 0, so a run takes `total_nodes - 1` steps;
/// `current_node` counts completed steps and increases by exactly one
/// per step; `node_to_save` is how many steps pass between checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeGrid {
    pub total_time: Float,
    pub time_step_size: Float,
    pub save_step: Float,
    pub total_nodes: u64,
    pub node_to_save: u64,
    pub current_time: Float,
    pub current_node: u64,
}

impl TimeGrid {
    pub fn new(total_time: Float, time_step_size: Float, save_step: Float) -> Result<TimeGrid, Error> {
        if total_time <= 0.0 {
            return Err(Error::Config("total_time must be positive".to_string()));
        }
        if time_step_size <= 0.0 || time_step_size > total_time {
            return Err(Error::Config(format!(
                "time_step_size must lie in (0, total_time], got {}",
                time_step_size
            )));
        }
        if save_step < time_step_size {
            return Err(Error::Config(format!(
                "save_step {} is smaller than the time step {}",
                save_step, time_step_size
            )));
        }
        // ceil keeps the last partial step; near-integer ratios such as
        // 0.3 / 0.1 land a hair below the integer in floating point and
        // a floor here would silently drop a step
        let total_nodes = (total_time / time_step_size).ceil() as u64 + 1;
        let node_to_save = (save_step / time_step_size).floor() as u64;
        if (save_step - node_to_save as Float * time_step_size).abs() > Float::EPSILON * save_step {
            info!(
                "save_step adjusted from {} to {} to land on whole time steps",
                save_step,
                node_to_save as Float * time_step_size
            );
        }
        Ok(TimeGrid {
            total_time,
            time_step_size,
            save_step: node_to_save as Float * time_step_size,
            total_nodes,
            node_to_save,
            current_time: 0.0,
            current_node: 0,
        })
    }

    pub fn update(&mut self) {
        self.current_node += 1;
        self.current_time += self.time_step_size;
    }

    pub fn is_finished(&self) -> bool {
        self.current_node + 1 >= self.total_nodes
    }

    pub fn should_save_now(&self) -> bool {
        self.current_node % self.node_to_save == 0
    }

    /// Consistency check after a checkpoint reload: the derived counts
    /// must match what the primary values imply.
    pub fn validate_derived(&self) -> Result<(), Error> {
        if self.node_to_save < 1 {
            return Err(Error::Config("node_to_save must be at least 1".to_string()));
        }
        let expected_total = (self.total_time / self.time_step_size).ceil() as u64 + 1;
        if self.total_nodes != expected_total {
            return Err(Error::Config(format!(
                "total_nodes {} inconsistent with ceil(total_time / dt) + 1 = {}",
                self.total_nodes, expected_total
            )));
        }
        Ok(())
    }
}

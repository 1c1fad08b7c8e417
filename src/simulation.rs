use crate::config::{Config, FieldConfig};
use crate::external_field::ExternalField;
use crate::inner_region::InnerRegion;
use crate::mesh::{BoundaryPotentials, MeshGrid, SpatialMesh};
use crate::prtls::source::ParticleSource;
use crate::solver::FieldSolver;
use crate::time_grid::TimeGrid;
use crate::vec3::Vec3;
use crate::Error;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionModel {
    Noninteracting,
    Binary,
    Pic,
}

/// The whole run: time axis, mesh, obstacles, sources, fields and the
/// interaction model, stepped by `advance_one_time_step`. Serializes
/// in full, including solver and per-source generator state, so a
/// reloaded checkpoint continues bit-identically.
#[derive(Serialize, Deserialize)]
pub struct Simulation {
    pub time_grid: TimeGrid,
    pub spatial_mesh: SpatialMesh,
    pub inner_regions: Vec<InnerRegion>,
    pub particle_sources: Vec<ParticleSource>,
    pub electric_fields: Vec<ExternalField>,
    pub magnetic_fields: Vec<ExternalField>,
    pub interaction_model: InteractionModel,
    pub output_filename_prefix: String,
    pub output_filename_suffix: String,
    /// Next particle id. Ids are handed out in blocks from this single
    /// counter, so they stay unique across all sources for the whole
    /// run and across restarts.
    pub max_id: u64,
    field_solver: FieldSolver,
}

impl Simulation {
    pub fn new(config: Config) -> Result<Simulation, Error> {
        let time_grid = TimeGrid::new(
            config.time_grid.total_time,
            config.time_grid.time_step_size,
            config.time_grid.save_step,
        )?;
        let grid = MeshGrid::from_step(
            config.spatial_mesh.grid_size,
            config.spatial_mesh.grid_step,
            config.spatial_mesh.origin,
        )?;
        let bc = &config.boundary_conditions;
        let boundary = BoundaryPotentials {
            x_min: bc.potential_x_min,
            x_max: bc.potential_x_max,
            y_min: bc.potential_y_min,
            y_max: bc.potential_y_max,
            z_min: bc.potential_z_min,
            z_max: bc.potential_z_max,
        };
        let mut spatial_mesh = SpatialMesh::new(grid, boundary);

        let mut inner_regions = Vec::with_capacity(config.inner_regions.len());
        for r in config.inner_regions {
            inner_regions.push(InnerRegion::new(r.name, r.shape, r.potential, r.inverted)?);
        }

        let mut particle_sources = Vec::with_capacity(config.particle_sources.len());
        for s in config.particle_sources {
            let source = ParticleSource::new(
                s.name,
                s.shape,
                s.initial_number_of_particles,
                s.particles_to_generate_each_step,
                s.mean_momentum,
                s.temperature,
                s.charge,
                s.mass,
                s.seed,
            )?;
            check_source_inside_domain(&source, &spatial_mesh.grid)?;
            particle_sources.push(source);
        }

        let electric_fields = build_fields(config.external_electric_fields)?;
        let magnetic_fields = build_fields(config.external_magnetic_fields)?;

        // Fields of the empty domain, so the very first half-step push
        // and the no-particle snapshot see a solved potential.
        let mut field_solver = FieldSolver::new(&spatial_mesh, &inner_regions);
        field_solver.eval_potential(&mut spatial_mesh, &inner_regions);
        field_solver.eval_fields_from_potential(&mut spatial_mesh);

        Ok(Simulation {
            time_grid,
            spatial_mesh,
            inner_regions,
            particle_sources,
            electric_fields,
            magnetic_fields,
            interaction_model: config.interaction_model.model,
            output_filename_prefix: config.output.filename_prefix,
            output_filename_suffix: config.output.filename_suffix,
            max_id: 0,
            field_solver,
        })
    }

    /// Initial particle population. Runs once, after the no-particle
    /// field snapshot has been taken.
    pub fn generate_initial_particles(&mut self) -> Result<(), Error> {
        let mut max_id = self.max_id;
        for source in self.particle_sources.iter_mut() {
            source.generate_initial_particles(&mut max_id);
        }
        self.max_id = max_id;
        self.shift_new_particles_momenta_half_step_back()
    }

    pub fn advance_one_time_step(&mut self) -> Result<(), Error> {
        self.push_particles()?;
        self.apply_domain_constrains();
        self.shift_new_particles_momenta_half_step_back()?;
        if self.interaction_model == InteractionModel::Pic {
            self.eval_charge_density_and_fields();
        }
        self.time_grid.update();
        Ok(())
    }

    pub fn total_particles(&self) -> usize {
        self.particle_sources.iter().map(|s| s.total_particles()).sum()
    }

    /// Grid-interpolated field can be skipped entirely for the
    /// non-gridded models when it is provably zero: uniform boundary
    /// potential and no inner regions means a flat potential.
    fn include_grid_field(&self) -> bool {
        match self.interaction_model {
            InteractionModel::Pic => true,
            InteractionModel::Noninteracting | InteractionModel::Binary => {
                !self.inner_regions.is_empty()
                    || !self.spatial_mesh.is_potential_uniform_on_boundary()
            }
        }
    }

    /// Total electric and magnetic field at each position: external
    /// fields, plus the mesh field when it matters, plus the pairwise
    /// particle field under the binary model.
    fn compute_total_fields(&self, positions: &[Vec3]) -> Result<(Vec<Vec3>, Vec<Vec3>), Error> {
        let time = self.time_grid.current_time;
        let mut e_total = vec![Vec3::zero(); positions.len()];
        for field in &self.electric_fields {
            for (acc, v) in e_total.iter_mut().zip(field.field_at_positions(positions, time)?) {
                *acc += v;
            }
        }
        if self.include_grid_field() {
            for (acc, v) in e_total
                .iter_mut()
                .zip(self.spatial_mesh.field_at_positions(positions))
            {
                *acc += v;
            }
        }
        if self.interaction_model == InteractionModel::Binary {
            for (acc, point) in e_total.iter_mut().zip(positions) {
                for source in &self.particle_sources {
                    for arr in &source.particle_arrays {
                        *acc += arr.field_at_point(*point);
                    }
                }
            }
        }
        let mut b_total = vec![Vec3::zero(); positions.len()];
        for field in &self.magnetic_fields {
            for (acc, v) in b_total.iter_mut().zip(field.field_at_positions(positions, time)?) {
                *acc += v;
            }
        }
        Ok((e_total, b_total))
    }

    fn push_particles(&mut self) -> Result<(), Error> {
        let dt = self.time_grid.time_step_size;
        let mut gathered = Vec::new();
        for source in &self.particle_sources {
            for arr in &source.particle_arrays {
                gathered.push(self.compute_total_fields(&arr.positions)?);
            }
        }
        let no_mgn = self.magnetic_fields.is_empty();
        let mut flat = 0;
        for source in self.particle_sources.iter_mut() {
            for arr in source.particle_arrays.iter_mut() {
                let (e, b) = &gathered[flat];
                flat += 1;
                if no_mgn {
                    arr.boris_update_momentum_no_mgn(dt, e);
                } else {
                    arr.boris_update_momentums(dt, e, b);
                }
                arr.update_positions(dt);
            }
        }
        Ok(())
    }

    /// Pulls freshly generated momenta back half a step so positions
    /// and momenta interleave on the leapfrog. Same field gather and
    /// Boris kick as the main push, with the time step negated and
    /// halved; the per-array flag keeps this from being applied twice.
    fn shift_new_particles_momenta_half_step_back(&mut self) -> Result<(), Error> {
        let minus_half_dt = -self.time_grid.time_step_size / 2.0;
        let mut gathered = Vec::new();
        for source in &self.particle_sources {
            for arr in &source.particle_arrays {
                if arr.momentum_is_half_time_step_shifted {
                    gathered.push(None);
                } else {
                    gathered.push(Some(self.compute_total_fields(&arr.positions)?));
                }
            }
        }
        let no_mgn = self.magnetic_fields.is_empty();
        let mut flat = 0;
        for source in self.particle_sources.iter_mut() {
            for arr in source.particle_arrays.iter_mut() {
                if let Some((e, b)) = &gathered[flat] {
                    if no_mgn {
                        arr.boris_update_momentum_no_mgn(minus_half_dt, e);
                    } else {
                        arr.boris_update_momentums(minus_half_dt, e, b);
                    }
                    arr.momentum_is_half_time_step_shifted = true;
                }
                flat += 1;
            }
        }
        Ok(())
    }

    /// Generation runs before removal on purpose: a source may overlap
    /// an inner region, and whatever it spawns inside the region is
    /// absorbed in the same step without special-casing.
    fn apply_domain_constrains(&mut self) {
        let mut max_id = self.max_id;
        for source in self.particle_sources.iter_mut() {
            source.generate_each_step(&mut max_id);
        }
        self.max_id = max_id;

        let lo = self.spatial_mesh.grid.origin;
        let hi = lo + self.spatial_mesh.grid.size;
        let mut left_domain = 0;
        for source in self.particle_sources.iter_mut() {
            for arr in source.particle_arrays.iter_mut() {
                let removed = arr.remove_if(|p| {
                    p.x < lo.x
                        || p.x > hi.x
                        || p.y < lo.y
                        || p.y > hi.y
                        || p.z < lo.z
                        || p.z > hi.z
                });
                left_domain += removed.len();
            }
        }
        if left_domain > 0 {
            debug!("{} particles left the domain", left_domain);
        }

        for region in self.inner_regions.iter_mut() {
            for source in self.particle_sources.iter_mut() {
                for arr in source.particle_arrays.iter_mut() {
                    region.absorb_from(arr);
                }
            }
        }
        for source in self.particle_sources.iter_mut() {
            source.prune_empty_arrays();
        }
    }

    fn eval_charge_density_and_fields(&mut self) {
        self.spatial_mesh.clear_charge();
        for source in &self.particle_sources {
            for arr in &source.particle_arrays {
                self.spatial_mesh.grid.distribute_scalar_at_positions(
                    arr.charge,
                    &arr.positions,
                    &mut self.spatial_mesh.charge_density,
                );
            }
        }
        self.field_solver
            .eval_potential(&mut self.spatial_mesh, &self.inner_regions);
        self.field_solver
            .eval_fields_from_potential(&mut self.spatial_mesh);
    }
}

fn build_fields(specs: Vec<FieldConfig>) -> Result<Vec<ExternalField>, Error> {
    let mut out = Vec::with_capacity(specs.len());
    for spec in specs {
        out.push(match spec {
            FieldConfig::Uniform { name, field } => ExternalField::uniform(name, field),
            FieldConfig::Expression { name, x, y, z } => ExternalField::expression(name, x, y, z)?,
            FieldConfig::TabulatedOnGrid { name, file } => {
                ExternalField::tabulated_from_file(name, &file)?
            }
        });
    }
    Ok(out)
}

fn check_source_inside_domain(source: &ParticleSource, grid: &MeshGrid) -> Result<(), Error> {
    let (lo, hi) = source.shape.bounding_box();
    let domain_lo = grid.origin;
    let domain_hi = grid.origin + grid.size;
    if lo.x < domain_lo.x
        || lo.y < domain_lo.y
        || lo.z < domain_lo.z
        || hi.x > domain_hi.x
        || hi.y > domain_hi.y
        || hi.z > domain_hi.z
    {
        return Err(Error::Config(format!(
            "particle source '{}' extends outside the computational domain",
            source.name
        )));
    }
    Ok(())
}

use espic::config::{
    BoundaryConfig, Config, InteractionModelConfig, OutputConfig, ParticleSourceConfig,
    SpatialMeshConfig, TimeGridConfig,
};
use espic::geometry::Shape;
use espic::simulation::{InteractionModel, Simulation};
use espic::vec3::Vec3;

// Builds a small dummy simulation for the integration tests: an 8x8x8
// domain with one boxy electron-like source in the middle.
pub fn setup_sim(model: InteractionModel) -> Simulation {
    let cfg = Config {
        time_grid: TimeGridConfig {
            total_time: 1.0,
            time_step_size: 0.1,
            save_step: 0.5,
        },
        spatial_mesh: SpatialMeshConfig {
            grid_size: Vec3::new(8.0, 8.0, 8.0),
            grid_step: Vec3::new(1.0, 1.0, 1.0),
            origin: Vec3::zero(),
        },
        boundary_conditions: BoundaryConfig::default(),
        particle_sources: vec![ParticleSourceConfig {
            name: "emitter".to_string(),
            shape: Shape::Box {
                origin: Vec3::new(3.0, 3.0, 3.0),
                size: Vec3::new(2.0, 2.0, 2.0),
            },
            initial_number_of_particles: 50,
            particles_to_generate_each_step: 2,
            mean_momentum: Vec3::zero(),
            temperature: 0.01,
            charge: -1.0,
            mass: 10.0,
            seed: 17,
        }],
        inner_regions: vec![],
        external_electric_fields: vec![],
        external_magnetic_fields: vec![],
        interaction_model: InteractionModelConfig { model },
        output: OutputConfig {
            filename_prefix: "test_out_".to_string(),
            filename_suffix: ".json".to_string(),
        },
    };
    Simulation::new(cfg).unwrap()
}

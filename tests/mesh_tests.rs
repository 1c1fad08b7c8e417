use espic::mesh::{BoundaryPotentials, MeshGrid, SpatialMesh};
use espic::vec3::Vec3;
use espic::Float;
use ndarray::Array1;

fn anisotropic_grid() -> MeshGrid {
    // deliberately unequal cells so weight bugs cannot hide
    MeshGrid::new(Vec3::new(3.0, 4.0, 5.0), (7, 5, 11), Vec3::new(-1.0, 0.0, 2.0)).unwrap()
}

#[test]
fn deposited_charge_equals_particle_charge_anywhere() {
    let grid = anisotropic_grid();
    let positions = vec![
        Vec3::new(-0.7, 0.3, 2.1),
        Vec3::new(1.999, 3.999, 6.999),
        Vec3::new(-1.0, 0.0, 2.0), // exactly the domain corner
        Vec3::new(0.5, 2.0, 4.5),
    ];
    let mut rho: Array1<Float> = Array1::zeros(grid.total_nodes());
    grid.distribute_scalar_at_positions(3.5, &positions, &mut rho);
    let total = rho.sum() * grid.cell_volume();
    let expected = 3.5 * positions.len() as Float;
    assert!((total - expected).abs() < 1e-10 * expected.abs());
}

#[test]
fn interpolation_returns_the_constant_of_a_uniform_field() {
    let grid = anisotropic_grid();
    let value = Vec3::new(-0.25, 7.0, 1.0e-3);
    let field = vec![value; grid.total_nodes()];
    let positions = vec![
        Vec3::new(-0.99, 0.01, 2.01),
        Vec3::new(1.0, 2.0, 5.0),
        Vec3::new(1.9, 3.9, 6.9),
    ];
    for v in grid.interpolate_field_at_positions(&field, &positions) {
        assert!((v.x - value.x).abs() < 1e-12);
        assert!((v.y - value.y).abs() < 1e-12);
        assert!((v.z - value.z).abs() < 1e-12);
    }
}

#[test]
fn interpolation_is_linear_between_nodes() {
    // 1D ramp along x: f(x) = x, exactly representable by trilinear
    // interpolation
    let grid = MeshGrid::new(Vec3::new(2.0, 1.0, 1.0), (3, 2, 2), Vec3::zero()).unwrap();
    let mut field = vec![Vec3::zero(); grid.total_nodes()];
    let (nx, ny, nz) = grid.n_nodes;
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                field[grid.node_index(i, j, k)] = Vec3::new(i as Float, 0.0, 0.0);
            }
        }
    }
    let values =
        grid.interpolate_field_at_positions(&field, &[Vec3::new(0.25, 0.5, 0.5)]);
    assert!((values[0].x - 0.25).abs() < 1e-14);
}

#[test]
fn mesh_charge_clears_between_steps() {
    let grid = anisotropic_grid();
    let mut mesh = SpatialMesh::new(grid, BoundaryPotentials::uniform(0.0));
    let g = mesh.grid.clone();
    g.distribute_scalar_at_positions(1.0, &[Vec3::new(0.0, 1.0, 4.0)], &mut mesh.charge_density);
    assert!(mesh.charge_density.sum() != 0.0);
    mesh.clear_charge();
    assert_eq!(mesh.charge_density.sum(), 0.0);
}

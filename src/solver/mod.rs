pub mod csr;

use crate::inner_region::InnerRegion;
use crate::mesh::SpatialMesh;
use crate::vec3::Vec3;
use crate::Float;
use log::warn;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const MAX_CG_ITERATIONS: usize = 1000;
const CG_TOLERANCE: Float = 1e-10;

/// Poisson solver on the interior nodes of a spatial mesh.
///
/// The discrete operator is the 7-point Laplacian scaled by
/// `dx^2 dy^2 dz^2`, assembled once per simulation with identity rows
/// punched for every interior node covered by an inner region
/// (embedded boundary). Each PIC step rebuilds only the right-hand side
/// and re-solves with conjugate gradient, warm-started from the
/// previous potential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSolver {
    matrix: csr::CsrMatrix,
    rhs: Array1<Float>,
    phi_interior: Array1<Float>,
}

/// Dimensions of the interior unknown block, with the x index fastest:
/// unknown `(i, j, k)` (node indices, all in `1..n-1`) maps to
/// `(i-1) + (j-1)*(nx-2) + (k-1)*(nx-2)*(ny-2)`.
fn interior_index(n_nodes: (usize, usize, usize), i: usize, j: usize, k: usize) -> usize {
    let (nx, ny, _) = n_nodes;
    (i - 1) + (j - 1) * (nx - 2) + (k - 1) * (nx - 2) * (ny - 2)
}

fn interior_count(n_nodes: (usize, usize, usize)) -> usize {
    let (nx, ny, nz) = n_nodes;
    (nx - 2) * (ny - 2) * (nz - 2)
}

impl FieldSolver {
    pub fn new(mesh: &SpatialMesh, inner_regions: &[InnerRegion]) -> FieldSolver {
        let matrix = FieldSolver::construct_equation_matrix(mesh, inner_regions);
        let n = interior_count(mesh.grid.n_nodes);
        FieldSolver {
            matrix,
            rhs: Array1::zeros(n),
            phi_interior: Array1::zeros(n),
        }
    }

    /// Assembles the interior-node Laplacian as triplets and converts to
    /// compressed rows, then rewrites the rows of nodes lying inside an
    /// inner region into identity rows so the right-hand side can impose
    /// the region potential directly.
    fn construct_equation_matrix(
        mesh: &SpatialMesh,
        inner_regions: &[InnerRegion],
    ) -> csr::CsrMatrix {
        let (nx, ny, nz) = mesh.grid.n_nodes;
        let cell = mesh.grid.cell;
        let (dx2, dy2, dz2) = (cell.x * cell.x, cell.y * cell.y, cell.z * cell.z);
        // stencil coefficients of d2/dx2 * dy2 dz2 etc.
        let cx = dy2 * dz2;
        let cy = dx2 * dz2;
        let cz = dx2 * dy2;
        let diagonal = -2.0 * (cx + cy + cz);

        let n = interior_count(mesh.grid.n_nodes);
        let mut triplets: Vec<(usize, usize, Float)> = Vec::with_capacity(7 * n);
        for k in 1..nz - 1 {
            for j in 1..ny - 1 {
                for i in 1..nx - 1 {
                    let row = interior_index(mesh.grid.n_nodes, i, j, k);
                    triplets.push((row, row, diagonal));
                    // Neighbours that are themselves unknowns get an
                    // off-diagonal entry; neighbours on the domain
                    // boundary are folded into the RHS instead.
                    if i > 1 {
                        triplets.push((row, interior_index(mesh.grid.n_nodes, i - 1, j, k), cx));
                    }
                    if i < nx - 2 {
                        triplets.push((row, interior_index(mesh.grid.n_nodes, i + 1, j, k), cx));
                    }
                    if j > 1 {
                        triplets.push((row, interior_index(mesh.grid.n_nodes, i, j - 1, k), cy));
                    }
                    if j < ny - 2 {
                        triplets.push((row, interior_index(mesh.grid.n_nodes, i, j + 1, k), cy));
                    }
                    if k > 1 {
                        triplets.push((row, interior_index(mesh.grid.n_nodes, i, j, k - 1), cz));
                    }
                    if k < nz - 2 {
                        triplets.push((row, interior_index(mesh.grid.n_nodes, i, j, k + 1), cz));
                    }
                }
            }
        }
        let mut matrix = csr::CsrMatrix::from_triplets(n, &triplets);

        for k in 1..nz - 1 {
            for j in 1..ny - 1 {
                for i in 1..nx - 1 {
                    let node = mesh.grid.node_coordinates(i, j, k);
                    if inner_regions.iter().any(|region| region.contains(node)) {
                        matrix.make_identity_row(interior_index(mesh.grid.n_nodes, i, j, k));
                    }
                }
            }
        }
        matrix
    }

    /// Builds the right-hand side from the current charge density, the
    /// six boundary potentials and the inner-region potentials.
    pub fn init_rhs_vector(&mut self, mesh: &SpatialMesh, inner_regions: &[InnerRegion]) {
        let (nx, ny, nz) = mesh.grid.n_nodes;
        let cell = mesh.grid.cell;
        let (dx2, dy2, dz2) = (cell.x * cell.x, cell.y * cell.y, cell.z * cell.z);
        let cx = dy2 * dz2;
        let cy = dx2 * dz2;
        let cz = dx2 * dy2;
        let rho_scale = -4.0 * PI * dx2 * dy2 * dz2;

        for k in 1..nz - 1 {
            for j in 1..ny - 1 {
                for i in 1..nx - 1 {
                    let row = interior_index(mesh.grid.n_nodes, i, j, k);
                    let node = mesh.grid.node_index(i, j, k);
                    let mut rhs = rho_scale * mesh.charge_density[node];
                    if i == 1 {
                        rhs -= cx * mesh.boundary.x_min;
                    }
                    if i == nx - 2 {
                        rhs -= cx * mesh.boundary.x_max;
                    }
                    if j == 1 {
                        rhs -= cy * mesh.boundary.y_min;
                    }
                    if j == ny - 2 {
                        rhs -= cy * mesh.boundary.y_max;
                    }
                    if k == 1 {
                        rhs -= cz * mesh.boundary.z_min;
                    }
                    if k == nz - 2 {
                        rhs -= cz * mesh.boundary.z_max;
                    }
                    self.rhs[row] = rhs;
                }
            }
        }

        // Inner-region nodes read their potential straight off the RHS
        // through the identity rows punched at assembly.
        for k in 1..nz - 1 {
            for j in 1..ny - 1 {
                for i in 1..nx - 1 {
                    let node = mesh.grid.node_coordinates(i, j, k);
                    for region in inner_regions {
                        if region.contains(node) {
                            let row = interior_index(mesh.grid.n_nodes, i, j, k);
                            self.rhs[row] = region.potential;
                        }
                    }
                }
            }
        }
    }

    /// One Poisson solve: rebuild the RHS, run conjugate gradient from
    /// the previous interior potential, write the result back into the
    /// mesh. Non-convergence degrades accuracy and is logged as a
    /// warning; it never stops the run.
    pub fn eval_potential(&mut self, mesh: &mut SpatialMesh, inner_regions: &[InnerRegion]) {
        self.init_rhs_vector(mesh, inner_regions);
        let outcome = csr::conjugate_gradient(
            &self.matrix,
            &self.rhs,
            &mut self.phi_interior,
            MAX_CG_ITERATIONS,
            CG_TOLERANCE,
        );
        if !outcome.converged {
            warn!(
                "Poisson solve did not converge after {} iterations (residual {:.3e}); \
                 continuing with best available solution",
                outcome.iterations, outcome.residual_norm
            );
        }

        let (nx, ny, nz) = mesh.grid.n_nodes;
        for k in 1..nz - 1 {
            for j in 1..ny - 1 {
                for i in 1..nx - 1 {
                    let row = interior_index(mesh.grid.n_nodes, i, j, k);
                    let node = mesh.grid.node_index(i, j, k);
                    mesh.potential[node] = self.phi_interior[row];
                }
            }
        }
    }

    /// E = -grad phi: centered differences at interior nodes, one-sided
    /// two-point differences on the domain boundary.
    pub fn eval_fields_from_potential(&self, mesh: &mut SpatialMesh) {
        let (nx, ny, nz) = mesh.grid.n_nodes;
        let cell = mesh.grid.cell;
        let phi = &mesh.potential;
        let at = |i: usize, j: usize, k: usize| phi[mesh.grid.node_index(i, j, k)];

        let mut field = vec![Vec3::zero(); mesh.grid.total_nodes()];
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let ex = if i == 0 {
                        (at(0, j, k) - at(1, j, k)) / cell.x
                    } else if i == nx - 1 {
                        (at(nx - 2, j, k) - at(nx - 1, j, k)) / cell.x
                    } else {
                        (at(i - 1, j, k) - at(i + 1, j, k)) / (2.0 * cell.x)
                    };
                    let ey = if j == 0 {
                        (at(i, 0, k) - at(i, 1, k)) / cell.y
                    } else if j == ny - 1 {
                        (at(i, ny - 2, k) - at(i, ny - 1, k)) / cell.y
                    } else {
                        (at(i, j - 1, k) - at(i, j + 1, k)) / (2.0 * cell.y)
                    };
                    let ez = if k == 0 {
                        (at(i, j, 0) - at(i, j, 1)) / cell.z
                    } else if k == nz - 1 {
                        (at(i, j, nz - 2) - at(i, j, nz - 1)) / cell.z
                    } else {
                        (at(i, j, k - 1) - at(i, j, k + 1)) / (2.0 * cell.z)
                    };
                    field[mesh.grid.node_index(i, j, k)] = Vec3::new(ex, ey, ez);
                }
            }
        }
        mesh.electric_field = field;
    }

    /// Matrix row of an interior node, exposed for inspection in tests.
    pub fn matrix_row(&self, row: usize) -> (&[usize], &[Float]) {
        self.matrix.row(row)
    }

    pub fn rhs(&self) -> &Array1<Float> {
        &self.rhs
    }

    pub fn unknowns(&self) -> usize {
        self.matrix.n()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{BoundaryPotentials, MeshGrid, SpatialMesh};

    fn mesh_433(boundary: Float) -> SpatialMesh {
        let grid = MeshGrid::new(Vec3::new(4.0, 3.0, 3.0), (5, 4, 4), Vec3::zero()).unwrap();
        SpatialMesh::new(grid, BoundaryPotentials::uniform(boundary))
    }

    #[test]
    fn unknown_count_matches_interior_nodes() {
        let mesh = mesh_433(0.0);
        let solver = FieldSolver::new(&mesh, &[]);
        assert_eq!(solver.unknowns(), 12);
    }

    #[test]
    fn zero_charge_zero_boundary_gives_zero_rhs_and_potential() {
        let mut mesh = mesh_433(0.0);
        let mut solver = FieldSolver::new(&mesh, &[]);
        solver.eval_potential(&mut mesh, &[]);
        for v in solver.rhs().iter() {
            assert_eq!(*v, 0.0);
        }
        for v in mesh.potential.iter() {
            assert!(v.abs() < 1e-12);
        }
    }

    #[test]
    fn rhs_counts_boundary_neighbours() {
        // With unit cells and all faces at -2, each interior node's RHS
        // is +2 per stencil neighbour lying on the domain boundary.
        let mut mesh = mesh_433(-2.0);
        let mut solver = FieldSolver::new(&mesh, &[]);
        solver.init_rhs_vector(&mut mesh, &[]);
        let expected = [
            6.0, 4.0, 6.0, 6.0, 4.0, 6.0, 6.0, 4.0, 6.0, 6.0, 4.0, 6.0,
        ];
        for (v, e) in solver.rhs().iter().zip(expected.iter()) {
            assert_eq!(*v, *e);
        }
    }

    #[test]
    fn uniform_boundary_gives_flat_potential_and_zero_field() {
        let mut mesh = mesh_433(-2.0);
        let mut solver = FieldSolver::new(&mesh, &[]);
        solver.eval_potential(&mut mesh, &[]);
        solver.eval_fields_from_potential(&mut mesh);
        for v in mesh.potential.iter() {
            assert!((v + 2.0).abs() < 1e-8);
        }
        for e in mesh.electric_field.iter() {
            assert!(e.length() < 1e-8);
        }
    }
}

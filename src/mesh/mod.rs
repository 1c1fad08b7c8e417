use crate::vec3::Vec3;
use crate::{Error, Float};
use log::info;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// A structured 3D lattice of nodes. Node `(i, j, k)` sits at
/// `origin + (i, j, k) * cell`; storage of per-node arrays is a flat
/// vec with the x index fastest: `i + j * nx + k * nx * ny`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshGrid {
    pub size: Vec3,
    pub n_nodes: (usize, usize, usize),
    pub origin: Vec3,
    pub cell: Vec3,
}

impl MeshGrid {
    pub fn new(size: Vec3, n_nodes: (usize, usize, usize), origin: Vec3) -> Result<MeshGrid, Error> {
        if size.x <= 0.0 || size.y <= 0.0 || size.z <= 0.0 {
            return Err(Error::Config(format!(
                "grid size must be positive along each axis, got ({}, {}, {})",
                size.x, size.y, size.z
            )));
        }
        if n_nodes.0 < 2 || n_nodes.1 < 2 || n_nodes.2 < 2 {
            return Err(Error::Config(format!(
                "grid needs at least 2 nodes per axis, got ({}, {}, {})",
                n_nodes.0, n_nodes.1, n_nodes.2
            )));
        }
        let cell = Vec3::new(
            size.x / (n_nodes.0 - 1) as Float,
            size.y / (n_nodes.1 - 1) as Float,
            size.z / (n_nodes.2 - 1) as Float,
        );
        Ok(MeshGrid {
            size,
            n_nodes,
            origin,
            cell,
        })
    }

    /// Builds a grid from a requested cell step, rounding the node count
    /// up so that a whole number of cells covers the domain. The realized
    /// step is then at most the requested one.
    pub fn from_step(size: Vec3, step: Vec3, origin: Vec3) -> Result<MeshGrid, Error> {
        if step.x <= 0.0 || step.y <= 0.0 || step.z <= 0.0 {
            return Err(Error::Config(format!(
                "grid step must be positive along each axis, got ({}, {}, {})",
                step.x, step.y, step.z
            )));
        }
        if step.x > size.x || step.y > size.y || step.z > size.z {
            return Err(Error::Config(
                "grid step exceeds domain size".to_string(),
            ));
        }
        let n_nodes = (
            (size.x / step.x).ceil() as usize + 1,
            (size.y / step.y).ceil() as usize + 1,
            (size.z / step.z).ceil() as usize + 1,
        );
        let grid = MeshGrid::new(size, n_nodes, origin)?;
        for (axis, requested, realized) in &[
            ("x", step.x, grid.cell.x),
            ("y", step.y, grid.cell.y),
            ("z", step.z, grid.cell.z),
        ] {
            if (requested - realized).abs() > Float::EPSILON * requested {
                info!(
                    "grid step along {} adjusted from {} to {} to fit a whole number of cells",
                    axis, requested, realized
                );
            }
        }
        Ok(grid)
    }

    pub fn total_nodes(&self) -> usize {
        self.n_nodes.0 * self.n_nodes.1 * self.n_nodes.2
    }

    pub fn cell_volume(&self) -> Float {
        self.cell.x * self.cell.y * self.cell.z
    }

    #[inline(always)]
    pub fn node_index(&self, i: usize, j: usize, k: usize) -> usize {
        i + j * self.n_nodes.0 + k * self.n_nodes.0 * self.n_nodes.1
    }

    pub fn node_coordinates(&self, i: usize, j: usize, k: usize) -> Vec3 {
        self.origin
            + Vec3::new(
                i as Float * self.cell.x,
                j as Float * self.cell.y,
                k as Float * self.cell.z,
            )
    }

    /// Lower-corner node index and fractional remainder of a position,
    /// the shared first half of deposition and interpolation.
    #[inline(always)]
    fn cell_of(&self, position: Vec3) -> ((isize, isize, isize), Vec3) {
        let rel = position - self.origin;
        let fx = rel.x / self.cell.x;
        let fy = rel.y / self.cell.y;
        let fz = rel.z / self.cell.z;
        let corner = (
            fx.floor() as isize,
            fy.floor() as isize,
            fz.floor() as isize,
        );
        let weight = Vec3::new(
            fx - fx.floor(),
            fy - fy.floor(),
            fz - fz.floor(),
        );
        (corner, weight)
    }

    /// Trilinearly spreads `value / cell_volume` from each position onto
    /// its 8 surrounding nodes, accumulating into `grid_out`.
    ///
    /// Panics if any node with nonzero weight is outside the grid. A
    /// particle that deposits out of bounds should already have been
    /// removed by the domain constraints pass, so this is an invariant
    /// violation and not a recoverable condition. Particles sitting
    /// exactly on the domain faces are kept by that pass and deposit
    /// cleanly.
    pub fn distribute_scalar_at_positions(
        &self,
        value: Float,
        positions: &[Vec3],
        grid_out: &mut Array1<Float>,
    ) {
        if !cfg!(feature = "unchecked") {
            assert_eq!(grid_out.len(), self.total_nodes());
        }
        let density = value / self.cell_volume();
        let (nx, ny, nz) = self.n_nodes;
        for position in positions {
            let (corner, w) = self.cell_of(*position);
            for (di, dj, dk, weight) in corner_weights(w).iter() {
                // A particle exactly on an upper face puts its far
                // corner one node past the grid with weight zero;
                // such corners deposit nothing and are skipped, so a
                // position of exactly `origin + size` stays valid.
                if *weight == 0.0 {
                    continue;
                }
                let i = corner.0 + di;
                let j = corner.1 + dj;
                let k = corner.2 + dk;
                assert!(
                    i >= 0
                        && j >= 0
                        && k >= 0
                        && (i as usize) < nx
                        && (j as usize) < ny
                        && (k as usize) < nz,
                    "charge deposition touched node ({}, {}, {}) outside the grid; \
                     particle at ({}, {}, {}) should have been removed before deposition",
                    i,
                    j,
                    k,
                    position.x,
                    position.y,
                    position.z
                );
                let ind = self.node_index(i as usize, j as usize, k as usize);
                grid_out[ind] += density * weight;
            }
        }
    }

    /// Gathers a node-valued vector field at each position with the same
    /// trilinear weights. Out-of-bounds corners contribute zero, so
    /// particles sitting exactly on the domain edge interpolate cleanly.
    pub fn interpolate_field_at_positions(
        &self,
        field: &[Vec3],
        positions: &[Vec3],
    ) -> Vec<Vec3> {
        if !cfg!(feature = "unchecked") {
            assert_eq!(field.len(), self.total_nodes());
        }
        let (nx, ny, nz) = self.n_nodes;
        positions
            .iter()
            .map(|position| {
                let (corner, w) = self.cell_of(*position);
                let mut total = Vec3::zero();
                for (di, dj, dk, weight) in corner_weights(w).iter() {
                    let i = corner.0 + di;
                    let j = corner.1 + dj;
                    let k = corner.2 + dk;
                    if i < 0
                        || j < 0
                        || k < 0
                        || i as usize >= nx
                        || j as usize >= ny
                        || k as usize >= nz
                    {
                        continue;
                    }
                    let ind = self.node_index(i as usize, j as usize, k as usize);
                    total += field[ind] * *weight;
                }
                total
            })
            .collect()
    }
}

/// The 8 trilinear corner offsets and their weights for a fractional
/// in-cell position. Weights sum to exactly 1 for any in-cell remainder.
#[inline(always)]
pub fn corner_weights(w: Vec3) -> [(isize, isize, isize, Float); 8] {
    let (wx, wy, wz) = (w.x, w.y, w.z);
    let (ux, uy, uz) = (1.0 - wx, 1.0 - wy, 1.0 - wz);
    [
        (0, 0, 0, ux * uy * uz),
        (1, 0, 0, wx * uy * uz),
        (0, 1, 0, ux * wy * uz),
        (1, 1, 0, wx * wy * uz),
        (0, 0, 1, ux * uy * wz),
        (1, 0, 1, wx * uy * wz),
        (0, 1, 1, ux * wy * wz),
        (1, 1, 1, wx * wy * wz),
    ]
}

/// Six face potentials, fixed for the whole run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundaryPotentials {
    pub x_min: Float,
    pub x_max: Float,
    pub y_min: Float,
    pub y_max: Float,
    pub z_min: Float,
    pub z_max: Float,
}

impl BoundaryPotentials {
    pub fn uniform(value: Float) -> BoundaryPotentials {
        BoundaryPotentials {
            x_min: value,
            x_max: value,
            y_min: value,
            y_max: value,
            z_min: value,
            z_max: value,
        }
    }

    pub fn is_uniform(&self) -> bool {
        self.x_min == self.x_max
            && self.x_min == self.y_min
            && self.x_min == self.y_max
            && self.x_min == self.z_min
            && self.x_min == self.z_max
    }
}

/// The grid plus its per-node scalar and vector fields: charge density
/// (reset every PIC step before deposition), potential (boundary faces
/// written once at construction, interior overwritten by every solve)
/// and the electric field derived from the potential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialMesh {
    pub grid: MeshGrid,
    pub charge_density: Array1<Float>,
    pub potential: Array1<Float>,
    pub electric_field: Vec<Vec3>,
    pub boundary: BoundaryPotentials,
}

impl SpatialMesh {
    pub fn new(grid: MeshGrid, boundary: BoundaryPotentials) -> SpatialMesh {
        let total = grid.total_nodes();
        let mut mesh = SpatialMesh {
            grid,
            charge_density: Array1::zeros(total),
            potential: Array1::zeros(total),
            electric_field: vec![Vec3::zero(); total],
            boundary,
        };
        mesh.set_boundary_conditions();
        mesh
    }

    /// Writes the six face potentials. Edges and corners get the value
    /// of whichever face is applied last, matching the construction
    /// order x, y, z.
    fn set_boundary_conditions(&mut self) {
        let (nx, ny, nz) = self.grid.n_nodes;
        for k in 0..nz {
            for j in 0..ny {
                let ind = self.grid.node_index(0, j, k);
                self.potential[ind] = self.boundary.x_min;
                let ind = self.grid.node_index(nx - 1, j, k);
                self.potential[ind] = self.boundary.x_max;
            }
        }
        for k in 0..nz {
            for i in 0..nx {
                let ind = self.grid.node_index(i, 0, k);
                self.potential[ind] = self.boundary.y_min;
                let ind = self.grid.node_index(i, ny - 1, k);
                self.potential[ind] = self.boundary.y_max;
            }
        }
        for j in 0..ny {
            for i in 0..nx {
                let ind = self.grid.node_index(i, j, 0);
                self.potential[ind] = self.boundary.z_min;
                let ind = self.grid.node_index(i, j, nz - 1);
                self.potential[ind] = self.boundary.z_max;
            }
        }
    }

    pub fn clear_charge(&mut self) {
        self.charge_density.fill(0.0);
    }

    /// True when the grid field is provably zero without a solve: all
    /// faces at one potential and nothing else sourcing the field.
    pub fn is_potential_uniform_on_boundary(&self) -> bool {
        self.boundary.is_uniform()
    }

    pub fn field_at_positions(&self, positions: &[Vec3]) -> Vec<Vec3> {
        self.grid
            .interpolate_field_at_positions(&self.electric_field, positions)
    }
}

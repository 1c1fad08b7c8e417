use crate::mesh::corner_weights;
use crate::vec3::Vec3;
use crate::{Error, Float};
use meval::{Context, Expr};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fs;
use std::path::Path;

/// Field contributors that live outside the simulation mesh. The
/// variant set is closed on purpose: the hot per-step loop matches on
/// the tag instead of going through a trait object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExternalField {
    Uniform {
        name: String,
        field: Vec3,
    },
    /// Component expressions over the variables x, y, z and t.
    Expression(ExpressionField),
    /// Static vector field sampled on a regular grid, trilinearly
    /// interpolated. Time is ignored.
    TabulatedOnGrid {
        name: String,
        file: String,
        grid: TabulatedGrid,
    },
}

impl ExternalField {
    pub fn name(&self) -> &str {
        match self {
            ExternalField::Uniform { name, .. } => name,
            ExternalField::Expression(f) => f.name(),
            ExternalField::TabulatedOnGrid { name, .. } => name,
        }
    }

    pub fn uniform(name: String, field: Vec3) -> ExternalField {
        ExternalField::Uniform { name, field }
    }

    pub fn expression(name: String, x: String, y: String, z: String) -> Result<ExternalField, Error> {
        let field = ExpressionField::new(name, x, y, z)?;
        // A trial evaluation catches unknown variables, which parse
        // fine and only fail when evaluated.
        field.eval(&[Vec3::zero()], 0.0)?;
        Ok(ExternalField::Expression(field))
    }

    pub fn tabulated_from_file<P: AsRef<Path>>(name: String, path: P) -> Result<ExternalField, Error> {
        let file = path.as_ref().display().to_string();
        let grid = TabulatedGrid::load(path.as_ref())?;
        Ok(ExternalField::TabulatedOnGrid { name, file, grid })
    }

    pub fn field_at_positions(&self, positions: &[Vec3], time: Float) -> Result<Vec<Vec3>, Error> {
        match self {
            ExternalField::Uniform { field, .. } => Ok(vec![*field; positions.len()]),
            ExternalField::Expression(f) => f.eval(positions, time),
            ExternalField::TabulatedOnGrid { grid, .. } => {
                Ok(positions.iter().map(|p| grid.interpolate(*p)).collect())
            }
        }
    }
}

/// Per-axis component expressions, compiled once. Only the source
/// strings are persisted; serde rebuilds the compiled forms through
/// `ExpressionSpec`, so a checkpoint reload recompiles and the per-step
/// loop never parses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ExpressionSpec", into = "ExpressionSpec")]
pub struct ExpressionField {
    name: String,
    x: String,
    y: String,
    z: String,
    exprs: [Expr; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExpressionSpec {
    name: String,
    x: String,
    y: String,
    z: String,
}

impl ExpressionField {
    pub fn new(name: String, x: String, y: String, z: String) -> Result<ExpressionField, Error> {
        let parse = |axis: &str, src: &str| -> Result<Expr, Error> {
            src.parse().map_err(|e| {
                Error::Field(format!(
                    "field '{}': bad {} expression '{}': {}",
                    name, axis, src, e
                ))
            })
        };
        let exprs = [parse("x", &x)?, parse("y", &y)?, parse("z", &z)?];
        Ok(ExpressionField { name, x, y, z, exprs })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn eval(&self, positions: &[Vec3], time: Float) -> Result<Vec<Vec3>, Error> {
        let mut out = Vec::with_capacity(positions.len());
        for p in positions {
            let mut ctx = Context::new();
            ctx.var("x", p.x).var("y", p.y).var("z", p.z).var("t", time);
            let mut components = [0.0; 3];
            for (component, expr) in components.iter_mut().zip(self.exprs.iter()) {
                *component = expr.eval_with_context(&ctx).map_err(|e| {
                    Error::Field(format!("field '{}': evaluation failed: {}", self.name, e))
                })?;
            }
            out.push(Vec3::new(components[0], components[1], components[2]));
        }
        Ok(out)
    }
}

impl TryFrom<ExpressionSpec> for ExpressionField {
    type Error = Error;

    fn try_from(spec: ExpressionSpec) -> Result<ExpressionField, Error> {
        ExpressionField::new(spec.name, spec.x, spec.y, spec.z)
    }
}

impl From<ExpressionField> for ExpressionSpec {
    fn from(f: ExpressionField) -> ExpressionSpec {
        ExpressionSpec {
            name: f.name,
            x: f.x,
            y: f.y,
            z: f.z,
        }
    }
}

/// Regular grid of vectors loaded from whitespace-separated
/// `x y z Fx Fy Fz` rows. Row order in the file is irrelevant; the
/// coordinates themselves define the lattice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabulatedGrid {
    origin: Vec3,
    cell: Vec3,
    n_nodes: (usize, usize, usize),
    values: Vec<Vec3>,
}

impl TabulatedGrid {
    pub fn load(path: &Path) -> Result<TabulatedGrid, Error> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Field(format!("cannot read tabulated field '{}': {}", path.display(), e))
        })?;
        TabulatedGrid::parse(&text)
            .map_err(|msg| Error::Field(format!("tabulated field '{}': {}", path.display(), msg)))
    }

    fn parse(text: &str) -> Result<TabulatedGrid, String> {
        let mut rows: Vec<(Vec3, Vec3)> = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let cols: Vec<Float> = line
                .split_whitespace()
                .map(|tok| tok.parse::<Float>())
                .collect::<Result<_, _>>()
                .map_err(|e| format!("line {}: {}", lineno + 1, e))?;
            if cols.len() != 6 {
                return Err(format!("line {}: expected 6 columns, got {}", lineno + 1, cols.len()));
            }
            rows.push((
                Vec3::new(cols[0], cols[1], cols[2]),
                Vec3::new(cols[3], cols[4], cols[5]),
            ));
        }
        if rows.is_empty() {
            return Err("no data rows".to_string());
        }

        let xs = sorted_unique(rows.iter().map(|(p, _)| p.x));
        let ys = sorted_unique(rows.iter().map(|(p, _)| p.y));
        let zs = sorted_unique(rows.iter().map(|(p, _)| p.z));
        let n_nodes = (xs.len(), ys.len(), zs.len());
        if n_nodes.0 * n_nodes.1 * n_nodes.2 != rows.len() {
            return Err(format!(
                "{} rows do not fill a {}x{}x{} lattice",
                rows.len(),
                n_nodes.0,
                n_nodes.1,
                n_nodes.2
            ));
        }
        let cell = Vec3::new(axis_step(&xs)?, axis_step(&ys)?, axis_step(&zs)?);
        let origin = Vec3::new(xs[0], ys[0], zs[0]);

        let index_on = |axis: &[Float], v: Float| -> Result<usize, String> {
            axis.iter()
                .position(|&a| (a - v).abs() <= 1e-9 * (1.0 + a.abs()))
                .ok_or_else(|| format!("coordinate {} off the lattice", v))
        };
        let mut values = vec![Vec3::zero(); rows.len()];
        let mut seen = vec![false; rows.len()];
        for (p, f) in &rows {
            let i = index_on(&xs, p.x)?;
            let j = index_on(&ys, p.y)?;
            let k = index_on(&zs, p.z)?;
            let idx = i + j * n_nodes.0 + k * n_nodes.0 * n_nodes.1;
            if seen[idx] {
                return Err(format!("duplicate node at ({}, {}, {})", p.x, p.y, p.z));
            }
            seen[idx] = true;
            values[idx] = *f;
        }
        Ok(TabulatedGrid {
            origin,
            cell,
            n_nodes,
            values,
        })
    }

    /// Trilinear sample; out-of-range corners contribute zero, so the
    /// field fades at the table's edge instead of erroring.
    pub fn interpolate(&self, point: Vec3) -> Vec3 {
        let local = point - self.origin;
        let w = Vec3::new(local.x / self.cell.x, local.y / self.cell.y, local.z / self.cell.z);
        let base = (w.x.floor(), w.y.floor(), w.z.floor());
        let frac = Vec3::new(w.x - base.0, w.y - base.1, w.z - base.2);
        let (nx, ny, nz) = self.n_nodes;
        let mut total = Vec3::zero();
        for (di, dj, dk, weight) in corner_weights(frac).iter() {
            let i = base.0 as isize + di;
            let j = base.1 as isize + dj;
            let k = base.2 as isize + dk;
            if i < 0 || j < 0 || k < 0 || i >= nx as isize || j >= ny as isize || k >= nz as isize {
                continue;
            }
            let idx = i as usize + j as usize * nx + k as usize * nx * ny;
            total += self.values[idx] * *weight;
        }
        total
    }
}

fn sorted_unique<I: Iterator<Item = Float>>(values: I) -> Vec<Float> {
    let mut out: Vec<Float> = values.collect();
    out.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    out.dedup_by(|a, b| (*a - *b).abs() <= 1e-9 * (1.0 + b.abs()));
    out
}

fn axis_step(axis: &[Float]) -> Result<Float, String> {
    if axis.len() < 2 {
        return Ok(1.0); // degenerate axis, never indexed past node 0
    }
    let step = axis[1] - axis[0];
    for pair in axis.windows(2) {
        if ((pair[1] - pair[0]) - step).abs() > 1e-9 * (1.0 + step.abs()) {
            return Err("grid spacing is not uniform".to_string());
        }
    }
    Ok(step)
}

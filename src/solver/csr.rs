use crate::Float;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Square sparse matrix in compressed-row storage. Built once from
/// triplets, then kept for the whole run; the only structural mutation
/// supported is rewriting a row's values in place, which is all the
/// embedded-boundary treatment needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrMatrix {
    n: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<Float>,
}

impl CsrMatrix {
    /// Converts coordinate triplets to compressed rows. Triplets may
    /// arrive in any order; duplicates for the same entry are summed.
    pub fn from_triplets(n: usize, triplets: &[(usize, usize, Float)]) -> CsrMatrix {
        let mut rows: Vec<Vec<(usize, Float)>> = vec![Vec::new(); n];
        for &(r, c, v) in triplets {
            if !cfg!(feature = "unchecked") {
                assert!(r < n && c < n);
            }
            rows[r].push((c, v));
        }
        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for row in rows.iter_mut() {
            row.sort_by_key(|&(c, _)| c);
            let mut last_col = usize::MAX;
            for &(c, v) in row.iter() {
                if c == last_col {
                    let pos = values.len() - 1;
                    values[pos] += v;
                } else {
                    col_idx.push(c);
                    values.push(v);
                    last_col = c;
                }
            }
            row_ptr.push(col_idx.len());
        }
        CsrMatrix {
            n,
            row_ptr,
            col_idx,
            values,
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row(&self, r: usize) -> (&[usize], &[Float]) {
        let (start, end) = (self.row_ptr[r], self.row_ptr[r + 1]);
        (&self.col_idx[start..end], &self.values[start..end])
    }

    /// Rewrites a row's stored values so it reads as an identity row:
    /// 1 on the diagonal, 0 elsewhere. The stored sparsity pattern is
    /// untouched, so the assembly never needs to be redone.
    pub fn make_identity_row(&mut self, r: usize) {
        let (start, end) = (self.row_ptr[r], self.row_ptr[r + 1]);
        let mut saw_diagonal = false;
        for pos in start..end {
            if self.col_idx[pos] == r {
                self.values[pos] = 1.0;
                saw_diagonal = true;
            } else {
                self.values[pos] = 0.0;
            }
        }
        if !cfg!(feature = "unchecked") {
            assert!(saw_diagonal, "row {} has no stored diagonal entry", r);
        }
    }

    /// y = A x
    pub fn matvec(&self, x: &Array1<Float>, y: &mut Array1<Float>) {
        if !cfg!(feature = "unchecked") {
            assert_eq!(x.len(), self.n);
            assert_eq!(y.len(), self.n);
        }
        for r in 0..self.n {
            let mut acc = 0.0;
            for pos in self.row_ptr[r]..self.row_ptr[r + 1] {
                acc += self.values[pos] * x[self.col_idx[pos]];
            }
            y[r] = acc;
        }
    }
}

pub struct CgOutcome {
    pub converged: bool,
    pub iterations: usize,
    pub residual_norm: Float,
}

/// Plain conjugate gradient on a symmetric system, warm-started from
/// whatever `x` holds on entry. Runs until the residual norm drops
/// below `tolerance` relative to the right-hand side, or `max_iter`
/// iterations have passed; either way `x` holds the best iterate.
pub fn conjugate_gradient(
    a: &CsrMatrix,
    b: &Array1<Float>,
    x: &mut Array1<Float>,
    max_iter: usize,
    tolerance: Float,
) -> CgOutcome {
    let n = a.n();
    let mut ax = Array1::zeros(n);
    a.matvec(x, &mut ax);
    let mut r: Array1<Float> = b - &ax;
    let mut p = r.clone();
    let mut rs_old = r.dot(&r);

    let b_norm = b.dot(b).sqrt();
    let threshold = if b_norm > 0.0 {
        tolerance * b_norm
    } else {
        tolerance
    };

    if rs_old.sqrt() <= threshold {
        return CgOutcome {
            converged: true,
            iterations: 0,
            residual_norm: rs_old.sqrt(),
        };
    }

    let mut ap = Array1::zeros(n);
    for iter in 1..=max_iter {
        a.matvec(&p, &mut ap);
        let denom = p.dot(&ap);
        if denom == 0.0 {
            // Breakdown: the search direction carries no curvature.
            return CgOutcome {
                converged: false,
                iterations: iter,
                residual_norm: rs_old.sqrt(),
            };
        }
        let alpha = rs_old / denom;
        x.scaled_add(alpha, &p);
        r.scaled_add(-alpha, &ap);
        let rs_new = r.dot(&r);
        if rs_new.sqrt() <= threshold {
            return CgOutcome {
                converged: true,
                iterations: iter,
                residual_norm: rs_new.sqrt(),
            };
        }
        let beta = rs_new / rs_old;
        p = &r + &(p * beta);
        rs_old = rs_new;
    }

    CgOutcome {
        converged: false,
        iterations: max_iter,
        residual_norm: rs_old.sqrt(),
    }
}

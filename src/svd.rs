
// imports
use crate::error::{SpaceError, SpaceResult};
use crate::sparse::{SparseMatrix, SparseRows};

use ndarray::{Array1, Array2, Axis};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use ndarray_stats::QuantileExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;


/// Truncated factorization `A ≈ U · diag(sigma) · Vᵗ` with singular values in
/// descending order.
#[derive(Clone, Debug)]
pub struct SvdFactors {
    pub u: Array2<f64>,
    pub sigma: Array1<f64>,
    pub vt: Array2<f64>,
}

impl SvdFactors {
    pub fn rank(&self) -> usize {
        self.sigma.len()
    }

    /// `U · diag(sigma)`.
    pub fn scaled_u(&self) -> Array2<f64> {
        &self.u * &self.sigma.view().insert_axis(Axis(0))
    }
}


/// Anything able to produce a rank-`k` factorization of a sparse matrix.
pub trait SvdSolver: Send + Sync {
    fn factorize(&self, matrix: &SparseMatrix, k: usize) -> SpaceResult<SvdFactors>;
}


/// Randomized subspace iteration. The row space is approximated by an orthonormal
/// block of `k + oversample` columns, refined with `iterations` passes of `AᵗA`,
/// and the small projected problem is solved with Jacobi rotations. With a block as
/// wide as the matrix the result is exact up to rounding.
#[derive(Clone, Debug)]
pub struct SubspaceIteration {
    pub iterations: usize,
    pub oversample: usize,
    pub seed: u64,
}

impl Default for SubspaceIteration {
    fn default() -> Self {
        SubspaceIteration { iterations: 4, oversample: 10, seed: 42 }
    }
}

impl SvdSolver for SubspaceIteration {

    fn factorize(&self, matrix: &SparseMatrix, k: usize) -> SpaceResult<SvdFactors> {

        let (n, m) = (matrix.rows(), matrix.columns());
        if k == 0 {
            return Err(SpaceError::config("the reduced rank must be at least 1"))
        }
        if k > m {
            return Err(SpaceError::config(format!("cannot reduce to {} dimensions, the matrix has only {} columns", k, m)))
        }
        if k > n {
            return Err(SpaceError::config(format!("cannot reduce to {} dimensions, the matrix has only {} rows", k, n)))
        }
        let width = (k + self.oversample).min(m);
        debug!("subspace iteration on {}x{} with block width {}", n, m, width);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut q = orthonormalize(Array2::random_using((m, width), Uniform::new(-0.5, 0.5), &mut rng));
        for _ in 0..self.iterations {
            let y = matrix.dot_dense(&q)?;
            q = orthonormalize(matrix.t_dot_dense(&y)?);
        }

        let b = matrix.dot_dense(&q)?;
        let gram = b.t().dot(&b);
        let (values, vectors) = symmetric_eigen(gram)?;

        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|x, y| values[*y].partial_cmp(&values[*x]).unwrap_or(std::cmp::Ordering::Equal));
        order.truncate(k);

        let sigma: Array1<f64> = order.iter().map(|i| values[*i].max(0.0).sqrt()).collect();
        let largest = sigma.get(0).copied().unwrap_or(0.0);
        let cutoff = largest * f64::EPSILON * n.max(m) as f64;

        let mut u = Array2::zeros((n, k));
        let mut v = Array2::zeros((m, k));
        for (c, i) in order.iter().enumerate() {
            if sigma[c] <= cutoff {
                return Err(SpaceError::solver(format!(
                    "singular value {} is zero, the matrix has rank below {}", c, k)))
            }
            let w = vectors.column(*i);
            v.column_mut(c).assign(&q.dot(&w));
            u.column_mut(c).assign(&(b.dot(&w) / sigma[c]));
        }

        Ok(SvdFactors { u, sigma, vt: v.reversed_axes() })
    }
}


/// Modified Gram-Schmidt over the columns. Columns that vanish against the earlier
/// ones are zeroed.
pub fn orthonormalize(mut z: Array2<f64>) -> Array2<f64> {
    for j in 0..z.ncols() {
        let original = z.column(j).dot(&z.column(j)).sqrt();
        for i in 0..j {
            let qi = z.column(i).to_owned();
            let dot = qi.dot(&z.column(j));
            z.column_mut(j).scaled_add(-dot, &qi);
        }
        let norm = z.column(j).dot(&z.column(j)).sqrt();
        if norm > 1e-10 * original && norm > 0.0 {
            z.column_mut(j).mapv_inplace(|x| x / norm);
        } else {
            z.column_mut(j).fill(0.0);
        }
    }
    z
}

/// Cyclic Jacobi eigen decomposition of a symmetric matrix. Returns the eigenvalues
/// and the eigenvectors as columns, unsorted.
pub fn symmetric_eigen(mut a: Array2<f64>) -> SpaceResult<(Array1<f64>, Array2<f64>)> {

    let n = a.nrows();
    let mut v: Array2<f64> = Array2::eye(n);
    if n < 2 {
        return Ok((a.diag().to_owned(), v))
    }

    for _sweep in 0..64 {

        let mut off = a.mapv(f64::abs);
        off.diag_mut().fill(0.0);
        let (p, q) = off.argmax().map_err(|e| SpaceError::solver(format!("eigen solver: {}", e)))?;
        let scale = a.diag().iter().fold(0.0f64, |acc, x| acc.max(x.abs()));
        if off[[p, q]] <= 1e-14 * scale || off[[p, q]] == 0.0 {
            return Ok((a.diag().to_owned(), v))
        }

        for p in 0..n {
            for q in p + 1..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let (akp, akq) = (a[[k, p]], a[[k, q]]);
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[[p, k]], a[[q, k]]);
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let (vkp, vkq) = (v[[k, p]], v[[k, q]]);
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }
    Err(SpaceError::solver("eigen solver did not converge"))
}


// imports
use crate::error::{SpaceError, SpaceResult};
use crate::sparse::{SparseRows, SparseVector};
use crate::svd::SvdFactors;

use std::sync::Arc;
use ndarray::{Array1, Array2, Axis};
use parking_lot::RwLock;
use rayon::prelude::*;
use tracing::debug;


/// Maps held-out rows into the latent space of a factorization with `p = Σ⁻¹·Vᵗ·t`.
///
/// `Σ⁻¹·Vᵗ` is built on first use and kept. Dropping it with `invalidate` only costs
/// a recomputation on the next projection.
#[derive(Debug)]
pub struct Projector {
    factors: SvdFactors,
    scaled: bool,
    basis: RwLock<Option<Arc<Array2<f64>>>>,
}

impl Projector {

    /// With `scaled` the word space is `U·Σ` and projections are scaled by `Σ` to match.
    pub fn new(factors: SvdFactors, scaled: bool) -> SpaceResult<Projector> {
        if let Some(i) = factors.sigma.iter().position(|s| *s == 0.0 || !s.is_finite()) {
            return Err(SpaceError::solver(format!("singular value {} is {}, it can not be inverted", i, factors.sigma[i])))
        }
        if factors.u.ncols() != factors.sigma.len() || factors.vt.nrows() != factors.sigma.len() {
            return Err(SpaceError::invalid_state(format!(
                "factor shapes disagree: U has {} columns, Σ {} values, Vᵗ {} rows",
                factors.u.ncols(), factors.sigma.len(), factors.vt.nrows())))
        }
        Ok(Projector { factors, scaled, basis: RwLock::new(None) })
    }

    pub fn factors(&self) -> &SvdFactors {
        &self.factors
    }

    pub fn rank(&self) -> usize {
        self.factors.rank()
    }

    pub fn features(&self) -> usize {
        self.factors.vt.ncols()
    }

    /// Latent rows of the factorized words, `U` or `U·Σ`.
    pub fn word_space(&self) -> Array2<f64> {
        if self.scaled { self.factors.scaled_u() } else { self.factors.u.clone() }
    }

    /// One latent row per factorized column (document), `(Σ·Vᵗ)ᵗ`.
    pub fn column_space(&self) -> Array2<f64> {
        (&self.factors.vt * &self.factors.sigma.view().insert_axis(Axis(1))).reversed_axes()
    }

    fn basis(&self) -> Arc<Array2<f64>> {
        if let Some(basis) = self.basis.read().as_ref() {
            return Arc::clone(basis)
        }
        let mut slot = self.basis.write();
        // another thread may have filled it while we waited for the write lock
        if let Some(basis) = slot.as_ref() {
            return Arc::clone(basis)
        }
        debug!("computing inverse basis of rank {}", self.rank());
        let basis = Arc::new(&self.factors.vt / &self.factors.sigma.view().insert_axis(Axis(1)));
        *slot = Some(Arc::clone(&basis));
        basis
    }

    pub fn is_cached(&self) -> bool {
        self.basis.read().is_some()
    }

    pub fn invalidate(&self) {
        *self.basis.write() = None;
    }

    /// Projects one transformed row living in the factorized feature space.
    pub fn project(&self, row: &SparseVector) -> SpaceResult<Array1<f64>> {

        let basis = self.basis();
        if let Some(max) = row.max_index() {
            if max >= basis.ncols() {
                return Err(SpaceError::invalid_state(format!(
                    "row has feature {} but the factorization covers {} features", max, basis.ncols())))
            }
        }
        let mut projected = Array1::zeros(basis.nrows());
        for (j, v) in row.iter() {
            projected.scaled_add(v, &basis.column(j));
        }
        if self.scaled {
            projected *= &self.factors.sigma;
        }
        Ok(projected)
    }

    /// Projects every row in parallel, one latent row each.
    pub fn project_rows<M: SparseRows>(&self, rows: &M) -> SpaceResult<Array2<f64>> {

        if rows.columns() != self.features() {
            return Err(SpaceError::invalid_state(format!(
                "rows have {} features but the factorization covers {}", rows.columns(), self.features())))
        }
        let projected: Vec<Array1<f64>> = (0..rows.rows())
            .into_par_iter()
            .map(|i| self.project(&rows.row(i)))
            .collect::<SpaceResult<Vec<Array1<f64>>>>()?;

        let mut out = Array2::zeros((projected.len(), self.rank()));
        for (i, p) in projected.iter().enumerate() {
            out.row_mut(i).assign(p);
        }
        Ok(out)
    }
}


#[cfg(test)]
mod tests {

    use ndarray::{array, Array1, Array2};
    use crate::error::SpaceError;
    use crate::sparse::{SparseMatrix, SparseRows, SparseVector};
    use crate::svd::{SubspaceIteration, SvdFactors, SvdSolver};
    use super::Projector;

    fn words() -> Array2<f64> {
        array![[3.0, 1.0, 0.0, 2.0], [1.0, 0.0, 4.0, 0.0], [0.0, 2.0, 1.0, 1.0], [5.0, 0.0, 0.0, 1.0], [0.0, 1.0, 1.0, 0.0]]
    }

    fn factorize(k: usize) -> SvdFactors {
        let solver = SubspaceIteration { iterations: 1, oversample: 100, seed: 3 };
        solver.factorize(&SparseMatrix::from_dense(&words()), k).unwrap()
    }

    fn close(a: &Array1<f64>, b: &Array1<f64>) -> bool {
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-8)
    }

    #[test]
    fn a_copy_of_a_word_projects_onto_that_word() {
        let matrix = SparseMatrix::from_dense(&words());
        for scaled in [false, true] {
            let projector = Projector::new(factorize(2), scaled).unwrap();
            let space = projector.word_space();
            for i in 0..matrix.rows() {
                let p = projector.project(&matrix.row(i)).unwrap();
                assert!(close(&p, &space.row(i).to_owned()), "row {} scaled {}", i, scaled);
            }
        }
    }

    #[test]
    fn projecting_all_rows_at_once() {
        let matrix = SparseMatrix::from_dense(&words());
        let projector = Projector::new(factorize(3), false).unwrap();
        let projected = projector.project_rows(&matrix).unwrap();
        assert_eq!(projected.shape(), &[5, 3]);
        for i in 0..5 {
            assert!(close(&projected.row(i).to_owned(), &projector.word_space().row(i).to_owned()));
        }
    }

    #[test]
    fn cache_is_rebuilt_after_invalidation() {
        let projector = Projector::new(factorize(2), false).unwrap();
        assert!(!projector.is_cached());
        let row = SparseVector::from_pairs(vec![(0, 1.0), (2, 2.0)]);
        let first = projector.project(&row).unwrap();
        assert!(projector.is_cached());
        projector.invalidate();
        assert!(!projector.is_cached());
        let second = projector.project(&row).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_singular_value_is_fatal() {
        let factors = SvdFactors {
            u: Array2::eye(2),
            sigma: array![2.0, 0.0],
            vt: Array2::eye(2),
        };
        assert!(matches!(Projector::new(factors, false), Err(SpaceError::Solver(_))));
    }

    #[test]
    fn rows_outside_the_feature_space_are_rejected() {
        let projector = Projector::new(factorize(2), false).unwrap();
        let row = SparseVector::from_pairs(vec![(7, 1.0)]);
        assert!(matches!(projector.project(&row), Err(SpaceError::InvalidState(_))));
    }

    #[test]
    fn column_space_rows_are_scaled_right_vectors() {
        let projector = Projector::new(factorize(2), false).unwrap();
        let columns = projector.column_space();
        let factors = projector.factors();
        assert_eq!(columns.shape(), &[4, 2]);
        assert!((columns[[1, 0]] - factors.sigma[0] * factors.vt[[0, 1]]).abs() < 1e-12);
    }
}

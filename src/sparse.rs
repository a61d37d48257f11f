
// imports
use crate::error::{SpaceError, SpaceResult};

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use ndarray::{Array1, Array2, ArrayView1, Axis};


/// Sparse row of real values, stored as `(index, value)` pairs sorted by index.
/// Explicit zeros are never stored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseVector {
    entries: Vec<(usize, f64)>,
}

impl SparseVector {

    /// Builds a vector from unordered pairs, summing repeated indices.
    pub fn from_pairs<I: IntoIterator<Item = (usize, f64)>>(pairs: I) -> SparseVector {
        let mut entries: Vec<(usize, f64)> = pairs.into_iter().collect();
        entries.sort_by_key(|(i, _)| *i);

        let mut merged: Vec<(usize, f64)> = Vec::with_capacity(entries.len());
        for (i, v) in entries {
            match merged.last_mut() {
                Some((last, acc)) if *last == i => *acc += v,
                _ => merged.push((i, v)),
            }
        }
        merged.retain(|(_, v)| *v != 0.0);
        SparseVector { entries: merged }
    }

    pub fn from_map(map: HashMap<usize, f64>) -> SparseVector {
        SparseVector::from_pairs(map)
    }

    pub fn from_dense(values: ArrayView1<f64>) -> SparseVector {
        SparseVector {
            entries: values.iter().enumerate().filter(|(_, v)| **v != 0.0).map(|(i, v)| (i, *v)).collect()
        }
    }

    pub fn get(&self, index: usize) -> f64 {
        match self.entries.binary_search_by_key(&index, |(i, _)| *i) {
            Ok(pos) => self.entries[pos].1,
            Err(_) => 0.0,
        }
    }

    /// Element-wise `self += other` as a single linear merge.
    pub fn add_assign(&mut self, other: &SparseVector) {
        if other.entries.is_empty() {
            return
        }
        let mut merged: Vec<(usize, f64)> = Vec::with_capacity(self.entries.len() + other.entries.len());
        let (mut a, mut b) = (self.entries.iter().peekable(), other.entries.iter().peekable());
        loop {
            match (a.peek(), b.peek()) {
                (Some(&&(i, x)), Some(&&(j, y))) => {
                    if i == j {
                        if x + y != 0.0 { merged.push((i, x + y)); }
                        a.next();
                        b.next();
                    } else if i < j {
                        merged.push((i, x));
                        a.next();
                    } else {
                        merged.push((j, y));
                        b.next();
                    }
                },
                (Some(&&e), None) => { merged.push(e); a.next(); },
                (None, Some(&&e)) => { merged.push(e); b.next(); },
                (None, None) => break,
            }
        }
        self.entries = merged;
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn sum(&self) -> f64 {
        self.entries.iter().map(|(_, v)| v).sum()
    }

    pub fn max_index(&self) -> Option<usize> {
        self.entries.last().map(|(i, _)| *i)
    }

    /// Applies `f(index, value)` to every stored value, dropping results that are zero.
    pub fn map_values<F: Fn(usize, f64) -> f64>(&self, f: F) -> SparseVector {
        SparseVector {
            entries: self.entries.iter().map(|(i, v)| (*i, f(*i, *v))).filter(|(_, v)| *v != 0.0).collect()
        }
    }

    /// Re-indexes through `lookup` (old index to new index), dropping unmapped entries.
    pub fn remap(&self, lookup: &[Option<usize>]) -> SparseVector {
        SparseVector::from_pairs(self.entries.iter().filter_map(|(i, v)| {
            lookup.get(*i).copied().flatten().map(|j| (j, *v))
        }))
    }

    /// Concatenates `other` after the first `offset` positions.
    pub fn concat(&self, other: &SparseVector, offset: usize) -> SparseVector {
        let mut entries = self.entries.clone();
        entries.extend(other.entries.iter().map(|(i, v)| (i + offset, *v)));
        SparseVector::from_pairs(entries)
    }

    pub fn to_dense(&self, length: usize) -> Array1<f64> {
        let mut dense = Array1::zeros(length);
        for (i, v) in self.entries.iter() {
            if *i < length {
                dense[*i] = *v;
            }
        }
        dense
    }
}


/// Read access shared by the plain and the masked matrix.
pub trait SparseRows: Sync {
    fn rows(&self) -> usize;
    fn columns(&self) -> usize;
    fn row(&self, index: usize) -> Cow<'_, SparseVector>;

    fn get(&self, row: usize, column: usize) -> f64 {
        self.row(row).get(column)
    }
}


/// Row-major sparse matrix.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseMatrix {
    rows: Vec<SparseVector>,
    columns: usize,
}

impl SparseMatrix {

    /// Column count grows to cover the largest stored index if needed.
    pub fn from_rows(rows: Vec<SparseVector>, columns: usize) -> SparseMatrix {
        let needed = rows.iter().filter_map(|r| r.max_index()).max().map_or(0, |m| m + 1);
        SparseMatrix { rows, columns: columns.max(needed) }
    }

    pub fn from_dense(dense: &Array2<f64>) -> SparseMatrix {
        let rows = dense.axis_iter(Axis(0)).map(SparseVector::from_dense).collect();
        SparseMatrix { rows, columns: dense.ncols() }
    }

    pub fn row_vector(&self, index: usize) -> &SparseVector {
        &self.rows[index]
    }

    /// `A · X` for a dense `X` of shape (columns, k).
    pub fn dot_dense(&self, x: &Array2<f64>) -> SpaceResult<Array2<f64>> {
        if x.nrows() != self.columns {
            return Err(SpaceError::invalid_state(format!(
                "cannot multiply a matrix with {} columns by {} rows", self.columns, x.nrows())))
        }
        let mut out = Array2::zeros((self.rows.len(), x.ncols()));
        for (i, row) in self.rows.iter().enumerate() {
            let mut target = out.row_mut(i);
            for (j, v) in row.iter() {
                target.scaled_add(v, &x.row(j));
            }
        }
        Ok(out)
    }

    /// `Aᵗ · Y` for a dense `Y` of shape (rows, k).
    pub fn t_dot_dense(&self, y: &Array2<f64>) -> SpaceResult<Array2<f64>> {
        if y.nrows() != self.rows.len() {
            return Err(SpaceError::invalid_state(format!(
                "cannot multiply a transposed matrix with {} rows by {} rows", self.rows.len(), y.nrows())))
        }
        let mut out = Array2::zeros((self.columns, y.ncols()));
        for (i, row) in self.rows.iter().enumerate() {
            let source = y.row(i);
            for (j, v) in row.iter() {
                out.row_mut(j).scaled_add(v, &source);
            }
        }
        Ok(out)
    }
}

impl SparseRows for SparseMatrix {
    fn rows(&self) -> usize {
        self.rows.len()
    }

    fn columns(&self) -> usize {
        self.columns
    }

    fn row(&self, index: usize) -> Cow<'_, SparseVector> {
        Cow::Borrowed(&self.rows[index])
    }
}


/// A view exposing only selected rows and columns of a shared matrix, re-indexed
/// compactly. Values are not copied until a row is read.
#[derive(Clone, Debug)]
pub struct MaskedMatrix {
    base: Arc<SparseMatrix>,
    row_mask: Vec<usize>,
    col_mask: Vec<usize>,
    col_lookup: Vec<Option<usize>>,
}

impl MaskedMatrix {

    /// `row_mask[new] = old` and `col_mask[new] = old`.
    pub fn new(base: Arc<SparseMatrix>, row_mask: Vec<usize>, col_mask: Vec<usize>) -> SpaceResult<MaskedMatrix> {

        if let Some(bad) = row_mask.iter().find(|r| **r >= base.rows.len()) {
            return Err(SpaceError::invalid_state(format!("row mask index {} out of {} rows", bad, base.rows.len())))
        }
        let mut col_lookup = vec![None; base.columns];
        for (new, old) in col_mask.iter().enumerate() {
            match col_lookup.get_mut(*old) {
                Some(slot) => *slot = Some(new),
                None => return Err(SpaceError::invalid_state(format!(
                    "column mask index {} out of {} columns", old, base.columns))),
            }
        }
        Ok(MaskedMatrix { base, row_mask, col_mask, col_lookup })
    }

    /// Keeps every row and masks only the columns.
    pub fn columns_only(base: Arc<SparseMatrix>, col_mask: Vec<usize>) -> SpaceResult<MaskedMatrix> {
        let all_rows = (0..base.rows.len()).collect();
        MaskedMatrix::new(base, all_rows, col_mask)
    }

    /// The same columns over every row of the shared matrix.
    pub fn with_all_rows(&self) -> SpaceResult<MaskedMatrix> {
        MaskedMatrix::columns_only(Arc::clone(&self.base), self.col_mask.clone())
    }

    pub fn row_mask(&self) -> &[usize] {
        &self.row_mask
    }

    pub fn col_mask(&self) -> &[usize] {
        &self.col_mask
    }

    /// Narrows the view to `keep`, given in this view's column indices.
    pub fn select_columns(&self, keep: &[usize]) -> SpaceResult<MaskedMatrix> {
        let mut col_mask = Vec::with_capacity(keep.len());
        for k in keep {
            match self.col_mask.get(*k) {
                Some(old) => col_mask.push(*old),
                None => return Err(SpaceError::invalid_state(format!(
                    "column {} out of {} masked columns", k, self.col_mask.len()))),
            }
        }
        MaskedMatrix::new(Arc::clone(&self.base), self.row_mask.clone(), col_mask)
    }
}

impl SparseRows for MaskedMatrix {
    fn rows(&self) -> usize {
        self.row_mask.len()
    }

    fn columns(&self) -> usize {
        self.col_mask.len()
    }

    fn row(&self, index: usize) -> Cow<'_, SparseVector> {
        Cow::Owned(self.base.rows[self.row_mask[index]].remap(&self.col_lookup))
    }
}


#[cfg(test)]
mod tests {

    use std::sync::Arc;
    use ndarray::array;
    use super::{MaskedMatrix, SparseMatrix, SparseRows, SparseVector};

    fn v(pairs: &[(usize, f64)]) -> SparseVector {
        SparseVector::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn from_pairs_merges_and_drops_zeros() {
        let vec = v(&[(3, 1.0), (1, 2.0), (3, 2.0), (5, 0.0)]);
        assert_eq!(vec.iter().collect::<Vec<_>>(), vec![(1, 2.0), (3, 3.0)]);
    }

    #[test]
    fn add_assign_merges_sorted() {
        let mut a = v(&[(0, 1.0), (4, 1.0)]);
        a.add_assign(&v(&[(2, 3.0), (4, -1.0), (9, 0.5)]));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![(0, 1.0), (2, 3.0), (9, 0.5)]);
    }

    #[test]
    fn masked_view_reindexes() {
        let base = Arc::new(SparseMatrix::from_rows(vec![
            v(&[(0, 1.0), (1, 2.0), (2, 3.0)]),
            v(&[(2, 4.0)]),
            v(&[(0, 5.0)]),
        ], 3));
        // keep rows 2 and 0, columns 2 and 0 in that order
        let masked = MaskedMatrix::new(Arc::clone(&base), vec![2, 0], vec![2, 0]).unwrap();
        assert_eq!(masked.rows(), 2);
        assert_eq!(masked.columns(), 2);
        assert_eq!(masked.row(0).iter().collect::<Vec<_>>(), vec![(1, 5.0)]);
        assert_eq!(masked.row(1).iter().collect::<Vec<_>>(), vec![(0, 3.0), (1, 1.0)]);
        assert_eq!(masked.get(1, 0), 3.0);
        assert_eq!(masked.get(0, 0), 0.0);

        let unmasked = masked.with_all_rows().unwrap();
        assert_eq!(unmasked.rows(), 3);
        assert_eq!(unmasked.row(1).iter().collect::<Vec<_>>(), vec![(0, 4.0)]);

        assert!(MaskedMatrix::new(base, vec![3], vec![0]).is_err());
    }

    #[test]
    fn dense_products() {
        let dense = array![[1.0, 0.0, 2.0], [0.0, 3.0, 0.0]];
        let sparse = SparseMatrix::from_dense(&dense);
        let x = array![[1.0], [1.0], [1.0]];
        assert_eq!(sparse.dot_dense(&x).unwrap(), dense.dot(&x));
        let y = array![[1.0, 2.0], [3.0, 4.0]];
        assert_eq!(sparse.t_dot_dense(&y).unwrap(), dense.t().dot(&y));
        assert!(sparse.dot_dense(&y).is_err());
    }
}

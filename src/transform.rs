
// imports
use crate::sparse::{SparseMatrix, SparseRows, SparseVector};

use std::fmt;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};


/// Reweighting applied to raw counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Correlation,
    LogTfIdf,
    #[serde(rename = "none")]
    Identity,
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransformKind::Correlation => "CORR",
            TransformKind::LogTfIdf => "LOG_TF_IDF",
            TransformKind::Identity => "NONE",
        };
        write!(f, "{}", name)
    }
}


/// A transform fitted once on a matrix. The statistics are never refreshed, so
/// rows transformed later (compounds) are scored against the same snapshot as
/// the matrix itself. It serializes with the rest of the saved statistics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Correlation {
        row_sums: Vec<f64>,
        col_sums: Vec<f64>,
        total: f64,
    },
    LogTfIdf {
        doc_freq: Vec<usize>,
        total_docs: f64,
    },
    Identity,
}

impl Transform {

    pub fn fit<M: SparseRows>(kind: TransformKind, matrix: &M) -> Transform {
        match kind {
            TransformKind::Correlation => {
                let mut row_sums = Vec::with_capacity(matrix.rows());
                let mut col_sums = vec![0.0; matrix.columns()];
                for i in 0..matrix.rows() {
                    let row = matrix.row(i);
                    let mut sum = 0.0;
                    for (j, v) in row.iter() {
                        sum += v;
                        col_sums[j] += v;
                    }
                    row_sums.push(sum);
                }
                let total = row_sums.iter().sum();
                Transform::Correlation { row_sums, col_sums, total }
            },
            TransformKind::LogTfIdf => {
                let doc_freq = (0..matrix.rows()).map(|i| matrix.row(i).nnz()).collect();
                Transform::LogTfIdf { doc_freq, total_docs: matrix.columns() as f64 }
            },
            TransformKind::Identity => Transform::Identity,
        }
    }

    pub fn kind(&self) -> TransformKind {
        match self {
            Transform::Correlation { .. } => TransformKind::Correlation,
            Transform::LogTfIdf { .. } => TransformKind::LogTfIdf,
            Transform::Identity => TransformKind::Identity,
        }
    }

    /// Transformed value of one cell of the fitted matrix.
    pub fn transform_cell(&self, row: usize, col: usize, value: f64) -> f64 {
        match self {
            Transform::Correlation { row_sums, col_sums, total } => {
                correlation(value, row_sums[row], col_sums[col], *total)
            },
            Transform::LogTfIdf { doc_freq, total_docs } => log_tf_idf(value, doc_freq[row], *total_docs),
            Transform::Identity => value,
        }
    }

    /// Transforms a row against the fitted statistics. Row-level quantities (the row
    /// sum, the number of non-zero cells) come from the row itself, which for a row
    /// of the fitted matrix equals the stored statistic.
    pub fn transform_row(&self, row: &SparseVector) -> SparseVector {
        match self {
            Transform::Correlation { col_sums, total, .. } => {
                let r = row.sum();
                row.map_values(|j, v| correlation(v, r, col_sums.get(j).copied().unwrap_or(0.0), *total))
            },
            Transform::LogTfIdf { total_docs, .. } => {
                let df = row.nnz();
                row.map_values(|_, v| log_tf_idf(v, df, *total_docs))
            },
            Transform::Identity => row.clone(),
        }
    }

    /// Transforms row `index` of the fitted matrix with its stored row statistic.
    /// An index past the fitted rows is treated as a held-out row.
    pub fn transform_fitted_row(&self, index: usize, row: &SparseVector) -> SparseVector {
        match self {
            Transform::Correlation { row_sums, col_sums, total } => match row_sums.get(index) {
                Some(r) => row.map_values(|j, v| correlation(v, *r, col_sums.get(j).copied().unwrap_or(0.0), *total)),
                None => self.transform_row(row),
            },
            Transform::LogTfIdf { doc_freq, total_docs } => match doc_freq.get(index) {
                Some(df) => row.map_values(|_, v| log_tf_idf(v, *df, *total_docs)),
                None => self.transform_row(row),
            },
            Transform::Identity => row.clone(),
        }
    }

    /// Transforms the rows the statistics were fitted on (or laid out against) in
    /// parallel.
    pub fn transform<M: SparseRows>(&self, matrix: &M) -> SparseMatrix {
        let rows: Vec<SparseVector> = (0..matrix.rows())
            .into_par_iter()
            .map(|i| self.transform_fitted_row(i, &matrix.row(i)))
            .collect();
        SparseMatrix::from_rows(rows, matrix.columns())
    }

    /// Transforms rows that took no part in the fit, such as compounds, in parallel.
    pub fn transform_held_out<M: SparseRows>(&self, matrix: &M) -> SparseMatrix {
        let rows: Vec<SparseVector> = (0..matrix.rows())
            .into_par_iter()
            .map(|i| self.transform_row(&matrix.row(i)))
            .collect();
        SparseMatrix::from_rows(rows, matrix.columns())
    }
}


/// `sqrt(z)` of the positive part of the row/column correlation
/// `z = (T·v - r·c) / sqrt(r·(T-r)·c·(T-c))`.
pub fn correlation(value: f64, row_sum: f64, col_sum: f64, total: f64) -> f64 {
    if value == 0.0 {
        return 0.0
    }
    let denominator = (row_sum * (total - row_sum) * col_sum * (total - col_sum)).sqrt();
    // a row or column carrying all the mass has no defined correlation
    if !denominator.is_finite() || denominator <= 0.0 {
        return 0.0
    }
    let z = (total * value - row_sum * col_sum) / denominator;
    if z > 0.0 { z.sqrt() } else { 0.0 }
}

/// `ln(v + 1) · ln(docs / (df + 1))`.
pub fn log_tf_idf(value: f64, doc_freq: usize, total_docs: f64) -> f64 {
    if value == 0.0 {
        return 0.0
    }
    (value + 1.0).ln() * (total_docs / (doc_freq as f64 + 1.0)).ln()
}

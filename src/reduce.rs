
// imports
use crate::cooccurrence::{AccumulatedCounts, ContextModel, TermContext};
use crate::error::{SpaceError, SpaceResult};
use crate::sparse::{MaskedMatrix, SparseMatrix, SparseRows, SparseVector};
use crate::vocabulary::Vocabulary;

use std::cmp::Ordering;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};


/// Which feature columns survive the entropy cut of the directional model.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum ColumnRetention {
    #[default]
    All,
    /// the `n` columns with the highest entropy
    Top(usize),
    /// every column whose entropy reaches the threshold
    Threshold(f64),
}


/// What a feature column counts. Document columns carry no label.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Word(String),
    Preceding(String),
    Following(String),
}


/// Word and compound rows over one shared feature space.
#[derive(Debug)]
pub struct TermMatrices {
    /// row `i` of `word_rows` belongs to the term with index `i`
    pub words: Vocabulary,
    pub compounds: Vocabulary,
    pub word_rows: MaskedMatrix,
    pub compound_rows: MaskedMatrix,
    /// one label per column, empty for document columns
    pub labels: Vec<Feature>,
    pub documents: usize,
}

impl TermMatrices {
    pub fn features(&self) -> usize {
        self.word_rows.columns()
    }
}


// the first `limit` entries of `order`, 0 meaning no limit
fn cap(order: &[usize], limit: usize) -> Vec<usize> {
    if limit == 0 || limit >= order.len() {
        order.to_vec()
    } else {
        order[..limit].to_vec()
    }
}

fn context_rows(contexts: &[TermContext], model: ContextModel, words: usize) -> Vec<SparseVector> {
    match model {
        ContextModel::Directional { .. } => contexts.iter().map(|c| c.preceding.concat(&c.following, words)).collect(),
        _ => contexts.iter().map(|c| c.combined()).collect(),
    }
}

// label of base column `column` for a vocabulary listed by index
fn label(model: ContextModel, names: &[String], column: usize) -> Option<Feature> {
    match model {
        ContextModel::Symmetric { .. } => names.get(column).cloned().map(Feature::Word),
        ContextModel::Directional { .. } if column < names.len() => Some(Feature::Preceding(names[column].clone())),
        ContextModel::Directional { .. } => names.get(column - names.len()).cloned().map(Feature::Following),
        ContextModel::Document => None,
    }
}

// base column of `feature` in the current vocabulary, if the word was seen
fn base_column(feature: &Feature, words: &Vocabulary) -> Option<usize> {
    match feature {
        Feature::Word(w) | Feature::Preceding(w) => words.index_of(w),
        Feature::Following(w) => words.index_of(w).map(|i| i + words.len()),
    }
}

fn base_columns(model: ContextModel, vocab_size: usize, documents: usize) -> usize {
    match model {
        ContextModel::Symmetric { .. } => vocab_size,
        ContextModel::Directional { .. } => 2 * vocab_size,
        ContextModel::Document => documents,
    }
}


/// Turns the accumulated counts into the reduced word matrix and the compound matrix.
///
/// Words are ranked by frequency (ties by descending word) and the top `max_words`
/// become the rows, renumbered in rank order. Every other word stops being
/// addressable. When the features are context words, the top `max_dimensions` of the
/// same ranking become the columns. Compounds keep all their rows and share the
/// column mask. A limit of 0 keeps everything.
pub fn build_matrix(counts: AccumulatedCounts, max_words: usize, max_dimensions: usize) -> SpaceResult<TermMatrices> {

    let AccumulatedCounts { model, words, compounds, frequencies, word_contexts, compound_contexts, documents } = counts;

    let names = words.terms_by_index();
    let vocab_size = names.len();
    let ranked: Vec<usize> = frequencies
        .ranked()
        .into_iter()
        .filter_map(|(word, _)| words.index_of(&word))
        .collect();
    let row_mask = cap(&ranked, max_words);

    let columns = base_columns(model, vocab_size, documents);
    let col_mask: Vec<usize> = match model {
        ContextModel::Symmetric { .. } => cap(&ranked, max_dimensions),
        _ => (0..columns).collect(),
    };
    let labels = col_mask.iter().filter_map(|c| label(model, &names, *c)).collect();

    let retained = Vocabulary::from_ordered(row_mask.iter().map(|old| names[*old].clone()));

    let word_base = SparseMatrix::from_rows(context_rows(&word_contexts, model, vocab_size), columns);
    let compound_base = SparseMatrix::from_rows(context_rows(&compound_contexts, model, vocab_size), columns);
    drop(word_contexts);
    drop(compound_contexts);

    debug!("kept {} of {} words as rows and {} of {} columns, {} compounds",
        row_mask.len(), vocab_size, col_mask.len(), columns, compound_base.rows());

    let compound_rows = MaskedMatrix::columns_only(Arc::new(compound_base), col_mask.clone())?;
    let word_rows = MaskedMatrix::new(Arc::new(word_base), row_mask, col_mask)?;

    Ok(TermMatrices {
        words: retained,
        compounds,
        word_rows,
        compound_rows,
        labels,
        documents,
    })
}


/// Lays the counts out against a saved layout instead of ranking them: row `i` is
/// `words[i]` and column `j` is `features[j]`. Saved words missing from these counts
/// get empty rows, and context words the layout does not know are dropped. The
/// document model keeps one column per counted document, with `features` empty.
pub fn build_matrix_with_layout(counts: AccumulatedCounts, words: &[String], features: &[Feature]) -> SpaceResult<TermMatrices> {

    let AccumulatedCounts { model, words: seen, compounds, word_contexts, compound_contexts, documents, .. } = counts;

    let vocab_size = seen.len();
    let mut lookup = vec![None; base_columns(model, vocab_size, documents)];
    if model == ContextModel::Document {
        if !features.is_empty() {
            return Err(SpaceError::config("document columns can not be laid out against saved features"))
        }
        lookup.iter_mut().enumerate().for_each(|(j, slot)| *slot = Some(j));
    } else {
        for (j, feature) in features.iter().enumerate() {
            if let Some(slot) = base_column(feature, &seen).and_then(|c| lookup.get_mut(c)) {
                *slot = Some(j);
            }
        }
    }
    let columns = if model == ContextModel::Document { documents } else { features.len() };

    let base_rows = context_rows(&word_contexts, model, vocab_size);
    let mut missing = 0;
    let rows: Vec<SparseVector> = words.iter().map(|w| match seen.index_of(w) {
        Some(i) => base_rows[i].remap(&lookup),
        None => {
            missing += 1;
            SparseVector::default()
        },
    }).collect();
    if missing > 0 {
        warn!("{} of {} saved words were not seen in this corpus", missing, words.len());
    }
    let compound_rows: Vec<SparseVector> = context_rows(&compound_contexts, model, vocab_size)
        .iter()
        .map(|row| row.remap(&lookup))
        .collect();
    debug!("laid out {} words and {} compounds over {} saved columns", rows.len(), compound_rows.len(), columns);

    let word_rows = MaskedMatrix::columns_only(Arc::new(SparseMatrix::from_rows(rows, columns)), (0..columns).collect())?;
    let compound_rows = MaskedMatrix::columns_only(Arc::new(SparseMatrix::from_rows(compound_rows, columns)), (0..columns).collect())?;

    Ok(TermMatrices {
        words: Vocabulary::from_ordered(words.iter().cloned()),
        compounds,
        word_rows,
        compound_rows,
        labels: features.to_vec(),
        documents,
    })
}


/// Shannon entropy of every column of `matrix`, taken over the column's values
/// normalized to sum to one. An all-zero column has entropy 0.
pub fn column_entropy<M: SparseRows>(matrix: &M) -> Vec<f64> {

    let mut sums = vec![0.0; matrix.columns()];
    let mut weighted = vec![0.0; matrix.columns()];
    for i in 0..matrix.rows() {
        for (j, v) in matrix.row(i).iter() {
            if v > 0.0 {
                sums[j] += v;
                weighted[j] += v * v.ln();
            }
        }
    }
    // H = ln(S) - sum(v ln v) / S
    sums.iter().zip(weighted.iter()).map(|(s, w)| {
        if *s > 0.0 { (s.ln() - w / s).max(0.0) } else { 0.0 }
    }).collect()
}

/// Column indices to keep under `retention`, in ascending order.
pub fn retained_columns(entropy: &[f64], retention: ColumnRetention) -> Vec<usize> {
    let mut keep: Vec<usize> = match retention {
        ColumnRetention::All => (0..entropy.len()).collect(),
        ColumnRetention::Threshold(t) => (0..entropy.len()).filter(|j| entropy[*j] >= t).collect(),
        ColumnRetention::Top(n) => {
            let mut order: Vec<usize> = (0..entropy.len()).collect();
            order.sort_by(|a, b| entropy[*b].partial_cmp(&entropy[*a]).unwrap_or(Ordering::Equal).then(a.cmp(b)));
            order.truncate(n);
            order
        }
    };
    keep.sort_unstable();
    keep
}

/// Applies an entropy cut to both matrices. The entropy is taken over every counted
/// word row, including the rows `max_words` left out.
pub fn retain_columns(matrices: TermMatrices, retention: ColumnRetention) -> SpaceResult<TermMatrices> {

    if retention == ColumnRetention::All {
        return Ok(matrices)
    }
    let entropy = column_entropy(&matrices.word_rows.with_all_rows()?);
    let keep = retained_columns(&entropy, retention);
    debug!("entropy cut keeps {} of {} columns", keep.len(), entropy.len());

    let labels = if matrices.labels.is_empty() {
        Vec::new()
    } else {
        keep.iter().filter_map(|j| matrices.labels.get(*j).cloned()).collect()
    };
    Ok(TermMatrices {
        word_rows: matrices.word_rows.select_columns(&keep)?,
        compound_rows: matrices.compound_rows.select_columns(&keep)?,
        labels,
        ..matrices
    })
}


#[cfg(test)]
mod tests {

    use std::sync::Arc;
    use crate::compound::CompoundRecognizer;
    use crate::cooccurrence::{Accumulator, ContextModel, Weighting};
    use crate::sparse::{SparseMatrix, SparseRows, SparseVector};
    use crate::tokens::tokenize;
    use super::{build_matrix, build_matrix_with_layout, column_entropy, retain_columns, retained_columns, ColumnRetention, Feature};

    fn flat_window(window: usize) -> ContextModel {
        ContextModel::Symmetric { window, weighting: Weighting::Flat }
    }

    fn counted(model: ContextModel, compounds: &[&str], docs: &[&str]) -> Accumulator {
        let recognizer = if compounds.is_empty() { None } else { Some(Arc::new(CompoundRecognizer::new(compounds.iter()))) };
        let acc = Accumulator::new(model, recognizer);
        for doc in docs {
            acc.process_tokens(&tokenize(doc, None)).unwrap();
        }
        acc
    }

    fn pairs(v: &SparseVector) -> Vec<(usize, f64)> {
        v.iter().collect()
    }

    #[test]
    fn rows_and_columns_follow_frequency() {
        // sat 3, mat 2, cat 1, dog 1
        let acc = counted(flat_window(1), &["sat mat"], &["cat sat mat", "dog sat mat", "sat"]);
        let m = build_matrix(acc.finish(), 2, 3).unwrap();

        assert_eq!(m.words.terms_by_index(), vec!["sat", "mat"]);
        assert!(m.words.index_of("cat").is_none());
        assert_eq!(m.words.get_or_insert("cat"), None);
        assert_eq!(m.features(), 3);
        // columns are sat, mat, dog
        assert_eq!(pairs(&m.word_rows.row(0)), vec![(1, 2.0), (2, 1.0)]);
        assert_eq!(pairs(&m.word_rows.row(1)), vec![(0, 2.0)]);

        // the compound row loses "cat" with the column cut but keeps "dog"
        assert_eq!(m.compound_rows.rows(), 1);
        assert_eq!(m.compound_rows.columns(), 3);
        assert_eq!(pairs(&m.compound_rows.row(0)), vec![(2, 1.0)]);
    }

    #[test]
    fn columns_are_labelled_by_word() {
        let acc = counted(flat_window(1), &[], &["cat sat mat", "dog sat mat", "sat"]);
        let m = build_matrix(acc.finish(), 0, 2).unwrap();
        assert_eq!(m.labels, vec![Feature::Word("sat".to_string()), Feature::Word("mat".to_string())]);

        let model = ContextModel::Directional { window: 1, weighting: Weighting::Flat };
        let m = build_matrix(counted(model, &[], &["x y"]).finish(), 0, 0).unwrap();
        assert_eq!(m.labels, vec![
            Feature::Preceding("x".to_string()), Feature::Preceding("y".to_string()),
            Feature::Following("x".to_string()), Feature::Following("y".to_string()),
        ]);

        let m = build_matrix(counted(ContextModel::Document, &[], &["a b"]).finish(), 0, 0).unwrap();
        assert!(m.labels.is_empty());
    }

    #[test]
    fn saved_layout_fixes_rows_and_columns() {
        let words = vec!["mat".to_string(), "sat".to_string(), "gone".to_string()];
        let features = vec![Feature::Word("sat".to_string()), Feature::Word("cat".to_string())];
        let acc = counted(flat_window(1), &["sat mat"], &["cat sat mat", "dog sat mat"]);
        let m = build_matrix_with_layout(acc.finish(), &words, &features).unwrap();

        assert_eq!(m.words.terms_by_index(), words);
        assert_eq!(m.features(), 2);
        // mat sees sat twice, sat sees cat once, "gone" was never counted
        assert_eq!(pairs(&m.word_rows.row(0)), vec![(0, 2.0)]);
        assert_eq!(pairs(&m.word_rows.row(1)), vec![(1, 1.0)]);
        assert!(m.word_rows.row(2).is_empty());
        // the compound keeps "cat" but loses "dog", which has no saved column
        assert_eq!(pairs(&m.compound_rows.row(0)), vec![(1, 1.0)]);
        assert_eq!(m.labels, features);
    }

    #[test]
    fn saved_layout_of_document_columns() {
        let words = vec!["b".to_string(), "a".to_string()];
        let acc = counted(ContextModel::Document, &[], &["a b", "b"]);
        let m = build_matrix_with_layout(acc.finish(), &words, &[]).unwrap();
        assert_eq!(m.features(), 2);
        assert_eq!(pairs(&m.word_rows.row(0)), vec![(0, 1.0), (1, 1.0)]);

        let acc = counted(ContextModel::Document, &[], &["a b"]);
        assert!(build_matrix_with_layout(acc.finish(), &words, &[Feature::Word("a".to_string())]).is_err());
    }

    #[test]
    fn zero_limits_keep_everything() {
        let acc = counted(flat_window(1), &[], &["cat sat mat", "dog sat mat"]);
        let m = build_matrix(acc.finish(), 0, 0).unwrap();
        assert_eq!(m.words.terms_by_index(), vec!["sat", "mat", "dog", "cat"]);
        assert_eq!(m.word_rows.rows(), 4);
        assert_eq!(m.features(), 4);

        let acc = counted(flat_window(1), &[], &["cat sat mat"]);
        let m = build_matrix(acc.finish(), 100, 100).unwrap();
        assert_eq!(m.word_rows.rows(), 3);
        assert_eq!(m.features(), 3);
    }

    #[test]
    fn cutoff_is_monotonic_in_frequency() {
        let docs = ["a b c d e a b c d a b c a b a", "f g a f", "h"];
        let acc = counted(flat_window(2), &[], &docs);
        let freq: Vec<(String, u64)> = acc.frequencies().ranked();
        let m = build_matrix(acc.finish(), 4, 0).unwrap();

        let kept = m.words.terms_by_index();
        assert_eq!(kept.len(), 4);
        let of = |w: &str| freq.iter().find(|(x, _)| x == w).map(|(_, f)| *f).unwrap();
        let lowest_kept = kept.iter().map(|w| of(w)).min().unwrap();
        for (word, f) in &freq {
            if !kept.contains(word) {
                assert!(*f <= lowest_kept);
            }
        }
        assert_eq!(kept[0], "a");
    }

    #[test]
    fn directional_rows_concatenate_both_sides() {
        let model = ContextModel::Directional { window: 1, weighting: Weighting::Flat };
        let acc = counted(model, &[], &["x y"]);
        let m = build_matrix(acc.finish(), 0, 0).unwrap();

        // x and y tie at 1, so y ranks first
        assert_eq!(m.words.terms_by_index(), vec!["y", "x"]);
        assert_eq!(m.features(), 4);
        // accumulator indices x=0 y=1, following block starts at 2
        assert_eq!(pairs(&m.word_rows.row(0)), vec![(0, 1.0)]);
        assert_eq!(pairs(&m.word_rows.row(1)), vec![(3, 1.0)]);
    }

    #[test]
    fn document_columns() {
        let acc = counted(ContextModel::Document, &[], &["a b", "b", "c b"]);
        let m = build_matrix(acc.finish(), 0, 0).unwrap();
        assert_eq!(m.documents, 3);
        assert_eq!(m.features(), 3);
        let b = m.words.index_of("b").unwrap();
        assert_eq!(pairs(&m.word_rows.row(b)), vec![(0, 1.0), (1, 1.0), (2, 1.0)]);
    }

    #[test]
    fn entropy_of_columns() {
        let m = SparseMatrix::from_rows(vec![
            SparseVector::from_pairs(vec![(0, 1.0), (1, 4.0)]),
            SparseVector::from_pairs(vec![(0, 1.0)]),
        ], 3);
        let h = column_entropy(&m);
        assert!((h[0] - 2f64.ln()).abs() < 1e-12);
        assert!(h[1].abs() < 1e-12);
        assert_eq!(h[2], 0.0);

        assert_eq!(retained_columns(&h, ColumnRetention::Top(1)), vec![0]);
        assert_eq!(retained_columns(&h, ColumnRetention::Top(2)), vec![0, 1]);
        assert_eq!(retained_columns(&h, ColumnRetention::Threshold(0.5)), vec![0]);
        assert_eq!(retained_columns(&h, ColumnRetention::All), vec![0, 1, 2]);
    }

    #[test]
    fn entropy_cut_applies_to_compounds_too() {
        let model = ContextModel::Directional { window: 2, weighting: Weighting::Ramp };
        let acc = counted(model, &["b c"], &["a b c d", "b a c d", "d c b a"]);
        let m = build_matrix(acc.finish(), 0, 0).unwrap();
        assert_eq!(m.features(), 8);

        let m = retain_columns(m, ColumnRetention::Top(3)).unwrap();
        assert_eq!(m.features(), 3);
        assert_eq!(m.compound_rows.columns(), 3);
        assert_eq!(m.word_rows.col_mask(), m.compound_rows.col_mask());
        assert_eq!(m.labels.len(), 3);
    }

    #[test]
    fn entropy_cut_sees_rows_beyond_the_word_cap() {
        let model = ContextModel::Directional { window: 2, weighting: Weighting::Ramp };
        let docs = ["a b c d", "b a c d", "d c b a", "a e a e"];
        let full = build_matrix(counted(model, &[], &docs).finish(), 0, 0).unwrap();
        let capped = build_matrix(counted(model, &[], &docs).finish(), 1, 0).unwrap();
        assert_eq!(capped.word_rows.rows(), 1);

        let full = retain_columns(full, ColumnRetention::Top(4)).unwrap();
        let capped = retain_columns(capped, ColumnRetention::Top(4)).unwrap();
        assert_eq!(full.labels, capped.labels);
        assert_eq!(full.word_rows.col_mask(), capped.word_rows.col_mask());
    }
}

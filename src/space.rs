
// imports
use crate::error::{SpaceError, SpaceResult};
use crate::sparse::{SparseMatrix, SparseRows, SparseVector};
use crate::vocabulary::Vocabulary;

use ndarray::{Array1, Array2, ArrayView1};


/// Row storage of one term universe.
#[derive(Clone, Debug)]
pub enum TermVectors {
    Dense(Array2<f64>),
    Sparse(SparseMatrix),
}

impl TermVectors {

    pub fn rows(&self) -> usize {
        match self {
            TermVectors::Dense(m) => m.nrows(),
            TermVectors::Sparse(m) => m.rows(),
        }
    }

    pub fn columns(&self) -> usize {
        match self {
            TermVectors::Dense(m) => m.ncols(),
            TermVectors::Sparse(m) => m.columns(),
        }
    }

    fn row(&self, index: usize) -> TermVector<'_> {
        match self {
            TermVectors::Dense(m) => TermVector::Dense(m.row(index)),
            TermVectors::Sparse(m) => TermVector::Sparse(m.row_vector(index), m.columns()),
        }
    }
}


/// Borrowed vector of one term.
#[derive(Clone, Copy, Debug)]
pub enum TermVector<'a> {
    Dense(ArrayView1<'a, f64>),
    Sparse(&'a SparseVector, usize),
}

impl<'a> TermVector<'a> {

    pub fn len(&self) -> usize {
        match self {
            TermVector::Dense(v) => v.len(),
            TermVector::Sparse(_, len) => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> f64 {
        match self {
            TermVector::Dense(v) => v.get(index).copied().unwrap_or(0.0),
            TermVector::Sparse(v, _) => v.get(index),
        }
    }

    pub fn to_dense(&self) -> Array1<f64> {
        match self {
            TermVector::Dense(v) => v.to_owned(),
            TermVector::Sparse(v, len) => v.to_dense(*len),
        }
    }
}


/// The finished space: every retained word and every compound mapped to a vector of
/// the same length.
#[derive(Debug)]
pub struct SemanticSpace {
    name: String,
    words: Vocabulary,
    compounds: Vocabulary,
    word_vectors: TermVectors,
    compound_vectors: TermVectors,
    documents: Option<Array2<f64>>,
}

impl SemanticSpace {

    pub fn new(name: impl Into<String>,
        words: Vocabulary,
        compounds: Vocabulary,
        word_vectors: TermVectors,
        compound_vectors: TermVectors) -> SpaceResult<SemanticSpace> {

        if word_vectors.rows() != words.len() || compound_vectors.rows() != compounds.len() {
            return Err(SpaceError::invalid_state(format!(
                "{} words with {} vectors, {} compounds with {} vectors",
                words.len(), word_vectors.rows(), compounds.len(), compound_vectors.rows())))
        }
        if word_vectors.columns() != compound_vectors.columns() {
            return Err(SpaceError::invalid_state(format!(
                "word vectors have length {} but compound vectors {}", word_vectors.columns(), compound_vectors.columns())))
        }
        words.freeze();
        compounds.freeze();
        Ok(SemanticSpace {
            name: name.into(),
            words,
            compounds,
            word_vectors,
            compound_vectors,
            documents: None,
        })
    }

    /// Keeps one latent vector per processed document.
    pub fn with_documents(mut self, documents: Array2<f64>) -> SemanticSpace {
        self.documents = Some(documents);
        self
    }

    pub fn space_name(&self) -> &str {
        &self.name
    }

    pub fn vector_length(&self) -> usize {
        self.word_vectors.columns()
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn compound_count(&self) -> usize {
        self.compounds.len()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.words.contains(term) || self.compounds.contains(term)
    }

    pub fn is_compound(&self, term: &str) -> bool {
        !self.words.contains(term) && self.compounds.contains(term)
    }

    /// The vector of `term`, looked up among words first and then among compounds.
    pub fn term_vector(&self, term: &str) -> Option<TermVector<'_>> {
        if let Some(i) = self.words.index_of(term) {
            return Some(self.word_vectors.row(i))
        }
        self.compounds.index_of(term).map(|i| self.compound_vectors.row(i))
    }

    pub fn vector(&self, term: &str) -> Option<Array1<f64>> {
        self.term_vector(term).map(|v| v.to_dense())
    }

    /// Words in row order followed by compounds in row order.
    pub fn terms(&self) -> Vec<String> {
        let mut terms = self.words.terms_by_index();
        terms.extend(self.compounds.terms_by_index());
        terms
    }

    pub fn words(&self) -> Vec<String> {
        self.words.terms_by_index()
    }

    pub fn compounds(&self) -> Vec<String> {
        self.compounds.terms_by_index()
    }

    pub fn document_count(&self) -> usize {
        self.documents.as_ref().map_or(0, |d| d.nrows())
    }

    pub fn document_vector(&self, document: usize) -> Option<ArrayView1<'_, f64>> {
        let documents = self.documents.as_ref()?;
        if document < documents.nrows() { Some(documents.row(document)) } else { None }
    }
}


// imports
use crate::compound::CompoundRecognizer;
use crate::error::{SpaceError, SpaceResult};
use crate::sparse::SparseVector;
use crate::tokens::{Token, TokenStream};
use crate::vocabulary::{FrequencyTable, Vocabulary};

use std::collections::{HashMap, HashSet};
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;


/// How a neighbor at `distance` slots from the focus is scored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// `window + 1 - distance`, the nearest neighbor scores `window`
    Ramp,
    /// every neighbor in the window scores 1
    Flat,
    /// `1 / distance`
    InverseDistance,
}

impl Weighting {
    pub fn weight(&self, distance: usize, window: usize) -> f64 {
        match self {
            Weighting::Ramp => (window + 1).saturating_sub(distance) as f64,
            Weighting::Flat => 1.0,
            Weighting::InverseDistance => 1.0 / distance as f64,
        }
    }
}

impl Default for Weighting {
    fn default() -> Self {
        Weighting::Ramp
    }
}


/// What a term row counts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ContextModel {
    /// neighbors on both sides folded into one row (COALS)
    Symmetric { window: usize, weighting: Weighting },
    /// preceding and following neighbors kept in separate rows (HAL)
    Directional { window: usize, weighting: Weighting },
    /// occurrences per document, one column per document (LSA)
    Document,
}

impl ContextModel {
    fn window(&self) -> Option<(usize, Weighting, bool)> {
        match self {
            ContextModel::Symmetric { window, weighting } => Some((*window, *weighting, false)),
            ContextModel::Directional { window, weighting } => Some((*window, *weighting, true)),
            ContextModel::Document => None,
        }
    }
}


/// Accumulated context of one term. Only `Directional` fills `following`; the
/// other models keep everything in `preceding`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TermContext {
    pub preceding: SparseVector,
    pub following: SparseVector,
}

impl TermContext {
    /// Both directions folded into one row.
    pub fn combined(&self) -> SparseVector {
        let mut row = self.preceding.clone();
        row.add_assign(&self.following);
        row
    }
}


// per-document scratch space, merged into the shared state once the document is done
#[derive(Default)]
struct LocalContext {
    preceding: HashMap<usize, f64>,
    following: HashMap<usize, f64>,
}

impl LocalContext {
    fn add(&mut self, index: usize, value: f64, following: bool) {
        let side = if following { &mut self.following } else { &mut self.preceding };
        *side.entry(index).or_insert(0.0) += value;
    }
}

#[derive(Default)]
struct DocumentCounts<'a> {
    words: HashMap<usize, LocalContext>,
    compounds: HashMap<usize, LocalContext>,
    frequencies: HashMap<&'a str, u64>,
}


type SharedContexts = DashMap<usize, Arc<Mutex<TermContext>>>;

/// Collects weighted co-occurrence counts for words and compounds.
///
/// `process_document` may be called from many threads at once. Each call counts
/// into local maps and merges them at the end under a per-term lock, so documents
/// only contend on the terms they share.
pub struct Accumulator {
    model: ContextModel,
    recognizer: Option<Arc<CompoundRecognizer>>,
    words: Vocabulary,
    compounds: Vocabulary,
    frequencies: FrequencyTable,
    word_contexts: SharedContexts,
    compound_contexts: SharedContexts,
    documents: AtomicUsize,
}

impl Accumulator {

    pub fn new(model: ContextModel, recognizer: Option<Arc<CompoundRecognizer>>) -> Accumulator {
        Accumulator {
            model,
            recognizer,
            words: Vocabulary::new(),
            compounds: Vocabulary::new(),
            frequencies: FrequencyTable::new(),
            word_contexts: DashMap::new(),
            compound_contexts: DashMap::new(),
            documents: AtomicUsize::new(0),
        }
    }

    pub fn model(&self) -> ContextModel {
        self.model
    }

    pub fn words(&self) -> &Vocabulary {
        &self.words
    }

    pub fn compounds(&self) -> &Vocabulary {
        &self.compounds
    }

    pub fn frequencies(&self) -> &FrequencyTable {
        &self.frequencies
    }

    pub fn documents(&self) -> usize {
        self.documents.load(Ordering::SeqCst)
    }

    /// Reads, tokenizes and counts one document.
    pub fn process_reader<R: BufRead>(&self, reader: R, stopwords: Option<&HashSet<String>>, lowercase: bool) -> SpaceResult<()> {
        let stream = TokenStream::new(reader).lowercase(lowercase);
        match stopwords {
            Some(stop) => self.process_document(stream.with_stopwords(stop)),
            None => self.process_document(stream),
        }
    }

    /// Counts one document. Nothing reaches the shared state unless the whole token
    /// stream was read without error.
    pub fn process_document<I>(&self, tokens: I) -> SpaceResult<()>
    where
        I: IntoIterator<Item = io::Result<Token>>,
    {
        if self.words.is_frozen() {
            return Err(SpaceError::invalid_state("documents can not be processed once the vocabulary is frozen"))
        }
        let tokens: Vec<Token> = tokens.into_iter().collect::<io::Result<Vec<Token>>>()?;
        self.process_tokens(&tokens)
    }

    pub fn process_tokens(&self, tokens: &[Token]) -> SpaceResult<()> {
        self.count(None, tokens)
    }

    /// Counts a document under a fixed ordinal. In the document model the ordinal is
    /// the document's column, so columns follow the corpus order no matter which
    /// document finishes first. Numbered and unnumbered documents must not be mixed.
    pub fn process_numbered(&self, ordinal: usize, tokens: &[Token]) -> SpaceResult<()> {
        self.count(Some(ordinal), tokens)
    }

    fn count(&self, ordinal: Option<usize>, tokens: &[Token]) -> SpaceResult<()> {

        if tokens.is_empty() {
            return Ok(())
        }
        let counts = match self.model.window() {
            Some((window, weighting, split)) => self.count_window(tokens, window, weighting, split)?,
            None => {
                let column = match ordinal {
                    Some(n) => {
                        self.documents.fetch_max(n + 1, Ordering::SeqCst);
                        n
                    },
                    None => self.documents.fetch_add(1, Ordering::SeqCst),
                };
                self.count_document(tokens, column)?
            }
        };
        if self.model.window().is_some() {
            self.documents.fetch_add(1, Ordering::SeqCst);
        }
        self.merge(counts);
        Ok(())
    }

    fn word_index(&self, word: &str) -> SpaceResult<usize> {
        self.words.get_or_insert(word)
            .ok_or_else(|| SpaceError::invalid_state(format!("word vocabulary frozen while counting '{}'", word)))
    }

    fn compound_index(&self, compound: &str) -> SpaceResult<usize> {
        self.compounds.get_or_insert(compound)
            .ok_or_else(|| SpaceError::invalid_state(format!("compound vocabulary frozen while counting '{}'", compound)))
    }

    fn count_window<'a>(&self, tokens: &'a [Token], window: usize, weighting: Weighting, split: bool) -> SpaceResult<DocumentCounts<'a>> {

        let mut counts = DocumentCounts::default();
        let n = tokens.len();

        for pos in 0..n {

            let focus = &tokens[pos];
            let following = &tokens[pos + 1..n.min(pos + 1 + window)];

            if let Some(word) = focus.scoring_word() {
                let focus_index = self.word_index(word)?;
                *counts.frequencies.entry(word).or_insert(0) += 1;

                let preceding = &tokens[pos.saturating_sub(window)..pos];
                let context = counts.words.entry(focus_index).or_default();
                self.score_neighbors(context, preceding, following, window, weighting, split)?;
            }

            // a compound is scored from its own slot: the preceding window starts before
            // its first word, so the words it subsumed never count as its neighbors
            if let Some(recognizer) = &self.recognizer {
                let prev1 = pos.checked_sub(1).map(|p| &tokens[p]);
                let prev2 = pos.checked_sub(2).map(|p| &tokens[p]);
                if let Some(found) = recognizer.recognize(prev2, prev1, focus) {
                    let compound_index = self.compound_index(&found.key)?;
                    let start = pos + 1 - found.span.len();
                    let preceding = &tokens[start.saturating_sub(window)..start];
                    let context = counts.compounds.entry(compound_index).or_default();
                    self.score_neighbors(context, preceding, following, window, weighting, split)?;
                }
            }
        }

        Ok(counts)
    }

    fn score_neighbors(&self,
        context: &mut LocalContext,
        preceding: &[Token],
        following: &[Token],
        window: usize,
        weighting: Weighting,
        split: bool) -> SpaceResult<()> {

        // preceding runs oldest first, so the last one is adjacent to the focus
        let before = preceding.len();
        for (k, token) in preceding.iter().enumerate() {
            if let Some(word) = token.scoring_word() {
                let index = self.word_index(word)?;
                context.add(index, weighting.weight(before - k, window), false);
            }
        }
        for (k, token) in following.iter().enumerate() {
            if let Some(word) = token.scoring_word() {
                let index = self.word_index(word)?;
                context.add(index, weighting.weight(k + 1, window), split);
            }
        }
        Ok(())
    }

    fn count_document<'a>(&self, tokens: &'a [Token], column: usize) -> SpaceResult<DocumentCounts<'a>> {

        let mut counts = DocumentCounts::default();
        for (pos, focus) in tokens.iter().enumerate() {

            if let Some(recognizer) = &self.recognizer {
                let prev1 = pos.checked_sub(1).map(|p| &tokens[p]);
                let prev2 = pos.checked_sub(2).map(|p| &tokens[p]);
                if let Some(found) = recognizer.recognize(prev2, prev1, focus) {
                    let compound_index = self.compound_index(&found.key)?;
                    counts.compounds.entry(compound_index).or_default().add(column, 1.0, false);
                }
            }

            if let Some(word) = focus.scoring_word() {
                let index = self.word_index(word)?;
                *counts.frequencies.entry(word).or_insert(0) += 1;
                counts.words.entry(index).or_default().add(column, 1.0, false);
            }
        }
        Ok(counts)
    }

    fn merge(&self, counts: DocumentCounts) {
        merge_contexts(&self.word_contexts, counts.words);
        merge_contexts(&self.compound_contexts, counts.compounds);
        for (word, count) in counts.frequencies {
            self.frequencies.add(word, count);
        }
    }

    /// Current accumulated context of a word, mostly useful for inspection.
    pub fn word_context(&self, word: &str) -> Option<TermContext> {
        let index = self.words.index_of(word)?;
        self.word_contexts.get(&index).map(|slot| slot.lock().clone())
    }

    pub fn compound_context(&self, compound: &str) -> Option<TermContext> {
        let index = self.compounds.index_of(compound)?;
        self.compound_contexts.get(&index).map(|slot| slot.lock().clone())
    }

    /// Freezes both vocabularies and hands the counts over for matrix building.
    pub fn finish(self) -> AccumulatedCounts {

        self.words.freeze();
        self.compounds.freeze();
        let word_contexts = unwrap_contexts(self.word_contexts, self.words.len());
        let compound_contexts = unwrap_contexts(self.compound_contexts, self.compounds.len());
        debug!("finished counting {} documents, {} words, {} compounds",
            self.documents.load(Ordering::SeqCst), word_contexts.len(), compound_contexts.len());

        AccumulatedCounts {
            model: self.model,
            words: self.words,
            compounds: self.compounds,
            frequencies: self.frequencies,
            word_contexts,
            compound_contexts,
            documents: self.documents.into_inner(),
        }
    }
}


fn context_slot(contexts: &SharedContexts, index: usize) -> Arc<Mutex<TermContext>> {
    if let Some(slot) = contexts.get(&index).map(|s| Arc::clone(s.value())) {
        return slot
    }
    let slot = contexts.entry(index).or_insert_with(|| Arc::new(Mutex::new(TermContext::default())));
    Arc::clone(slot.value())
}

fn merge_contexts(contexts: &SharedContexts, local: HashMap<usize, LocalContext>) {
    for (index, context) in local {
        // sort outside of the lock, only the merge itself is serialized
        let preceding = SparseVector::from_map(context.preceding);
        let following = SparseVector::from_map(context.following);
        let slot = context_slot(contexts, index);
        let mut shared = slot.lock();
        shared.preceding.add_assign(&preceding);
        shared.following.add_assign(&following);
    }
}

fn unwrap_contexts(contexts: SharedContexts, len: usize) -> Vec<TermContext> {
    let mut rows = vec![TermContext::default(); len];
    for (index, slot) in contexts.into_iter() {
        let context = match Arc::try_unwrap(slot) {
            Ok(owned) => owned.into_inner(),
            Err(shared) => shared.lock().clone(),
        };
        if index < len {
            rows[index] = context;
        }
    }
    rows
}


/// Everything counted over the corpus, with both vocabularies frozen.
/// `word_contexts[i]` belongs to the word with index `i`.
#[derive(Debug)]
pub struct AccumulatedCounts {
    pub model: ContextModel,
    pub words: Vocabulary,
    pub compounds: Vocabulary,
    pub frequencies: FrequencyTable,
    pub word_contexts: Vec<TermContext>,
    pub compound_contexts: Vec<TermContext>,
    pub documents: usize,
}


#[cfg(test)]
mod tests {

    use std::collections::HashMap;
    use std::io::{self, Cursor};
    use std::sync::Arc;
    use rayon::prelude::*;
    use crate::compound::CompoundRecognizer;
    use crate::tokens::{tokenize, Token};
    use super::{Accumulator, ContextModel, Weighting};

    fn words(text: &str) -> Vec<Token> {
        tokenize(text, None)
    }

    // context of `term` keyed by neighbor string, so results do not depend on index order
    fn named(acc: &Accumulator, context: &crate::sparse::SparseVector) -> HashMap<String, f64> {
        let names = acc.words().terms_by_index();
        context.iter().map(|(i, v)| (names[i].clone(), v)).collect()
    }

    fn expect(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(w, v)| (w.to_string(), *v)).collect()
    }

    #[test]
    fn weighting_functions() {
        assert_eq!(Weighting::Ramp.weight(1, 4), 4.0);
        assert_eq!(Weighting::Ramp.weight(4, 4), 1.0);
        assert_eq!(Weighting::Flat.weight(3, 4), 1.0);
        assert_eq!(Weighting::InverseDistance.weight(2, 4), 0.5);
    }

    #[test]
    fn two_document_adjacency() {
        let acc = Accumulator::new(ContextModel::Symmetric { window: 1, weighting: Weighting::Flat }, None);
        acc.process_tokens(&words("cat sat mat")).unwrap();
        acc.process_tokens(&words("dog sat mat")).unwrap();

        assert_eq!(acc.words().terms_by_index(), vec!["cat", "sat", "mat", "dog"]);
        let sat = acc.word_context("sat").unwrap().combined();
        assert_eq!(named(&acc, &sat), expect(&[("cat", 1.0), ("mat", 2.0), ("dog", 1.0)]));
        let cat = acc.word_context("cat").unwrap().combined();
        assert_eq!(named(&acc, &cat), expect(&[("sat", 1.0)]));
        let mat = acc.word_context("mat").unwrap().combined();
        assert_eq!(named(&acc, &mat), expect(&[("sat", 2.0)]));
        assert_eq!(acc.frequencies().get("sat"), 2);
        assert_eq!(acc.documents(), 2);
    }

    #[test]
    fn ramp_is_symmetric_around_the_focus() {
        let acc = Accumulator::new(ContextModel::Symmetric { window: 4, weighting: Weighting::Ramp }, None);
        acc.process_tokens(&words("a b c d e f g h i")).unwrap();

        let e = named(&acc, &acc.word_context("e").unwrap().combined());
        assert_eq!(e, expect(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0),
                                ("f", 4.0), ("g", 3.0), ("h", 2.0), ("i", 1.0)]));

        // at the start of a document the adjacent word still gets the full weight
        let a = named(&acc, &acc.word_context("a").unwrap().combined());
        assert_eq!(a, expect(&[("b", 4.0), ("c", 3.0), ("d", 2.0), ("e", 1.0)]));
        let b = named(&acc, &acc.word_context("b").unwrap().combined());
        assert_eq!(b["a"], 4.0);

        // and so does the trailing edge
        let i = named(&acc, &acc.word_context("i").unwrap().combined());
        assert_eq!(i, expect(&[("e", 1.0), ("f", 2.0), ("g", 3.0), ("h", 4.0)]));
        let h = named(&acc, &acc.word_context("h").unwrap().combined());
        assert_eq!(h["i"], 4.0);
        assert_eq!(h["d"], 1.0);
    }

    #[test]
    fn stopwords_hold_their_slot() {
        let acc = Accumulator::new(ContextModel::Symmetric { window: 1, weighting: Weighting::Flat }, None);
        let tokens = vec![Token::word("cat"), Token::stopword("the"), Token::word("dog")];
        acc.process_tokens(&tokens).unwrap();

        assert!(acc.word_context("cat").unwrap().combined().is_empty());
        assert!(acc.words().index_of("the").is_none());
        assert_eq!(acc.frequencies().get("the"), 0);
    }

    #[test]
    fn bigram_compound_records_its_own_window() {
        let recognizer = Arc::new(CompoundRecognizer::new(["sat mat"]));
        let acc = Accumulator::new(ContextModel::Symmetric { window: 1, weighting: Weighting::Flat }, Some(recognizer));
        acc.process_tokens(&words("cat sat mat")).unwrap();
        acc.process_tokens(&words("dog sat mat")).unwrap();

        assert_eq!(acc.compounds().index_of("sat mat"), Some(0));
        let compound = acc.compound_context("sat mat").unwrap().combined();
        assert_eq!(named(&acc, &compound), expect(&[("cat", 1.0), ("dog", 1.0)]));
        // compounds never count as words
        assert_eq!(acc.frequencies().get("sat mat"), 0);
        assert!(acc.words().index_of("sat mat").is_none());
    }

    #[test]
    fn trigram_compound_window_skips_subsumed_words() {
        let recognizer = Arc::new(CompoundRecognizer::new(["new york city", "york city"]));
        let acc = Accumulator::new(ContextModel::Symmetric { window: 2, weighting: Weighting::Ramp }, Some(recognizer));
        acc.process_tokens(&words("x y new york city z")).unwrap();

        assert_eq!(acc.compounds().len(), 1);
        assert!(acc.compound_context("york city").is_none());
        let compound = acc.compound_context("new city").unwrap().combined();
        assert_eq!(named(&acc, &compound), expect(&[("x", 1.0), ("y", 2.0), ("z", 2.0)]));
    }

    #[test]
    fn stopword_inside_a_trigram() {
        let recognizer = Arc::new(CompoundRecognizer::new(["bill of rights"]));
        let acc = Accumulator::new(ContextModel::Symmetric { window: 3, weighting: Weighting::Flat }, Some(recognizer));
        let tokens = vec![Token::word("the"), Token::word("bill"), Token::stopword("of"), Token::word("rights"), Token::word("passed")];
        acc.process_tokens(&tokens).unwrap();

        let compound = acc.compound_context("bill rights").unwrap().combined();
        assert_eq!(named(&acc, &compound), expect(&[("the", 1.0), ("passed", 1.0)]));
    }

    #[test]
    fn directional_keeps_sides_apart() {
        let acc = Accumulator::new(ContextModel::Directional { window: 2, weighting: Weighting::Ramp }, None);
        acc.process_tokens(&words("a b c")).unwrap();

        let b = acc.word_context("b").unwrap();
        assert_eq!(named(&acc, &b.preceding), expect(&[("a", 2.0)]));
        assert_eq!(named(&acc, &b.following), expect(&[("c", 2.0)]));
        let a = acc.word_context("a").unwrap();
        assert!(a.preceding.is_empty());
        assert_eq!(named(&acc, &a.following), expect(&[("b", 2.0), ("c", 1.0)]));
    }

    #[test]
    fn document_model_counts_per_column() {
        let recognizer = Arc::new(CompoundRecognizer::new(["hot dog"]));
        let acc = Accumulator::new(ContextModel::Document, Some(recognizer));
        acc.process_tokens(&words("hot dog hot dog")).unwrap();
        acc.process_tokens(&words("dog")).unwrap();

        let dog = acc.word_context("dog").unwrap().combined();
        assert_eq!(dog.iter().collect::<Vec<_>>(), vec![(0, 2.0), (1, 1.0)]);
        let compound = acc.compound_context("hot dog").unwrap().combined();
        assert_eq!(compound.iter().collect::<Vec<_>>(), vec![(0, 2.0)]);
        assert_eq!(acc.documents(), 2);
    }

    #[test]
    fn numbered_documents_keep_their_column() {
        let acc = Accumulator::new(ContextModel::Document, None);
        acc.process_numbered(2, &words("c")).unwrap();
        acc.process_numbered(0, &words("a")).unwrap();
        acc.process_numbered(1, &words("b c")).unwrap();

        assert_eq!(acc.documents(), 3);
        let c = acc.word_context("c").unwrap().combined();
        assert_eq!(c.iter().collect::<Vec<_>>(), vec![(1, 1.0), (2, 1.0)]);
        let a = acc.word_context("a").unwrap().combined();
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![(0, 1.0)]);
    }

    #[test]
    fn failed_read_leaves_no_trace() {
        let acc = Accumulator::new(ContextModel::Symmetric { window: 2, weighting: Weighting::Ramp }, None);
        let tokens: Vec<io::Result<Token>> = vec![
            Ok(Token::word("cat")),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated")),
        ];
        assert!(acc.process_document(tokens).is_err());
        assert!(acc.words().is_empty());
        assert_eq!(acc.documents(), 0);

        acc.process_reader(Cursor::new("cat sat"), None, true).unwrap();
        assert_eq!(acc.words().len(), 2);
    }

    #[test]
    fn frozen_accumulator_rejects_documents() {
        let acc = Accumulator::new(ContextModel::Symmetric { window: 2, weighting: Weighting::Ramp }, None);
        acc.words().freeze();
        assert!(acc.process_document(vec![Ok(Token::word("cat"))]).is_err());
    }

    #[test]
    fn parallel_documents_match_sequential() {
        let docs: Vec<String> = (0..64).map(|i| {
            format!("w{} common w{} shared new york city w{}", i % 7, i % 5, i % 3)
        }).collect();
        let recognizer = Arc::new(CompoundRecognizer::new(["new york city", "common w1"]));
        let model = ContextModel::Symmetric { window: 3, weighting: Weighting::Ramp };

        let sequential = Accumulator::new(model, Some(Arc::clone(&recognizer)));
        for doc in &docs {
            sequential.process_tokens(&words(doc)).unwrap();
        }
        let parallel = Accumulator::new(model, Some(recognizer));
        docs.par_iter().try_for_each(|doc| parallel.process_tokens(&words(doc))).unwrap();

        assert_eq!(sequential.words().len(), parallel.words().len());
        for word in sequential.words().terms_by_index() {
            let a = named(&sequential, &sequential.word_context(&word).unwrap().combined());
            let b = named(&parallel, &parallel.word_context(&word).unwrap().combined());
            assert_eq!(a, b, "context of {}", word);
            assert_eq!(sequential.frequencies().get(&word), parallel.frequencies().get(&word));
        }
        for compound in ["new city", "common w1"] {
            let a = named(&sequential, &sequential.compound_context(compound).unwrap().combined());
            let b = named(&parallel, &parallel.compound_context(compound).unwrap().combined());
            assert_eq!(a, b);
        }
    }

    #[test]
    fn finish_freezes_and_lays_out_by_index() {
        let acc = Accumulator::new(ContextModel::Symmetric { window: 1, weighting: Weighting::Flat }, None);
        acc.process_tokens(&words("cat sat")).unwrap();
        let counts = acc.finish();
        assert!(counts.words.is_frozen());
        assert_eq!(counts.word_contexts.len(), 2);
        assert_eq!(counts.word_contexts[0].combined().get(1), 1.0);
        assert_eq!(counts.words.get_or_insert("dog"), None);
    }
}

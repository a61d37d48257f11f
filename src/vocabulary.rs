
// imports
use dashmap::DashMap;

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};


/// Concurrent term to dense index mapping. Indices are handed out in order of first
/// sight and never reused; once frozen, unknown terms are reported as absent.
#[derive(Debug, Default)]
pub struct Vocabulary {
    index: DashMap<String, usize>,
    next: AtomicUsize,
    read_only: AtomicBool,
}

impl Vocabulary {

    pub fn new() -> Vocabulary {
        Vocabulary::default()
    }

    /// Builds a frozen vocabulary where `terms[i]` gets index `i`.
    pub fn from_ordered<I, S>(terms: I) -> Vocabulary
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let vocab = Vocabulary::new();
        for term in terms {
            let i = vocab.next.fetch_add(1, Ordering::SeqCst);
            vocab.index.insert(term.into(), i);
        }
        vocab.freeze();
        vocab
    }

    /// Returns the index of `term`, assigning the next free one on first sight.
    /// Returns `None` only when the vocabulary is frozen and `term` is unknown.
    pub fn get_or_insert(&self, term: &str) -> Option<usize> {

        // fast path without taking a shard write lock
        if let Some(i) = self.index_of(term) {
            return Some(i)
        }
        if self.is_frozen() {
            return None
        }

        // the entry holds the shard lock, so the recheck and the assignment are one step
        // and a racing thread that got here first wins
        let i = *self.index
            .entry(term.to_string())
            .or_insert_with(|| self.next.fetch_add(1, Ordering::SeqCst))
            .value();
        Some(i)
    }

    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.index.get(term).map(|i| *i.value())
    }

    pub fn contains(&self, term: &str) -> bool {
        self.index.contains_key(term)
    }

    pub fn freeze(&self) {
        self.read_only.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// All terms laid out by their index.
    pub fn terms_by_index(&self) -> Vec<String> {
        let mut terms: Vec<(usize, String)> = self.index
            .iter()
            .map(|e| (*e.value(), e.key().to_owned()))
            .collect();
        terms.sort_by_key(|(i, _)| *i);
        terms.into_iter().map(|(_, t)| t).collect()
    }
}


/// Corpus-wide occurrence counts of plain words, used to rank them for pruning.
#[derive(Debug, Default)]
pub struct FrequencyTable {
    counts: DashMap<String, AtomicU64>,
}

impl FrequencyTable {

    pub fn new() -> FrequencyTable {
        FrequencyTable::default()
    }

    /// Atomic increment-or-insert.
    pub fn add(&self, word: &str, count: u64) {
        if let Some(freq) = self.counts.get(word) {
            freq.fetch_add(count, Ordering::Relaxed);
            return
        }
        self.counts
            .entry(word.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn get(&self, word: &str) -> u64 {
        self.counts.get(word).map_or(0, |freq| freq.load(Ordering::Relaxed))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Words ordered by descending frequency, ties broken by descending word order.
    pub fn ranked(&self) -> Vec<(String, u64)> {
        let mut ranked: Vec<(String, u64)> = self.counts
            .iter()
            .map(|e| (e.key().to_owned(), e.value().load(Ordering::Relaxed)))
            .collect();
        ranked.sort_by(rank_order);
        ranked
    }
}

pub fn rank_order(a: &(String, u64), b: &(String, u64)) -> CmpOrdering {
    b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0))
}


// imports
use crate::tokens::Token;

use std::collections::HashSet;
use std::io::BufRead;
use tracing::{debug, warn};


/// Number of token slots a recognized compound covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Span {
    Bigram,
    Trigram,
}

impl Span {
    pub fn len(&self) -> usize {
        match self {
            Span::Bigram => 2,
            Span::Trigram => 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompoundMatch {
    pub key: String,
    pub span: Span,
}


/// Holds the registered compound phrases and decides whether the span ending at the
/// focus token forms one of them.
#[derive(Clone, Debug, Default)]
pub struct CompoundRecognizer {
    phrases: HashSet<String>,
}

impl CompoundRecognizer {

    pub fn new<I, S>(phrases: I) -> CompoundRecognizer
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut recognizer = CompoundRecognizer::default();
        for phrase in phrases {
            recognizer.insert(phrase.as_ref());
        }
        recognizer
    }

    /// Loads one phrase per line, ignoring blank lines.
    pub fn from_reader<R: BufRead>(reader: R, lowercase: bool) -> std::io::Result<CompoundRecognizer> {
        let mut recognizer = CompoundRecognizer::default();
        for line in reader.lines() {
            let line = line?;
            let phrase = if lowercase { line.to_lowercase() } else { line };
            recognizer.insert(&phrase);
        }
        debug!("loaded {} compound phrases", recognizer.len());
        Ok(recognizer)
    }

    fn insert(&mut self, phrase: &str) {
        // phrases are matched against space-joined tokens, so normalize inner whitespace
        let parts: Vec<&str> = phrase.split_whitespace().collect();
        match parts.len() {
            0 => {},
            2 | 3 => { self.phrases.insert(parts.join(" ")); },
            n => warn!("ignoring compound '{}' with {} tokens, only bigrams and trigrams are supported", phrase.trim(), n),
        }
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn contains(&self, phrase: &str) -> bool {
        self.phrases.contains(phrase)
    }

    /// Tests the trigram (`prev2 prev1 focus`) and then the bigram (`prev1 focus`)
    /// ending at `focus`. A trigram match shadows the bigram at the same position.
    ///
    /// Only the middle word of a trigram is tested with its real text, so a stopword
    /// may join the outer words ("bill of rights"). The outer slots use their window
    /// text, which is empty for stopwords and therefore never matches.
    pub fn recognize(&self, prev2: Option<&Token>, prev1: Option<&Token>, focus: &Token) -> Option<CompoundMatch> {

        if self.phrases.is_empty() || focus.is_empty() {
            return None
        }
        let focus = focus.window_text();
        let prev1 = prev1?;

        if let Some(prev2) = prev2 {
            let trigram = format!("{} {} {}", prev2.window_text(), prev1.real_text(), focus);
            if self.phrases.contains(&trigram) {
                if let Some(key) = canonical_key(&trigram) {
                    return Some(CompoundMatch { key, span: Span::Trigram })
                }
            }
        }

        let bigram = format!("{} {}", prev1.window_text(), focus);
        if self.phrases.contains(&bigram) {
            return Some(CompoundMatch { key: bigram, span: Span::Bigram })
        }
        None
    }
}


/// Maps a registered phrase to the key it is indexed under: a trigram drops its
/// middle word, a bigram is kept verbatim.
pub fn canonical_key(phrase: &str) -> Option<String> {
    let parts: Vec<&str> = phrase.split_whitespace().collect();
    match parts.as_slice() {
        [first, second] => Some(format!("{} {}", first, second)),
        [first, _, last] => Some(format!("{} {}", first, last)),
        _ => None,
    }
}

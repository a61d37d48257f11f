
// imports
use std::collections::HashSet;
use std::collections::VecDeque;
use std::io::{self, BufRead};


/// The window role of a filtered token. It still occupies a slot but never scores.
pub const EMPTY_TOKEN: &str = "";


#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Token {
    Word(String),
    Stopword(String),
}

impl Token {

    pub fn word(text: impl Into<String>) -> Token {
        Token::Word(text.into())
    }

    pub fn stopword(text: impl Into<String>) -> Token {
        Token::Stopword(text.into())
    }

    /// The text used for co-occurrence scoring, `EMPTY_TOKEN` for stopwords.
    pub fn window_text(&self) -> &str {
        match self {
            Token::Word(w) => w,
            Token::Stopword(_) => EMPTY_TOKEN,
        }
    }

    /// The surface text, flag removed. Used when a stopword sits inside a compound.
    pub fn real_text(&self) -> &str {
        match self {
            Token::Word(w) => w,
            Token::Stopword(s) => s,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.window_text().is_empty()
    }

    /// `Some(word)` when the token takes part in scoring.
    pub fn scoring_word(&self) -> Option<&str> {
        match self {
            Token::Word(w) if !w.is_empty() => Some(w),
            _ => None,
        }
    }
}


/// Order-preserving tokenizer over a reader. Tokens found in the stopword set are
/// flagged instead of dropped so window positions stay intact.
pub struct TokenStream<'a, R: BufRead> {
    reader: R,
    stopwords: Option<&'a HashSet<String>>,
    lowercase: bool,
    pending: VecDeque<String>,
    line: String,
    done: bool,
}

impl<'a, R: BufRead> TokenStream<'a, R> {

    pub fn new(reader: R) -> Self {
        Self {
            reader,
            stopwords: None,
            lowercase: false,
            pending: VecDeque::new(),
            line: String::new(),
            done: false,
        }
    }

    pub fn with_stopwords(mut self, stopwords: &'a HashSet<String>) -> Self {
        self.stopwords = Some(stopwords);
        self
    }

    pub fn lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    fn classify(&self, raw: String) -> Token {
        match self.stopwords {
            Some(stopwords) if stopwords.contains(&raw) => Token::Stopword(raw),
            _ => Token::Word(raw),
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        // read lines until at least one token is available or the reader is drained
        while self.pending.is_empty() && !self.done {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                self.done = true;
                break;
            }
            let lowercase = self.lowercase;
            self.pending.extend(self.line.split_whitespace().map(|tok| {
                if lowercase { tok.to_lowercase() } else { tok.to_string() }
            }));
        }
        Ok(())
    }
}

impl<'a, R: BufRead> Iterator for TokenStream<'a, R> {
    type Item = io::Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.fill() {
            self.done = true;
            self.pending.clear();
            return Some(Err(e));
        }
        let raw = self.pending.pop_front()?;
        Some(Ok(self.classify(raw)))
    }
}


/// Tokenizes an in-memory document, flagging stopwords.
pub fn tokenize(text: &str, stopwords: Option<&HashSet<String>>) -> Vec<Token> {
    text.split_whitespace().map(|tok| {
        match stopwords {
            Some(stop) if stop.contains(tok) => Token::stopword(tok),
            _ => Token::word(tok),
        }
    }).collect()
}


// imports
use crate::compound::CompoundRecognizer;
use crate::cooccurrence::{ContextModel, Weighting};
use crate::error::{SpaceError, SpaceResult};
use crate::reduce::ColumnRetention;
use crate::svd::SubspaceIteration;
use crate::transform::TransformKind;

use std::collections::HashSet;
use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;


pub const DEFAULT_MAX_WORDS: usize = 15000;
pub const DEFAULT_MAX_DIMENSIONS: usize = 14000;
pub const DEFAULT_REDUCED_DIMENSIONS: usize = 800;


#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    Coals,
    Hal,
    Lsa,
    /// the term-document space of `Lsa` without the factorization
    Vsm,
}

impl ModelKind {
    /// Models whose features are documents rather than context words.
    pub fn counts_documents(&self) -> bool {
        matches!(self, ModelKind::Lsa | ModelKind::Vsm)
    }
}


/// Parameters of one run, read from a json file. Every field but `corpus_file` has
/// a default, and the model-dependent ones stay `None` until asked for.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub corpus_file: String,
    pub compounds_file: Option<String>,
    pub stopwords_file: Option<String>,
    pub model: ModelKind,
    pub window_size: Option<usize>,
    pub weighting: Weighting,
    pub max_words: Option<usize>,
    pub max_dimensions: usize,
    pub transform: Option<TransformKind>,
    pub reduce: bool,
    pub reduced_dimensions: usize,
    pub scale_by_singular_values: bool,
    pub retain_columns: Option<usize>,
    pub entropy_threshold: Option<f64>,
    pub retain_document_space: bool,
    pub num_threads: usize,
    pub lowercase: bool,
    pub svd_iterations: usize,
    pub svd_oversample: usize,
    pub svd_seed: u64,
    pub save_statistics: Option<String>,
    pub load_statistics: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let solver = SubspaceIteration::default();
        Config {
            corpus_file: String::new(),
            compounds_file: None,
            stopwords_file: None,
            model: ModelKind::Coals,
            window_size: None,
            weighting: Weighting::Ramp,
            max_words: None,
            max_dimensions: DEFAULT_MAX_DIMENSIONS,
            transform: None,
            reduce: false,
            reduced_dimensions: DEFAULT_REDUCED_DIMENSIONS,
            scale_by_singular_values: false,
            retain_columns: None,
            entropy_threshold: None,
            retain_document_space: false,
            num_threads: 4,
            lowercase: true,
            svd_iterations: solver.iterations,
            svd_oversample: solver.oversample,
            svd_seed: solver.seed,
            save_statistics: None,
            load_statistics: None,
        }
    }
}

impl Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "using parameters:
        corpus_file: {}
        compounds_file: {:?}
        stopwords_file: {:?}
        model: {:?}
        window_size: {}
        weighting: {:?}
        max_words: {}
        max_dimensions: {}
        transform: {}
        reduce: {} to {} dimensions
        save_statistics: {:?}
        load_statistics: {:?}
        num_threads: {}",
        self.corpus_file, self.compounds_file, self.stopwords_file, self.model, self.window(),
        self.weighting, self.max_words(), self.max_dimensions, self.transform_kind(),
        self.use_reduction(), self.rank(), self.save_statistics, self.load_statistics, self.num_threads)
    }
}

impl Config {

    /// Expects the program name followed by the path of a json file.
    pub fn new(args: &[String]) -> SpaceResult<Config> {
        if args.len() != 2 {
            return Err(SpaceError::config("input should be a path to json file only"))
        }
        Config::from_file(&args[1])
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> SpaceResult<Config> {
        let f = BufReader::new(File::open(path)?);
        let config: Config = serde_json::from_reader(f)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> SpaceResult<Config> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects contradictory or unusable parameters before anything is read.
    pub fn validate(&self) -> SpaceResult<()> {
        if self.corpus_file.is_empty() {
            return Err(SpaceError::config("corpus_file was not supplied through json"))
        }
        if !self.model.counts_documents() && self.window() == 0 {
            return Err(SpaceError::config("window_size must be at least 1"))
        }
        if self.num_threads == 0 {
            return Err(SpaceError::config("num_threads must be at least 1"))
        }
        if self.retain_columns.is_some() && self.entropy_threshold.is_some() {
            return Err(SpaceError::config("retain_columns and entropy_threshold can not be set together"))
        }
        if (self.retain_columns.is_some() || self.entropy_threshold.is_some()) && self.model != ModelKind::Hal {
            return Err(SpaceError::config("entropy based column retention only applies to the hal model"))
        }
        if let Some(t) = self.entropy_threshold {
            if !t.is_finite() {
                return Err(SpaceError::config("entropy_threshold must be a finite number"))
            }
        }
        if self.retain_document_space && self.model != ModelKind::Lsa {
            return Err(SpaceError::config("retain_document_space only applies to the lsa model"))
        }
        if self.reduce && self.model == ModelKind::Vsm {
            return Err(SpaceError::config("the vsm model is never reduced, use lsa instead"))
        }
        if self.save_statistics.is_some() && self.load_statistics.is_some() {
            return Err(SpaceError::config("save_statistics and load_statistics can not be set together"))
        }
        if self.load_statistics.is_some() && self.model.counts_documents() && self.transform_kind() == TransformKind::Correlation {
            return Err(SpaceError::config("column statistics of documents can not be reused by another corpus"))
        }
        Ok(())
    }

    pub fn window(&self) -> usize {
        match (self.window_size, self.model) {
            (Some(w), _) => w,
            (None, ModelKind::Hal) => 5,
            (None, _) => 4,
        }
    }

    pub fn transform_kind(&self) -> TransformKind {
        match (self.transform, self.model) {
            (Some(kind), _) => kind,
            (None, ModelKind::Coals) => TransformKind::Correlation,
            (None, ModelKind::Hal) => TransformKind::Identity,
            (None, ModelKind::Lsa | ModelKind::Vsm) => TransformKind::LogTfIdf,
        }
    }

    /// Row cap. Only COALS caps by default, the other models keep every word.
    pub fn max_words(&self) -> usize {
        match (self.max_words, self.model) {
            (Some(n), _) => n,
            (None, ModelKind::Coals) => DEFAULT_MAX_WORDS,
            (None, _) => 0,
        }
    }

    /// LSA always factorizes.
    pub fn use_reduction(&self) -> bool {
        self.reduce || self.model == ModelKind::Lsa
    }

    pub fn rank(&self) -> usize {
        if self.reduced_dimensions == 0 { DEFAULT_REDUCED_DIMENSIONS } else { self.reduced_dimensions }
    }

    pub fn context_model(&self) -> ContextModel {
        match self.model {
            ModelKind::Coals => ContextModel::Symmetric { window: self.window(), weighting: self.weighting },
            ModelKind::Hal => ContextModel::Directional { window: self.window(), weighting: self.weighting },
            ModelKind::Lsa | ModelKind::Vsm => ContextModel::Document,
        }
    }

    pub fn column_retention(&self) -> ColumnRetention {
        match (self.retain_columns, self.entropy_threshold) {
            (Some(n), _) => ColumnRetention::Top(n),
            (None, Some(t)) => ColumnRetention::Threshold(t),
            (None, None) => ColumnRetention::All,
        }
    }

    pub fn thread_pool(&self) -> SpaceResult<ThreadPool> {
        ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
            .map_err(|e| SpaceError::config(format!("cannot build a pool of {} threads: {}", self.num_threads, e)))
    }

    pub fn solver(&self) -> SubspaceIteration {
        SubspaceIteration {
            iterations: self.svd_iterations,
            oversample: self.svd_oversample,
            seed: self.svd_seed,
        }
    }

    pub fn read_compounds(&self) -> SpaceResult<Option<CompoundRecognizer>> {
        match &self.compounds_file {
            Some(path) => {
                let recognizer = CompoundRecognizer::from_reader(BufReader::new(File::open(path)?), self.lowercase)?;
                Ok(Some(recognizer))
            },
            None => Ok(None),
        }
    }

    pub fn read_stopwords(&self) -> SpaceResult<Option<HashSet<String>>> {
        let path = match &self.stopwords_file {
            Some(path) => path,
            None => return Ok(None),
        };
        let mut stopwords = HashSet::new();
        for line in BufReader::new(File::open(path)?).lines() {
            let line = line?;
            let word = line.trim();
            if !word.is_empty() {
                stopwords.insert(if self.lowercase { word.to_lowercase() } else { word.to_string() });
            }
        }
        debug!("loaded {} stopwords", stopwords.len());
        Ok(Some(stopwords))
    }

    /// The corpus, one document per line.
    pub fn read_corpus(&self) -> SpaceResult<Lines<BufReader<File>>> {
        let f = File::open(&self.corpus_file)?;
        Ok(BufReader::new(f).lines())
    }
}

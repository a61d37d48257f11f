
// imports
use crate::compound::CompoundRecognizer;
use crate::config::{Config, ModelKind};
use crate::cooccurrence::Accumulator;
use crate::error::{SpaceError, SpaceResult};
use crate::projection::Projector;
use crate::reduce::{build_matrix, build_matrix_with_layout, retain_columns, TermMatrices};
use crate::space::{SemanticSpace, TermVectors};
use crate::sparse::SparseRows;
use crate::statistics::SpaceStatistics;
use crate::svd::SvdSolver;
use crate::tokens::{tokenize, Token};
use crate::transform::Transform;

use std::borrow::Cow;
use std::collections::HashSet;
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use rayon::prelude::*;
use tracing::{debug, info, warn};


/// One run of space construction: documents are fed in, possibly from many threads,
/// then `process_space` turns the counts into a `SemanticSpace` exactly once.
pub struct Pipeline {
    config: Config,
    stopwords: Option<HashSet<String>>,
    solver: Box<dyn SvdSolver>,
    statistics: Option<SpaceStatistics>,
    accumulator: Option<Accumulator>,
}

impl Pipeline {

    pub fn new(config: Config, recognizer: Option<CompoundRecognizer>, stopwords: Option<HashSet<String>>) -> SpaceResult<Pipeline> {

        config.validate()?;
        // saved statistics are read up front so a bad file fails before any counting
        let statistics = match &config.load_statistics {
            Some(path) => {
                let statistics = SpaceStatistics::load(path)?;
                statistics.check(config.model, config.transform_kind())?;
                Some(statistics)
            },
            None => None,
        };
        let recognizer = recognizer.filter(|r| !r.is_empty()).map(Arc::new);
        let accumulator = Accumulator::new(config.context_model(), recognizer);
        let solver = Box::new(config.solver());
        Ok(Pipeline { config, stopwords, solver, statistics, accumulator: Some(accumulator) })
    }

    /// Builds a pipeline with the compounds and stopwords named in `config`.
    pub fn from_config(config: Config) -> SpaceResult<Pipeline> {
        let recognizer = config.read_compounds()?;
        let stopwords = config.read_stopwords()?;
        Pipeline::new(config, recognizer, stopwords)
    }

    /// Replaces the default factorization routine.
    pub fn with_solver(mut self, solver: Box<dyn SvdSolver>) -> Pipeline {
        self.solver = solver;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn accumulator(&self) -> SpaceResult<&Accumulator> {
        self.accumulator.as_ref().ok_or_else(|| SpaceError::invalid_state("the space was already processed"))
    }

    /// Counts one document. Safe to call from several threads at once.
    pub fn process_document<R: BufRead>(&self, reader: R) -> SpaceResult<()> {
        self.accumulator()?.process_reader(reader, self.stopwords.as_ref(), self.config.lowercase)
    }

    fn tokens(&self, text: &str) -> Vec<Token> {
        let text = if self.config.lowercase { Cow::Owned(text.to_lowercase()) } else { Cow::Borrowed(text) };
        tokenize(&text, self.stopwords.as_ref())
    }

    pub fn process_text(&self, text: &str) -> SpaceResult<()> {
        let accumulator = self.accumulator()?;
        accumulator.process_tokens(&self.tokens(text))
    }

    /// Counts in-memory documents on the current rayon pool.
    pub fn process_documents<I, D>(&self, documents: I) -> SpaceResult<()>
    where
        I: IntoParallelIterator<Item = D>,
        D: AsRef<str>,
    {
        documents.into_par_iter().try_for_each(|doc| self.process_text(doc.as_ref()))
    }

    /// Counts a line-per-document stream. Lines are read and numbered in order but
    /// counted in parallel, and document `i` is the `i`-th non-blank line. The first
    /// read error stops the run.
    pub fn process_corpus<I>(&self, lines: I) -> SpaceResult<usize>
    where
        I: Iterator<Item = io::Result<String>> + Send,
    {
        let accumulator = self.accumulator()?;
        let processed = AtomicUsize::new(0);
        let mut empty = 0;
        let documents = lines
            .filter(|line| match line {
                Ok(text) if text.trim().is_empty() => {
                    empty += 1;
                    false
                },
                _ => true,
            })
            .enumerate();
        documents.par_bridge().try_for_each(|(ordinal, line)| {
            accumulator.process_numbered(ordinal, &self.tokens(&line?))?;
            processed.fetch_add(1, Ordering::Relaxed);
            Ok::<(), SpaceError>(())
        })?;

        if empty > 0 {
            warn!("skipped {} empty corpus lines", empty);
        }
        Ok(processed.into_inner())
    }

    /// Builds the final space. Must be called once, after every document was counted.
    pub fn process_space(&mut self) -> SpaceResult<SemanticSpace> {

        let accumulator = self.accumulator.take()
            .ok_or_else(|| SpaceError::invalid_state("process_space can only be called once"))?;

        let counts = accumulator.finish();
        info!("counted {} documents with {} words and {} compounds", counts.documents, counts.words.len(), counts.compounds.len());
        debug!("processing the space on {} threads", rayon::current_num_threads());

        let (matrices, transform) = match self.statistics.take() {
            // the saved layout already carries any column cut
            Some(statistics) => {
                let matrices = build_matrix_with_layout(counts, &statistics.words, &statistics.features)?;
                (matrices, statistics.transform)
            },
            None => {
                let mut matrices = build_matrix(counts, self.config.max_words(), self.config.max_dimensions)?;
                if self.config.model == ModelKind::Hal {
                    matrices = retain_columns(matrices, self.config.column_retention())?;
                }
                // fitted on the reduced word rows only and reused as is for the compounds
                let transform = Transform::fit(self.config.transform_kind(), &matrices.word_rows);
                (matrices, transform)
            },
        };
        let TermMatrices { words, compounds, word_rows, compound_rows, labels, .. } = matrices;
        let features = word_rows.columns();

        let word_matrix = transform.transform(&word_rows);
        let compound_matrix = transform.transform_held_out(&compound_rows);
        debug!("applied {} to {} word and {} compound rows", transform.kind(), word_matrix.rows(), compound_matrix.rows());

        if let Some(path) = &self.config.save_statistics {
            let statistics = SpaceStatistics {
                model: self.config.model,
                words: words.terms_by_index(),
                features: labels,
                transform,
            };
            statistics.save(path)?;
        }

        let name = self.space_name(features);
        let space = if self.config.use_reduction() {
            let rank = self.config.rank();
            let timer = Instant::now();
            let factors = self.solver.factorize(&word_matrix, rank)?;
            debug!("factorized {}x{} to rank {} in {} ms", word_matrix.rows(), word_matrix.columns(), rank, timer.elapsed().as_millis());

            let projector = Projector::new(factors, self.config.scale_by_singular_values)?;
            let compound_vectors = projector.project_rows(&compound_matrix)?;
            let space = SemanticSpace::new(name, words, compounds,
                TermVectors::Dense(projector.word_space()),
                TermVectors::Dense(compound_vectors))?;
            if self.config.retain_document_space {
                space.with_documents(projector.column_space())
            } else {
                space
            }
        } else {
            SemanticSpace::new(name, words, compounds, TermVectors::Sparse(word_matrix), TermVectors::Sparse(compound_matrix))?
        };

        info!("built {} with {} words, {} compounds and vectors of length {}",
            space.space_name(), space.word_count(), space.compound_count(), space.vector_length());
        Ok(space)
    }

    /// Name encoding the parameters that shape the space.
    pub fn space_name(&self, features: usize) -> String {
        let config = &self.config;
        let reduced = if config.use_reduction() { format!("_D{}", config.rank()) } else { String::new() };
        match config.model {
            ModelKind::Coals => format!("COALS_M{}_N{}{}", config.max_words(), config.max_dimensions, reduced),
            ModelKind::Hal => format!("HAL_W{}_R{}{}", config.window(), features, reduced),
            ModelKind::Lsa => format!("LSA_D{}_{}", config.rank(), config.transform_kind()),
            ModelKind::Vsm => format!("VSM_{}", config.transform_kind()),
        }
    }

    /// Reads everything named in `config`, then counts the corpus and builds the
    /// space on a pool of `num_threads` workers.
    pub fn run(config: Config) -> SpaceResult<SemanticSpace> {

        info!("{}", config);
        let pool = config.thread_pool()?;

        let mut pipeline = Pipeline::from_config(config)?;
        let timer = Instant::now();
        info!("starting co-occurrence counting...");
        let lines = pipeline.config.read_corpus()?;
        let documents = pool.install(|| pipeline.process_corpus(lines))?;
        info!("counted {} documents, took {} seconds ...", documents, timer.elapsed().as_secs());

        let timer = Instant::now();
        info!("starting space processing...");
        let space = pool.install(|| pipeline.process_space())?;
        info!("finished space processing, took {} seconds ...", timer.elapsed().as_secs());
        Ok(space)
    }
}

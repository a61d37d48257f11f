pub mod error;
pub mod config;
pub mod tokens;
pub mod compound;
pub mod vocabulary;
pub mod sparse;
pub mod cooccurrence;
pub mod reduce;
pub mod transform;
pub mod svd;
pub mod projection;
pub mod space;
pub mod statistics;
pub mod pipeline;

pub use error::{SpaceError, SpaceResult};
pub use config::{Config, ModelKind};
pub use tokens::{Token, TokenStream, EMPTY_TOKEN};
pub use compound::{CompoundMatch, CompoundRecognizer, Span};
pub use vocabulary::{FrequencyTable, Vocabulary};
pub use sparse::{MaskedMatrix, SparseMatrix, SparseRows, SparseVector};
pub use cooccurrence::{Accumulator, AccumulatedCounts, ContextModel, TermContext, Weighting};
pub use reduce::{build_matrix, build_matrix_with_layout, ColumnRetention, Feature, TermMatrices};
pub use transform::{Transform, TransformKind};
pub use svd::{SubspaceIteration, SvdFactors, SvdSolver};
pub use projection::Projector;
pub use space::{SemanticSpace, TermVector, TermVectors};
pub use statistics::SpaceStatistics;
pub use pipeline::Pipeline;

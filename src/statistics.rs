
// imports
use crate::config::ModelKind;
use crate::error::{SpaceError, SpaceResult};
use crate::reduce::Feature;
use crate::transform::{Transform, TransformKind};

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use serde::{Deserialize, Serialize};
use tracing::info;


/// What a fitted space leaves behind for later runs: the fitted transform, the row
/// order of the word matrix and the label of every column. A later corpus laid out
/// against it is reweighted with these statistics instead of its own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpaceStatistics {
    pub model: ModelKind,
    pub words: Vec<String>,
    pub features: Vec<Feature>,
    pub transform: Transform,
}

impl SpaceStatistics {

    pub fn save<P: AsRef<Path>>(&self, path: P) -> SpaceResult<()> {
        let mut f = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(&mut f, self)?;
        f.flush()?;
        info!("saved statistics of {} words and {} features to {}", self.words.len(), self.features.len(), path.as_ref().display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> SpaceResult<SpaceStatistics> {
        let f = BufReader::new(File::open(path.as_ref())?);
        let statistics: SpaceStatistics = serde_json::from_reader(f)?;
        info!("loaded statistics of {} words and {} features from {}", statistics.words.len(), statistics.features.len(), path.as_ref().display());
        Ok(statistics)
    }

    /// Statistics only apply to a run of the same model and transform.
    pub fn check(&self, model: ModelKind, kind: TransformKind) -> SpaceResult<()> {
        if self.model != model {
            return Err(SpaceError::config(format!("statistics were saved by a {:?} space, not {:?}", self.model, model)))
        }
        if self.transform.kind() != kind {
            return Err(SpaceError::config(format!("statistics were saved with {}, not {}", self.transform.kind(), kind)))
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {

    use tempfile::NamedTempFile;
    use crate::config::ModelKind;
    use crate::error::SpaceError;
    use crate::reduce::Feature;
    use crate::sparse::{SparseMatrix, SparseVector};
    use crate::transform::{Transform, TransformKind};
    use super::SpaceStatistics;

    fn fitted() -> SpaceStatistics {
        let counts = SparseMatrix::from_rows(vec![
            SparseVector::from_pairs(vec![(0, 2.0), (1, 1.0)]),
            SparseVector::from_pairs(vec![(0, 1.0)]),
        ], 2);
        SpaceStatistics {
            model: ModelKind::Coals,
            words: vec!["sat".to_string(), "mat".to_string()],
            features: vec![Feature::Word("sat".to_string()), Feature::Word("mat".to_string())],
            transform: Transform::fit(TransformKind::Correlation, &counts),
        }
    }

    #[test]
    fn saved_statistics_load_back() {
        let file = NamedTempFile::new().unwrap();
        let statistics = fitted();
        statistics.save(file.path()).unwrap();
        assert_eq!(SpaceStatistics::load(file.path()).unwrap(), statistics);
    }

    #[test]
    fn mismatched_runs_are_rejected() {
        let statistics = fitted();
        assert!(statistics.check(ModelKind::Coals, TransformKind::Correlation).is_ok());
        assert!(matches!(statistics.check(ModelKind::Hal, TransformKind::Correlation), Err(SpaceError::Config(_))));
        assert!(matches!(statistics.check(ModelKind::Coals, TransformKind::LogTfIdf), Err(SpaceError::Config(_))));
        assert!(matches!(SpaceStatistics::load("/no/such/statistics.json"), Err(SpaceError::Io(_))));
    }
}

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::ArtifactKind;
use crate::space::SpacePair;

/// A transform file in a subject's registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformArtifact {
    pub pair: SpacePair,
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

/// Result of one producer run on one subject.
#[derive(Debug)]
pub enum Outcome {
    /// Every listed artifact exists.
    Completed(Vec<TransformArtifact>),
    /// A precondition was not met; nothing was attempted.
    Skipped(String),
    Failed(Error),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn artifacts(&self) -> &[TransformArtifact] {
        match self {
            Outcome::Completed(artifacts) => artifacts,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<Result<Vec<TransformArtifact>>> for Outcome {
    fn from(result: Result<Vec<TransformArtifact>>) -> Self {
        match result {
            Ok(artifacts) => Outcome::Completed(artifacts),
            Err(err) => Outcome::Failed(err),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Completed(artifacts) => write!(f, "completed ({} artifacts)", artifacts.len()),
            Outcome::Skipped(reason) => write!(f, "skipped: {}", reason),
            Outcome::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::Space;

    #[test]
    fn result_converts_to_outcome() {
        let artifact = TransformArtifact {
            pair: SpacePair::new(Space::Hr, Space::Std),
            kind: ArtifactKind::Linear,
            path: PathBuf::from("mpr/reg/hr2std.mat"),
        };

        let done = Outcome::from(Ok(vec![artifact.clone()]));
        assert!(done.is_completed());
        assert_eq!(done.artifacts(), [artifact]);
        assert_eq!(done.to_string(), "completed (1 artifacts)");

        let failed = Outcome::from(Err(Error::EmptyRoiList));
        assert!(failed.is_failed());
        assert!(failed.artifacts().is_empty());
        assert!(matches!(failed.error(), Some(Error::EmptyRoiList)));

        let skipped = Outcome::Skipped("no t1".to_string());
        assert!(skipped.is_skipped());
        assert_eq!(skipped.to_string(), "skipped: no t1");
    }
}

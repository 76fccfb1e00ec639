//! Per-subject transform registry.
//!
//! [`SubjectTransforms`] knows where every artifact of every registered pair
//! lives, computes them through the producers, and moves ROIs between spaces.

mod coreg;
mod producers;
mod roi;

use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use log::warn;

pub use coreg::{CoregCheck, CoregSummary};
pub use roi::{PathType, RoiRequest};

use crate::error::{Error, Result};
use crate::fsl::Fsl;
use crate::graph::{owner, ArtifactKind, TransformGraph};
use crate::image::Image;
use crate::space::{Space, SpacePair};
use crate::subject::Subject;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransformOptions {
    pub overwrite: bool,
    /// Seed non-linear registration with a whole-head affine.
    pub usehead_nl: bool,
    /// Register dti to standard through hr only, even when t2 is available.
    pub ignore_t2: bool,
    /// Command log; relative paths are resolved against the subject folder.
    pub log: Option<PathBuf>,
}

/// Transform to use for a pair, and the image defining the target grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lookup {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub reference: Image,
}

#[derive(Debug, Clone)]
pub struct SubjectTransforms {
    subject: Subject,
    fsl: Fsl,
    registry: HashMap<(SpacePair, ArtifactKind), PathBuf>,
}

impl SubjectTransforms {
    /// Paths follow from the subject layout alone; nothing is read from disk.
    pub fn new(subject: Subject, fsl: Fsl) -> Self {
        let graph = TransformGraph::shared();
        let mut registry = HashMap::with_capacity(graph.len() * 2);

        for edge in graph.edges() {
            let dir = subject.reg_dir(owner(edge.pair));
            let stem = edge.pair.stem();
            registry.insert(
                (edge.pair, ArtifactKind::Linear),
                dir.join(format!("{}.mat", stem)),
            );
            if edge.has_warp {
                registry.insert(
                    (edge.pair, ArtifactKind::NonLinear),
                    dir.join(format!("{}_warp.nii.gz", stem)),
                );
            }
        }

        SubjectTransforms {
            subject,
            fsl,
            registry,
        }
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn fsl(&self) -> &Fsl {
        &self.fsl
    }

    /// `None` for unregistered pairs and for warps of degenerate pairs.
    pub fn artifact(&self, pair: SpacePair, kind: ArtifactKind) -> Option<&Path> {
        self.registry.get(&(pair, kind)).map(PathBuf::as_path)
    }

    pub fn registered_pairs(&self) -> Vec<SpacePair> {
        let mut pairs: Vec<SpacePair> = TransformGraph::shared()
            .edges()
            .map(|edge| edge.pair)
            .collect();
        pairs.sort();
        pairs
    }

    pub(crate) fn mat(&self, from: Space, to: Space) -> PathBuf {
        let pair = SpacePair::new(from, to);
        self.artifact(pair, ArtifactKind::Linear)
            .unwrap_or_else(|| panic!("No linear artifact for {}", pair))
            .to_path_buf()
    }

    pub(crate) fn warp(&self, from: Space, to: Space) -> Image {
        let pair = SpacePair::new(from, to);
        let path = self
            .artifact(pair, ArtifactKind::NonLinear)
            .unwrap_or_else(|| panic!("No warp for {}", pair));
        Image::new(path)
    }

    /// Whole-head affine used to initialise non-linear registration.
    pub fn head_mat(&self, from: Space, to: Space) -> PathBuf {
        let pair = SpacePair::new(from, to);
        self.subject
            .reg_dir(owner(pair))
            .join(format!("{}_head.mat", pair.stem()))
    }

    pub fn linear(&self, pair: SpacePair) -> Result<Lookup> {
        let path = self
            .artifact(pair, ArtifactKind::Linear)
            .ok_or_else(|| Error::UnknownRegistration(pair.key()))?;
        Ok(Lookup {
            kind: ArtifactKind::Linear,
            path: path.to_path_buf(),
            reference: self.subject.anchor(pair.to).clone(),
        })
    }

    /// Degenerate pairs have no warp and resolve to their matrix.
    pub fn non_linear(&self, pair: SpacePair) -> Result<Lookup> {
        match self.artifact(pair, ArtifactKind::NonLinear) {
            Some(path) => Ok(Lookup {
                kind: ArtifactKind::NonLinear,
                path: path.to_path_buf(),
                reference: self.subject.anchor(pair.to).clone(),
            }),
            None => {
                let lookup = self.linear(pair)?;
                warn!(
                    "{}: no non-linear transform for {}, using the linear one",
                    self.subject.label, pair
                );
                Ok(lookup)
            }
        }
    }

    pub(crate) fn log_path(&self, options: &TransformOptions) -> Option<PathBuf> {
        options.log.as_ref().map(|log| {
            if log.is_absolute() {
                log.clone()
            } else {
                self.subject.dir.join(log)
            }
        })
    }
}

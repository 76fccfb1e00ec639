//! Visual coregistration check: every participating space's reference image
//! moved into every other participating space, linearly and non-linearly.

use std::path::{Path, PathBuf};

use common::file_utils::image_files;
use log::info;
use strum::IntoEnumIterator;

use crate::error::{Error, Result};
use crate::image::Image;
use crate::space::{RegistrationKey, Space, SpacePair};
use crate::transforms::{PathType, RoiRequest, SubjectTransforms};

const MODES: [(&str, bool); 2] = [("linear", true), ("nonlinear", false)];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoregCheck {
    pub test_dir: PathBuf,
    /// Also bring standard-space images back into the native spaces.
    pub extended: bool,
    /// Restricts the check to these spaces; all available ones otherwise.
    pub spaces: Option<Vec<Space>>,
    pub overwrite: bool,
}

impl CoregCheck {
    pub fn new(test_dir: impl Into<PathBuf>) -> Self {
        CoregCheck {
            test_dir: test_dir.into(),
            extended: false,
            spaces: None,
            overwrite: false,
        }
    }

    /// Restricts the check to the named spaces.
    pub fn with_space_names(mut self, names: &[&str]) -> Result<Self> {
        let spaces = names
            .iter()
            .map(|name| Space::parse(name))
            .collect::<Result<Vec<_>>>()?;
        self.spaces = Some(spaces);
        Ok(self)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoregSummary {
    pub produced: Vec<Image>,
    /// Pairs with no route between them.
    pub skipped: Vec<SpacePair>,
}

fn mode_dir(test_dir: &Path, linear: bool, space: Space) -> PathBuf {
    let mode = if linear { "linear" } else { "nonlinear" };
    test_dir.join(mode).join(space.as_str())
}

impl SubjectTransforms {
    fn participating_spaces(&self, check: &CoregCheck) -> Vec<Space> {
        Space::iter()
            .filter(|space| {
                check
                    .spaces
                    .as_ref()
                    .map_or(true, |spaces| spaces.contains(space))
            })
            .filter(|space| self.subject.has_space(*space))
            .collect()
    }

    pub fn test_all_coregistration(&self, check: &CoregCheck) -> Result<CoregSummary> {
        let spaces = self.participating_spaces(check);
        let mut summary = CoregSummary::default();

        for &to in &spaces {
            let anchor = self.subject.anchor(to);
            for (_, linear) in MODES {
                let dir = mode_dir(&check.test_dir, linear, to);
                std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
                let copy = anchor.in_dir(&dir);
                if check.overwrite || !copy.exist() {
                    anchor.cp(&self.fsl, &copy, None)?;
                }
            }

            for &from in &spaces {
                if from == to || (from.is_standard() && !to.is_standard() && !check.extended) {
                    continue;
                }
                let pair = SpacePair::new(from, to);
                let key = match RegistrationKey::for_pair(pair) {
                    Ok(key) => key,
                    Err(_) => {
                        summary.skipped.push(pair);
                        continue;
                    }
                };

                let source = self.subject.anchor(from).path();
                for (mode, linear) in MODES {
                    let request = RoiRequest::new(key, [source.to_string_lossy()])
                        .path_type(PathType::Abs)
                        .outdir(mode_dir(&check.test_dir, linear, to))
                        .outname(pair.stem())
                        .linear(linear)
                        .overwrite(check.overwrite);
                    info!("{}: {} check of {}", self.subject.label, mode, pair);
                    summary.produced.extend(self.transform_roi(&request)?);
                }
            }
        }

        Ok(summary)
    }

    /// Opens the viewer on one folder of the check without waiting for it.
    pub fn view_space_images(&self, test_dir: &Path, space: Space, linear: bool) -> Result<()> {
        let dir = mode_dir(test_dir, linear, space);
        let images = image_files(&dir).map_err(|e| Error::io(&dir, e))?;
        if images.is_empty() {
            return Err(Error::MissingImage(dir));
        }
        self.fsl.view(&images)
    }
}

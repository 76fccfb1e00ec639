//! Moving ROIs between spaces.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::config::Interp;
use crate::error::{Error, Result};
use crate::graph::ArtifactKind;
use crate::image::Image;
use crate::space::{RegistrationKey, Space};
use crate::transforms::SubjectTransforms;

/// How the entries of [`RoiRequest::rois`] are located.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PathType {
    /// Names inside the `reg_<from>` ROI folder.
    #[default]
    Standard,
    /// Paths relative to the subject folder.
    Rel,
    /// Paths used as given.
    Abs,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RoiRequest {
    pub key: RegistrationKey,
    pub path_type: PathType,
    pub outdir: Option<PathBuf>,
    /// Output name, only valid for a single ROI.
    pub outname: Option<String>,
    /// Binarize at this value when positive.
    pub threshold: f32,
    pub islin: bool,
    /// Defaults to the configured interpolation.
    pub interp: Option<Interp>,
    pub report: Option<PathBuf>,
    pub overwrite: bool,
    pub log: Option<PathBuf>,
    pub rois: Vec<String>,
}

impl RoiRequest {
    pub fn new<I, S>(key: RegistrationKey, rois: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RoiRequest {
            key,
            path_type: PathType::default(),
            outdir: None,
            outname: None,
            threshold: 0.0,
            islin: true,
            interp: None,
            report: None,
            overwrite: false,
            log: None,
            rois: rois.into_iter().map(Into::into).collect(),
        }
    }

    /// Same as [`RoiRequest::new`] with a `<from>TO<to>` key.
    pub fn parse<I, S>(key: &str, rois: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::new(key.parse()?, rois))
    }

    pub fn path_type(mut self, path_type: PathType) -> Self {
        self.path_type = path_type;
        self
    }

    pub fn outdir(mut self, outdir: impl Into<PathBuf>) -> Self {
        self.outdir = Some(outdir.into());
        self
    }

    pub fn outname(mut self, outname: impl Into<String>) -> Self {
        self.outname = Some(outname.into());
        self
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn linear(mut self, islin: bool) -> Self {
        self.islin = islin;
        self
    }

    pub fn interp(mut self, interp: Interp) -> Self {
        self.interp = Some(interp);
        self
    }

    pub fn report(mut self, report: impl Into<PathBuf>) -> Self {
        self.report = Some(report.into());
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn log(mut self, log: impl Into<PathBuf>) -> Self {
        self.log = Some(log.into());
        self
    }

    fn validate(&self) -> Result<()> {
        self.key.validate()?;
        if self.rois.is_empty() {
            return Err(Error::EmptyRoiList);
        }
        if let Some(outdir) = &self.outdir {
            if !outdir.is_dir() {
                return Err(Error::InvalidOutputDir(outdir.clone()));
            }
        }
        if self.outname.is_some() && self.rois.len() > 1 {
            return Err(Error::InvalidConfig(format!(
                "outname given for {} ROIs",
                self.rois.len()
            )));
        }
        Ok(())
    }
}

fn append_report(report: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(report)
        .map_err(|e| Error::io(report, e))?;
    writeln!(file, "{}", line).map_err(|e| Error::io(report, e))
}

impl SubjectTransforms {
    /// Moves every ROI of the request into the target space and returns the
    /// outputs in request order.
    pub fn transform_roi(&self, request: &RoiRequest) -> Result<Vec<Image>> {
        request.validate()?;

        let from = request.key.from_space();
        let to = request.key.to_space();
        let inputs = request
            .rois
            .iter()
            .map(|roi| self.resolve_roi(request.path_type, from, roi))
            .collect::<Result<Vec<_>>>()?;

        let outdir = match &request.outdir {
            Some(outdir) => outdir.clone(),
            None => {
                let dir = self.subject.roi_dir.join(format!("reg_{}", to));
                std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
                dir
            }
        };

        let log = request.log.as_ref().map(|log| {
            if log.is_absolute() {
                log.clone()
            } else {
                self.subject.dir.join(log)
            }
        });
        let log = log.as_deref();
        let interp = request
            .interp
            .unwrap_or(self.fsl.config().registration.interp);

        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            let name = match &request.outname {
                Some(outname) => outname.clone(),
                None => format!("{}_{}", input.name(), to),
            };
            let output = Image::new(outdir.join(name));

            self.apply_key(request, &input, &output, interp, log)?;

            if request.threshold > 0.0 {
                output.binarize(&self.fsl, request.threshold, &output, log)?;
                let voxels = output.nvoxels(&self.fsl, log)?;
                let line = if voxels == 0 {
                    warn!("{}: {} is empty", self.subject.label, output);
                    format!("{} : EMPTY MASK", output)
                } else {
                    format!("{} : {} voxels", output, voxels)
                };
                if let Some(report) = &request.report {
                    append_report(report, &line)?;
                }
            }

            outputs.push(output);
        }

        Ok(outputs)
    }

    fn resolve_roi(&self, path_type: PathType, from: Space, roi: &str) -> Result<Image> {
        let image = match path_type {
            PathType::Standard => {
                let base = if from.is_standard() {
                    &self.subject.project_roi_dir
                } else {
                    &self.subject.roi_dir
                };
                Image::new(base.join(format!("reg_{}", from)).join(roi))
            }
            PathType::Rel => Image::new(self.subject.dir.join(roi)),
            PathType::Abs => Image::new(roi),
        };

        if image.exist() {
            Ok(image)
        } else {
            Err(Error::RoiNotFound(image.cpath()))
        }
    }

    fn apply_key(
        &self,
        request: &RoiRequest,
        input: &Image,
        output: &Image,
        interp: Interp,
        log: Option<&Path>,
    ) -> Result<Image> {
        let overwrite = request.overwrite;
        let pair = match request.key {
            RegistrationKey::Resample(pair) => {
                let template = self.subject.anchor(pair.to);
                let voxel_mm = pair
                    .to
                    .template_voxel_mm()
                    .ok_or_else(|| Error::UnknownRegistration(request.key.to_string()))?;
                let identity = self.subject.reg_dir(Space::Std).join("ident.mat");
                return self.fsl.check_apply_iso(
                    output, input, template, &identity, voxel_mm, interp, overwrite, log,
                );
            }
            RegistrationKey::Registered(pair) => pair,
        };

        let lookup = if request.islin {
            self.linear(pair)?
        } else {
            let lookup = self.non_linear(pair)?;
            if lookup.kind == ArtifactKind::NonLinear && !Image::new(&lookup.path).exist() {
                info!(
                    "{}: {} missing, falling back to the linear transform",
                    self.subject.label,
                    lookup.path.display()
                );
                self.linear(pair)?
            } else {
                lookup
            }
        };

        match lookup.kind {
            ArtifactKind::Linear => self.fsl.check_apply_mat(
                output,
                input,
                &lookup.reference,
                &lookup.path,
                interp,
                overwrite,
                log,
            ),
            ArtifactKind::NonLinear => self.fsl.check_apply_warp(
                output,
                input,
                &lookup.reference,
                &Image::new(&lookup.path),
                interp,
                overwrite,
                log,
            ),
        }
    }
}

//! Producers: estimate, compose and invert the artifacts of one cluster of
//! spaces. Every step is skipped when its output already exists.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::Result;
use crate::graph::ArtifactKind;
use crate::image::Image;
use crate::outcome::{Outcome, TransformArtifact};
use crate::space::{Space, SpacePair};
use crate::subject::{TemplateCheck, TemplateImages};
use crate::transforms::{SubjectTransforms, TransformOptions};

fn linear(from: Space, to: Space, path: PathBuf) -> TransformArtifact {
    TransformArtifact {
        pair: SpacePair::new(from, to),
        kind: ArtifactKind::Linear,
        path,
    }
}

fn non_linear(from: Space, to: Space, warp: &Image) -> TransformArtifact {
    TransformArtifact {
        pair: SpacePair::new(from, to),
        kind: ArtifactKind::NonLinear,
        path: warp.cpath(),
    }
}

fn standard_targets(process_std4: bool) -> Vec<Space> {
    if process_std4 {
        vec![Space::Std, Space::Std4]
    } else {
        vec![Space::Std]
    }
}

/// Settings shared by every step of one producer run.
struct Run<'a> {
    overwrite: bool,
    log: Option<PathBuf>,
    artifacts: Vec<TransformArtifact>,
    transforms: &'a SubjectTransforms,
}

impl<'a> Run<'a> {
    fn new(transforms: &'a SubjectTransforms, options: &TransformOptions) -> Self {
        Run {
            overwrite: options.overwrite,
            log: transforms.log_path(options),
            artifacts: Vec::new(),
            transforms,
        }
    }

    fn log(&self) -> Option<&Path> {
        self.log.as_deref()
    }

    fn flirt(&mut self, from: Space, to: Space, moving: &Image, fixed: &Image, params: &[String]) -> Result<PathBuf> {
        let out = self.transforms.mat(from, to);
        let mat = self
            .transforms
            .fsl
            .check_flirt(&out, moving, fixed, params, self.overwrite, self.log())?;
        self.artifacts.push(linear(from, to, mat.clone()));
        Ok(mat)
    }

    /// Inverts the `to -> from` matrix into `from -> to`.
    fn invert(&mut self, from: Space, to: Space) -> Result<PathBuf> {
        let out = self.transforms.mat(from, to);
        let input = self.transforms.mat(to, from);
        let mat = self
            .transforms
            .fsl
            .check_invert_mat(&out, &input, self.overwrite, self.log())?;
        self.artifacts.push(linear(from, to, mat.clone()));
        Ok(mat)
    }

    /// `from -> via -> to`.
    fn concat(&mut self, from: Space, via: Space, to: Space) -> Result<PathBuf> {
        let out = self.transforms.mat(from, to);
        let mat1 = self.transforms.mat(from, via);
        let mat2 = self.transforms.mat(via, to);
        let mat = self
            .transforms
            .fsl
            .check_concat_mat(&out, &mat1, &mat2, self.overwrite, self.log())?;
        self.artifacts.push(linear(from, to, mat.clone()));
        Ok(mat)
    }

    /// Inverts the `to -> from` warp; `reference` lives in `to`.
    fn invert_warp(&mut self, from: Space, to: Space, reference: &Image) -> Result<Image> {
        let out = self.transforms.warp(from, to);
        let input = self.transforms.warp(to, from);
        let warp = self.transforms.fsl.check_invert_warp(
            &out,
            &input,
            reference,
            self.overwrite,
            self.log(),
        )?;
        self.artifacts.push(non_linear(from, to, &warp));
        Ok(warp)
    }

    fn push_warp(&mut self, from: Space, to: Space, warp: &Image) {
        self.artifacts.push(non_linear(from, to, warp));
    }
}

impl SubjectTransforms {
    fn template_images(&self, space: Space) -> &TemplateImages {
        self.subject
            .template
            .images(space)
            .unwrap_or_else(|| panic!("{} is not a template space", space))
    }

    fn precondition(&self, check: &TemplateCheck, images: &[&Image]) -> Option<String> {
        if let Some(error) = &check.error {
            return Some(error.clone());
        }
        images
            .iter()
            .find(|image| !image.exist())
            .map(|image| format!("{} is missing", image))
    }

    fn skip(&self, operation: &str, reason: String) -> Outcome {
        warn!("{}: {} skipped, {}", self.subject.label, operation, reason);
        Outcome::Skipped(reason)
    }

    fn produce<F>(&self, operation: &str, f: F) -> Outcome
    where
        F: FnOnce() -> Result<Vec<TransformArtifact>>,
    {
        info!("{}: {}", self.subject.label, operation);
        let outcome = Outcome::from(f());
        if let Outcome::Failed(err) = &outcome {
            warn!("{}: {} failed, {}", self.subject.label, operation, err);
        }
        outcome
    }

    /// Structural to standard.
    pub fn transform_mpr(&self, options: &TransformOptions) -> Outcome {
        const OP: &str = "transform_mpr";
        let s = &self.subject;
        let check = s.check_template();
        if let Some(reason) = self.precondition(&check, &[&s.t1_data, &s.t1_brain_data]) {
            return self.skip(OP, reason);
        }
        self.produce(OP, || self.run_mpr(options, check.process_std4))
    }

    fn run_mpr(&self, options: &TransformOptions, process_std4: bool) -> Result<Vec<TransformArtifact>> {
        let s = &self.subject;
        let reg = &self.fsl.config().registration;
        let usehead = options.usehead_nl || reg.usehead_nl;
        let mut run = Run::new(self, options);

        for std in standard_targets(process_std4) {
            let template = self.template_images(std);
            let hr2std = run.flirt(Space::Hr, std, &s.t1_brain_data, &template.brain, &reg.flirt_hr2std)?;
            let affine = if usehead {
                self.fsl.check_flirt(
                    &self.head_mat(Space::Hr, std),
                    &s.t1_data,
                    &template.head,
                    &reg.flirt_hr2std,
                    run.overwrite,
                    run.log(),
                )?
            } else {
                hr2std
            };
            run.invert(std, Space::Hr)?;

            let fnirt_config = match std {
                Space::Std4 => &reg.fnirt_config_std4,
                _ => &reg.fnirt_config_std,
            };
            let hr2std_warp = self.fsl.check_fnirt(
                &self.warp(Space::Hr, std),
                &s.t1_data,
                &template.head,
                &affine,
                Some(fnirt_config),
                Some(&template.mask_dil),
                run.overwrite,
                run.log(),
            )?;
            run.push_warp(Space::Hr, std, &hr2std_warp);
            run.invert_warp(std, Space::Hr, &s.t1_brain_data)?;
        }

        Ok(run.artifacts)
    }

    /// Resting-state functional to structural and standard.
    pub fn transform_rs(&self, options: &TransformOptions) -> Outcome {
        self.transform_functional(Space::Rs, options)
    }

    /// Task functional to structural and standard.
    pub fn transform_fmri(&self, options: &TransformOptions) -> Outcome {
        self.transform_functional(Space::Fmri, options)
    }

    fn transform_functional(&self, func: Space, options: &TransformOptions) -> Outcome {
        let op = match func {
            Space::Rs => "transform_rs",
            _ => "transform_fmri",
        };
        let s = &self.subject;
        let check = s.check_template();
        let examplefunc = s.anchor(func);
        if let Some(reason) = self.precondition(&check, &[examplefunc, &s.t1_brain_data]) {
            return self.skip(op, reason);
        }
        self.produce(op, || self.run_functional(func, options, check.process_std4))
    }

    fn run_functional(
        &self,
        func: Space,
        options: &TransformOptions,
        process_std4: bool,
    ) -> Result<Vec<TransformArtifact>> {
        let s = &self.subject;
        let reg = &self.fsl.config().registration;
        let examplefunc = s.anchor(func);
        let mut run = Run::new(self, options);

        let func2hr = run.flirt(func, Space::Hr, examplefunc, &s.t1_brain_data, &reg.flirt_func2hr)?;
        run.invert(Space::Hr, func)?;

        for std in standard_targets(process_std4) {
            let template = self.template_images(std);
            run.concat(func, Space::Hr, std)?;
            run.invert(std, func)?;

            let func2std_warp = self.fsl.check_convert_warp_mw(
                &self.warp(func, std),
                &func2hr,
                &self.warp(Space::Hr, std),
                &template.brain,
                run.overwrite,
                run.log(),
            )?;
            run.push_warp(func, std, &func2std_warp);
            run.invert_warp(std, func, examplefunc)?;
        }

        Ok(run.artifacts)
    }

    /// Diffusion to structural and standard, through t2 when available.
    pub fn transform_dti_t2(&self, options: &TransformOptions) -> Outcome {
        const OP: &str = "transform_dti_t2";
        let s = &self.subject;
        let check = s.check_template();
        let required = [&s.dti_nodiff_data, &s.dti_nodiff_brain_data, &s.t1_brain_data];
        if let Some(reason) = self.precondition(&check, &required) {
            return self.skip(OP, reason);
        }
        self.produce(OP, || self.run_dti_t2(options, check.process_std4))
    }

    fn run_dti_t2(&self, options: &TransformOptions, process_std4: bool) -> Result<Vec<TransformArtifact>> {
        let s = &self.subject;
        let reg = &self.fsl.config().registration;
        let use_t2 = s.has_t2() && !options.ignore_t2;
        let usehead = options.usehead_nl || reg.usehead_nl;
        let mut run = Run::new(self, options);

        let dti2hr = run.flirt(
            Space::Dti,
            Space::Hr,
            &s.dti_nodiff_brain_data,
            &s.t1_brain_data,
            &reg.flirt_dti2hr,
        )?;
        run.invert(Space::Hr, Space::Dti)?;

        let mut t2_route = None;
        if use_t2 {
            let t22hr = run.flirt(Space::T2, Space::Hr, &s.t2_brain_data, &s.t1_brain_data, &reg.flirt_t22hr)?;
            run.invert(Space::Hr, Space::T2)?;
            let dti2t2 = run.flirt(
                Space::Dti,
                Space::T2,
                &s.dti_nodiff_brain_data,
                &s.t2_brain_data,
                &reg.flirt_dti2t2,
            )?;
            run.invert(Space::T2, Space::Dti)?;

            let affine = if usehead {
                self.fsl.check_flirt(
                    &self.head_mat(Space::Dti, Space::T2),
                    &s.dti_nodiff_data,
                    &s.t2_data,
                    &reg.flirt_dti2t2,
                    run.overwrite,
                    run.log(),
                )?
            } else {
                dti2t2
            };
            let dti2t2_warp = self.fsl.check_fnirt(
                &self.warp(Space::Dti, Space::T2),
                &s.dti_nodiff_data,
                &s.t2_data,
                &affine,
                reg.fnirt_config_dti2t2.as_deref(),
                None,
                run.overwrite,
                run.log(),
            )?;
            run.push_warp(Space::Dti, Space::T2, &dti2t2_warp);
            run.invert_warp(Space::T2, Space::Dti, &s.dti_nodiff_brain_data)?;

            let dti2hr_warp = self.fsl.check_convert_warp_wm(
                &self.warp(Space::Dti, Space::Hr),
                &dti2t2_warp,
                &t22hr,
                &s.t1_brain_data,
                run.overwrite,
                run.log(),
            )?;
            run.push_warp(Space::Dti, Space::Hr, &dti2hr_warp);
            run.invert_warp(Space::Hr, Space::Dti, &s.dti_nodiff_brain_data)?;

            t2_route = Some((t22hr, dti2t2_warp));
        }

        for std in standard_targets(process_std4) {
            let template = self.template_images(std);
            let hr2std_warp = self.warp(Space::Hr, std);
            run.concat(Space::Dti, Space::Hr, std)?;
            run.invert(std, Space::Dti)?;

            let dti2std_warp = match &t2_route {
                Some((t22hr, dti2t2_warp)) => {
                    if std == Space::Std {
                        run.concat(Space::T2, Space::Hr, std)?;
                        run.invert(std, Space::T2)?;
                        let t22std_warp = self.fsl.check_convert_warp_mw(
                            &self.warp(Space::T2, std),
                            t22hr,
                            &hr2std_warp,
                            &template.brain,
                            run.overwrite,
                            run.log(),
                        )?;
                        run.push_warp(Space::T2, std, &t22std_warp);
                        run.invert_warp(std, Space::T2, &s.t2_brain_data)?;
                    }

                    self.fsl.check_convert_warp_wmw(
                        &self.warp(Space::Dti, std),
                        dti2t2_warp,
                        t22hr,
                        &hr2std_warp,
                        &template.brain,
                        run.overwrite,
                        run.log(),
                    )?
                }
                None => self.fsl.check_convert_warp_mw(
                    &self.warp(Space::Dti, std),
                    &dti2hr,
                    &hr2std_warp,
                    &template.brain,
                    run.overwrite,
                    run.log(),
                )?,
            };
            run.push_warp(Space::Dti, std, &dti2std_warp);
            run.invert_warp(std, Space::Dti, &s.dti_nodiff_brain_data)?;
        }

        Ok(run.artifacts)
    }

    /// Direct links between the two functional spaces, composed from
    /// what `transform_rs` and `transform_fmri` computed.
    pub fn transform_extra(&self, options: &TransformOptions) -> Outcome {
        const OP: &str = "transform_extra";
        let s = &self.subject;
        let check = s.check_template();
        if let Some(reason) = self.precondition(&check, &[&s.rs_examplefunc, &s.fmri_examplefunc]) {
            return self.skip(OP, reason);
        }
        self.produce(OP, || self.run_extra(options))
    }

    fn run_extra(&self, options: &TransformOptions) -> Result<Vec<TransformArtifact>> {
        let s = &self.subject;
        let mut run = Run::new(self, options);

        run.concat(Space::Rs, Space::Hr, Space::Fmri)?;
        run.invert(Space::Fmri, Space::Rs)?;

        let rs2fmri_warp = self.fsl.check_convert_warp_ww(
            &self.warp(Space::Rs, Space::Fmri),
            &self.warp(Space::Rs, Space::Std),
            &self.warp(Space::Std, Space::Fmri),
            &s.fmri_examplefunc,
            run.overwrite,
            run.log(),
        )?;
        run.push_warp(Space::Rs, Space::Fmri, &rs2fmri_warp);

        let fmri2rs_warp = self.fsl.check_convert_warp_ww(
            &self.warp(Space::Fmri, Space::Rs),
            &self.warp(Space::Fmri, Space::Std),
            &self.warp(Space::Std, Space::Rs),
            &s.rs_examplefunc,
            run.overwrite,
            run.log(),
        )?;
        run.push_warp(Space::Fmri, Space::Rs, &fmri2rs_warp);

        Ok(run.artifacts)
    }
}

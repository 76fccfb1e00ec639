//! Transform primitives.
//!
//! Every `check_*` operation is idempotent: when its output already exists
//! and `overwrite` is false it returns the output without running anything.
//! Required inputs are verified before any tool starts.

use std::path::{Path, PathBuf};

use log::debug;

use crate::affine::AffineMat;
use crate::command::Tool;
use crate::config::{Interp, LinearBackend};
use crate::error::{Error, Result};
use crate::fsl::Fsl;
use crate::image::Image;

fn require_file(op: &'static str, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::MissingInput {
            op,
            path: path.to_path_buf(),
        })
    }
}

fn require_image(op: &'static str, image: &Image) -> Result<()> {
    if image.exist() {
        Ok(())
    } else {
        Err(Error::MissingInput {
            op,
            path: image.cpath(),
        })
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))
        }
        _ => Ok(()),
    }
}

fn cached(op: &str, output: &Path, exists: bool, overwrite: bool) -> bool {
    let skip = exists && !overwrite;
    if skip {
        debug!("{}: {} exists, skipping", op, output.display());
    }
    skip
}

impl Fsl {
    /// Linear registration of `moving` onto `fixed`.
    pub fn check_flirt(
        &self,
        output_mat: &Path,
        moving: &Image,
        fixed: &Image,
        params: &[String],
        overwrite: bool,
        log: Option<&Path>,
    ) -> Result<PathBuf> {
        const OP: &str = "check_flirt";
        if cached(OP, output_mat, output_mat.is_file(), overwrite) {
            return Ok(output_mat.to_path_buf());
        }
        require_image(OP, moving)?;
        require_image(OP, fixed)?;
        ensure_parent(output_mat)?;

        let command = self
            .command(Tool::Flirt)
            .arg("-in")
            .path(&moving.path())
            .arg("-ref")
            .path(&fixed.path())
            .arg("-omat")
            .path(output_mat)
            .args(params.iter().cloned());
        self.run(command, log)?;

        Ok(output_mat.to_path_buf())
    }

    pub fn check_invert_mat(
        &self,
        output_mat: &Path,
        input_mat: &Path,
        overwrite: bool,
        log: Option<&Path>,
    ) -> Result<PathBuf> {
        const OP: &str = "check_invert_mat";
        if cached(OP, output_mat, output_mat.is_file(), overwrite) {
            return Ok(output_mat.to_path_buf());
        }
        require_file(OP, input_mat)?;
        ensure_parent(output_mat)?;

        match self.config().tools.linear_backend {
            LinearBackend::Native => {
                let inverse = AffineMat::read(input_mat)?.inverse(input_mat)?;
                inverse.write(output_mat)?;
            }
            LinearBackend::ConvertXfm => {
                let command = self
                    .command(Tool::ConvertXfm)
                    .arg("-omat")
                    .path(output_mat)
                    .arg("-inverse")
                    .path(input_mat);
                self.run(command, log)?;
            }
        }

        Ok(output_mat.to_path_buf())
    }

    /// `mat1` is applied first, then `mat2`.
    pub fn check_concat_mat(
        &self,
        output_mat: &Path,
        mat1: &Path,
        mat2: &Path,
        overwrite: bool,
        log: Option<&Path>,
    ) -> Result<PathBuf> {
        const OP: &str = "check_concat_mat";
        if cached(OP, output_mat, output_mat.is_file(), overwrite) {
            return Ok(output_mat.to_path_buf());
        }
        require_file(OP, mat1)?;
        require_file(OP, mat2)?;
        ensure_parent(output_mat)?;

        match self.config().tools.linear_backend {
            LinearBackend::Native => {
                let composed = AffineMat::read(mat1)?.then(&AffineMat::read(mat2)?);
                composed.write(output_mat)?;
            }
            LinearBackend::ConvertXfm => {
                // convert_xfm takes the second transform first
                let command = self
                    .command(Tool::ConvertXfm)
                    .arg("-omat")
                    .path(output_mat)
                    .arg("-concat")
                    .path(mat2)
                    .path(mat1);
                self.run(command, log)?;
            }
        }

        Ok(output_mat.to_path_buf())
    }

    /// Non-linear registration seeded by `affine`.
    #[allow(clippy::too_many_arguments)]
    pub fn check_fnirt(
        &self,
        output_warp: &Image,
        moving: &Image,
        fixed: &Image,
        affine: &Path,
        config: Option<&str>,
        refmask: Option<&Image>,
        overwrite: bool,
        log: Option<&Path>,
    ) -> Result<Image> {
        const OP: &str = "check_fnirt";
        if cached(OP, &output_warp.cpath(), output_warp.exist(), overwrite) {
            return Ok(output_warp.clone());
        }
        require_image(OP, moving)?;
        require_image(OP, fixed)?;
        require_file(OP, affine)?;
        if let Some(mask) = refmask {
            require_image(OP, mask)?;
        }
        ensure_parent(&output_warp.cpath())?;

        let mut command = self
            .command(Tool::Fnirt)
            .opt("--in=", &moving.path())
            .opt("--ref=", &fixed.path())
            .opt("--aff=", affine)
            .opt("--cout=", &output_warp.cpath());
        if let Some(config) = config {
            command = command.arg(format!("--config={}", config));
        }
        if let Some(mask) = refmask {
            command = command.opt("--refmask=", &mask.path());
        }
        self.run(command, log)?;

        Ok(output_warp.clone())
    }

    /// `reference` must be in the space the inverted warp maps into, i.e. the
    /// source space of `input_warp`.
    pub fn check_invert_warp(
        &self,
        output_warp: &Image,
        input_warp: &Image,
        reference: &Image,
        overwrite: bool,
        log: Option<&Path>,
    ) -> Result<Image> {
        const OP: &str = "check_invert_warp";
        if cached(OP, &output_warp.cpath(), output_warp.exist(), overwrite) {
            return Ok(output_warp.clone());
        }
        require_image(OP, input_warp)?;
        require_image(OP, reference)?;
        ensure_parent(&output_warp.cpath())?;

        let command = self
            .command(Tool::Invwarp)
            .arg("-w")
            .path(&input_warp.path())
            .arg("-o")
            .path(&output_warp.cpath())
            .arg("-r")
            .path(&reference.path());
        self.run(command, log)?;

        Ok(output_warp.clone())
    }

    /// Matrix then warp.
    pub fn check_convert_warp_mw(
        &self,
        output_warp: &Image,
        mat: &Path,
        warp: &Image,
        reference: &Image,
        overwrite: bool,
        log: Option<&Path>,
    ) -> Result<Image> {
        const OP: &str = "check_convert_warp_mw";
        if cached(OP, &output_warp.cpath(), output_warp.exist(), overwrite) {
            return Ok(output_warp.clone());
        }
        require_file(OP, mat)?;
        require_image(OP, warp)?;
        require_image(OP, reference)?;
        self.convert_warp(
            output_warp,
            reference,
            &[("--premat=", mat.to_path_buf()), ("--warp1=", warp.path())],
            log,
        )
    }

    /// Warp then matrix.
    pub fn check_convert_warp_wm(
        &self,
        output_warp: &Image,
        warp: &Image,
        mat: &Path,
        reference: &Image,
        overwrite: bool,
        log: Option<&Path>,
    ) -> Result<Image> {
        const OP: &str = "check_convert_warp_wm";
        if cached(OP, &output_warp.cpath(), output_warp.exist(), overwrite) {
            return Ok(output_warp.clone());
        }
        require_image(OP, warp)?;
        require_file(OP, mat)?;
        require_image(OP, reference)?;
        self.convert_warp(
            output_warp,
            reference,
            &[("--warp1=", warp.path()), ("--postmat=", mat.to_path_buf())],
            log,
        )
    }

    /// Warp, matrix, warp.
    #[allow(clippy::too_many_arguments)]
    pub fn check_convert_warp_wmw(
        &self,
        output_warp: &Image,
        warp1: &Image,
        mat: &Path,
        warp2: &Image,
        reference: &Image,
        overwrite: bool,
        log: Option<&Path>,
    ) -> Result<Image> {
        const OP: &str = "check_convert_warp_wmw";
        if cached(OP, &output_warp.cpath(), output_warp.exist(), overwrite) {
            return Ok(output_warp.clone());
        }
        require_image(OP, warp1)?;
        require_file(OP, mat)?;
        require_image(OP, warp2)?;
        require_image(OP, reference)?;
        self.convert_warp(
            output_warp,
            reference,
            &[
                ("--warp1=", warp1.path()),
                ("--midmat=", mat.to_path_buf()),
                ("--warp2=", warp2.path()),
            ],
            log,
        )
    }

    /// Warp then warp.
    pub fn check_convert_warp_ww(
        &self,
        output_warp: &Image,
        warp1: &Image,
        warp2: &Image,
        reference: &Image,
        overwrite: bool,
        log: Option<&Path>,
    ) -> Result<Image> {
        const OP: &str = "check_convert_warp_ww";
        if cached(OP, &output_warp.cpath(), output_warp.exist(), overwrite) {
            return Ok(output_warp.clone());
        }
        require_image(OP, warp1)?;
        require_image(OP, warp2)?;
        require_image(OP, reference)?;
        self.convert_warp(
            output_warp,
            reference,
            &[("--warp1=", warp1.path()), ("--warp2=", warp2.path())],
            log,
        )
    }

    fn convert_warp(
        &self,
        output_warp: &Image,
        reference: &Image,
        stages: &[(&str, PathBuf)],
        log: Option<&Path>,
    ) -> Result<Image> {
        ensure_parent(&output_warp.cpath())?;

        let command = stages.iter().fold(
            self.command(Tool::Convertwarp)
                .opt("--ref=", &reference.path())
                .opt("--out=", &output_warp.cpath()),
            |command, (flag, path)| command.opt(flag, path),
        );
        self.run(command, log)?;

        Ok(output_warp.clone())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn check_apply_mat(
        &self,
        output: &Image,
        input: &Image,
        reference: &Image,
        mat: &Path,
        interp: Interp,
        overwrite: bool,
        log: Option<&Path>,
    ) -> Result<Image> {
        const OP: &str = "check_apply_mat";
        if cached(OP, &output.cpath(), output.exist(), overwrite) {
            return Ok(output.clone());
        }
        require_image(OP, input)?;
        require_image(OP, reference)?;
        require_file(OP, mat)?;
        ensure_parent(&output.cpath())?;

        let command = self
            .command(Tool::Flirt)
            .arg("-in")
            .path(&input.path())
            .arg("-ref")
            .path(&reference.path())
            .arg("-out")
            .path(&output.cpath())
            .arg("-applyxfm")
            .arg("-init")
            .path(mat)
            .arg("-interp")
            .arg(interp.flirt_name());
        self.run(command, log)?;

        Ok(output.clone())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn check_apply_warp(
        &self,
        output: &Image,
        input: &Image,
        reference: &Image,
        warp: &Image,
        interp: Interp,
        overwrite: bool,
        log: Option<&Path>,
    ) -> Result<Image> {
        const OP: &str = "check_apply_warp";
        if cached(OP, &output.cpath(), output.exist(), overwrite) {
            return Ok(output.clone());
        }
        require_image(OP, input)?;
        require_image(OP, reference)?;
        require_image(OP, warp)?;
        ensure_parent(&output.cpath())?;

        let command = self
            .command(Tool::Applywarp)
            .arg("-i")
            .path(&input.path())
            .arg("-r")
            .path(&reference.path())
            .arg("-o")
            .path(&output.cpath())
            .arg("-w")
            .path(&warp.path())
            .arg(format!("--interp={}", interp.applywarp_name()));
        self.run(command, log)?;

        Ok(output.clone())
    }

    /// Isotropic resampling onto `reference`'s grid at `voxel_mm`, with no
    /// estimated transform involved. `identity` is written when absent.
    #[allow(clippy::too_many_arguments)]
    pub fn check_apply_iso(
        &self,
        output: &Image,
        input: &Image,
        reference: &Image,
        identity: &Path,
        voxel_mm: f32,
        interp: Interp,
        overwrite: bool,
        log: Option<&Path>,
    ) -> Result<Image> {
        const OP: &str = "check_apply_iso";
        if cached(OP, &output.cpath(), output.exist(), overwrite) {
            return Ok(output.clone());
        }
        require_image(OP, input)?;
        require_image(OP, reference)?;
        ensure_parent(&output.cpath())?;

        if !identity.is_file() {
            ensure_parent(identity)?;
            AffineMat::identity().write(identity)?;
        }

        let command = self
            .command(Tool::Flirt)
            .arg("-in")
            .path(&input.path())
            .arg("-ref")
            .path(&reference.path())
            .arg("-out")
            .path(&output.cpath())
            .arg("-applyisoxfm")
            .arg(voxel_mm.to_string())
            .arg("-init")
            .path(identity)
            .arg("-interp")
            .arg(interp.flirt_name());
        self.run(command, log)?;

        Ok(output.clone())
    }
}

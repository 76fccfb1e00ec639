//! Image handle.
//!
//! An [`Image`] is a path with its extension stripped; the file on disk may be
//! a compressed (`.nii.gz`) or uncompressed (`.nii`) volume, or a `.gii`
//! surface. File operations go through the toolkit.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use common::file_utils::{image_files, strip_image_extension};
use serde::{Deserialize, Serialize};

use crate::command::Tool;
use crate::error::{Error, Result};
use crate::fsl::Fsl;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Image {
    base: PathBuf,
}

impl Image {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let base = match path.file_name().and_then(|name| name.to_str()) {
            Some(name) => path.with_file_name(strip_image_extension(name)),
            None => path.to_path_buf(),
        };
        Image { base }
    }

    pub fn fpathnoext(&self) -> &Path {
        &self.base
    }

    fn with_ext(&self, ext: &str) -> PathBuf {
        let mut name = self.base.as_os_str().to_os_string();
        name.push(ext);
        PathBuf::from(name)
    }

    pub fn cpath(&self) -> PathBuf {
        self.with_ext(".nii.gz")
    }

    pub fn upath(&self) -> PathBuf {
        self.with_ext(".nii")
    }

    pub fn gpath(&self) -> PathBuf {
        self.with_ext(".gii")
    }

    /// Path to hand to the tools: the uncompressed file when only that one
    /// exists, the compressed one otherwise.
    pub fn path(&self) -> PathBuf {
        if !self.cexist() && self.uexist() {
            self.upath()
        } else {
            self.cpath()
        }
    }

    pub fn name(&self) -> String {
        self.base
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn dir(&self) -> &Path {
        self.base.parent().unwrap_or_else(|| Path::new(""))
    }

    pub fn cexist(&self) -> bool {
        self.cpath().is_file()
    }

    pub fn uexist(&self) -> bool {
        self.upath().is_file()
    }

    pub fn gexist(&self) -> bool {
        self.gpath().is_file()
    }

    pub fn exist(&self) -> bool {
        self.cexist() || self.uexist()
    }

    pub fn check(&self) -> Result<&Self> {
        if self.exist() {
            Ok(self)
        } else {
            Err(Error::MissingImage(self.cpath()))
        }
    }

    pub fn add_postfix(&self, postfix: &str) -> Image {
        Image {
            base: self.with_ext(postfix),
        }
    }

    pub fn add_prefix(&self, prefix: &str) -> Image {
        Image {
            base: self.base.with_file_name(format!("{}{}", prefix, self.name())),
        }
    }

    /// Same name, different folder.
    pub fn in_dir(&self, dir: &Path) -> Image {
        Image {
            base: dir.join(self.name()),
        }
    }

    pub fn cp(&self, fsl: &Fsl, dest: &Image, log: Option<&Path>) -> Result<Image> {
        self.check()?;
        let command = fsl
            .command(Tool::Imcp)
            .path(&self.path())
            .path(&dest.cpath());
        fsl.run(command, log)?;
        Ok(dest.clone())
    }

    pub fn mv(&self, fsl: &Fsl, dest: &Image, log: Option<&Path>) -> Result<Image> {
        self.check()?;
        let command = fsl
            .command(Tool::Immv)
            .path(&self.path())
            .path(&dest.cpath());
        fsl.run(command, log)?;
        Ok(dest.clone())
    }

    /// Removes the image; absent images are ignored.
    pub fn rm(&self, fsl: &Fsl, log: Option<&Path>) -> Result<()> {
        if !self.exist() {
            return Ok(());
        }
        fsl.run(fsl.command(Tool::Imrm).path(&self.path()), log)?;
        Ok(())
    }

    /// Concatenates volumes along time into `output`.
    pub fn merge(fsl: &Fsl, output: &Image, inputs: &[Image], log: Option<&Path>) -> Result<Image> {
        if inputs.is_empty() {
            return Err(Error::InvalidConfig("merge requires at least one image".to_string()));
        }
        let mut command = fsl.command(Tool::Fslmerge).arg("-t").path(&output.cpath());
        for input in inputs {
            input.check()?;
            command = command.path(&input.path());
        }
        fsl.run(command, log)?;
        Ok(output.clone())
    }

    /// Splits a 4D image into volumes named `<prefix>NNNN`, returned in order.
    pub fn split(&self, fsl: &Fsl, prefix: &Image, log: Option<&Path>) -> Result<Vec<Image>> {
        self.check()?;
        let command = fsl
            .command(Tool::Fslsplit)
            .path(&self.path())
            .path(prefix.fpathnoext())
            .arg("-t");
        fsl.run(command, log)?;

        let prefix_name = prefix.name();
        let volumes = image_files(prefix.dir())
            .map_err(|e| Error::io(prefix.dir(), e))?
            .into_iter()
            .map(Image::new)
            .filter(|image| {
                image
                    .name()
                    .strip_prefix(&prefix_name)
                    .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
            })
            .collect();
        Ok(volumes)
    }

    pub fn threshold(&self, fsl: &Fsl, thr: f32, output: &Image, log: Option<&Path>) -> Result<Image> {
        self.check()?;
        let command = fsl
            .command(Tool::Fslmaths)
            .path(&self.path())
            .arg("-thr")
            .arg(thr.to_string())
            .path(&output.cpath());
        fsl.run(command, log)?;
        Ok(output.clone())
    }

    pub fn binarize(&self, fsl: &Fsl, thr: f32, output: &Image, log: Option<&Path>) -> Result<Image> {
        self.check()?;
        let command = fsl
            .command(Tool::Fslmaths)
            .path(&self.path())
            .arg("-thr")
            .arg(thr.to_string())
            .arg("-bin")
            .path(&output.cpath());
        fsl.run(command, log)?;
        Ok(output.clone())
    }

    /// Number of non-zero voxels.
    pub fn nvoxels(&self, fsl: &Fsl, log: Option<&Path>) -> Result<u64> {
        self.check()?;
        let command = fsl.command(Tool::Fslstats).path(&self.path()).arg("-V");
        let rendered = command.to_string();
        let output = fsl.run(command, log)?;

        output
            .stdout
            .split_whitespace()
            .next()
            .and_then(|count| count.parse::<u64>().ok())
            .ok_or_else(|| Error::ToolOutput {
                command: rendered,
                output: output.stdout.clone(),
            })
    }
}

impl Display for Image {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.base.display())
    }
}

impl From<&Path> for Image {
    fn from(path: &Path) -> Self {
        Image::new(path)
    }
}

impl From<PathBuf> for Image {
    fn from(path: PathBuf) -> Self {
        Image::new(path)
    }
}

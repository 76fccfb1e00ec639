//! Stand-in for the FSL binaries.
//!
//! Matrices and warps are both written as 4x4 affines, so compositions done
//! through `convertwarp` can be checked numerically. Registrations return
//! the exact transform between the ground-truth world matrices of the moving
//! and fixed images.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use strum::IntoEnumIterator;
use tempfile::TempDir;

use crate::affine::AffineMat;
use crate::command::{CommandOutput, CommandRunner, Tool, ToolCommand};
use crate::config::LabConfig;
use crate::dispatch::Project;
use crate::error::{Error, Result};
use crate::fsl::Fsl;
use crate::image::Image;
use crate::space::Space;
use crate::subject::Template;
use crate::transforms::SubjectTransforms;

#[derive(Debug, Default)]
pub struct FakeFsl {
    calls: Mutex<Vec<ToolCommand>>,
    detached: Mutex<Vec<ToolCommand>>,
    failing: Mutex<HashSet<String>>,
    worlds: Mutex<HashMap<String, AffineMat>>,
    nvoxels: Mutex<u64>,
}

fn arg<'a>(command: &'a ToolCommand, flag: &str) -> Result<&'a str> {
    command
        .value_of(flag)
        .or_else(|| command.value_of_eq(flag))
        .ok_or_else(|| Error::ToolOutput {
            command: command.to_string(),
            output: format!("missing {}", flag),
        })
}

fn touch(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    std::fs::write(path, content).map_err(|e| Error::io(path, e))
}

impl FakeFsl {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeFsl {
            nvoxels: Mutex::new(100),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> Vec<ToolCommand> {
        self.calls.lock().clone()
    }

    pub fn calls_of(&self, tool: Tool) -> Vec<ToolCommand> {
        self.calls()
            .into_iter()
            .filter(|call| call.name() == tool.as_ref())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn detached(&self) -> Vec<ToolCommand> {
        self.detached.lock().clone()
    }

    pub fn fail_on(&self, tool: Tool) {
        self.failing.lock().insert(tool.as_ref().to_string());
    }

    pub fn set_world(&self, image_name: &str, world: AffineMat) {
        self.worlds.lock().insert(image_name.to_string(), world);
    }

    pub fn set_nvoxels(&self, nvoxels: u64) {
        *self.nvoxels.lock() = nvoxels;
    }

    fn world(&self, image: &str) -> AffineMat {
        let name = Image::new(image).name();
        self.worlds.lock().get(&name).copied().unwrap_or_default()
    }

    fn registration(&self, moving: &str, fixed: &str) -> Result<AffineMat> {
        let to_fixed = self.world(fixed).inverse(Path::new(fixed))?;
        Ok(self.world(moving).then(&to_fixed))
    }

    fn flirt(&self, command: &ToolCommand) -> Result<()> {
        if command.args.iter().any(|a| a == "-applyxfm" || a == "-applyisoxfm") {
            let input = arg(command, "-in")?;
            return touch(Path::new(arg(command, "-out")?), input);
        }
        let mat = self.registration(arg(command, "-in")?, arg(command, "-ref")?)?;
        let out = Path::new(arg(command, "-omat")?);
        touch(out, "")?;
        mat.write(out)
    }

    fn convert_xfm(&self, command: &ToolCommand) -> Result<()> {
        let out = Path::new(arg(command, "-omat")?);
        let mat = if let Ok(input) = arg(command, "-inverse") {
            AffineMat::read(Path::new(input))?.inverse(Path::new(input))?
        } else {
            // -concat mat2 mat1
            let mat2 = AffineMat::read(Path::new(arg(command, "-concat")?))?;
            let mat1_arg = command.args.last().map(String::as_str).unwrap_or_default();
            AffineMat::read(Path::new(mat1_arg))?.then(&mat2)
        };
        touch(out, "")?;
        mat.write(out)
    }

    fn convertwarp(&self, command: &ToolCommand) -> Result<()> {
        let out = Path::new(arg(command, "--out=")?);
        let mut composed = AffineMat::identity();
        for flag in ["--premat=", "--warp1=", "--midmat=", "--warp2=", "--postmat="] {
            if let Some(stage) = command.value_of_eq(flag) {
                composed = composed.then(&AffineMat::read(Path::new(stage))?);
            }
        }
        touch(out, "")?;
        composed.write(out)
    }

    fn handle(&self, command: &ToolCommand) -> Result<CommandOutput> {
        let name = command.name();
        let tool = Tool::iter().find(|tool| tool.as_ref() == name);

        match tool {
            Some(Tool::Flirt) => self.flirt(command)?,
            Some(Tool::ConvertXfm) => self.convert_xfm(command)?,
            Some(Tool::Convertwarp) => self.convertwarp(command)?,
            Some(Tool::Fnirt) => {
                let affine = AffineMat::read(Path::new(arg(command, "--aff=")?))?;
                let out = Path::new(arg(command, "--cout=")?);
                touch(out, "")?;
                affine.write(out)?;
            }
            Some(Tool::Invwarp) => {
                let input = Path::new(arg(command, "-w")?);
                let inverse = AffineMat::read(input)?.inverse(input)?;
                let out = Path::new(arg(command, "-o")?);
                touch(out, "")?;
                inverse.write(out)?;
            }
            Some(Tool::Applywarp) => {
                let input = arg(command, "-i")?;
                touch(Path::new(arg(command, "-o")?), input)?;
            }
            Some(Tool::Fslmaths) => {
                let out = Path::new(command.args.last().map(String::as_str).unwrap_or_default());
                if !out.is_file() {
                    touch(out, "")?;
                }
            }
            Some(Tool::Fslstats) => {
                let nvoxels = *self.nvoxels.lock();
                return Ok(CommandOutput {
                    stdout: format!("{} {}.000000\n", nvoxels, nvoxels * 8),
                    stderr: String::new(),
                });
            }
            Some(Tool::Imcp) | Some(Tool::Immv) => {
                let src = PathBuf::from(&command.args[0]);
                let dest = PathBuf::from(&command.args[1]);
                touch(&dest, "")?;
                std::fs::copy(&src, &dest).map_err(|e| Error::io(&src, e))?;
                if tool == Some(Tool::Immv) {
                    std::fs::remove_file(&src).map_err(|e| Error::io(&src, e))?;
                }
            }
            Some(Tool::Imrm) => {
                let path = PathBuf::from(&command.args[0]);
                std::fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
            }
            Some(Tool::Fslmerge) => touch(Path::new(&command.args[1]), "")?,
            Some(Tool::Fslsplit) => {
                let prefix = &command.args[1];
                for idx in 0..2 {
                    touch(Path::new(&format!("{}{:04}.nii.gz", prefix, idx)), "")?;
                }
            }
            None => {}
        }

        Ok(CommandOutput::default())
    }
}

impl CommandRunner for FakeFsl {
    fn run(&self, command: &ToolCommand) -> Result<CommandOutput> {
        self.calls.lock().push(command.clone());

        if self.failing.lock().contains(&command.name()) {
            return Err(Error::ToolFailed {
                command: command.to_string(),
                status: Some(1),
                stderr: "simulated failure".to_string(),
            });
        }

        self.handle(command)
    }

    fn spawn_detached(&self, command: &ToolCommand) -> Result<()> {
        self.detached.lock().push(command.clone());
        Ok(())
    }
}

pub fn touch_image(image: &Image) -> std::io::Result<()> {
    std::fs::create_dir_all(image.dir())?;
    std::fs::write(image.cpath(), b"")
}

/// Temporary project with both templates present, run by a [`FakeFsl`].
pub struct Fixture {
    pub root: TempDir,
    pub fake: Arc<FakeFsl>,
    pub project: Project,
}

impl Fixture {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_config(LabConfig::default())
    }

    pub fn with_config(config: LabConfig) -> anyhow::Result<Self> {
        let root = tempfile::tempdir()?;
        let template = Template::mni152(&root.path().join("standard"));
        for images in [&template.std, &template.std4] {
            for image in images.all() {
                touch_image(image)?;
            }
        }

        let fake = FakeFsl::new();
        let fsl = Fsl::new(config, fake.clone());
        let project = Project::new(root.path().join("project"), template, fsl);

        Ok(Fixture {
            root,
            fake,
            project,
        })
    }

    pub fn with_std4(mut self) -> Self {
        self.project = self.project.with_std4_analysis(true);
        self
    }

    /// Creates the images of the given spaces for `label`.
    pub fn subject(&self, label: &str, spaces: &[Space]) -> anyhow::Result<SubjectTransforms> {
        let transforms = self.project.transforms(label);
        let s = transforms.subject();
        for space in spaces {
            let images = match space {
                Space::Hr => vec![&s.t1_data, &s.t1_brain_data],
                Space::Rs => vec![&s.rs_examplefunc],
                Space::Fmri => vec![&s.fmri_examplefunc],
                Space::Dti => vec![&s.dti_nodiff_data, &s.dti_nodiff_brain_data],
                Space::T2 => vec![&s.t2_data, &s.t2_brain_data],
                Space::Std | Space::Std4 => vec![],
            };
            for image in images {
                touch_image(image)?;
            }
        }
        Ok(transforms)
    }
}

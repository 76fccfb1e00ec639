//! External command invocation.

use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::debug;
use strum_macros::{AsRefStr, Display, EnumIter};

use crate::error::{Error, Result};

/// Toolkit binaries the subsystem drives.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Tool {
    Flirt,
    Fnirt,
    Invwarp,
    Convertwarp,
    ConvertXfm,
    Applywarp,
    Fslmaths,
    Fslstats,
    Imcp,
    Immv,
    Imrm,
    Fslmerge,
    Fslsplit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandRunner: Debug + Send + Sync {
    /// Runs to completion; a non-zero exit is an error.
    fn run(&self, command: &ToolCommand) -> Result<CommandOutput>;
    /// Starts without waiting, for interactive viewers.
    fn spawn_detached(&self, command: &ToolCommand) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        ToolCommand {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// Appends `<flag><path>`, for `--ref=` style options.
    pub fn opt(self, flag: &str, path: &Path) -> Self {
        let arg = format!("{}{}", flag, path.to_string_lossy());
        self.arg(arg)
    }

    /// File name of the program, e.g. `flirt`.
    pub fn name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.to_string_lossy().into_owned())
    }

    /// Value following `flag` in the argument list.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(String::as_str)
    }

    /// Value of a `--flag=value` argument.
    pub fn value_of_eq(&self, flag: &str) -> Option<&str> {
        self.args.iter().find_map(|arg| arg.strip_prefix(flag))
    }
}

impl std::fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, command: &ToolCommand) -> Result<CommandOutput> {
        debug!("{}", command);

        let output = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| Error::ToolSpawn {
                tool: command.name(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(Error::ToolFailed {
                command: command.to_string(),
                status: output.status.code(),
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }

    fn spawn_detached(&self, command: &ToolCommand) -> Result<()> {
        debug!("{} &", command);

        Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| Error::ToolSpawn {
                tool: command.name(),
                source,
            })?;

        Ok(())
    }
}

/// Appends the command line to a per-run log file.
pub fn append_to_log(log: &Path, command: &ToolCommand) -> Result<()> {
    if let Some(parent) = log.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log)
        .map_err(|e| Error::io(log, e))?;
    writeln!(file, "{}", command).map_err(|e| Error::io(log, e))
}

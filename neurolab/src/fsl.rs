use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::command::{append_to_log, CommandOutput, CommandRunner, SystemRunner, Tool, ToolCommand};
use crate::config::LabConfig;
use crate::error::Result;

/// Handle to the imaging toolkit: immutable configuration plus the runner
/// that executes its binaries. Cheap to clone; shared by every subject.
#[derive(Debug, Clone)]
pub struct Fsl {
    config: Arc<LabConfig>,
    runner: Arc<dyn CommandRunner>,
}

impl Fsl {
    pub fn new(config: LabConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Fsl {
            config: Arc::new(config),
            runner,
        }
    }

    pub fn system(config: LabConfig) -> Self {
        Self::new(config, Arc::new(SystemRunner))
    }

    pub fn config(&self) -> &LabConfig {
        &self.config
    }

    pub fn command(&self, tool: Tool) -> ToolCommand {
        ToolCommand::new(self.config.tools.binary(tool))
    }

    pub fn run(&self, command: ToolCommand, log: Option<&Path>) -> Result<CommandOutput> {
        if let Some(log) = log {
            append_to_log(log, &command)?;
        }
        self.runner.run(&command)
    }

    /// Opens the configured viewer on `images` without waiting for it.
    pub fn view(&self, images: &[PathBuf]) -> Result<()> {
        let command = images.iter().fold(
            ToolCommand::new(self.config.tools.viewer_binary()),
            |command, image| command.path(image),
        );
        self.runner.spawn_detached(&command)
    }
}

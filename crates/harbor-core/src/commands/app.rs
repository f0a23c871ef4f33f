//! The `app` task: control the application processes.

use anyhow::Result;

use crate::config::CommandConfig;
use crate::console::Console;
use crate::runner::ShellCommandRunner;
use crate::shell::{ExecutionResult, ShellCommand};

pub struct AppCommand {
    config: CommandConfig,
    console: Console,
}

impl AppCommand {
    pub fn new(config: CommandConfig, console: Console) -> Self {
        Self { config, console }
    }

    /// Start the application processes with the configured command lines.
    pub fn start(&self) -> Result<ExecutionResult> {
        let lines = self.config.command_lines("start")?;
        let command = ShellCommand::new(lines)?;
        Ok(ShellCommandRunner::new(&self.console).run(command)?)
    }
}

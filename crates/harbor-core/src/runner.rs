//! Execution reporting around [`ShellCommand`].

use crate::console::Console;
use crate::shell::{ExecutionResult, ShellCommand, ShellError};

/// Runs shell commands, tracing each command line before it spawns and
/// reporting the outcome through the console.
///
/// The result is always returned, success or not — the caller decides
/// whether a failure is fatal to the surrounding task.
pub struct ShellCommandRunner<'a> {
    console: &'a Console,
}

impl<'a> ShellCommandRunner<'a> {
    pub fn new(console: &'a Console) -> Self {
        Self { console }
    }

    pub fn run(&self, command: ShellCommand) -> Result<ExecutionResult, ShellError> {
        let success_msg = command.success_msg().map(str::to_string);
        let error_msg = command.error_msg().map(str::to_string);

        let result = command.run_with(|line| self.console.trace(line))?;

        if result.success() {
            if let Some(msg) = success_msg {
                self.console.ok(msg);
            }
        } else if let Some(msg) = error_msg {
            self.console.err(format!("{msg}: {result}"));
        } else {
            self.console.err(result);
        }
        Ok(result)
    }
}

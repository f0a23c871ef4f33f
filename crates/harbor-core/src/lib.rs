//! Harbor core library.
//!
//! A configuration-driven task runner: local shell commands with
//! fail-stop sequencing and signal-aware subprocess handling, plus a
//! deploy workflow orchestrated against the Heroku Platform API.

pub mod commands;
pub mod config;
pub mod console;
pub mod interpolate;
pub mod platform;
pub mod runner;
pub mod shell;

/// Re-exports of commonly used types
pub mod prelude {
    pub use crate::commands::{
        AppCommand, DeployCommand, DeployOptions, HerokuCommand, Service, ServicesCommand,
        TestCommand,
    };
    pub use crate::config::{CommandConfig, Config, ConfigError};
    pub use crate::console::{Console, Status};
    pub use crate::interpolate::{InterpolateError, interpolate};
    pub use crate::platform::{
        AppInfo, Dyno, Formation, FormationUpdate, HerokuPlatform, Platform, PlatformError,
    };
    pub use crate::runner::ShellCommandRunner;
    pub use crate::shell::{CommandLine, ExecutionResult, ShellCommand, ShellError, capture};
}

//! The `services` task: control the platform services the application
//! uses locally.
//!
//! Service kinds are a closed set resolved from the `commands.services`
//! config tree at load time; a configured kind outside the set is a
//! configuration error before anything runs.

use anyhow::Result;

use crate::config::{CommandConfig, ConfigError};
use crate::console::Console;
use crate::runner::ShellCommandRunner;
use crate::shell::ShellCommand;

/// A platform service and how to start and stop it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Service {
    /// Managed through launchd on macOS hosts.
    Launchctl { name: String, plist: String },
    /// Started and stopped with configured command lines.
    Shell {
        name: String,
        start: Vec<String>,
        stop: Vec<String>,
    },
}

impl Service {
    pub fn name(&self) -> &str {
        match self {
            Service::Launchctl { name, .. } => name,
            Service::Shell { name, .. } => name,
        }
    }

    fn start_lines(&self) -> Vec<String> {
        match self {
            Service::Launchctl { plist, .. } => {
                vec![format!("launchctl load -w -F {plist}")]
            }
            Service::Shell { start, .. } => start.clone(),
        }
    }

    fn stop_lines(&self) -> Vec<String> {
        match self {
            Service::Launchctl { plist, .. } => vec![format!("launchctl unload {plist}")],
            Service::Shell { stop, .. } => stop.clone(),
        }
    }
}

#[derive(Debug)]
pub struct ServicesCommand {
    console: Console,
    services: Vec<Service>,
}

impl ServicesCommand {
    /// Resolve the configured services, rejecting unknown kinds.
    pub fn from_config(config: &CommandConfig, console: Console) -> Result<Self, ConfigError> {
        let mut services = Vec::new();
        let root = match config.root().and_then(|value| value.as_mapping()) {
            Some(mapping) => mapping,
            None => {
                return Ok(Self { console, services });
            }
        };

        for (kind, specs) in root {
            let kind = kind.as_str().unwrap_or_default();
            let specs = specs.as_mapping();
            match kind {
                "launchctl" => {
                    for (name, keys) in specs.into_iter().flatten() {
                        let name = name.as_str().unwrap_or_default().to_string();
                        let plist = keys
                            .get("plist")
                            .and_then(|value| value.as_str())
                            .ok_or_else(|| ConfigError::MissingServiceKey {
                                key: "plist".to_string(),
                                service: name.clone(),
                            })?;
                        services.push(Service::Launchctl {
                            name,
                            plist: plist.to_string(),
                        });
                    }
                }
                "shell" => {
                    for (name, keys) in specs.into_iter().flatten() {
                        let name = name.as_str().unwrap_or_default().to_string();
                        let start = keys
                            .get("start")
                            .and_then(CommandConfig::lines_from)
                            .ok_or_else(|| ConfigError::MissingServiceKey {
                                key: "start".to_string(),
                                service: name.clone(),
                            })?;
                        let stop = keys
                            .get("stop")
                            .and_then(CommandConfig::lines_from)
                            .ok_or_else(|| ConfigError::MissingServiceKey {
                                key: "stop".to_string(),
                                service: name.clone(),
                            })?;
                        services.push(Service::Shell { name, start, stop });
                    }
                }
                other => {
                    return Err(ConfigError::UnknownServiceKind {
                        kind: other.to_string(),
                    });
                }
            }
        }
        Ok(Self { console, services })
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Start some or all platform services. No names means all of them.
    pub fn start(&self, names: &[String]) -> Result<()> {
        self.invoke(names, |service| {
            let name = service.name();
            Ok(ShellCommand::new(service.start_lines())?
                .with_success_msg(format!("{name} started"))
                .with_error_msg(format!("{name} could not be started")))
        })
    }

    /// Stop some or all platform services. No names means all of them.
    pub fn stop(&self, names: &[String]) -> Result<()> {
        self.invoke(names, |service| {
            let name = service.name();
            Ok(ShellCommand::new(service.stop_lines())?
                .with_success_msg(format!("{name} stopped"))
                .with_error_msg(format!("{name} could not be stopped")))
        })
    }

    fn invoke(
        &self,
        names: &[String],
        mut command_for: impl FnMut(&Service) -> Result<ShellCommand>,
    ) -> Result<()> {
        let names: Vec<String> = if names.is_empty() {
            self.services
                .iter()
                .map(|service| service.name().to_string())
                .collect()
        } else {
            names.to_vec()
        };
        for name in &names {
            match self
                .services
                .iter()
                .find(|service| service.name() == name.as_str())
            {
                Some(service) => {
                    let command = command_for(service)?;
                    ShellCommandRunner::new(&self.console).run(command)?;
                }
                None => self.console.err(format!("No such service {name}")),
            }
        }
        Ok(())
    }
}

//! Configuration loading and the dotted-path accessor.
//!
//! Harbor reads a single `harbor.yml` at startup. Every command owns one
//! section of the `commands:` tree and reads its values through
//! [`CommandConfig::get`] / [`CommandConfig::get_opt`], which traverse
//! dotted paths (`production.heroku.app_name`) and report the exact key
//! that was missing.

use std::io;
use std::path::{Path, PathBuf};

use serde_yaml_ng::Value;
use thiserror::Error;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "harbor.yml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("Missing '{key}' config for '{command}' command")]
    Missing { key: String, command: String },

    #[error("Invalid '{key}' config for '{command}' command: {reason}")]
    Invalid {
        key: String,
        command: String,
        reason: String,
    },

    #[error("Missing '{key}' config for '{service}' platform service")]
    MissingServiceKey { key: String, service: String },

    #[error("Unknown platform service type '{kind}'")]
    UnknownServiceKind { kind: String },
}

/// The parsed configuration tree.
#[derive(Debug, Clone)]
pub struct Config {
    root: Value,
}

impl Config {
    /// Load and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_str(content: &str) -> Result<Self, serde_yaml_ng::Error> {
        let root: Value = serde_yaml_ng::from_str(content)?;
        Ok(Self { root })
    }

    /// The configuration section for one command.
    ///
    /// A command whose section is absent still gets a view; every required
    /// lookup on it fails with the dotted key, which matches how the
    /// original surface behaves.
    pub fn command(&self, name: &str) -> CommandConfig {
        let section = self
            .root
            .get("commands")
            .and_then(|commands| commands.get(name))
            .cloned();
        CommandConfig {
            command: name.to_string(),
            root: section,
        }
    }
}

/// One command's view of the configuration tree.
#[derive(Debug, Clone)]
pub struct CommandConfig {
    command: String,
    root: Option<Value>,
}

impl CommandConfig {
    /// Build a view directly from a value, mainly for tests.
    pub fn from_value(command: &str, root: Value) -> Self {
        Self {
            command: command.to_string(),
            root: Some(root),
        }
    }

    pub fn command_name(&self) -> &str {
        &self.command
    }

    /// The whole section, when present.
    pub fn root(&self) -> Option<&Value> {
        self.root.as_ref()
    }

    /// Look up a required dotted-path key.
    pub fn get(&self, key: &str) -> Result<&Value, ConfigError> {
        match self.walk(key)? {
            Some(value) => Ok(value),
            None => Err(self.missing(key)),
        }
    }

    /// Look up an optional dotted-path key.
    ///
    /// Only the leaf may be absent: a missing intermediate mapping is a
    /// configuration error even for optional values.
    pub fn get_opt(&self, key: &str) -> Result<Option<&Value>, ConfigError> {
        self.walk(key)
    }

    /// A required key that must be a string.
    pub fn str_value(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.invalid(key, "expected a string"))
    }

    /// An optional key that, when present, must be a string.
    pub fn opt_str(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match self.get_opt(key)? {
            Some(value) => value
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| self.invalid(key, "expected a string")),
            None => Ok(None),
        }
    }

    /// A required key holding one command line or a list of them.
    pub fn command_lines(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        Self::lines_from(self.get(key)?).ok_or_else(|| {
            self.invalid(key, "expected a command line or a list of command lines")
        })
    }

    /// Optional variant of [`CommandConfig::command_lines`].
    pub fn opt_command_lines(&self, key: &str) -> Result<Option<Vec<String>>, ConfigError> {
        match self.get_opt(key)? {
            Some(value) => Self::lines_from(value).map(Some).ok_or_else(|| {
                self.invalid(key, "expected a command line or a list of command lines")
            }),
            None => Ok(None),
        }
    }

    pub(crate) fn lines_from(value: &Value) -> Option<Vec<String>> {
        match value {
            Value::String(line) => Some(vec![line.clone()]),
            Value::Sequence(lines) => lines
                .iter()
                .map(|line| line.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }

    fn walk(&self, key: &str) -> Result<Option<&Value>, ConfigError> {
        let mut current = match self.root.as_ref() {
            Some(root) => root,
            None => return Err(self.missing(key)),
        };
        let segments: Vec<&str> = key.split('.').collect();
        for (i, segment) in segments.iter().enumerate() {
            match current.get(*segment) {
                Some(next) => current = next,
                None if i < segments.len() - 1 => return Err(self.missing(key)),
                None => return Ok(None),
            }
        }
        if current.is_null() {
            Ok(None)
        } else {
            Ok(Some(current))
        }
    }

    fn missing(&self, key: &str) -> ConfigError {
        ConfigError::Missing {
            key: key.to_string(),
            command: self.command.clone(),
        }
    }

    fn invalid(&self, key: &str, reason: &str) -> ConfigError {
        ConfigError::Invalid {
            key: key.to_string(),
            command: self.command.clone(),
            reason: reason.to_string(),
        }
    }
}

//! Remote deployment platform surface.
//!
//! The deploy orchestrator talks to the platform exclusively through the
//! [`Platform`] trait; [`heroku::HerokuPlatform`] is the production
//! implementation. Tests substitute an in-memory fake.

mod heroku;

pub use heroku::HerokuPlatform;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error(
        "Access to Heroku is not authorized. Did you set the HEROKU_DEPLOY_TOKEN environment variable?"
    )]
    Unauthorized,

    #[error("Remote resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Heroku API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Heroku API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid Heroku API URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Failed to decode Heroku API response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to start the HTTP runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl PlatformError {
    /// True for the not-found condition the dyno poll loop treats as its
    /// completion signal rather than as an error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound { .. })
    }
}

/// Application metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct AppInfo {
    pub name: String,
    pub git_url: String,
    #[serde(default)]
    pub maintenance: bool,
}

/// One entry of the process formation: how many instances of a process
/// type the platform should keep running.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Formation {
    #[serde(rename = "type")]
    pub process_type: String,
    pub quantity: u32,
}

/// One entry of a batch formation update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormationUpdate {
    #[serde(rename = "process")]
    pub process_type: String,
    pub quantity: u32,
}

impl FormationUpdate {
    pub fn new(process_type: impl Into<String>, quantity: u32) -> Self {
        Self {
            process_type: process_type.into(),
            quantity,
        }
    }
}

/// A provisioned dyno. The state is the platform's free-form lifecycle
/// string (`starting`, `up`, `crashed`, ...); the poll loop only compares
/// and logs it.
#[derive(Debug, Clone, Deserialize)]
pub struct Dyno {
    pub id: String,
    #[serde(rename = "type", default)]
    pub process_type: String,
    #[serde(default)]
    pub command: String,
    pub state: String,
}

/// Operations the deploy workflow needs from the deployment platform.
///
/// The session behind an implementation is established once per run and
/// memoized; an authorization failure surfaces from whichever call hits
/// the platform first and is fatal to the whole run.
pub trait Platform {
    fn app_info(&self, app_name: &str) -> Result<AppInfo, PlatformError>;

    fn set_maintenance(&self, app_name: &str, enabled: bool) -> Result<(), PlatformError>;

    /// Current process formation quantities.
    fn formation(&self, app_name: &str) -> Result<Vec<Formation>, PlatformError>;

    /// Batch-update process formation quantities.
    fn scale(&self, app_name: &str, updates: &[FormationUpdate]) -> Result<(), PlatformError>;

    /// Provision a one-off dyno running `command`.
    fn run_one_off(&self, app_name: &str, command: &str) -> Result<Dyno, PlatformError>;

    /// Current state of a dyno.
    ///
    /// Fails with [`PlatformError::NotFound`] once the dyno has finished
    /// and been reaped by the platform — for one-off dynos that absence is
    /// the completion signal, not an error.
    fn dyno_info(&self, app_name: &str, dyno_id: &str) -> Result<Dyno, PlatformError>;

    fn list_dynos(&self, app_name: &str) -> Result<Vec<Dyno>, PlatformError>;

    fn restart(&self, app_name: &str, dyno_id: &str) -> Result<(), PlatformError>;

    fn restart_all(&self, app_name: &str) -> Result<(), PlatformError>;
}

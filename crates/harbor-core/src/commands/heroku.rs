//! The `heroku` task: direct app management outside a deploy.

use anyhow::Result;

use crate::config::CommandConfig;
use crate::console::Console;
use crate::platform::Platform;

pub struct HerokuCommand {
    config: CommandConfig,
    console: Console,
    platform: Box<dyn Platform>,
}

impl HerokuCommand {
    pub fn new(config: CommandConfig, console: Console, platform: Box<dyn Platform>) -> Self {
        Self {
            config,
            console,
            platform,
        }
    }

    /// Restart all of the app's dynos for one environment.
    pub fn restartall(&self, environment: &str) -> Result<()> {
        let app_name = self.config.str_value(&format!("{environment}.app_name"))?;
        self.platform.restart_all(&app_name)?;
        self.console
            .ok(format!("Restarted all dynos for {app_name}"));
        Ok(())
    }
}

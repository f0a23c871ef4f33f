//! The deploy workflow.
//!
//! Deployment is a linear pipeline of idempotent steps, each of which can
//! also be invoked on its own. Per-run state (environment, branch,
//! migration count, formation snapshot, ...) lives in a memoized
//! [`DeployContext`], so every step re-derives what it needs from the same
//! consistent snapshot instead of re-querying remote state that may have
//! changed mid-run.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::config::CommandConfig;
use crate::console::Console;
use crate::interpolate::interpolate;
use crate::platform::{AppInfo, Dyno, FormationUpdate, Platform};
use crate::runner::ShellCommandRunner;
use crate::shell::{ShellCommand, capture};

/// Process types the scale steps manage. `web` is deliberately excluded:
/// web dynos are restarted, never scaled, during a deploy.
const NON_WEB_PROCESS_TYPES: [&str; 2] = ["worker", "clock"];

/// Directory whose changed files count as pending migrations.
const MIGRATIONS_PATH: &str = "db";

const MIGRATE_COMMAND: &str = "rake db:migrate db:seed";

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Caller-supplied options for a deploy run.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub environment: Option<String>,
    pub branch: Option<String>,
    pub worker: Option<u32>,
    pub clock: Option<u32>,
}

/// Per-run memoized state. Every field is computed on first access and
/// cached for the remainder of the run.
#[derive(Debug, Default)]
struct DeployContext {
    environment: Option<String>,
    branch: Option<String>,
    revision: Option<String>,
    app_name: Option<String>,
    remote_name: Option<String>,
    app_info: Option<AppInfo>,
    migration_count: Option<usize>,
    process_counts: Option<BTreeMap<String, u32>>,
}

pub struct DeployCommand {
    config: CommandConfig,
    console: Console,
    platform: Box<dyn Platform>,
    options: DeployOptions,
    ctx: DeployContext,
    poll_interval: Duration,
}

impl DeployCommand {
    pub fn new(
        config: CommandConfig,
        console: Console,
        platform: Box<dyn Platform>,
        options: DeployOptions,
    ) -> Self {
        Self {
            config,
            console,
            platform,
            options,
            ctx: DeployContext::default(),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Override the dyno poll interval (tests zero it).
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Fully deploy the application by performing all deploy steps.
    ///
    /// When pending migrations are detected the app is taken into
    /// maintenance mode and its non-web processes scaled down before the
    /// push, then migrated, scaled back up, restarted, and brought out of
    /// maintenance after it. Without pending migrations the run is just
    /// sync, push, notify.
    pub fn all(&mut self) -> Result<()> {
        self.update_code_from_heroku()?;
        self.detect_pending_migrations()?;
        let pending_migrations = self.migration_count()? > 0;
        if pending_migrations {
            self.maintenance_on()?;
            self.scale_down()?;
        }
        self.push_code_to_heroku()?;
        if pending_migrations {
            self.snapshot_db()?;
            self.migrate_db()?;
            self.scale_up()?;
            self.restart_app()?;
            self.maintenance_off()?;
        }
        self.send_notifications()?;
        Ok(())
    }

    /// Update the local copy of the Heroku git remote.
    ///
    /// Ensures the remote alias exists (creating it from the app's git
    /// URL if a probe fails) and fetches its history. Never pushes.
    pub fn update_code_from_heroku(&mut self) -> Result<()> {
        let remote = self.remote_name()?;
        let probe = ShellCommand::new([format!("git remote | grep {remote} > /dev/null")])?;
        let result = ShellCommandRunner::new(&self.console).run(probe)?;
        if !result.success() {
            let git_url = self.app_info()?.git_url;
            let add = ShellCommand::new([format!("git remote add {remote} {git_url}")])?;
            ShellCommandRunner::new(&self.console).run(add)?;
        }
        let fetch = ShellCommand::new([format!("git fetch {remote}")])?;
        ShellCommandRunner::new(&self.console).run(fetch)?;
        let app_name = self.app_name()?;
        self.console
            .ok(format!("Updated code from {app_name} Heroku app"));
        Ok(())
    }

    /// Detect whether the local branch has pending migrations to apply.
    pub fn detect_pending_migrations(&mut self) -> Result<()> {
        let count = self.migration_count()?;
        self.console.ok(migration_message(count));
        Ok(())
    }

    /// Enable maintenance mode for the Heroku app.
    pub fn maintenance_on(&mut self) -> Result<()> {
        let app_name = self.app_name()?;
        self.platform.set_maintenance(&app_name, true)?;
        self.console.ok("Maintenance mode enabled");
        Ok(())
    }

    /// Scale down all non-web processes.
    ///
    /// Only process types whose current count is positive appear in the
    /// batch update; already-zero types are omitted entirely.
    pub fn scale_down(&mut self) -> Result<()> {
        let app_name = self.app_name()?;
        let counts = self.process_counts()?;
        let updates: Vec<FormationUpdate> = counts
            .keys()
            .map(|process_type| FormationUpdate::new(process_type.clone(), 0))
            .collect();
        self.platform.scale(&app_name, &updates)?;
        let updated = describe_counts(&counts);
        if updated.is_empty() {
            self.console.ok("No non-web processes to scale down");
        } else {
            self.console
                .ok(format!("Scaled down {}", updated.join(", ")));
        }
        Ok(())
    }

    /// Push the local git branch to the Heroku remote's mainline.
    pub fn push_code_to_heroku(&mut self) -> Result<()> {
        let remote = self.remote_name()?;
        let branch = self.branch()?;
        let push = ShellCommand::new([format!("git push -f {remote} {branch}:master")])?;
        ShellCommandRunner::new(&self.console).run(push)?;
        self.console.ok("Pushed code to Heroku");
        Ok(())
    }

    /// Capture a snapshot of the Heroku database.
    ///
    /// Fire and forget: the command's result is reported but not checked
    /// beyond its exit code.
    pub fn snapshot_db(&mut self) -> Result<()> {
        let app_name = self.app_name()?;
        let snapshot = ShellCommand::new([format!(
            "heroku pgbackups:capture --expire --app {app_name}"
        )])?;
        ShellCommandRunner::new(&self.console).run(snapshot)?;
        self.console.ok("Database snapshot captured");
        Ok(())
    }

    /// Apply pending migrations on a one-off dyno, polled to completion.
    pub fn migrate_db(&mut self) -> Result<()> {
        if self.migration_count()? > 0 {
            let app_name = self.app_name()?;
            let dyno = self.platform.run_one_off(&app_name, MIGRATE_COMMAND)?;
            self.poll_one_off(&dyno)?;
            self.console.ok("Pending database migrations applied");
        } else {
            self.console.ok("No pending database migrations to apply");
        }
        Ok(())
    }

    /// Scale non-web processes back up.
    ///
    /// Explicit worker/clock counts are applied verbatim, including zero;
    /// without them, each process type is restored to the positive count
    /// captured in the formation snapshot before `scale_down` ran.
    pub fn scale_up(&mut self) -> Result<()> {
        let app_name = self.app_name()?;
        let explicit = self.options.worker.is_some() || self.options.clock.is_some();
        let updates: Vec<FormationUpdate> = if explicit {
            [
                ("worker", self.options.worker),
                ("clock", self.options.clock),
            ]
            .into_iter()
            .filter_map(|(process_type, quantity)| {
                quantity.map(|quantity| FormationUpdate::new(process_type, quantity))
            })
            .collect()
        } else {
            self.process_counts()?
                .iter()
                .map(|(process_type, &quantity)| {
                    FormationUpdate::new(process_type.clone(), quantity)
                })
                .collect()
        };
        self.platform.scale(&app_name, &updates)?;
        let updated = describe_counts(&self.process_counts()?);
        if updated.is_empty() {
            self.console.ok("No non-web processes to scale up");
        } else {
            self.console.ok(format!("Scaled up {}", updated.join(", ")));
        }
        Ok(())
    }

    /// Restart every running web dyno, one at a time.
    pub fn restart_app(&mut self) -> Result<()> {
        let app_name = self.app_name()?;
        let web_dynos: Vec<Dyno> = self
            .platform
            .list_dynos(&app_name)?
            .into_iter()
            .filter(|dyno| dyno.process_type == "web")
            .collect();
        for dyno in &web_dynos {
            self.platform.restart(&app_name, &dyno.id)?;
        }
        match web_dynos.len() {
            0 => self.console.ok("No web dynos to restart"),
            1 => self.console.ok("Restarted 1 web dyno"),
            count => self.console.ok(format!("Restarted {count} web dynos")),
        }
        Ok(())
    }

    /// Disable maintenance mode for the Heroku app.
    pub fn maintenance_off(&mut self) -> Result<()> {
        let app_name = self.app_name()?;
        self.platform.set_maintenance(&app_name, false)?;
        self.console.ok("Maintenance mode disabled");
        Ok(())
    }

    /// Send deploy notifications to the configured external services.
    ///
    /// Each target's command template gets `{environment}` and
    /// `{revision}` interpolated, then runs as a one-off dyno polled to
    /// completion.
    pub fn send_notifications(&mut self) -> Result<()> {
        let targets = match self.config.get_opt("notifications")? {
            Some(value) => value
                .as_mapping()
                .cloned()
                .context("'notifications' config must be a mapping of service to command")?,
            None => return Ok(()),
        };
        if targets.is_empty() {
            return Ok(());
        }

        let context = HashMap::from([
            ("environment".to_string(), self.environment()?),
            ("revision".to_string(), self.revision()?),
        ]);
        let app_name = self.app_name()?;
        for (service, template) in &targets {
            let service = service.as_str().unwrap_or_default();
            let template = template.as_str().with_context(|| {
                format!("notification command for '{service}' must be a string")
            })?;
            let command = interpolate(template, &context)?;
            let dyno = self.platform.run_one_off(&app_name, &command)?;
            self.poll_one_off(&dyno)?;
            self.console
                .ok(format!("Notification sent to {service}"));
        }
        Ok(())
    }

    /// Poll a one-off dyno until the platform reports it gone.
    ///
    /// Absence is the completion signal: a dyno that finished cleanly and
    /// one that crashed and was reaped look identical here, and both are
    /// logged as a transition to `complete`.
    fn poll_one_off(&mut self, dyno: &Dyno) -> Result<()> {
        self.console.trace(format!(
            "Starting process with command `{}`",
            dyno.command
        ));
        let app_name = self.app_name()?;
        let mut state = String::from("starting");
        loop {
            match self.platform.dyno_info(&app_name, &dyno.id) {
                Ok(current) => {
                    if current.state != state {
                        self.console.trace(format!(
                            "State changed from {state} to {}",
                            current.state
                        ));
                        state = current.state;
                    }
                    std::thread::sleep(self.poll_interval);
                }
                Err(err) if err.is_not_found() => {
                    self.console
                        .trace(format!("State changed from {state} to complete"));
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    // Memoized per-run state.

    fn environment(&mut self) -> Result<String> {
        if let Some(environment) = &self.ctx.environment {
            return Ok(environment.clone());
        }
        let configured = match self.options.environment.clone() {
            Some(environment) => Some(environment),
            None => self.config.opt_str("default_environment")?,
        };
        let environment = match configured {
            Some(environment) => environment,
            None => bail!(
                "Deployment environment must be specified, either with --environment or with \
                 'default_environment' config for '{}' command",
                self.config.command_name()
            ),
        };
        self.ctx.environment = Some(environment.clone());
        Ok(environment)
    }

    fn branch(&mut self) -> Result<String> {
        if let Some(branch) = &self.ctx.branch {
            return Ok(branch.clone());
        }
        let environment = self.environment()?;
        let configured = match self.options.branch.clone() {
            Some(branch) => Some(branch),
            None => self.config.opt_str(&format!("{environment}.branch"))?,
        };
        let branch = match configured {
            Some(branch) => branch,
            None => bail!(
                "Local branch name must be specified, either with --branch or with \
                 '{environment}.branch' config for '{}' command",
                self.config.command_name()
            ),
        };
        self.ctx.branch = Some(branch.clone());
        Ok(branch)
    }

    fn revision(&mut self) -> Result<String> {
        if let Some(revision) = &self.ctx.revision {
            return Ok(revision.clone());
        }
        let branch = self.branch()?;
        let (output, _) = capture(&format!("git rev-parse {branch}"))?;
        let revision = output.trim().to_string();
        self.ctx.revision = Some(revision.clone());
        Ok(revision)
    }

    fn app_name(&mut self) -> Result<String> {
        if let Some(app_name) = &self.ctx.app_name {
            return Ok(app_name.clone());
        }
        let environment = self.environment()?;
        let app_name = self
            .config
            .str_value(&format!("{environment}.heroku.app_name"))?;
        self.ctx.app_name = Some(app_name.clone());
        Ok(app_name)
    }

    fn remote_name(&mut self) -> Result<String> {
        if let Some(remote_name) = &self.ctx.remote_name {
            return Ok(remote_name.clone());
        }
        let environment = self.environment()?;
        let remote_name = match self
            .config
            .opt_str(&format!("{environment}.heroku.remote_name"))?
        {
            Some(remote_name) => remote_name,
            None => self.app_name()?,
        };
        self.ctx.remote_name = Some(remote_name.clone());
        Ok(remote_name)
    }

    fn app_info(&mut self) -> Result<AppInfo> {
        if let Some(app_info) = &self.ctx.app_info {
            return Ok(app_info.clone());
        }
        let app_name = self.app_name()?;
        let app_info = self.platform.app_info(&app_name)?;
        self.ctx.app_info = Some(app_info.clone());
        Ok(app_info)
    }

    /// Count of changed files under the migrations directory between the
    /// local branch tip and the remote mainline tip. Computed exactly once
    /// per run.
    fn migration_count(&mut self) -> Result<usize> {
        if let Some(count) = self.ctx.migration_count {
            return Ok(count);
        }
        let branch = self.branch()?;
        let remote = self.remote_name()?;
        let (output, _) = capture(&format!(
            "git diff {branch} {remote}/master --name-only -- {MIGRATIONS_PATH} | wc -l"
        ))?;
        let count = output.trim().parse().unwrap_or(0);
        self.ctx.migration_count = Some(count);
        Ok(count)
    }

    /// Snapshot of positive non-web formation quantities, taken once so
    /// scale-down, scale-up, and restart act on a consistent view.
    fn process_counts(&mut self) -> Result<BTreeMap<String, u32>> {
        if let Some(counts) = &self.ctx.process_counts {
            return Ok(counts.clone());
        }
        let app_name = self.app_name()?;
        let formations = self.platform.formation(&app_name)?;
        let mut counts = BTreeMap::new();
        for process_type in NON_WEB_PROCESS_TYPES {
            let quantity = formations
                .iter()
                .find(|formation| formation.process_type == process_type)
                .map(|formation| formation.quantity)
                .unwrap_or(0);
            if quantity > 0 {
                counts.insert(process_type.to_string(), quantity);
            }
        }
        self.ctx.process_counts = Some(counts.clone());
        Ok(counts)
    }
}

fn migration_message(count: usize) -> String {
    match count {
        0 => "No pending database migrations detected".to_string(),
        1 => "1 pending database migration detected".to_string(),
        count => format!("{count} pending database migrations detected"),
    }
}

/// Human descriptions of a formation snapshot, in the fixed
/// worker-then-clock order.
fn describe_counts(counts: &BTreeMap<String, u32>) -> Vec<String> {
    NON_WEB_PROCESS_TYPES
        .iter()
        .filter_map(|process_type| {
            counts.get(*process_type).map(|&count| match count {
                1 => format!("1 {process_type} process"),
                count => format!("{count} {process_type} processes"),
            })
        })
        .collect()
}

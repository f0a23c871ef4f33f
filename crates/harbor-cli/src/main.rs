//! Harbor - configuration-driven task runner and Heroku deployer
//!
//! Usage:
//!   harbor deploy all                 # Full deploy pipeline
//!   harbor deploy migrate_db          # Any single deploy step
//!   harbor app start                  # Start the application
//!   harbor services start [names...]  # Control platform services
//!   harbor test all                   # Run the test suites

use std::path::Path;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use harbor_core::commands::{
    AppCommand, DeployCommand, DeployOptions, HerokuCommand, ServicesCommand, TestCommand,
};
use harbor_core::config::{CONFIG_FILE, Config};
use harbor_core::console::Console;
use harbor_core::platform::HerokuPlatform;

#[derive(Parser)]
#[command(name = "harbor")]
#[command(about = "Configuration-driven task runner and Heroku deployer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the application
    Deploy(DeployArgs),

    /// Control the application
    App {
        #[command(subcommand)]
        command: AppSubcommand,
    },

    /// Control platform services
    Services {
        #[command(subcommand)]
        command: ServicesSubcommand,
    },

    /// Run tests
    Test {
        #[command(subcommand)]
        command: TestSubcommand,
    },

    /// Manage the Heroku app directly
    Heroku {
        #[command(subcommand)]
        command: HerokuSubcommand,
    },
}

#[derive(Args)]
struct DeployArgs {
    /// Deployment environment (falls back to 'default_environment' config)
    #[arg(long, global = true)]
    environment: Option<String>,

    /// Local branch to deploy (falls back to '<environment>.branch' config)
    #[arg(long, global = true)]
    branch: Option<String>,

    #[command(subcommand)]
    step: DeployStep,
}

#[derive(Subcommand)]
#[command(rename_all = "snake_case")]
enum DeployStep {
    /// Fully deploy the application by performing all deploy steps
    ///
    /// Steps run in this order: update_code_from_heroku,
    /// detect_pending_migrations, then (only when migrations are pending)
    /// maintenance_on and scale_down, push_code_to_heroku, then (only when
    /// migrations are pending) snapshot_db, migrate_db, scale_up,
    /// restart_app, and maintenance_off, and finally send_notifications.
    All,

    /// Update the local copy of the Heroku git remote
    UpdateCodeFromHeroku,

    /// Detect whether the local branch has pending migrations to apply
    DetectPendingMigrations,

    /// Enable maintenance mode for the Heroku app
    MaintenanceOn,

    /// Scale down all non-web processes
    ScaleDown,

    /// Push the local git branch to the Heroku remote
    PushCodeToHeroku,

    /// Capture a snapshot of the Heroku database
    SnapshotDb,

    /// Apply pending migrations to the database
    MigrateDb,

    /// Scale up all non-web processes
    ScaleUp {
        /// Explicit worker process count, applied verbatim
        #[arg(long)]
        worker: Option<u32>,

        /// Explicit clock process count, applied verbatim
        #[arg(long)]
        clock: Option<u32>,
    },

    /// Restart the Heroku app's web dynos
    RestartApp,

    /// Disable maintenance mode for the Heroku app
    MaintenanceOff,

    /// Send deploy notifications to external services
    SendNotifications,
}

#[derive(Subcommand)]
enum AppSubcommand {
    /// Start the application processes
    Start,
}

#[derive(Subcommand)]
enum ServicesSubcommand {
    /// Start some or all platform services
    Start {
        /// Services to start; all of them when omitted
        services: Vec<String>,
    },

    /// Stop some or all platform services
    Stop {
        /// Services to stop; all of them when omitted
        services: Vec<String>,
    },
}

#[derive(Subcommand)]
enum TestSubcommand {
    /// Run all configured test suites
    All,

    /// Run only server tests
    Server,

    /// Run only client tests
    Client,
}

#[derive(Subcommand)]
enum HerokuSubcommand {
    /// Restart all app dynos
    Restartall {
        /// Environment whose app to restart
        environment: String,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harbor=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli.command) {
        Console::stdout().err(format!("{err:#}"));
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    let config = Config::load(Path::new(CONFIG_FILE))?;
    let console = Console::stdout();

    match command {
        Commands::Deploy(args) => run_deploy(&config, console, args),
        Commands::App { command } => {
            let app = AppCommand::new(config.command("app"), console);
            match command {
                AppSubcommand::Start => {
                    app.start()?;
                }
            }
            Ok(())
        }
        Commands::Services { command } => {
            let services = ServicesCommand::from_config(&config.command("services"), console)?;
            match command {
                ServicesSubcommand::Start { services: names } => services.start(&names),
                ServicesSubcommand::Stop { services: names } => services.stop(&names),
            }
        }
        Commands::Test { command } => {
            let test = TestCommand::new(config.command("test"), console);
            match command {
                TestSubcommand::All => test.all(),
                TestSubcommand::Server => test.server().map(|_| ()),
                TestSubcommand::Client => test.client().map(|_| ()),
            }
        }
        Commands::Heroku { command } => {
            let heroku = HerokuCommand::new(
                config.command("heroku"),
                console,
                Box::new(HerokuPlatform::new()),
            );
            match command {
                HerokuSubcommand::Restartall { environment } => heroku.restartall(&environment),
            }
        }
    }
}

fn run_deploy(config: &Config, console: Console, args: DeployArgs) -> Result<()> {
    let mut options = DeployOptions {
        environment: args.environment,
        branch: args.branch,
        worker: None,
        clock: None,
    };
    if let DeployStep::ScaleUp { worker, clock } = &args.step {
        options.worker = *worker;
        options.clock = *clock;
    }

    let mut deploy = DeployCommand::new(
        config.command("deploy"),
        console,
        Box::new(HerokuPlatform::new()),
        options,
    );

    match args.step {
        DeployStep::All => deploy.all(),
        DeployStep::UpdateCodeFromHeroku => deploy.update_code_from_heroku(),
        DeployStep::DetectPendingMigrations => deploy.detect_pending_migrations(),
        DeployStep::MaintenanceOn => deploy.maintenance_on(),
        DeployStep::ScaleDown => deploy.scale_down(),
        DeployStep::PushCodeToHeroku => deploy.push_code_to_heroku(),
        DeployStep::SnapshotDb => deploy.snapshot_db(),
        DeployStep::MigrateDb => deploy.migrate_db(),
        DeployStep::ScaleUp { .. } => deploy.scale_up(),
        DeployStep::RestartApp => deploy.restart_app(),
        DeployStep::MaintenanceOff => deploy.maintenance_off(),
        DeployStep::SendNotifications => deploy.send_notifications(),
    }
}

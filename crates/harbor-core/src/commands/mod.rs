//! Task commands dispatched from the CLI.

mod app;
mod deploy;
mod heroku;
mod services;

pub use app::AppCommand;
pub use deploy::{DeployCommand, DeployOptions};
pub use heroku::HerokuCommand;
pub use services::{Service, ServicesCommand};
pub use test::TestCommand;

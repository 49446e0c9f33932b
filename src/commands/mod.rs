mod config_cmd;
mod migrate;
mod queue;
mod status;

use clap::ValueEnum;

pub use config_cmd::ConfigCommand;
pub use migrate::MigrateCommand;
pub use queue::QueueCommand;
pub use status::StatusCommand;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

mod config_cmd;
mod doc;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use doc::{DocCommand, DocSubcommand};
pub use sync_cmd::SyncCommand;

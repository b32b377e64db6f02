use clap::Subcommand;

use super::{open_app, CliResult};

#[derive(Subcommand)]
pub enum SyncAction {
    /// Run a manual sync round
    Now,
    /// Print the last sync outcome
    Status,
    /// Count records waiting to be pushed
    Pending,
}

pub fn run(action: SyncAction) -> CliResult {
    let app = open_app()?;
    match action {
        SyncAction::Now => {
            let outcome = app.sync_now()?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        SyncAction::Status => {
            println!("{}", serde_json::to_string_pretty(&app.sync_status())?);
        }
        SyncAction::Pending => {
            println!(
                "{}",
                serde_json::json!({ "pending": app.pending_sync_count()? })
            );
        }
    }
    Ok(())
}

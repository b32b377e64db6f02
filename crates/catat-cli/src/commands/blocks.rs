use clap::Subcommand;

use super::{open_app, CliResult};

#[derive(Subcommand)]
pub enum BlocksAction {
    /// List unresolved unlogged blocks
    List,
    /// Log a block retroactively as an activity
    Resolve {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "general")]
        category: String,
    },
    /// Drop a block without logging it
    Dismiss { id: String },
}

pub fn run(action: BlocksAction) -> CliResult {
    let app = open_app()?;
    match action {
        BlocksAction::List => {
            println!("{}", serde_json::to_string_pretty(&app.unlogged_blocks()?)?);
        }
        BlocksAction::Resolve { id, name, category } => {
            match app.resolve_unlogged_block(&id, &name, &category)? {
                Some(activity) => println!("{}", serde_json::to_string_pretty(&activity)?),
                None => println!("{{\"status\": \"not found\"}}"),
            }
        }
        BlocksAction::Dismiss { id } => {
            app.dismiss_unlogged_block(&id)?;
            println!("{{\"status\": \"dismissed\"}}");
        }
    }
    Ok(())
}

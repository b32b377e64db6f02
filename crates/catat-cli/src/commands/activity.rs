use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;

use catat_core::PauseReason;

use super::{open_app, CliResult};

#[derive(Subcommand)]
pub enum ActivityAction {
    /// Start a named activity (closes whatever was running)
    Start {
        name: String,
        /// Category for reports
        #[arg(long, default_value = "general")]
        category: String,
    },
    /// Stop the running activity
    Stop,
    /// Pause the running activity
    Pause {
        /// rest | errand | other
        #[arg(long, default_value = "other")]
        reason: String,
        /// Free-form note stored on the pause log
        #[arg(long)]
        note: Option<String>,
    },
    /// Resume the paused activity
    Resume {
        /// Resume a specific activity instead of the latest paused one
        #[arg(long)]
        id: Option<String>,
    },
    /// Print the running activity as JSON
    Status,
    /// Attach a memo to an activity
    Memo { id: String, memo: String },
    /// List activities overlapping the last N days
    List {
        #[arg(long, default_value = "1")]
        days: i64,
    },
    /// Tracked seconds per category over the last N days
    Report {
        #[arg(long, default_value = "7")]
        days: i64,
    },
}

fn parse_reason(reason: &str) -> PauseReason {
    match reason {
        "rest" => PauseReason::Rest,
        "errand" => PauseReason::Errand,
        _ => PauseReason::Other,
    }
}

pub fn run(action: ActivityAction) -> CliResult {
    let app = open_app()?;
    match action {
        ActivityAction::Start { name, category } => {
            let outcome = app.start_activity(&name, &category)?;
            println!("{}", serde_json::to_string_pretty(&outcome.started)?);
            if let Some(previous) = outcome.previous {
                eprintln!("closed: {} ({})", previous.name, previous.id);
            }
        }
        ActivityAction::Stop => match app.stop_activity()? {
            Some(stopped) => println!("{}", serde_json::to_string_pretty(&stopped)?),
            None => println!("{{\"status\": \"idle\"}}"),
        },
        ActivityAction::Pause { reason, note } => {
            match app.pause_activity(parse_reason(&reason), note)? {
                Some(paused) => println!("{}", serde_json::to_string_pretty(&paused)?),
                None => println!("{{\"status\": \"nothing running\"}}"),
            }
        }
        ActivityAction::Resume { id } => {
            let resumed = match id {
                Some(id) => app.resume_activity_by_id(&id)?,
                None => app.resume_activity()?,
            };
            match resumed {
                Some(activity) => println!("{}", serde_json::to_string_pretty(&activity)?),
                None => println!("{{\"status\": \"nothing paused\"}}"),
            }
        }
        ActivityAction::Status => match app.current_activity()? {
            Some(activity) => {
                let mut value = serde_json::to_value(&activity)?;
                value["elapsed_secs"] =
                    serde_json::json!(activity.elapsed(app.now()).num_seconds());
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            None => println!("{{\"status\": \"idle\"}}"),
        },
        ActivityAction::Memo { id, memo } => match app.attach_memo(&id, &memo)? {
            Some(activity) => println!("{}", serde_json::to_string_pretty(&activity)?),
            None => println!("{{\"status\": \"not found\"}}"),
        },
        ActivityAction::List { days } => {
            let to: DateTime<Utc> = app.now();
            let from = to - Duration::days(days);
            let activities = app.activities_between(from, to)?;
            println!("{}", serde_json::to_string_pretty(&activities)?);
        }
        ActivityAction::Report { days } => {
            let to = app.now();
            let from = to - Duration::days(days);
            let totals = app.duration_by_category(from, to)?;
            let report: serde_json::Map<String, serde_json::Value> = totals
                .into_iter()
                .map(|(category, secs)| (category, serde_json::json!(secs)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

use chrono::{DateTime, Utc};
use clap::Subcommand;

use super::{open_app, CliResult};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Queue a new ad-hoc task
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Alarm time, RFC 3339 (e.g. 2025-03-01T15:00:00Z)
        #[arg(long)]
        alarm: Option<String>,
    },
    /// List open tasks in sort order
    List,
    /// Start a pending task (interrupts the running activity)
    Start { id: String },
    /// Complete an in-progress task
    Done { id: String },
    /// Cancel an in-progress task back to pending
    Cancel { id: String },
    /// Pause an in-progress task
    Pause { id: String },
    /// Resume a paused task
    Resume { id: String },
    /// Set or clear the alarm on a task
    Alarm {
        id: String,
        /// RFC 3339 time; omit to clear
        time: Option<String>,
    },
    /// Move a task to a new sort position
    Move {
        id: String,
        #[arg(long)]
        to: i64,
    },
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    Ok(s.parse::<DateTime<Utc>>()?)
}

pub fn run(action: TaskAction) -> CliResult {
    let app = open_app()?;
    match action {
        TaskAction::Add {
            title,
            description,
            alarm,
        } => {
            let alarm_time = alarm.as_deref().map(parse_time).transpose()?;
            let task = app.create_task(&title, description, alarm_time)?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::List => {
            let tasks = app.open_tasks()?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        TaskAction::Start { id } => match app.start_task(&id)? {
            Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
            None => println!("{{\"status\": \"not startable\"}}"),
        },
        TaskAction::Done { id } => match app.complete_task(&id)? {
            Some(completion) => {
                println!("{}", serde_json::to_string_pretty(&completion.task)?);
                if let Some(resumable) = completion.resumable {
                    eprintln!("resumable: {} ({})", resumable.name, resumable.id);
                }
            }
            None => println!("{{\"status\": \"not in progress\"}}"),
        },
        TaskAction::Cancel { id } => match app.cancel_task(&id)? {
            Some(cancelled) => println!("{}", serde_json::to_string_pretty(&cancelled.task)?),
            None => println!("{{\"status\": \"not in progress\"}}"),
        },
        TaskAction::Pause { id } => match app.pause_task(&id)? {
            Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
            None => println!("{{\"status\": \"not pausable\"}}"),
        },
        TaskAction::Resume { id } => match app.resume_task(&id)? {
            Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
            None => println!("{{\"status\": \"not paused\"}}"),
        },
        TaskAction::Alarm { id, time } => {
            let alarm_time = time.as_deref().map(parse_time).transpose()?;
            match app.set_task_alarm(&id, alarm_time)? {
                Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
                None => println!("{{\"status\": \"not found\"}}"),
            }
        }
        TaskAction::Move { id, to } => match app.reorder_task(&id, to)? {
            Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
            None => println!("{{\"status\": \"not found\"}}"),
        },
    }
    Ok(())
}

use clap::Subcommand;
use uuid::Uuid;

use catat_core::{FlowStep, FlowTemplate, SafetyWindow};

use super::{open_app, CliResult};

#[derive(Subcommand)]
pub enum FlowAction {
    /// Register a flow template with IF/THEN steps (JSON array)
    AddTemplate {
        id: String,
        name: String,
        #[arg(long, default_value = "general")]
        category: String,
        /// e.g. '[{"condition":"window open","action":"wudhu","activity_name":"Wudhu"}]'
        #[arg(long)]
        steps: String,
    },
    /// List registered templates
    Templates,
    /// Bind a daily clock window to a template
    AddWindow {
        /// Template id this window triggers
        #[arg(long)]
        flow: String,
        /// Window start, HH:MM (UTC)
        #[arg(long)]
        start: String,
        /// Window end, HH:MM (UTC)
        #[arg(long)]
        end: String,
    },
    /// List windows
    Windows,
    /// Remove a window
    RemoveWindow { id: String },
    /// Settle windows against the current time and list open offers
    Eval,
    /// Acknowledge an offered window and start its first step
    OnIt { window: String },
    /// Complete the current step of a window's flow
    StepDone { window: String },
    /// Abandon the in-progress flow for a window
    Abandon { window: String },
    /// Toggle haid mode on or off
    Haid {
        #[arg(value_parser = ["on", "off", "status"])]
        state: String,
    },
    /// Answer the periodic haid check-in
    HaidPrompt {
        #[arg(long)]
        still_active: bool,
    },
}

fn parse_hhmm(s: &str) -> Result<(u32, u32), Box<dyn std::error::Error>> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| format!("invalid time '{s}', expected HH:MM"))?;
    Ok((h.parse()?, m.parse()?))
}

pub fn run(action: FlowAction) -> CliResult {
    let app = open_app()?;
    match action {
        FlowAction::AddTemplate {
            id,
            name,
            category,
            steps,
        } => {
            let steps: Vec<FlowStep> = serde_json::from_str(&steps)?;
            let template = FlowTemplate {
                id,
                name,
                category,
                steps,
            };
            app.add_flow_template(&template)?;
            println!("{}", serde_json::to_string_pretty(&template)?);
        }
        FlowAction::Templates => {
            println!("{}", serde_json::to_string_pretty(&app.flow_templates()?)?);
        }
        FlowAction::AddWindow { flow, start, end } => {
            let (start_hour, start_minute) = parse_hhmm(&start)?;
            let (end_hour, end_minute) = parse_hhmm(&end)?;
            let window = SafetyWindow {
                id: format!("window-{}", Uuid::new_v4()),
                start_hour,
                start_minute,
                end_hour,
                end_minute,
                linked_flow_id: flow,
            };
            app.add_safety_window(&window)?;
            println!("{}", serde_json::to_string_pretty(&window)?);
        }
        FlowAction::Windows => {
            println!("{}", serde_json::to_string_pretty(&app.safety_windows()?)?);
        }
        FlowAction::RemoveWindow { id } => {
            app.remove_safety_window(&id)?;
            println!("{{\"status\": \"removed\"}}");
        }
        FlowAction::Eval => {
            let offers = app.evaluate_flows()?;
            let open: Vec<serde_json::Value> = offers
                .iter()
                .map(|o| {
                    serde_json::json!({
                        "window": o.window.id,
                        "flow": o.template.name,
                        "until": o.window_end,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&open)?);
        }
        FlowAction::OnIt { window } => match app.acknowledge_flow(&window)? {
            Some(log) => println!("{}", serde_json::to_string_pretty(&log)?),
            None => println!("{{\"status\": \"nothing to acknowledge\"}}"),
        },
        FlowAction::StepDone { window } => match app.complete_flow_step(&window)? {
            Some(log) => println!("{}", serde_json::to_string_pretty(&log)?),
            None => println!("{{\"status\": \"no step in progress\"}}"),
        },
        FlowAction::Abandon { window } => match app.abandon_flow(&window)? {
            Some(log) => println!("{}", serde_json::to_string_pretty(&log)?),
            None => println!("{{\"status\": \"no flow in progress\"}}"),
        },
        FlowAction::Haid { state } => match state.as_str() {
            "on" => {
                let mode = app.set_haid_active(true)?;
                println!("{}", serde_json::to_string_pretty(&mode)?);
            }
            "off" => {
                let mode = app.set_haid_active(false)?;
                println!("{}", serde_json::to_string_pretty(&mode)?);
            }
            _ => {
                let mode = app.haid_mode()?;
                let mut value = serde_json::to_value(&mode)?;
                value["prompt_due"] = serde_json::json!(app.haid_prompt_due()?);
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
        },
        FlowAction::HaidPrompt { still_active } => {
            let mode = app.answer_haid_prompt(still_active)?;
            println!("{}", serde_json::to_string_pretty(&mode)?);
        }
    }
    Ok(())
}

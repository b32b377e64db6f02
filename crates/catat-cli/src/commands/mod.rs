pub mod activity;
pub mod blocks;
pub mod config;
pub mod flow;
pub mod sync;
pub mod task;

use catat_core::{App, InMemoryRemote};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Open the app against the on-disk store.
///
/// The remote backend is supplied by the hosting application; standalone
/// CLI invocations run against an in-memory remote, so sync commands
/// exercise the full pipeline but do not leave the machine.
pub fn open_app() -> Result<App, Box<dyn std::error::Error>> {
    Ok(App::open(Box::new(InMemoryRemote::new()))?)
}

/// The `open` top-level command: foreground pass.
pub fn open() -> CliResult {
    let app = open_app()?;
    let report = app.opened()?;
    let summary = serde_json::json!({
        "orphans_closed": report.orphans_closed.len(),
        "flow_offers": report.offers.iter().map(|o| o.window.id.clone()).collect::<Vec<_>>(),
        "unlogged_found": report.unlogged_found.len(),
        "sync": report.sync,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// The `tick` top-level command: one poll step.
pub fn tick() -> CliResult {
    let app = open_app()?;
    let report = app.tick()?;
    let summary = serde_json::json!({
        "flow_offers": report.offers.iter().map(|o| o.window.id.clone()).collect::<Vec<_>>(),
        "flow_alarms": report.flow_alarms,
        "task_alarms": report.task_alarms.iter().map(|t| t.title.clone()).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

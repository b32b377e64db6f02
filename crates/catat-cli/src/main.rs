use clap::{CommandFactory, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "catat-cli", version, about = "Catat time logger CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Activity tracking
    Activity {
        #[command(subcommand)]
        action: commands::activity::ActivityAction,
    },
    /// Ad-hoc task queue
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Guided flows, safety windows and haid mode
    Flow {
        #[command(subcommand)]
        action: commands::flow::FlowAction,
    },
    /// Sync control and status
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
    /// Unlogged time blocks
    Blocks {
        #[command(subcommand)]
        action: commands::blocks::BlocksAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Run the app-open pass: orphan cleanup, window settlement, sweep, sync
    Open,
    /// Run one poll tick: settle windows, fire due alarms
    Tick,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Activity { action } => commands::activity::run(action),
        Commands::Task { action } => commands::task::run(action),
        Commands::Flow { action } => commands::flow::run(action),
        Commands::Sync { action } => commands::sync::run(action),
        Commands::Blocks { action } => commands::blocks::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Open => commands::open(),
        Commands::Tick => commands::tick(),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "catat-cli", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

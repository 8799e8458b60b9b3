mod cmd;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "soar",
    about = "Human-in-the-loop remediation: propose a command, approve it, dispatch it",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: /etc/soar/config.yaml)
    #[arg(long, global = true, env = soar_core::paths::CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log pipeline steps to stderr
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Proposal stage: turn detection events into a pending action
    Propose {
        /// Event records, one per line ("-" for stdin; the default unless
        /// --sample or --command is given)
        #[arg(long, conflicts_with = "sample")]
        events: Option<PathBuf>,

        /// Use this record as the detection sample instead of scanning events
        #[arg(long)]
        sample: Option<String>,

        /// Occurrence count for --sample
        #[arg(long, default_value_t = 1, requires = "sample")]
        count: u64,

        /// Propose this command directly, skipping the oracle
        #[arg(long)]
        command: Option<String>,
    },

    /// Approval stage: review the pending action and execute or discard it
    Approve {
        /// Approve without prompting
        #[arg(long, conflicts_with = "no")]
        yes: bool,

        /// Reject without prompting
        #[arg(long)]
        no: bool,
    },

    /// Show the pending action
    Status,

    /// Show which backend and priority a command would get
    Classify {
        /// Command text
        text: String,
    },

    /// Discard the pending action without notifying
    Clear,

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = soar_core::paths::config_path(cli.config.as_deref());

    let result = match cli.command {
        Commands::Propose {
            events,
            sample,
            count,
            command,
        } => {
            let source = match (events, sample) {
                (Some(path), _) => Some(cmd::propose::SignalSource::Events(path)),
                (None, Some(text)) => Some(cmd::propose::SignalSource::Sample { text, count }),
                (None, None) => None,
            };
            cmd::propose::run(&config_path, source, command, cli.json)
        }
        Commands::Approve { yes, no } => cmd::approve::run(&config_path, yes, no, cli.json),
        Commands::Status => cmd::status::run(&config_path, cli.json),
        Commands::Classify { text } => cmd::classify::run(&text, cli.json),
        Commands::Clear => cmd::clear::run(&config_path, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&config_path, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

use crate::output::{print_fields, print_json};
use crate::settings;
use anyhow::Context;
use soar_core::config::Stage;
use soar_core::notify;
use soar_core::oracle::GeminiOracle;
use soar_core::pending::{PendingStore, WriteOutcome};
use soar_core::proposal::{CommandProposal, IntakeOutcome, ProposalIntake};
use soar_core::report::OutcomeReporter;
use soar_core::signal::DetectionSignal;
use std::io::BufReader;
use std::path::{Path, PathBuf};

const MANUAL_SAMPLE: &str = "manual proposal";

pub enum SignalSource {
    /// Scan a file of event records; `-` reads stdin.
    Events(PathBuf),
    Sample { text: String, count: u64 },
}

pub fn run(
    config_path: &Path,
    source: Option<SignalSource>,
    command: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let manual = command.is_some();
    let config = settings::load_for(config_path, Stage::Propose { manual })?;

    let source = match source {
        Some(s) => s,
        None if manual => SignalSource::Sample {
            text: MANUAL_SAMPLE.to_string(),
            count: 0,
        },
        None => SignalSource::Events(PathBuf::from("-")),
    };
    let Some(signal) = read_signal(source)? else {
        tracing::info!("no event records; nothing to propose");
        if json {
            print_json(&serde_json::json!({ "outcome": "no_signal" }))?;
        } else {
            println!("No event records. Nothing proposed.");
        }
        return Ok(());
    };

    let store = PendingStore::new(&config.pending_file);
    let notifier = notify::from_config(&config.notify).context("failed to set up notifier")?;
    let intake = ProposalIntake::new(&store, OutcomeReporter::new(notifier), config.severity_threshold);

    let outcome = match command {
        Some(text) => {
            let proposal = CommandProposal::new(text, &signal, config.severity_threshold);
            intake.submit(proposal, &signal)?
        }
        None => {
            let oracle = GeminiOracle::new(&config.oracle).context("failed to set up oracle")?;
            intake.propose(&oracle, &signal)?
        }
    };

    if json {
        print_json(&outcome)?;
    } else {
        print_outcome(&outcome, &store);
    }
    Ok(())
}

fn read_signal(source: SignalSource) -> anyhow::Result<Option<DetectionSignal>> {
    match source {
        SignalSource::Sample { text, count } => Ok(Some(DetectionSignal::new(text, count))),
        SignalSource::Events(path) if path.as_os_str() == "-" => {
            let stdin = std::io::stdin();
            Ok(DetectionSignal::scan_reader(stdin.lock()).context("failed to read events from stdin")?)
        }
        SignalSource::Events(path) => {
            let file = std::fs::File::open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Ok(DetectionSignal::scan_reader(BufReader::new(file))
                .with_context(|| format!("failed to read {}", path.display()))?)
        }
    }
}

fn print_outcome(outcome: &IntakeOutcome, store: &PendingStore) {
    match outcome.write {
        WriteOutcome::Written => println!("Pending action stored."),
        WriteOutcome::Skipped => {
            println!("Skipped: a higher-priority action is already pending.")
        }
    }
    let mut rows = vec![
        ("Command", outcome.proposal.command_text.clone()),
        ("Priority", outcome.proposal.priority().to_string()),
        ("Severity", outcome.proposal.derived_severity.to_string()),
        ("Store", store.path().display().to_string()),
    ];
    if outcome.fallback {
        rows.push(("Oracle", "failed; fallback stored".to_string()));
    }
    print_fields(&rows);
}

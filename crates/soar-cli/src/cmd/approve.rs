use crate::output::{print_fields, print_json};
use crate::settings;
use anyhow::Context;
use soar_core::approval::{ApprovalGate, ApprovalPrompt, DecisionSource, GateOutcome, Preset};
use soar_core::config::Stage;
use soar_core::exec::{Dispatcher, Execution};
use soar_core::notify;
use soar_core::pending::PendingStore;
use soar_core::report::{render_detail, OutcomeReporter};
use soar_core::types::HumanChoice;
use std::io::Write;
use std::path::Path;
use tokio::io::AsyncBufReadExt;

pub fn run(config_path: &Path, yes: bool, no: bool, json: bool) -> anyhow::Result<()> {
    let config = settings::load_for(config_path, Stage::Approve)?;
    let store = PendingStore::new(&config.pending_file);
    let dispatcher = Dispatcher::from_config(&config).context("failed to set up executors")?;
    let notifier = notify::from_config(&config.notify).context("failed to set up notifier")?;
    let gate = ApprovalGate::new(&store, dispatcher, OutcomeReporter::new(notifier));

    let mut source: Box<dyn DecisionSource> = match (yes, no) {
        (true, _) => Box::new(Preset(HumanChoice::Approve)),
        (_, true) => Box::new(Preset(HumanChoice::Reject)),
        _ => Box::new(TerminalDecision),
    };
    let outcome = gate.run(source.as_mut())?;

    if json {
        print_json(&outcome)?;
    } else {
        print_outcome(&outcome);
    }

    if let GateOutcome::Executed { execution, .. } = &outcome {
        if !execution.succeeded() {
            anyhow::bail!("approved command failed");
        }
    }
    Ok(())
}

fn print_outcome(outcome: &GateOutcome) {
    match outcome {
        GateOutcome::NoPendingAction => println!("No pending action."),
        GateOutcome::Cancelled { action, .. } => {
            println!("Cancelled. Discarded: {}", action.command_text);
        }
        GateOutcome::Executed {
            action, execution, ..
        } => {
            let verdict = if execution.succeeded() { "succeeded" } else { "failed" };
            println!("Execution {verdict}.");
            print_fields(&[
                ("Command", action.command_text.clone()),
                ("Target", execution.backend().label().to_string()),
            ]);
            if let Execution::Fleet(fleet) = execution {
                println!(
                    "{} of {} devices applied the command.",
                    fleet.results.iter().filter(|r| r.succeeded).count(),
                    fleet.results.len()
                );
            }
            for line in render_detail(execution) {
                println!("  {line}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TerminalDecision
// ---------------------------------------------------------------------------

/// Asks on the terminal. EOF, read errors and Ctrl-C all count as reject.
/// A Ctrl-C after the answer aborts the run with exit status 130.
struct TerminalDecision;

impl DecisionSource for TerminalDecision {
    fn collect(&mut self, prompt: &ApprovalPrompt) -> HumanChoice {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "Pending action");
        let _ = writeln!(err, "  Target:  {} ({})", prompt.label, prompt.backend);
        let _ = writeln!(err, "  Command: {}", prompt.command);
        let _ = write!(err, "Execute this command? [y/N] ");
        let _ = err.flush();
        drop(err);

        let answer = read_answer();
        watch_interrupts();
        match answer {
            Ok(Some(answer)) => HumanChoice::from_answer(&answer),
            Ok(None) => {
                eprintln!();
                tracing::info!("input closed; treating as reject");
                HumanChoice::Reject
            }
            Err(e) => {
                eprintln!();
                tracing::warn!(error = %e, "no answer read; treating as reject");
                HumanChoice::Reject
            }
        }
    }
}

/// One line from stdin, or `None` on EOF. Ctrl-C ends the wait with an error.
fn read_answer() -> anyhow::Result<Option<String>> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start input runtime")?;

    let answer = rt.block_on(async {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        tokio::select! {
            line = lines.next_line() => line.context("failed to read answer"),
            _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted")),
        }
    });
    // the stdin reader may still be parked on a blocking read
    rt.shutdown_background();
    answer
}

/// Listening for Ctrl-C above takes SIGINT away from its default handler for
/// good, so from here on an interrupt must end the process explicitly.
fn watch_interrupts() {
    let spawned = std::thread::Builder::new()
        .name("interrupt-watch".into())
        .spawn(|| {
            let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to start interrupt watcher");
                    return;
                }
            };
            if rt.block_on(tokio::signal::ctrl_c()).is_ok() {
                eprintln!();
                eprintln!("interrupted");
                tracing::warn!("interrupted while executing approved command");
                std::process::exit(130);
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "failed to spawn interrupt watcher");
    }
}

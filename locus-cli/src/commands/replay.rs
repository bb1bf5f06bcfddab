//! `locus replay`: run a scripted session and print what consumers saw.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use locus_coordinator::scenario::{self, ReplayOutcome};
use locus_coordinator::{init_tracing, Reply};
use locus_core::settings;

/// Arguments for `locus replay`.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Scenario file (YAML).
    pub scenario: PathBuf,

    /// Directory holding `.locus/`; defaults to the home directory.
    #[arg(long)]
    pub home: Option<PathBuf>,

    /// Render a table instead of one JSON object per line.
    #[arg(long)]
    pub table: bool,
}

impl ReplayArgs {
    pub fn run(self) -> Result<()> {
        let home = super::resolve_home(self.home)?;
        let settings = settings::load_at(&home).context("failed to load settings")?;
        init_tracing(&settings.log_filter);

        let scenario = scenario::load(&self.scenario)
            .with_context(|| format!("cannot load scenario '{}'", self.scenario.display()))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        let outcome = runtime
            .block_on(scenario::replay(&scenario, &settings))
            .context("replay failed")?;

        if self.table {
            print_table(&outcome)
        } else {
            print_json_lines(&outcome)
        }
    }
}

fn print_json_lines(outcome: &ReplayOutcome) -> Result<()> {
    for reply in &outcome.replies {
        println!(
            "{}",
            serde_json::to_string(&reply.to_json()).context("failed to serialize reply")?
        );
    }
    Ok(())
}

#[derive(Tabled)]
struct ReplyRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "callback")]
    callback: String,
    #[tabled(rename = "result")]
    result: String,
    #[tabled(rename = "open")]
    open: String,
    #[tabled(rename = "payload")]
    payload: String,
}

fn print_table(outcome: &ReplayOutcome) -> Result<()> {
    if outcome.replies.is_empty() {
        println!("No replies.");
    } else {
        let rows = outcome
            .replies
            .iter()
            .enumerate()
            .map(|(index, reply)| row(index + 1, reply))
            .collect::<Result<Vec<_>>>()?;
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    let state = &outcome.final_state;
    let stream = if state.stream_running {
        "running".yellow().bold()
    } else {
        "stopped".green().bold()
    };
    println!(
        "stream {stream} | {} watches | one-shot {} | permission {}",
        state.watch_ids.len(),
        pending_label(state.current_position_pending),
        pending_label(state.permission_pending),
    );
    Ok(())
}

fn row(index: usize, reply: &Reply) -> Result<ReplyRow> {
    let json = reply.to_json();
    let result = match reply.error_code() {
        None => "ok".green().to_string(),
        Some(code) => code.red().bold().to_string(),
    };
    Ok(ReplyRow {
        index,
        callback: reply.callback_id.to_string(),
        result,
        open: (if reply.keep_open { "yes" } else { "" }).to_string(),
        payload: serde_json::to_string(&json["payload"]).context("failed to serialize payload")?,
    })
}

fn pending_label(pending: bool) -> &'static str {
    if pending {
        "pending"
    } else {
        "idle"
    }
}

//! # Classify Subcommand
//!
//! Runs the classifier offline. Nothing is logged or dispatched.

use std::io::Write;

use clap::Args;
use serde::Serialize;

use triage_core::TriageResult;

/// Arguments for the classify subcommand.
#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Message text. Multiple words are joined with spaces.
    #[arg(required = true, num_args = 1..)]
    pub text: Vec<String>,

    /// Print compact JSON on one line.
    #[arg(long)]
    pub compact: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyOutput<'a> {
    #[serde(flatten)]
    triage: &'a TriageResult,
    headline: String,
    estimated_response_text: String,
}

/// Classify `args.text` and write the result as JSON to `out`.
pub fn run(args: &ClassifyArgs, out: &mut impl Write) -> anyhow::Result<TriageResult> {
    let text = args.text.join(" ");
    let triage = triage_classifier::classify(&text);
    let output = ClassifyOutput {
        triage: &triage,
        headline: triage.headline(),
        estimated_response_text: triage.estimated_response.to_string(),
    };
    if args.compact {
        serde_json::to_writer(&mut *out, &output)?;
    } else {
        serde_json::to_writer_pretty(&mut *out, &output)?;
    }
    writeln!(out)?;
    Ok(triage)
}

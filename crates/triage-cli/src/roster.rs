//! # Roster Subcommand
//!
//! Validates a YAML technician roster the same way the server loads it and
//! reports on-call coverage per category.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};

use triage_core::Category;
use triage_dispatch::{Directory, InMemoryDirectory};

/// Arguments for the roster subcommand.
#[derive(Args, Debug)]
pub struct RosterArgs {
    #[command(subcommand)]
    pub command: RosterCommand,
}

#[derive(Subcommand, Debug)]
pub enum RosterCommand {
    /// Parse and validate a roster file.
    Check {
        /// Path to the roster YAML.
        file: PathBuf,

        /// Exit non-zero when any category has nobody on call.
        #[arg(long)]
        strict: bool,
    },
}

/// Per-category on-call counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coverage {
    pub technicians: usize,
    pub on_call: Vec<(Category, usize)>,
}

impl Coverage {
    pub fn of(directory: &InMemoryDirectory) -> Self {
        Self {
            technicians: directory.len(),
            on_call: Category::all()
                .into_iter()
                .map(|c| (c, directory.on_call_count(c)))
                .collect(),
        }
    }

    /// Categories with nobody on call.
    pub fn uncovered(&self) -> Vec<Category> {
        self.on_call
            .iter()
            .filter(|(_, n)| *n == 0)
            .map(|(c, _)| *c)
            .collect()
    }
}

pub fn run(args: &RosterArgs, out: &mut impl Write) -> anyhow::Result<Coverage> {
    match &args.command {
        RosterCommand::Check { file, strict } => {
            let directory = InMemoryDirectory::load(file)
                .with_context(|| format!("roster {} is invalid", file.display()))?;
            let coverage = Coverage::of(&directory);

            writeln!(out, "{}: {} technicians", file.display(), coverage.technicians)?;
            for (category, count) in &coverage.on_call {
                writeln!(out, "  {:<10} {count} on call", category.as_str())?;
            }

            let uncovered = coverage.uncovered();
            if !uncovered.is_empty() {
                let names: Vec<&str> = uncovered.iter().map(|c| c.as_str()).collect();
                tracing::warn!(categories = ?names, "categories with nobody on call");
                if *strict {
                    anyhow::bail!("no on-call coverage for {}", names.join(", "));
                }
            }
            Ok(coverage)
        }
    }
}

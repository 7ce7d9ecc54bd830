//! `toolcast validate` -- check newline-delimited envelopes.
//!
//! Each non-blank line goes through the same gate the channel receiver
//! applies: the byte ceiling first, then the validating decoder. A line that
//! is not UTF-8 is rejected like any other invalid message and the run goes
//! on. One verdict is printed per line, then a summary. Any rejection makes
//! the command fail.
//!
//! # Examples
//!
//! ```text
//! toolcast validate captured.jsonl
//! cat captured.jsonl | toolcast validate
//! ```

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use toolcast_types::{MAX_MESSAGE_BYTES, ToolEventEnvelope, deserialize};

/// Arguments for the `validate` subcommand.
#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// File with one JSON envelope per line (stdin when omitted).
    pub file: Option<PathBuf>,
}

/// Verdict for one line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineVerdict {
    Accepted(ToolEventEnvelope),
    Oversized { bytes: usize },
    Invalid,
}

/// Classify one raw message.
pub fn check_line(raw: &str) -> LineVerdict {
    if raw.len() > MAX_MESSAGE_BYTES {
        return LineVerdict::Oversized { bytes: raw.len() };
    }
    match deserialize(raw) {
        Some(envelope) => LineVerdict::Accepted(envelope),
        None => LineVerdict::Invalid,
    }
}

/// Counts over a whole stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    pub accepted: usize,
    pub rejected: usize,
}

/// Validate every line of `input`, writing verdicts to `out`.
pub fn validate_stream<R: BufRead, W: Write>(input: R, out: &mut W) -> io::Result<ValidationSummary> {
    let mut summary = ValidationSummary::default();

    for (idx, raw) in input.split(b'\n').enumerate() {
        let mut raw = raw?;
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        let line_no = idx + 1;

        let verdict = match String::from_utf8(raw) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => check_line(&line),
            Err(_) => LineVerdict::Invalid,
        };
        match verdict {
            LineVerdict::Accepted(envelope) => {
                summary.accepted += 1;
                writeln!(out, "line {line_no}: ok {} {}", envelope.event_type, envelope.tool_id)?;
            }
            LineVerdict::Oversized { bytes } => {
                summary.rejected += 1;
                writeln!(
                    out,
                    "line {line_no}: rejected, {bytes} bytes exceeds the {MAX_MESSAGE_BYTES}-byte limit"
                )?;
            }
            LineVerdict::Invalid => {
                summary.rejected += 1;
                writeln!(out, "line {line_no}: rejected, not a valid envelope")?;
            }
        }
    }

    writeln!(out, "{} accepted, {} rejected", summary.accepted, summary.rejected)?;
    Ok(summary)
}

/// Run the `validate` subcommand.
pub fn run(args: ValidateArgs) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let summary = match &args.file {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            validate_stream(BufReader::new(file), &mut out)?
        }
        None => validate_stream(io::stdin().lock(), &mut out)?,
    };

    if summary.rejected > 0 {
        anyhow::bail!("{} envelope(s) rejected", summary.rejected);
    }
    Ok(())
}

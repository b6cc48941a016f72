// crmsync/src/pipeline/progress.rs
use std::fmt;

use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Collect,
    Match,
    Derive,
    Write,
    Export,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Collect => "collect",
            Phase::Match => "match",
            Phase::Derive => "derive",
            Phase::Write => "write",
            Phase::Export => "export",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started { phase: Phase, label: String },
    Progress { phase: Phase, count: usize },
    Completed { phase: Phase, count: usize },
    Skipped { id: String, reason: String },
}

/// Receives pipeline progress. Implementations decide where it goes.
pub trait ProgressReporter {
    fn report(&self, event: ProgressEvent);

    fn on_progress(&self, phase: Phase, count: usize) {
        self.report(ProgressEvent::Progress { phase, count });
    }
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { phase, label } => info!("[*] {}: {}", phase, label),
            ProgressEvent::Progress { phase, count } => info!("  [*] {}: {} so far...", phase, count),
            ProgressEvent::Completed { phase, count } => info!("[*] {} finished: {}", phase, count),
            ProgressEvent::Skipped { id, reason } => warn!("SKIPPED: {} - {}", id, reason),
        }
    }
}

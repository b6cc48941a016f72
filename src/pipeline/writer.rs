// crmsync/src/pipeline/writer.rs
use log::{error, info};
use reqwest::Method;
use serde_json::{Value, json};

use super::progress::{Phase, ProgressEvent, ProgressReporter};
use crate::client::{RequestExecutor, Transport};
use crate::errors::{AppError, Result};

/// One element of a batch endpoint's `inputs` array.
pub trait BatchInput {
    fn to_input(&self) -> Value;
}

/// What a batch run achieved. `failure` is set when a chunk failed permanently;
/// `written` then counts only the chunks accepted before it.
#[derive(Debug)]
pub struct WriteOutcome {
    pub written: usize,
    pub batches: usize,
    pub failure: Option<AppError>,
}

impl WriteOutcome {
    pub fn into_result(self) -> Result<usize> {
        match self.failure {
            Some(e) => Err(e),
            None => Ok(self.written),
        }
    }
}

/// Submits write intents in fixed-size chunks, stopping at the first chunk that fails.
pub struct BatchWriter<'a, T, R> {
    executor: &'a RequestExecutor<T>,
    reporter: &'a R,
    batch_size: usize,
}

impl<'a, T: Transport, R: ProgressReporter> BatchWriter<'a, T, R> {
    pub fn new(executor: &'a RequestExecutor<T>, reporter: &'a R, batch_size: usize) -> Self {
        BatchWriter {
            executor,
            reporter,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn write_batches<I: BatchInput>(&self, intents: &[I], path: &str, label: &str) -> WriteOutcome {
        let url = self.executor.endpoint(path);
        let mut outcome = WriteOutcome { written: 0, batches: 0, failure: None };

        self.reporter.report(ProgressEvent::Started {
            phase: Phase::Write,
            label: format!("submitting {} {} in batches of {}", intents.len(), label, self.batch_size),
        });

        for chunk in intents.chunks(self.batch_size) {
            let inputs: Vec<Value> = chunk.iter().map(BatchInput::to_input).collect();
            let payload = json!({ "inputs": inputs });

            info!("  [*] Submitting batch of {} {}...", chunk.len(), label);
            if let Err(e) = self.executor.execute(Method::POST, &url, Some(&payload)).await {
                if e.is_permanent_failure() {
                    error!(
                        "[!!] FATAL: a batch of {} failed permanently after {} written. Stopping.",
                        label, outcome.written
                    );
                } else {
                    error!("[!!] A batch of {} could not be submitted: {}. Stopping.", label, e);
                }
                outcome.failure = Some(e);
                break;
            }
            outcome.written += chunk.len();
            outcome.batches += 1;
            self.reporter.on_progress(Phase::Write, outcome.written);
        }

        if outcome.failure.is_none() {
            self.reporter.report(ProgressEvent::Completed { phase: Phase::Write, count: outcome.written });
        }
        outcome
    }
}

//! Channel binding: input -> filter -> output, with failures on a side channel.

use crate::errors::FilterError;
use crate::filter::ScriptedFilter;
use crate::message::{Action, Message};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A message whose evaluation failed; it was neither forwarded nor dropped.
#[derive(Debug)]
pub struct FailedMessage {
    pub message: Message,
    pub error: FilterError,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub received: u64,
    pub forwarded: u64,
    pub dropped: u64,
    pub failed: u64,
}

/// The caller's side of a bound processor.
pub struct Binding {
    pub input: mpsc::Sender<Message>,
    pub output: mpsc::Receiver<Message>,
    pub errors: mpsc::Receiver<FailedMessage>,
    pub handle: JoinHandle<ProcessorStats>,
}

pub struct Processor;

impl Processor {
    /// Spawn the processing loop on the current tokio runtime. It runs until
    /// every input sender is dropped or the output receiver goes away.
    pub fn bind(filter: Arc<ScriptedFilter>, capacity: usize) -> Binding {
        let (input, input_rx) = mpsc::channel(capacity);
        let (output_tx, output) = mpsc::channel(capacity);
        let (errors_tx, errors) = mpsc::channel(capacity);
        let handle = tokio::spawn(Self::run(filter, input_rx, output_tx, errors_tx));
        Binding { input, output, errors, handle }
    }

    pub async fn run(
        filter: Arc<ScriptedFilter>,
        mut input: mpsc::Receiver<Message>,
        output: mpsc::Sender<Message>,
        errors: mpsc::Sender<FailedMessage>,
    ) -> ProcessorStats {
        let mut stats = ProcessorStats::default();
        while let Some(message) = input.recv().await {
            stats.received += 1;
            match filter.evaluate(&message) {
                Ok(verdict) => match ScriptedFilter::route(message, verdict) {
                    Action::Forward(message) => {
                        if output.send(message).await.is_err() {
                            tracing::warn!("output channel closed, stopping");
                            break;
                        }
                        stats.forwarded += 1;
                    }
                    Action::Drop => {
                        stats.dropped += 1;
                        tracing::debug!("message dropped");
                    }
                },
                Err(error) => {
                    stats.failed += 1;
                    tracing::warn!(%error, "message failed evaluation");
                    if errors.send(FailedMessage { message, error }).await.is_err() {
                        tracing::debug!("error channel closed, failure discarded");
                    }
                }
            }
        }
        tracing::info!(
            received = stats.received,
            forwarded = stats.forwarded,
            dropped = stats.dropped,
            failed = stats.failed,
            "processor stopped"
        );
        stats
    }
}

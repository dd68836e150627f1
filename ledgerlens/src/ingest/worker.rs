//! The ingestion worker: a dedicated OS thread reachable only through channels
//!
//! Requests are processed one at a time in arrival order. Outgoing messages
//! go through a bounded channel, so a slow host throttles the parser instead
//! of letting batches pile up in memory.

use crate::ingest::classifier::{DirectionClassifier, KeywordClassifier};
use crate::ingest::config::IngestConfig;
use crate::ingest::error::IngestError;
use crate::ingest::parser::parse_statement;
use crate::ingest::protocol::{ParseRequest, WorkerMessage, WorkerRequest};
use anyhow::{Context, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Handle to a running worker thread
pub struct IngestWorker {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    thread: Option<JoinHandle<()>>,
}

impl IngestWorker {
    /// Spawn a worker with the keyword direction classifier from `config`
    pub fn spawn(config: IngestConfig) -> Result<(Self, mpsc::Receiver<WorkerMessage>)> {
        let classifier = Arc::new(KeywordClassifier::new(&config.credit_keywords));
        Self::spawn_with_classifier(config, classifier)
    }

    pub fn spawn_with_classifier(
        config: IngestConfig,
        classifier: Arc<dyn DirectionClassifier>,
    ) -> Result<(Self, mpsc::Receiver<WorkerMessage>)> {
        if let Err(e) = config.validate() {
            anyhow::bail!("Invalid ingest configuration: {}", e);
        }

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::channel(config.channel_capacity);

        let thread = std::thread::Builder::new()
            .name("ledgerlens-ingest".to_string())
            .spawn(move || run_worker(config, classifier, request_rx, message_tx))
            .context("Failed to spawn ingestion worker thread")?;

        Ok((
            Self {
                requests: request_tx,
                thread: Some(thread),
            },
            message_rx,
        ))
    }

    /// Queue a parse request
    pub fn submit(&self, request: ParseRequest) -> Result<()> {
        self.requests
            .send(WorkerRequest::Parse(request))
            .map_err(|_| anyhow::anyhow!("Ingestion worker has stopped"))
    }

    /// Stop accepting requests and wait for the thread to finish
    ///
    /// The message receiver must be drained or dropped, or the worker may
    /// stay blocked on a full channel.
    pub fn shutdown(mut self) {
        let thread = self.thread.take();
        drop(self);
        if let Some(thread) = thread {
            if thread.join().is_err() {
                error!("Ingestion worker thread panicked");
            }
        }
    }
}

fn run_worker(
    config: IngestConfig,
    classifier: Arc<dyn DirectionClassifier>,
    mut requests: mpsc::UnboundedReceiver<WorkerRequest>,
    messages: mpsc::Sender<WorkerMessage>,
) {
    info!("Ingestion worker started");

    while let Some(request) = requests.blocking_recv() {
        let WorkerRequest::Parse(request) = request;
        let id = request.id;
        debug!("Parsing {} for session {}", request.file_name, id);

        let mut host_gone = false;
        let mut emit = |message: WorkerMessage| {
            if !host_gone && messages.blocking_send(message).is_err() {
                host_gone = true;
            }
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            parse_statement(&request, &config, classifier.as_ref(), &mut emit)
        }));
        let terminal = match outcome {
            Ok(Ok(summary)) => {
                info!(
                    "Session {} parsed {} transactions from {}",
                    id, summary.transaction_count, summary.file_name
                );
                WorkerMessage::Result { id, data: summary }
            }
            Ok(Err(e)) => {
                warn!("Session {} failed: {}", id, e);
                WorkerMessage::error(id, &e)
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!("Parser panicked in session {}: {}", id, detail);
                WorkerMessage::error(id, &IngestError::Internal(detail))
            }
        };
        emit(terminal);

        if host_gone {
            debug!("Host dropped the message channel; stopping worker");
            break;
        }
    }

    info!("Ingestion worker stopped");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::classifier::Direction;
    use uuid::Uuid;

    struct PanickingClassifier;

    impl DirectionClassifier for PanickingClassifier {
        fn classify(&self, _: f64, _: &str, _: &str) -> Direction {
            panic!("classifier exploded")
        }
    }

    fn request(csv: &str) -> ParseRequest {
        ParseRequest {
            id: Uuid::new_v4(),
            file_name: "s.csv".to_string(),
            buffer: csv.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_worker_streams_to_terminal_message() {
        let (worker, mut messages) = IngestWorker::spawn(IngestConfig::default()).unwrap();
        let req = request("Date,Narration,Debit,Credit\n2024-01-01,POS,5,\n");
        let id = req.id;
        worker.submit(req).unwrap();

        let mut seen = Vec::new();
        while let Some(message) = messages.blocking_recv() {
            let terminal = message.is_terminal();
            seen.push(message);
            if terminal {
                break;
            }
        }

        assert!(seen.iter().all(|m| m.id() == id));
        assert!(matches!(seen.last(), Some(WorkerMessage::Result { data, .. }) if data.transaction_count == 1));
        drop(messages);
        worker.shutdown();
    }

    #[test]
    fn test_parser_panic_becomes_internal_error() {
        let (worker, mut messages) =
            IngestWorker::spawn_with_classifier(IngestConfig::default(), Arc::new(PanickingClassifier)).unwrap();
        let csv = "Transaction Date,Transaction Amount,Settlement Debit,Settlement Credit\n2024-01-01,10,0,0\n";
        worker.submit(request(csv)).unwrap();

        let terminal = std::iter::from_fn(|| messages.blocking_recv())
            .find(WorkerMessage::is_terminal)
            .unwrap();
        match terminal {
            WorkerMessage::Error { kind, message, .. } => {
                assert_eq!(kind, crate::ingest::error::IngestErrorKind::Internal);
                assert!(message.contains("classifier exploded"));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = IngestConfig {
            channel_capacity: 0,
            ..Default::default()
        };
        assert!(IngestWorker::spawn(config).is_err());
    }
}

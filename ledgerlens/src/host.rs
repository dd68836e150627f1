//! Host side of the ingestion worker
//!
//! The host owns the authoritative session. Starting a new parse replaces
//! it, and any message still arriving for an older session is dropped.

use crate::ingest::{
    AccountInfo, IngestConfig, IngestFailure, IngestWorker, NormalizedRecord, ParseRequest, SessionId,
    StatementMetadata, WorkerMessage,
};
use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Everything one successful session produced
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    pub session: SessionId,
    pub file_name: String,
    pub metadata: Option<StatementMetadata>,
    pub account_info: AccountInfo,
    /// Records in row order
    pub records: Vec<NormalizedRecord>,
}

pub struct IngestHost {
    worker: IngestWorker,
    events: mpsc::Receiver<WorkerMessage>,
    current: Option<SessionId>,
}

impl IngestHost {
    /// Spawn a worker and attach to it
    pub fn new(config: IngestConfig) -> Result<Self> {
        let (worker, events) = IngestWorker::spawn(config)?;
        Ok(Self::from_worker(worker, events))
    }

    pub fn from_worker(worker: IngestWorker, events: mpsc::Receiver<WorkerMessage>) -> Self {
        Self {
            worker,
            events,
            current: None,
        }
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.current
    }

    /// Send a buffer to the worker under a fresh session id
    ///
    /// Whatever session was current becomes stale.
    pub fn start(&mut self, file_name: &str, buffer: Vec<u8>) -> Result<SessionId> {
        let id = Uuid::new_v4();
        if let Some(previous) = self.current.replace(id) {
            debug!("Session {} superseded by {}", previous, id);
        }

        self.worker.submit(ParseRequest {
            id,
            file_name: file_name.to_string(),
            buffer,
        })?;
        info!("Started session {} for {}", id, file_name);
        Ok(id)
    }

    /// Next message of the current session
    ///
    /// Returns `None` when no session is current or the worker has stopped.
    /// A terminal message ends the session.
    pub async fn next_event(&mut self) -> Option<WorkerMessage> {
        loop {
            let current = self.current?;
            let message = self.events.recv().await?;

            if message.id() != current {
                debug!("Discarding stale message for session {}", message.id());
                continue;
            }
            if message.is_terminal() {
                self.current = None;
            }
            return Some(message);
        }
    }

    /// Parse a statement and wait for the whole result
    pub async fn ingest(&mut self, file_name: &str, buffer: Vec<u8>) -> Result<ParsedStatement> {
        self.ingest_with_progress(file_name, buffer, |_| {}).await
    }

    /// Like [`ingest`](Self::ingest), reporting each progress update
    pub async fn ingest_with_progress<F>(
        &mut self,
        file_name: &str,
        buffer: Vec<u8>,
        mut on_progress: F,
    ) -> Result<ParsedStatement>
    where
        F: FnMut(u8),
    {
        let session = self.start(file_name, buffer)?;
        let mut metadata = None;
        let mut records = Vec::new();

        loop {
            let message = self
                .next_event()
                .await
                .context("Ingestion worker stopped before finishing the session")?;

            match message {
                WorkerMessage::Progress { value, .. } => on_progress(value),
                WorkerMessage::Meta { data, .. } => metadata = Some(data),
                WorkerMessage::Batch { data, .. } => records.extend(data.transactions),
                WorkerMessage::Result { data, .. } => {
                    return Ok(ParsedStatement {
                        session,
                        file_name: data.file_name,
                        metadata,
                        account_info: data.account_info,
                        records,
                    });
                }
                WorkerMessage::Error { kind, message, .. } => {
                    return Err(IngestFailure { kind, message }.into());
                }
            }
        }
    }

    /// Stop the worker thread
    pub fn shutdown(self) {
        let Self { worker, events, .. } = self;
        drop(events);
        worker.shutdown();
    }
}

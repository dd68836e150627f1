//! Statement parsing state machine
//!
//! `SeekingHeader -> ReadingRows -> Finalizing -> Done`, with `Failed`
//! reachable from any state. Messages are pushed through an emit callback as
//! soon as they are known, so batches stream while the sheet is still being
//! read.

use crate::ingest::classifier::{Direction, DirectionClassifier};
use crate::ingest::config::IngestConfig;
use crate::ingest::error::IngestError;
use crate::ingest::header::{ColumnMap, HeaderDetector};
use crate::ingest::metadata::MetadataExtractor;
use crate::ingest::protocol::{BatchData, ParseRequest, ParseSummary, SessionId, WorkerMessage};
use crate::ingest::record::{AccountInfo, NormalizedRecord};
use crate::ingest::values::{cell_amount, cell_date};
use crate::ingest::workbook::{load_sheet, Cell};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, info};

/// Progress milestones
const PROGRESS_LOAD_START: u8 = 5;
const PROGRESS_LOADED: u8 = 15;
const PROGRESS_HEADER: u8 = 25;
const PROGRESS_ROWS_END: u8 = 90;
const PROGRESS_FINALIZE: u8 = 95;
const PROGRESS_DONE: u8 = 100;

static EMPTY: Cell = Cell::Empty;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    SeekingHeader,
    ReadingRows,
    Finalizing,
    Done,
    Failed,
}

#[derive(Debug, Default)]
struct Totals {
    count: usize,
    skipped: usize,
    total_debit: f64,
    total_credit: f64,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    first_opening: Option<f64>,
    last_balance: Option<f64>,
}

/// Parses one request, streaming messages through `emit`
///
/// Returns the summary for the terminal `result` message; the caller turns
/// an error into the terminal `error` message.
pub fn parse_statement(
    request: &ParseRequest,
    config: &IngestConfig,
    classifier: &dyn DirectionClassifier,
    emit: &mut dyn FnMut(WorkerMessage),
) -> Result<ParseSummary, IngestError> {
    let mut parser = StatementParser::new(request.id, &request.file_name, config, classifier, emit);
    let result = parser.run(&request.buffer);
    if result.is_err() {
        parser.state = ParseState::Failed;
    }
    debug!("Session {} ended in state {:?}", request.id, parser.state);
    result
}

struct StatementParser<'a> {
    id: SessionId,
    id_prefix: String,
    file_name: &'a str,
    config: &'a IngestConfig,
    classifier: &'a dyn DirectionClassifier,
    emit: &'a mut dyn FnMut(WorkerMessage),
    detector: HeaderDetector,
    state: ParseState,
    progress: u8,
    metadata: MetadataExtractor,
    columns: Option<ColumnMap>,
    /// A header that matched but lacks essential columns
    partial_header: Option<ColumnMap>,
    header_row: usize,
    batch: Vec<NormalizedRecord>,
    totals: Totals,
}

impl<'a> StatementParser<'a> {
    fn new(
        id: SessionId,
        file_name: &'a str,
        config: &'a IngestConfig,
        classifier: &'a dyn DirectionClassifier,
        emit: &'a mut dyn FnMut(WorkerMessage),
    ) -> Self {
        let simple = id.simple().to_string();
        Self {
            id,
            id_prefix: simple.chars().take(8).collect(),
            file_name,
            config,
            classifier,
            emit,
            detector: HeaderDetector::default(),
            state: ParseState::SeekingHeader,
            progress: 0,
            metadata: MetadataExtractor::new(),
            columns: None,
            partial_header: None,
            header_row: 0,
            batch: Vec::with_capacity(config.batch_size),
            totals: Totals::default(),
        }
    }

    fn report(&mut self, value: u8) {
        let value = value.min(PROGRESS_DONE);
        if value > self.progress {
            self.progress = value;
            (self.emit)(WorkerMessage::Progress { id: self.id, value });
        }
    }

    fn run(&mut self, buffer: &[u8]) -> Result<ParseSummary, IngestError> {
        self.report(PROGRESS_LOAD_START);
        let sheet = load_sheet(buffer, self.config.max_file_bytes)?;
        self.report(PROGRESS_LOADED);
        info!(
            "Parsing {} (worksheet {}, {} rows)",
            self.file_name,
            sheet.name,
            sheet.rows.len()
        );

        let total_rows = sheet.rows.len();
        for (index, row) in sheet.rows.iter().enumerate() {
            match self.state {
                ParseState::SeekingHeader => self.seek_header(index, row),
                ParseState::ReadingRows => {
                    self.read_row(row);
                    let done = index - self.header_row;
                    if done % self.config.progress_interval == 0 {
                        let remaining = (total_rows - self.header_row - 1).max(1);
                        let span = (PROGRESS_ROWS_END - PROGRESS_HEADER) as usize;
                        self.report(PROGRESS_HEADER + (span * done / remaining) as u8);
                    }
                }
                _ => break,
            }
        }

        self.finalize()
    }

    fn seek_header(&mut self, index: usize, row: &[Cell]) {
        let Some(columns) = self.detector.detect(row) else {
            self.metadata.observe(row);
            return;
        };

        if !columns.missing_essentials().is_empty() {
            debug!("Row {} looks like a header but lacks essential columns", index);
            if self.partial_header.is_none() {
                self.partial_header = Some(columns);
            }
            return;
        }

        debug!("Header found at row {} ({:?} layout)", index, columns.layout);
        self.columns = Some(columns);
        self.header_row = index;
        self.state = ParseState::ReadingRows;

        if !self.metadata.metadata().is_empty() {
            let data = self.metadata.metadata().clone();
            (self.emit)(WorkerMessage::Meta { id: self.id, data });
        }
        self.report(PROGRESS_HEADER);
    }

    fn read_row(&mut self, row: &[Cell]) {
        let Some(columns) = self.columns.as_ref() else {
            return;
        };
        let cell = |index: Option<usize>| index.and_then(|i| row.get(i)).unwrap_or(&EMPTY);

        let date_cell = cell(columns.date);
        if date_cell.is_empty() {
            // Footers such as "Closing Balance" sit in the table without a date
            self.metadata.observe(row);
            return;
        }
        let Some(date) = cell_date(date_cell) else {
            self.totals.skipped += 1;
            return;
        };

        let mut debit = cell_amount(cell(columns.debit)).abs();
        let mut credit = cell_amount(cell(columns.credit)).abs();
        let transaction_type = cell(columns.transaction_type).text();
        let account_name = cell(columns.account_name).text();

        if columns.is_extended_format() && debit == 0.0 && credit == 0.0 {
            let amount = cell_amount(cell(columns.transaction_amount));
            if amount != 0.0 {
                match self.classifier.classify(amount, &transaction_type, &account_name) {
                    Direction::Debit => debit = amount.abs(),
                    Direction::Credit => credit = amount.abs(),
                }
            }
        }

        let mut narration = cell(columns.narration).text();
        if narration.is_empty() {
            narration = [transaction_type.as_str(), account_name.as_str()]
                .iter()
                .filter(|s| !s.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join(" - ");
        }
        let balance_cell = cell(columns.balance);
        let balance = cell_amount(balance_cell);
        let has_balance = !balance_cell.is_empty();
        let reference = cell(columns.reference).text();

        let totals = &mut self.totals;
        totals.count += 1;
        totals.total_debit += debit;
        totals.total_credit += credit;
        totals.start_date = Some(totals.start_date.map_or(date, |d| d.min(date)));
        totals.end_date = Some(totals.end_date.map_or(date, |d| d.max(date)));
        if has_balance {
            if totals.first_opening.is_none() {
                totals.first_opening = Some(balance - credit + debit);
            }
            totals.last_balance = Some(balance);
        }

        let record = NormalizedRecord {
            id: format!("{}-{:06}", self.id_prefix, totals.count),
            date,
            narration,
            reference,
            debit,
            credit,
            balance,
        };
        self.batch.push(record);
        if self.batch.len() >= self.config.batch_size {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let transactions = std::mem::replace(&mut self.batch, Vec::with_capacity(self.config.batch_size));
        (self.emit)(WorkerMessage::Batch {
            id: self.id,
            data: BatchData { transactions },
        });
    }

    fn finalize(&mut self) -> Result<ParseSummary, IngestError> {
        let Some(columns) = self.columns.clone() else {
            return Err(match self.partial_header.take() {
                Some(partial) => IngestError::MissingColumns(partial.missing_essentials()),
                None => IngestError::MissingHeader,
            });
        };
        self.state = ParseState::Finalizing;
        self.flush();

        if self.totals.count == 0 {
            return Err(IngestError::NoTransactions);
        }
        self.report(PROGRESS_FINALIZE);

        let meta = std::mem::take(&mut self.metadata).into_metadata();
        let account_name = meta
            .account_name
            .clone()
            .or_else(|| {
                Path::new(self.file_name)
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "Unknown account".to_string());

        let totals = &self.totals;
        let account_info = AccountInfo {
            account_name,
            account_number: meta.account_number,
            currency: meta.currency,
            statement_period: meta.statement_period,
            opening_balance: meta.opening_balance.or(totals.first_opening),
            closing_balance: meta.closing_balance.or(totals.last_balance),
            total_debit: meta.total_debit.unwrap_or(totals.total_debit),
            total_credit: meta.total_credit.unwrap_or(totals.total_credit),
            start_date: totals.start_date,
            end_date: totals.end_date,
            transaction_count: totals.count,
            skipped_rows: totals.skipped,
            is_extended_format: columns.is_extended_format(),
        };
        if totals.skipped > 0 {
            info!("Skipped {} rows with unreadable dates", totals.skipped);
        }

        let summary = ParseSummary {
            file_name: self.file_name.to_string(),
            transaction_count: totals.count,
            account_info,
        };
        self.report(PROGRESS_DONE);
        self.state = ParseState::Done;
        Ok(summary)
    }
}

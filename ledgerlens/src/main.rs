use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledgerlens::{AppConfig, IngestHost, NormalizedRecord, ParsedStatement};
use ledgerlens_core::chunk::{ChunkSpec, DataChunker};
use ledgerlens_core::memory::MemoryManager;
use ledgerlens_core::viewport::{IndexedItem, VirtualList};

#[derive(Parser)]
#[command(name = "ledgerlens")]
#[command(about = "Bank statement ingestion and bounded-memory browsing", long_about = None)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a statement and print the account summary
    Parse {
        /// Statement file (xlsx, xls, ods or csv)
        file: PathBuf,
    },

    /// Render one window of a parsed statement
    Browse {
        /// Statement file (xlsx, xls, ods or csv)
        file: PathBuf,

        /// Scroll offset in pixels
        #[arg(short, long, default_value = "0")]
        offset: f64,

        /// Container height in pixels
        #[arg(long)]
        height: Option<f64>,

        /// Row height in pixels
        #[arg(long)]
        item_height: Option<f64>,

        /// Rows rendered above and below the visible area
        #[arg(short, long)]
        buffer: Option<usize>,
    },

    /// Sweep through a statement and print cache statistics
    Stats {
        /// Statement file (xlsx, xls, ods or csv)
        file: PathBuf,

        /// Number of windows to visit
        #[arg(short, long, default_value = "20")]
        windows: usize,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ledgerlens=info,ledgerlens_core=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Parse { ref file } => {
            let parsed = ingest_file(&config, file).await?;
            print_summary(&parsed);
        }

        Commands::Browse {
            ref file,
            offset,
            height,
            item_height,
            buffer,
        } => {
            if let Some(height) = height {
                config.viewport.container_height = height;
            }
            if let Some(item_height) = item_height {
                config.viewport.item_height = item_height;
            }
            if let Some(buffer) = buffer {
                config.viewport.buffer_size = buffer;
            }

            let parsed = ingest_file(&config, file).await?;
            let mut browser = Browser::new(&config, &parsed);
            let now = browser.elapsed_ms();
            browser.list.on_scroll(offset, now);
            let rows = browser.load().await?;

            let range = browser.list.visible_range();
            println!(
                "Rows {}..{} of {} (offset {:.0}px)",
                range.start_index,
                range.end_index,
                browser.list.len(),
                browser.list.scroll_offset()
            );
            println!("{}", "=".repeat(78));
            for row in &rows {
                print_row(row);
            }
            browser.memory.destroy();
        }

        Commands::Stats { ref file, windows } => {
            let parsed = ingest_file(&config, file).await?;
            let mut browser = Browser::new(&config, &parsed);

            let len = browser.list.len();
            let step = (len / windows.max(1)).max(1);
            let mut rendered = 0;
            for index in (0..len).step_by(step).take(windows) {
                let offset = browser.list.scroll_to_index(index);
                let now = browser.elapsed_ms();
                browser.list.on_scroll(offset, now);
                rendered += browser.load().await?.len();
            }
            let idle_at = browser.elapsed_ms() + browser.list.config().idle_timeout.as_millis() as u64;
            browser.list.tick(idle_at);

            let chunks = browser.chunker.stats();
            println!("Chunk Statistics:");
            println!("  Chunks:        {}", browser.chunker.chunk_count(len));
            println!("  Loads:         {}", chunks.loads);
            println!("  Cache hits:    {}", chunks.cache_hits);
            println!("  Dedup waits:   {}", chunks.dedup_waits);
            println!("  Prefetches:    {}", chunks.prefetches);
            println!("  Compressed:    {}", chunks.compressed);
            println!("  Rows rendered: {}", rendered);
            println!();
            println!("{}", browser.memory.stats());
            browser.memory.destroy();
        }

        Commands::Config => {
            print!("{}", config.to_yaml()?);
        }
    }

    Ok(())
}

async fn ingest_file(config: &AppConfig, path: &Path) -> Result<ParsedStatement> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mut host = IngestHost::new(config.ingest.clone())?;
    let parsed = host
        .ingest_with_progress(&file_name, bytes, |value| {
            tracing::debug!("Parsing {}: {}%", file_name, value);
        })
        .await?;
    host.shutdown();
    Ok(parsed)
}

/// Memory manager, chunker and virtual list wired to one parsed statement
struct Browser {
    memory: Arc<MemoryManager>,
    chunker: DataChunker<NormalizedRecord>,
    list: VirtualList<NormalizedRecord>,
    records: Arc<Vec<NormalizedRecord>>,
    started: Instant,
}

impl Browser {
    fn new(config: &AppConfig, parsed: &ParsedStatement) -> Self {
        let memory = MemoryManager::new(config.memory.clone());
        memory.start_gc();

        let records = Arc::new(parsed.records.clone());
        let chunker = DataChunker::new(memory.clone(), config.chunker.clone());
        let mut list = VirtualList::new(memory.clone(), config.viewport.clone());
        list.set_chunked_dataset(&parsed.session.to_string(), records.len());

        Self {
            memory,
            chunker,
            list,
            records,
            started: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    async fn load(&mut self) -> Result<Vec<IndexedItem<NormalizedRecord>>> {
        let records = self.records.clone();
        let loader = move |spec: ChunkSpec| {
            let records = records.clone();
            async move {
                let end = spec.end_index.min(records.len());
                let start = spec.start_index.min(end);
                Ok::<_, anyhow::Error>(records[start..end].to_vec())
            }
        };
        Ok(self.list.load_window(&self.chunker, loader).await?)
    }
}

fn print_summary(parsed: &ParsedStatement) {
    let info = &parsed.account_info;
    println!("Statement: {}", parsed.file_name);
    println!("  Account:      {}", info.account_name);
    if let Some(number) = &info.account_number {
        println!("  Number:       {}", number);
    }
    if let Some(currency) = &info.currency {
        println!("  Currency:     {}", currency);
    }
    if let Some(period) = &info.statement_period {
        println!("  Period:       {}", period);
    }
    if let (Some(start), Some(end)) = (info.start_date, info.end_date) {
        println!("  Dates:        {} .. {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"));
    }
    if let Some(opening) = info.opening_balance {
        println!("  Opening:      {:.2}", opening);
    }
    if let Some(closing) = info.closing_balance {
        println!("  Closing:      {:.2}", closing);
    }
    println!("  Total debit:  {:.2}", info.total_debit);
    println!("  Total credit: {:.2}", info.total_credit);
    println!("  Transactions: {}", info.transaction_count);
    if info.skipped_rows > 0 {
        println!("  Skipped rows: {}", info.skipped_rows);
    }
    println!(
        "  Format:       {}",
        if info.is_extended_format { "extended" } else { "standard" }
    );
}

fn print_row(row: &IndexedItem<NormalizedRecord>) {
    let record = &row.item;
    let narration: String = record.narration.chars().take(30).collect();
    println!(
        "{:>6}  {}  {:<30}  {:>+12.2}  {:>12.2}",
        row.index,
        record.date.format("%Y-%m-%d"),
        narration,
        record.net_amount(),
        record.balance
    );
}

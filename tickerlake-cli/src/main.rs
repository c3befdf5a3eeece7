//! TickerLake CLI: Silver pipeline runs, Bronze imports and checkpoint status.
//!
//! Commands:
//! - `silver`: run the Silver pipeline over the Parquet lake
//! - `import-bars`: merge raw daily bars from CSV into Bronze
//! - `import-splits`: replace the split registry from CSV
//! - `status`: report checkpoints, ticker count and split digests

mod logging;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tickerlake_core::data::{CheckpointStore, ParquetLake, RawBarStore};
use tickerlake_core::domain::{RawBar, SplitEvent, Timeframe};
use tickerlake_silver::{PipelineConfig, SilverPipeline};

#[derive(Parser)]
#[command(
    name = "tickerlake",
    about = "TickerLake CLI: split-adjusted Silver layer over a Parquet lake"
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or update the Silver tables.
    Silver {
        /// Path to a TOML pipeline config.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Lake root. Overrides the config file.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Tickers per aggregation batch.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Tickers per indicator batch.
        #[arg(long)]
        indicator_batch_size: Option<usize>,

        /// Rewrite every ticker from raw history.
        #[arg(long, default_value_t = false)]
        full_rewrite: bool,

        /// Write the run report as JSON to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Merge raw daily bars (ticker,date,open,high,low,close,volume[,transactions]) into Bronze.
    ImportBars {
        #[arg(long)]
        file: PathBuf,

        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// Replace the split registry (ticker,execution_date,split_from,split_to).
    ImportSplits {
        #[arg(long)]
        file: PathBuf,

        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// Show checkpoints and lake contents.
    Status {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Print as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_json);

    match cli.command {
        Commands::Silver {
            config,
            data_dir,
            batch_size,
            indicator_batch_size,
            full_rewrite,
            report,
        } => {
            let config = load_config(config.as_deref(), data_dir)?
                .with_batch_sizes(batch_size, indicator_batch_size);
            run_silver(config, full_rewrite, report.as_deref())
        }
        Commands::ImportBars { file, data_dir } => run_import_bars(&file, &data_dir),
        Commands::ImportSplits { file, data_dir } => run_import_splits(&file, &data_dir),
        Commands::Status {
            config,
            data_dir,
            json,
        } => {
            let config = load_config(config.as_deref(), data_dir)?;
            run_status(&config.data_dir, json)
        }
    }
}

fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    Ok(match data_dir {
        Some(dir) => config.with_data_dir(dir),
        None => config,
    })
}

fn run_silver(config: PipelineConfig, full_rewrite: bool, report_path: Option<&Path>) -> Result<()> {
    let lake = ParquetLake::new(&config.data_dir);
    let pipeline = SilverPipeline::from_lake(&lake, config)
        .context("invalid pipeline configuration")?
        .force_full_rewrite(full_rewrite);

    let report = pipeline.run().context("silver run aborted")?;
    println!("{report}");

    if let Some(path) = report_path {
        report
            .write_json(path)
            .with_context(|| format!("writing report {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    if !report.committed {
        eprintln!("Run was not committed; the next run resumes from the previous checkpoint.");
        std::process::exit(1);
    }
    Ok(())
}

fn open_lake(data_dir: &Path) -> Result<ParquetLake> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating lake root {}", data_dir.display()))?;
    Ok(ParquetLake::new(data_dir))
}

fn read_csv<T: serde::de::DeserializeOwned>(file: &Path) -> Result<Vec<T>> {
    let mut reader =
        csv::Reader::from_path(file).with_context(|| format!("opening {}", file.display()))?;
    reader
        .deserialize()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("{} row {}", file.display(), i + 2)))
        .collect()
}

fn run_import_bars(file: &Path, data_dir: &Path) -> Result<()> {
    let bars: Vec<RawBar> = read_csv(file)?;
    let lake = open_lake(data_dir)?;
    lake.write_raw_bars(&bars).context("writing bronze bars")?;

    let tickers: std::collections::BTreeSet<&str> = bars.iter().map(|b| b.ticker.as_str()).collect();
    println!("Imported {} bars for {} tickers", bars.len(), tickers.len());
    Ok(())
}

fn run_import_splits(file: &Path, data_dir: &Path) -> Result<()> {
    let splits: Vec<SplitEvent> = read_csv(file)?;
    for split in &splits {
        if let Err(e) = split.factor() {
            tracing::warn!(%e, "importing split the pipeline will reject");
        }
    }
    let lake = open_lake(data_dir)?;
    lake.write_splits(&splits).context("writing split registry")?;
    println!("Imported {} splits", splits.len());
    Ok(())
}

#[derive(Serialize)]
struct LakeStatus {
    data_dir: PathBuf,
    tickers: usize,
    max_known_date: Option<NaiveDate>,
    checkpoints: BTreeMap<String, Option<NaiveDate>>,
    /// `None` until a run has stored digests.
    split_digests: Option<usize>,
}

fn run_status(data_dir: &Path, json: bool) -> Result<()> {
    let lake = ParquetLake::new(data_dir);
    let mut checkpoints = BTreeMap::new();
    for timeframe in Timeframe::ALL {
        for table in [timeframe.aggregates_table(), timeframe.indicators_table()] {
            let date = lake
                .get_checkpoint(&table)
                .with_context(|| format!("reading checkpoint for {table}"))?;
            checkpoints.insert(table, date);
        }
    }

    let status = LakeStatus {
        data_dir: data_dir.to_path_buf(),
        tickers: lake.list_tickers().context("listing tickers")?.len(),
        max_known_date: lake.get_max_known_date().context("reading max date")?,
        checkpoints,
        split_digests: lake
            .get_split_digests()
            .context("reading split digests")?
            .map(|digests| digests.len()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let fmt_date = |d: Option<NaiveDate>| d.map_or_else(|| "-".to_string(), |d| d.to_string());
    println!("Lake: {}", status.data_dir.display());
    println!("  tickers:        {}", status.tickers);
    println!("  max known date: {}", fmt_date(status.max_known_date));
    println!(
        "  split digests:  {}",
        status.split_digests.map_or_else(|| "-".to_string(), |n| n.to_string())
    );
    println!("  checkpoints:");
    for (table, date) in &status.checkpoints {
        println!("    {table:<20} {}", fmt_date(*date));
    }
    Ok(())
}

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand, ValueEnum};
use rollcall_core::export::{serialize_summary, ReportMeta};
use rollcall_core::types::{parse_date, parse_time, DATE_FORMAT, TIME_FORMAT};
use rollcall_core::{
    AttendanceRecord, AttendanceSummary, CaptureState, ExportFormat, ExportName, Identity, Method,
    MethodFilter, RecognitionOutcome, RecordFilter, SessionSnapshot, Status,
};
use rollcall_engine::{CaptureDriver, FixedRecognizer};
use rollcall_store::{RecordStore, SqliteStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

mod config;

use config::Config;

/// Delay before the simulated recognizer answers.
const SIMULATED_RECOGNITION_DELAY: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "rollcall", about = "Biometric attendance capture and export")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    /// Plain CSV
    Csv,
    /// Spreadsheet-friendly variant
    Excel,
}

impl From<FormatArg> for ExportFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Csv => ExportFormat::Plain,
            FormatArg::Excel => ExportFormat::SpreadsheetCompatible,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulated capture session and record the result
    Capture {
        #[arg(short, long, default_value = "face")]
        method: Method,
        /// Identity the simulated recognizer reports
        #[arg(long, default_value = "ST001234")]
        student_id: String,
        #[arg(long, default_value = "Emma Thompson")]
        name: String,
        #[arg(long, default_value = "10-A")]
        class: String,
        /// Confidence the simulated recognizer reports
        #[arg(long, default_value_t = 98.5)]
        confidence: f64,
        /// Simulate a recognizer that finds nobody
        #[arg(long)]
        no_match: bool,
        #[arg(long, default_value = "present")]
        status: Status,
    },
    /// Append an attendance record by hand
    Record {
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        class: String,
        #[arg(short, long)]
        method: Method,
        #[arg(long)]
        confidence: f64,
        #[arg(long, default_value = "present")]
        status: Status,
        /// YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
        /// HH:MM:SS (default: now)
        #[arg(long)]
        time: Option<String>,
    },
    /// List stored records
    List {
        #[command(flatten)]
        query: QueryArgs,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Export matching records to a file
    Export {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(short, long, value_enum, default_value = "csv")]
        format: FormatArg,
        /// Filename category, e.g. "database" → attendance_database_<date>.csv
        #[arg(long)]
        category: Option<String>,
        /// Output directory (default: configured export_dir)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Show attendance counts
    Summary {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long)]
        json: bool,
    },
    /// Write a summary report for a date range
    Report {
        /// Report label, e.g. daily, weekly, monthly
        #[arg(long = "type", default_value = "daily")]
        report_type: String,
        /// First day, inclusive (default: today)
        #[arg(long)]
        from: Option<String>,
        /// Last day, inclusive (default: today)
        #[arg(long)]
        to: Option<String>,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct QueryArgs {
    /// Only records on this date (YYYY-MM-DD)
    #[arg(long, conflicts_with = "today")]
    date: Option<String>,
    /// Only records from today
    #[arg(long)]
    today: bool,
    /// Case-insensitive match on student name or id
    #[arg(short, long, default_value = "")]
    search: String,
    /// face, fingerprint, motion or all
    #[arg(short, long, default_value = "all")]
    method: MethodFilter,
}

impl QueryArgs {
    /// Names exported files after the queried day, or `today` without `--date`.
    fn export_name(&self, category: Option<String>, today: NaiveDate) -> Result<ExportName> {
        let date = optional_date(self.date.as_deref())?.unwrap_or(today);
        Ok(match category {
            Some(category) => ExportName::with_category(category, date),
            None => ExportName::dated(date),
        })
    }

    fn run(&self, store: &RecordStore<SqliteStore>) -> Result<Vec<AttendanceRecord>> {
        let base = if self.today {
            store.query_today()
        } else if let Some(date) = &self.date {
            parse_date(date)?;
            store.query_by_date(date)
        } else {
            store.query_all()
        };
        let filter = RecordFilter::new(self.search.clone(), self.method);
        Ok(base.into_iter().filter(|r| filter.matches(r)).collect())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let store = RecordStore::new(SqliteStore::open(&config.db_path).with_context(|| {
        format!("failed to open attendance database {}", config.db_path.display())
    })?);

    match cli.command {
        Commands::Capture {
            method,
            student_id,
            name,
            class,
            confidence,
            no_match,
            status,
        } => {
            let outcome = if no_match {
                RecognitionOutcome::no_match()
            } else {
                let identity = Identity {
                    student_id,
                    student_name: name,
                    class,
                };
                RecognitionOutcome::matched(identity, confidence)
            };
            run_capture(&config, &store, method, status, outcome).await?;
        }
        Commands::Record {
            student_id,
            name,
            class,
            method,
            confidence,
            status,
            date,
            time,
        } => {
            let (date, time) = record_timestamp(date, time, Local::now().naive_local())?;
            let record = AttendanceRecord {
                student_id,
                student_name: name,
                class,
                date,
                time,
                method,
                confidence,
                status,
            };
            store.append(record.clone())?;
            println!(
                "Recorded {} ({}) as {} on {} {}",
                record.student_name, record.student_id, record.status, record.date, record.time
            );
        }
        Commands::List { query, json } => {
            let records = query.run(&store)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No attendance records found");
            } else {
                for r in &records {
                    println!(
                        "{}  {}  {:<10} {:<24} {:<6} {:<11} {:>5.1}%  {}",
                        r.date,
                        r.time,
                        r.student_id,
                        r.student_name,
                        r.class,
                        r.method,
                        r.confidence,
                        r.status
                    );
                }
                println!("{} record(s)", records.len());
            }
        }
        Commands::Export {
            query,
            format,
            category,
            out,
        } => {
            let records = query.run(&store)?;
            if records.is_empty() {
                bail!("No records to export.");
            }
            let name = query.export_name(category, Local::now().date_naive())?;
            let payload = rollcall_core::serialize(&records, format.into(), &name)?;
            let dir = out.unwrap_or_else(|| config.export_dir.clone());
            let path = write_payload(&dir, &payload.filename, &payload.bytes)?;
            println!(
                "Exported {} record(s) to {} ({})",
                records.len(),
                path.display(),
                payload.mime_type
            );
        }
        Commands::Summary { query, json } => {
            let summary = AttendanceSummary::from_records(&query.run(&store)?);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
        Commands::Report {
            report_type,
            from,
            to,
            out,
        } => {
            let now = Local::now().naive_local();
            let from = optional_date(from.as_deref())?.unwrap_or(now.date());
            let to = optional_date(to.as_deref())?.unwrap_or(now.date());
            if from > to {
                bail!("--from {from} is after --to {to}");
            }
            let (lo, hi) = (
                from.format(DATE_FORMAT).to_string(),
                to.format(DATE_FORMAT).to_string(),
            );
            // ISO dates order lexicographically.
            let records: Vec<_> = store
                .query_all()
                .into_iter()
                .filter(|r| r.date >= lo && r.date <= hi)
                .collect();
            let summary = AttendanceSummary::from_records(&records);
            let meta = ReportMeta {
                report_type,
                from,
                to,
                generated_at: now,
            };
            let payload = serialize_summary(&summary, &meta);
            let dir = out.unwrap_or_else(|| config.export_dir.clone());
            let path = write_payload(&dir, &payload.filename, &payload.bytes)?;
            println!("Report written to {}", path.display());
        }
    }

    Ok(())
}

async fn run_capture(
    config: &Config,
    store: &RecordStore<SqliteStore>,
    method: Method,
    status: Status,
    outcome: RecognitionOutcome,
) -> Result<()> {
    let recognizer = FixedRecognizer::new(outcome, SIMULATED_RECOGNITION_DELAY);
    let driver = CaptureDriver::new(config.session_config(), Arc::new(recognizer));
    let mut updates = driver.subscribe();

    println!("Starting {} capture (Ctrl-C to cancel)", method.display_name());
    if !driver.start(method).await {
        bail!("a capture session is already in progress");
    }
    print_progress(&driver.snapshot().await);

    let done = loop {
        tokio::select! {
            changed = updates.changed() => {
                changed?;
                let snapshot = updates.borrow_and_update().clone();
                print_progress(&snapshot);
                if !snapshot.state.is_in_flight() {
                    break snapshot;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                driver.cancel().await;
                break driver.snapshot().await;
            }
        }
    };

    match (done.state, done.outcome) {
        (
            CaptureState::Recognized,
            Some(RecognitionOutcome {
                identity: Some(identity),
                confidence,
            }),
        ) => {
            let record = AttendanceRecord::from_identity(
                &identity,
                confidence,
                method,
                status,
                Local::now().naive_local(),
            );
            store.append(record.clone())?;
            println!(
                "Recognized {} ({}, class {}) with {}% confidence; marked {} at {}",
                identity.student_name,
                identity.student_id,
                identity.class,
                confidence,
                record.status,
                record.time
            );
        }
        (CaptureState::Failed, outcome) => {
            let confidence = outcome.map(|o| o.confidence).unwrap_or(0.0);
            println!(
                "Recognition failed ({}% confidence, {}% required); nothing recorded",
                confidence,
                config.match_threshold
            );
        }
        (CaptureState::Cancelled, _) => println!("Capture cancelled; nothing recorded"),
        (state, _) => println!("Capture ended in state {state:?}; nothing recorded"),
    }
    Ok(())
}

fn print_progress(snapshot: &SessionSnapshot) {
    match (snapshot.state, snapshot.stage_label.as_deref()) {
        (CaptureState::Capturing, Some(label)) => {
            println!("[{:>3}%] {label}", snapshot.progress_percent)
        }
        (CaptureState::Capturing, None) => println!("[{:>3}%]", snapshot.progress_percent),
        (CaptureState::AwaitingOutcome, _) => println!("[100%] Recognizing..."),
        _ => {}
    }
}

fn print_summary(summary: &AttendanceSummary) {
    println!("Total records:      {}", summary.total);
    println!("Present:            {}", summary.present);
    println!("Late:               {}", summary.late);
    println!("Absent:             {}", summary.absent);
    match summary.average_confidence {
        Some(avg) => println!("Average confidence: {avg:.1}%"),
        None => println!("Average confidence: n/a"),
    }
    for method in Method::ALL {
        println!(
            "{:<20}{}",
            format!("{}:", method.display_name()),
            summary.by_method.get(method)
        );
    }
}

/// Explicit `--date`/`--time` values, checked, with `now` filling the gaps.
fn record_timestamp(
    date: Option<String>,
    time: Option<String>,
    now: NaiveDateTime,
) -> Result<(String, String)> {
    let date = match date {
        Some(date) => {
            parse_date(&date)?;
            date
        }
        None => now.format(DATE_FORMAT).to_string(),
    };
    let time = match time {
        Some(time) => {
            parse_time(&time)?;
            time
        }
        None => now.format(TIME_FORMAT).to_string(),
    };
    Ok((date, time))
}

fn optional_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    value.map(|v| parse_date(v).map_err(Into::into)).transpose()
}

fn write_payload(dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory {}", dir.display()))?;
    let path = dir.join(filename);
    std::fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "export written");
    Ok(path)
}

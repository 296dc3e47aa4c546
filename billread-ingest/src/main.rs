use std::path::PathBuf;

use anyhow::{bail, Result};
use billread_client::queries::load_profile;
use billread_ingest::{
    analyzer::{AnalysisOutcome, AnalysisRequest, Analyzer, RangeRequest, Resolution},
    config::AppConfig,
    metrics_textfile, observability,
    progress::ProgressEvent,
    sinks::{CombinedCsvSink, ReportSink, SummaryJsonSink},
    sources::SourceFormat,
    transform::parse_timestamp,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use time::{macros::format_description, Duration};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "billread")]
#[command(about = "Normalize folders of meter export files onto a regular time grid", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Input file layout
    #[arg(long, global = true, default_value = "csv")]
    format: SourceFormat,

    /// Write the combined dataset to this CSV file
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    /// Write the analysis report to this JSON file
    #[arg(long, global = true)]
    summary: Option<PathBuf>,

    /// Disable the progress spinner
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print every grid reading of this company
    #[arg(long, global = true)]
    profile: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze one calendar month
    Month {
        folder: PathBuf,
        #[arg(long)]
        month: Option<u8>,
        #[arg(long)]
        year: Option<i32>,
        /// Grid start time of day (HH:MM)
        #[arg(long)]
        start_time: Option<String>,
        /// Grid end time of day on the first day of the next month (HH:MM)
        #[arg(long)]
        end_time: Option<String>,
    },
    /// Analyze an arbitrary window, possibly spanning several months
    Range {
        folder: PathBuf,
        /// First instant, e.g. "2024-01-15 00:00"
        #[arg(long)]
        start: String,
        /// Last instant, inclusive
        #[arg(long)]
        end: String,
        #[arg(long, default_value = "native")]
        resolution: Resolution,
    },
}

enum Job {
    Month(AnalysisRequest),
    Range(RangeRequest),
}

fn spinner(quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Some(pb)
}

fn print_report(outcome: &AnalysisOutcome) {
    let report = &outcome.report;
    println!("{}", outcome.message());
    if let Some(range) = report.date_range {
        println!("range: {} .. {}", range.start, range.end);
    }
    for d in &report.details {
        match (&d.error, &d.note) {
            (Some(err), _) => println!("  x {}: {err}", d.filename),
            (None, Some(note)) => println!("  - {}: {} rows ({note})", d.filename, d.rows),
            (None, None) => println!(
                "  + {}: {} rows, {} kWh / {} kvarh values, {} min",
                d.filename,
                d.rows,
                d.kwh_values,
                d.kvarh_values,
                d.interval_minutes.unwrap_or_default()
            ),
        }
    }

    let total = |v: Option<f64>| v.map(|v| format!("{v:.3}")).unwrap_or_else(|| "-".to_string());
    for t in &report.company_totals {
        println!(
            "  {}: {} kWh, {} kvarh over {} readings",
            t.company,
            total(t.total_kwh),
            total(t.total_kvarh),
            t.readings
        );
    }
}

fn print_profile(outcome: &AnalysisOutcome, company: &str) {
    let Some((start, end)) = outcome.dataset.bounds() else {
        return;
    };
    let end = end.checked_add(Duration::MINUTE).unwrap_or(end);
    let readings = load_profile(&outcome.dataset, company, start, end);
    if readings.is_empty() {
        println!("no readings for company '{company}'");
        return;
    }

    let format = format_description!("[year]-[month]-[day] [hour]:[minute]");
    let value = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
    println!("{company}: {} readings", readings.len());
    for r in readings {
        let ts = r.ts.format(format).unwrap_or_else(|_| r.ts.to_string());
        println!("  {ts}  {:>12}  {:>12}", value(r.kwh), value(r.kvarh));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cli = Cli::parse();
    let cfg = AppConfig::load()?;
    if cfg.metrics.is_some() {
        metrics_textfile::init()?;
    }

    let job = match cli.command {
        Command::Month {
            folder,
            month,
            year,
            start_time,
            end_time,
        } => Job::Month(AnalysisRequest {
            folder,
            month,
            year,
            start_time: start_time.unwrap_or_else(|| cfg.period.start_time.clone()),
            end_time: end_time.unwrap_or_else(|| cfg.period.end_time.clone()),
            format: cli.format,
        }),
        Command::Range {
            folder,
            start,
            end,
            resolution,
        } => {
            let (Some(start_ts), Some(end_ts)) = (parse_timestamp(&start), parse_timestamp(&end)) else {
                bail!("--start and --end must be dates such as \"2024-01-15 00:00\" (got '{start}' and '{end}')");
            };
            Job::Range(RangeRequest {
                folder,
                start: start_ts,
                end: end_ts,
                resolution,
                format: cli.format,
            })
        }
    };

    let analyzer = Analyzer::new(cfg.ingest.settings());
    let pb = spinner(cli.quiet);
    let pb_events = pb.clone();

    let result = tokio::task::spawn_blocking(move || {
        let sink = move |event: &ProgressEvent| -> Result<()> {
            if let Some(pb) = &pb_events {
                pb.set_message(event.to_string());
            }
            Ok(())
        };
        match job {
            Job::Month(request) => analyzer.analyze(&request, Some(&sink)),
            Job::Range(request) => analyzer.analyze_range(&request, Some(&sink)),
        }
    })
    .await?;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(pb) = &pb {
                pb.abandon_with_message("analysis failed");
            }
            error!(error = %e, "analysis failed");
            write_metrics(&cfg);
            return Err(e.into());
        }
    };
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }
    print_report(&outcome);
    if let Some(company) = &cli.profile {
        print_profile(&outcome, company);
    }

    let sinks: Vec<Box<dyn ReportSink>> = cli
        .out
        .map(|path| Box::new(CombinedCsvSink::new(path)) as Box<dyn ReportSink>)
        .into_iter()
        .chain(cli.summary.map(|path| Box::new(SummaryJsonSink::new(path)) as Box<dyn ReportSink>))
        .collect();
    for sink in &sinks {
        sink.write(&outcome)?;
        info!(path = %sink.path().display(), "export written");
    }

    write_metrics(&cfg);
    Ok(())
}

fn write_metrics(cfg: &AppConfig) {
    if let Some(metrics) = &cfg.metrics {
        if let Err(e) = metrics_textfile::write_textfile(std::path::Path::new(&metrics.textfile_path)) {
            error!(error = %e, "failed to write metrics textfile");
        }
    }
}

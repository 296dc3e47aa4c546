use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use billread_ingest::{
    config::AppConfig,
    observability,
    sources::{locate_header, SourceFormat},
    transform::{
        classify::{self, ColumnView},
        parse_timestamp,
    },
};
use clap::Parser;

/// Dump what the loader sees in a single meter export: the raw preamble,
/// the chosen header line and the detected column roles.
#[derive(Parser)]
#[command(name = "inspect-header")]
#[command(about = "Show header detection and column roles for one meter export", long_about = None)]
struct Cli {
    file: PathBuf,

    /// Layout override; defaults to the file extension
    #[arg(long)]
    format: Option<SourceFormat>,

    /// Raw lines to print
    #[arg(long, default_value = "15")]
    lines: usize,

    /// Parsed timestamps to print
    #[arg(long, default_value = "5")]
    samples: usize,
}

fn main() -> Result<()> {
    observability::init_tracing();
    let cli = Cli::parse();
    let cfg = AppConfig::load()?;
    let settings = cfg.ingest.settings();

    let format = match cli.format.or_else(|| SourceFormat::from_path(&cli.file)) {
        Some(format) => format,
        None => bail!("cannot tell the layout of {}; pass --format csv|prn", cli.file.display()),
    };

    let bytes = fs::read(&cli.file).with_context(|| format!("failed to read {}", cli.file.display()))?;
    let (encoding, text) = settings
        .load
        .encodings
        .iter()
        .find_map(|enc| enc.decode(&bytes).map(|text| (*enc, text)))
        .context("no configured encoding can decode the file")?;
    let lines: Vec<&str> = text.lines().collect();

    println!("file: {}  ({} lines, decoded as {})", cli.file.display(), lines.len(), encoding.label());
    let scan = &lines[..lines.len().min(settings.load.header_scan_lines)];
    let offset = locate_header(scan, format, settings.load.min_header_fields);
    for (i, line) in lines.iter().take(cli.lines).enumerate() {
        let marker = if i == offset { ">" } else { " " };
        println!("{marker}{i:>4} [{:>2}] {line}", format.field_count(line));
    }
    println!("header offset: {offset}");

    let loaded = format.open(&cli.file).load(&settings.load)?;
    let table = &loaded.table;
    let view = ColumnView::of_table(table);
    let ts_col = classify::classify_timestamp(&view, settings.timestamp_sample_size);
    let excluded: Vec<usize> = ts_col.into_iter().chain(classify::company_column(&view)).collect();
    let eligible = classify::value_columns(&view, &excluded);
    let energy = classify::classify_energy(&view, &eligible);

    println!("rows: {}  malformed: {}", table.rows.len(), loaded.malformed_rows);
    for (col, role) in classify::column_roles(table.width(), ts_col, &energy).iter().enumerate() {
        println!(
            "  {col:>3} {:<32} {role:?}  numeric={:.2}",
            table.columns[col],
            classify::numeric_density(&view, col)
        );
    }
    println!(
        "energy tiers: primary={}, secondary={}",
        energy.primary_tier.unwrap_or("-"),
        energy.secondary_tier.unwrap_or("-")
    );

    if let Some(col) = ts_col {
        println!("first timestamps ({}):", table.columns[col]);
        for raw in view.values(col).take(cli.samples) {
            match parse_timestamp(raw) {
                Some(ts) => println!("  {raw:<28} -> {ts}"),
                None => println!("  {raw:<28} -> (unparsed)"),
            }
        }
    } else {
        println!("no timestamp column detected");
    }

    Ok(())
}

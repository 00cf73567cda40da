//! allocate - assign subjects to genotype x treatment groups
//!
//! Reads a subject table, balances baseline means per sex across groups,
//! prints the assignment and summary tables, and writes the assigned
//! table (and optionally a chart) to disk.

use anyhow::{bail, Context, Result};
use clap::Parser;
use mouse_allocation::chart;
use mouse_allocation::export;
use mouse_allocation::prelude::*;
use std::path::PathBuf;
use tabled::builder::Builder;
use tabled::Table;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Subject table (CSV, or a spreadsheet by extension: xlsx, xlsm, xlsb, xls, ods)
    /// with ID, Sex, Genotype, VonFrey and optional Batch columns
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Worksheet to read from a spreadsheet input (defaults to the first)
    #[arg(long)]
    sheet: Option<String>,

    /// Path to a design TOML (arms, capacity, missing-baseline policy)
    #[arg(long)]
    design: Option<PathBuf>,

    /// Subjects per group and sex (overrides the design)
    #[arg(long)]
    capacity: Option<usize>,

    /// What to do with subjects without a baseline: reject or skip (overrides the design)
    #[arg(long)]
    missing_baseline: Option<MissingBaseline>,

    /// Where to write the assigned table
    #[arg(long, default_value = "assigned_mice.csv")]
    output: PathBuf,

    /// Write a bar chart of mean baseline per group and sex (SVG)
    #[arg(long)]
    chart: Option<PathBuf>,

    /// Field delimiter of the input
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Only log warnings and errors
    #[arg(long, short)]
    quiet: bool,
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn design(args: &Args) -> Result<Design> {
    let mut design = match &args.design {
        Some(path) => Design::load(path).with_context(|| format!("loading design {}", path.display()))?,
        None => Design::default(),
    };
    if let Some(capacity) = args.capacity {
        design = design.with_capacity(capacity);
    }
    if let Some(policy) = args.missing_baseline {
        design = design.with_missing_baseline(policy);
    }
    Ok(design)
}

fn run(args: &Args) -> Result<()> {
    if !args.delimiter.is_ascii() {
        bail!("delimiter must be a single ASCII character");
    }
    let design = design(args)?;

    let reading = || format!("reading {}", args.input.display());
    let mut sample = Sample::new();
    if is_spreadsheet(&args.input) {
        let mut builder = SpreadsheetBuilder::new();
        if let Some(sheet) = &args.sheet {
            builder.sheet(sheet);
        }
        sample.observe(builder.from_path(&args.input).with_context(reading)?)?;
    } else {
        let csv = CsvBuilder::new()
            .delimiter(args.delimiter as u8)
            .from_path(&args.input)
            .with_context(reading)?;
        sample.observe(csv)?;
    }
    info!(subjects = sample.len(), capacity = design.capacity, "loaded subjects");

    let allocation = sample.allocate(&design)?;

    let meta = export::meta_fields(allocation.rows());
    let mut table = Builder::default();
    table.push_record(export::table_header(&meta));
    for row in allocation.rows() {
        table.push_record(export::table_record(row, &meta));
    }
    println!("{}", table.build());

    let summary = Summary::from_rows(allocation.rows());
    if summary.is_empty() {
        println!("No subjects were assigned.");
    } else {
        println!("{}", Table::new(summary.rows()));
    }

    export::write_path(&allocation, &args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(path = %args.output.display(), "wrote assigned table");

    if let Some(path) = &args.chart {
        chart::write_svg(&summary, path).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "wrote chart");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.quiet);

    if let Err(err) = run(&args) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}

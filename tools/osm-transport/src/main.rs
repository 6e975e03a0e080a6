use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use roxmltree::Document;
use std::path::PathBuf;
use std::time::Duration;

mod error;
mod extract;
mod streams;
mod transform;

#[cfg(test)]
mod testutil;

use extract::{ExtractStats, Extractor, InvalidIdPolicy};
use streams::{check_output_path, read_input, write_json, InputFormat};
use transform::TransitIndex;

#[derive(Parser, Debug)]
#[command(
    name = "osm-transport",
    author,
    version,
    about = "List public transport stops from OpenStreetMap XML with the lines serving them",
    long_about = "Reads route relations and stop nodes from an OSM XML extract (.osm or \
                  .osm.bz2) and writes a JSON array with one object per node: its tags \
                  plus a `lines` list summarising every relation that has the node as a \
                  stop member."
)]
struct Args {
    /// Input OSM XML file (.osm, or .osm.bz2 for bzip2-compressed)
    input: PathBuf,

    /// Output JSON file (.json)
    output: PathBuf,

    /// Skip elements with missing or non-numeric ids instead of failing
    #[arg(long)]
    skip_invalid: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Verbose output (show debug messages)
    #[arg(short, long)]
    verbose: bool,
}

/// Counts reported once the listing is written
#[derive(Debug, Default)]
struct RunSummary {
    lines: usize,
    stops: usize,
    served_stops: usize,
    orphaned_stops: usize,
    extract: ExtractStats,
}

impl RunSummary {
    fn log_summary(&self) {
        log::info!("=== Transport Statistics ===");
        log::info!("Lines: {}", self.lines);
        log::info!("Stops: {}", self.stops);
        log::info!("Stops served by at least one line: {}", self.served_stops);
        if self.orphaned_stops > 0 {
            log::info!(
                "Stop references without a node (omitted): {}",
                self.orphaned_stops
            );
        }
        if self.extract.ignored_children > 0 {
            log::info!("Ignored children: {}", self.extract.ignored_children);
        }
        if self.extract.skipped > 0 {
            log::warn!("Skipped for invalid ids: {}", self.extract.skipped);
        }
    }
}

fn parse_spinner() -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

fn run(args: &Args) -> Result<RunSummary> {
    // Reject bad paths before touching the filesystem
    let format = InputFormat::from_path(&args.input)?;
    check_output_path(&args.output)?;

    if !args.input.exists() {
        bail!("Input file does not exist: {}", args.input.display());
    }

    let policy = if args.skip_invalid {
        InvalidIdPolicy::Skip
    } else {
        InvalidIdPolicy::Abort
    };

    // Phase 1: Load document
    log::info!("Phase 1: Reading {} ...", format);
    let pb = parse_spinner()?;
    pb.set_message(format!("Reading {}", args.input.display()));
    let xml = read_input(&args.input, format)?;
    pb.set_message(format!("Parsing {} bytes of XML", xml.len()));
    let doc = Document::parse(&xml)
        .with_context(|| format!("Failed to parse OSM XML from {}", args.input.display()))?;
    pb.finish_and_clear();

    let mut extractor = Extractor::new(policy);
    let mut index = TransitIndex::default();

    // Phase 2: Lines and the stop -> lines index
    log::info!("Phase 2: Extracting route relations...");
    index
        .index_lines(&doc, &mut extractor)
        .context("Failed to extract relations")?;

    // Phase 3: Stops
    log::info!("Phase 3: Extracting stop nodes...");
    index
        .index_stops(&doc, &mut extractor)
        .context("Failed to extract nodes")?;

    // Phase 4: Join
    log::info!("Phase 4: Joining stops with lines...");
    let orphans = index.orphaned_stops();
    for id in &orphans {
        log::debug!("  Stop {} is referenced by a line but has no node record", id);
    }
    let records = index.records();

    // Phase 5: Write output
    log::info!("Phase 5: Writing {} stops to {}", records.len(), args.output.display());
    write_json(&records, &args.output, args.pretty).context("Failed to write stop listing")?;

    Ok(RunSummary {
        lines: index.lines.len(),
        stops: index.stops.len(),
        served_stops: index.served_stops(),
        orphaned_stops: orphans.len(),
        extract: extractor.stats(),
    })
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.verbose { "debug" } else { "info" }),
    )
    .format_timestamp(None)
    .init();

    log::info!("=== OSM Transport Stops ===");
    log::info!("Input: {}", args.input.display());
    log::info!("Output: {}", args.output.display());

    let summary = run(&args)?;

    summary.log_summary();
    log::info!("Output written to: {}", args.output.display());

    Ok(())
}

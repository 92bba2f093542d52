pub mod cell;
pub mod cli;
pub mod context;
pub mod dating;
pub mod error;
pub mod io_utils;
pub mod layout;
pub mod merge;
pub mod merged;
pub mod normalize;
pub mod output;
pub mod reader;
pub mod record;
pub mod resolve;
pub mod total;

use std::{
    env,
    io::{self, Write},
    sync::OnceLock,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands},
    context::{LogProgress, MergeContext},
    layout::MergeLayout,
    reader::FileTableReader,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("maestro_merge", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Merge(args) => handle_merge(&args),
        Commands::Layout(args) => handle_layout(&args),
    }
}

fn handle_merge(args: &cli::MergeArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let layout = match &args.layout {
        Some(path) => MergeLayout::load(path)
            .with_context(|| format!("Loading merge layout from {path:?}"))?,
        None => MergeLayout::default(),
    };
    debug!(
        "Layout: key '{}', {} date column(s), {} field group(s)",
        layout.key_column,
        layout.date_columns.len(),
        layout.groups.len()
    );
    if let Some(delimiter) = args.delimiter {
        info!(
            "Reading delimited inputs with delimiter '{}'",
            printable_delimiter(delimiter)
        );
    }

    let reader = FileTableReader::new(args.delimiter, encoding);
    let progress = LogProgress;
    let context = MergeContext::new(&progress).with_jobs(args.jobs);
    let merged = merge::merge_files(&args.inputs, &reader, &layout, &context)
        .with_context(|| format!("Merging {} input file(s)", args.inputs.len()))?;

    let delimiter = io_utils::resolve_output_delimiter(&args.output, args.output_delimiter);
    output::write_merged_table(&merged, &args.output, delimiter)
        .with_context(|| format!("Writing merged output to {:?}", args.output))?;
    info!(
        "Wrote {} row(s) across {} column(s) to {:?}",
        merged.len(),
        merged.headers().len(),
        args.output
    );
    Ok(())
}

fn handle_layout(args: &cli::LayoutArgs) -> Result<()> {
    let layout = MergeLayout::default();
    match &args.output {
        Some(path) => {
            layout
                .save(path)
                .with_context(|| format!("Writing layout to {path:?}"))?;
            info!(
                "Default layout with {} field group(s) written to {:?}",
                layout.groups.len(),
                path
            );
        }
        None => {
            let yaml = layout.to_yaml_string()?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(yaml.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}

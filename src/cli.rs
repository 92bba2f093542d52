use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Merge MAESTRO commission extracts into one row per line",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Merge CSV/Excel extracts keeping the freshest value per field group
    Merge(MergeArgs),
    /// Print or save the default merge layout as YAML
    Layout(LayoutArgs),
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Input files (csv, tsv, txt, xlsx, xlsm, xlsb, xls, ods); repeat for each file
    #[arg(short = 'i', long = "input", required = true, action = clap::ArgAction::Append)]
    pub inputs: Vec<PathBuf>,
    /// Output CSV file (use '-' for stdout)
    #[arg(short = 'o', long = "output", default_value = "MAESTRO_UNIFICADO.csv")]
    pub output: PathBuf,
    /// YAML layout overriding the built-in MAESTRO layout
    #[arg(long)]
    pub layout: Option<PathBuf>,
    /// Delimiter for delimited inputs (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Delimiter for the output file (defaults from its extension)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding of delimited inputs (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Maximum number of files read concurrently (0 uses every available core)
    #[arg(short = 'j', long, default_value_t = 0)]
    pub jobs: usize,
}

#[derive(Debug, Args)]
pub struct LayoutArgs {
    /// Destination YAML file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_names_and_single_characters_parse() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("semicolon"), Ok(b';'));
        assert_eq!(parse_delimiter(":"), Ok(b':'));
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("§").is_err());
    }

    #[test]
    fn merge_requires_at_least_one_input() {
        assert!(Cli::try_parse_from(["maestro-merge", "merge"]).is_err());
        let cli = Cli::try_parse_from([
            "maestro-merge",
            "merge",
            "-i",
            "a.csv",
            "--input",
            "b.xlsx",
            "-j",
            "2",
        ])
        .expect("valid arguments");
        match cli.command {
            Commands::Merge(args) => {
                assert_eq!(args.inputs.len(), 2);
                assert_eq!(args.output, PathBuf::from("MAESTRO_UNIFICADO.csv"));
                assert_eq!(args.jobs, 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}

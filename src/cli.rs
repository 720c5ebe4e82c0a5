use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::{Config, FieldCountPolicy};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Input CSV file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Number of most frequent values to report per column (overrides config)
    #[arg(short = 'n', long)]
    pub top_n: Option<usize>,

    /// Rows per chunk (overrides config)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Field delimiter (overrides config)
    #[arg(long)]
    pub delimiter: Option<char>,

    /// Keep rows whose field count differs from the header
    #[arg(long)]
    pub lenient: bool,

    /// Report format written to stdout
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}

impl CliOptions {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, cfg: &mut Config) {
        if let Some(top_n) = self.top_n {
            cfg.top_n = top_n;
        }
        if let Some(chunk_size) = self.chunk_size {
            cfg.chunk_size = chunk_size;
        }
        if let Some(delimiter) = self.delimiter {
            cfg.delimiter = delimiter;
        }
        if self.lenient {
            cfg.field_count = FieldCountPolicy::Lenient;
        }
    }
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}

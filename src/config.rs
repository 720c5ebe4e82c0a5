use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_EVENT_CAPACITY, DEFAULT_MAX_WARNING_CHARS, DEFAULT_SAMPLE_BYTES,
    DEFAULT_TOP_N, FALLBACK_ROW_BYTES, MIN_CHUNK_SIZE,
};
use crate::error::AnalysisError;

/// How rows whose field count differs from the header are treated.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldCountPolicy {
    /// Such rows are malformed and skipped.
    #[default]
    Strict,
    /// Short rows leave trailing columns uncounted; extra fields get positional names.
    Lenient,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    pub run_id: String,
    pub top_n: usize,
    pub chunk_size: usize,
    pub min_chunk_size: usize,
    pub sample_bytes: usize,
    pub fallback_row_bytes: f64,
    pub min_encoding_confidence: f32,
    pub delimiter: char,
    pub field_count: FieldCountPolicy,
    pub event_capacity: usize,
    pub max_warning_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_id: String::new(),
            top_n: DEFAULT_TOP_N,
            chunk_size: DEFAULT_CHUNK_SIZE,
            min_chunk_size: MIN_CHUNK_SIZE,
            sample_bytes: DEFAULT_SAMPLE_BYTES,
            fallback_row_bytes: FALLBACK_ROW_BYTES,
            min_encoding_confidence: 0.0,
            delimiter: ',',
            field_count: FieldCountPolicy::Strict,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_warning_chars: DEFAULT_MAX_WARNING_CHARS,
        }
    }
}

impl Config {
    /// Check every parameter range. Runs before any file is touched.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.top_n < 1 {
            return Err(invalid(format!("top_n must be at least 1, got {}", self.top_n)));
        }
        if self.min_chunk_size < 1 {
            return Err(invalid("min_chunk_size must be at least 1".to_string()));
        }
        if self.chunk_size < self.min_chunk_size {
            return Err(invalid(format!(
                "chunk_size {} is below the minimum of {}",
                self.chunk_size, self.min_chunk_size
            )));
        }
        if self.sample_bytes < 1 {
            return Err(invalid("sample_bytes must be at least 1".to_string()));
        }
        if !self.fallback_row_bytes.is_finite() || self.fallback_row_bytes <= 0.0 {
            return Err(invalid(format!(
                "fallback_row_bytes must be positive, got {}",
                self.fallback_row_bytes
            )));
        }
        if !(0.0..=1.0).contains(&self.min_encoding_confidence) {
            return Err(invalid(format!(
                "min_encoding_confidence must be within [0, 1], got {}",
                self.min_encoding_confidence
            )));
        }
        if !self.delimiter.is_ascii() || matches!(self.delimiter, '"' | '\n' | '\r') {
            return Err(invalid(format!(
                "delimiter must be a single ASCII character other than a quote or newline, got {:?}",
                self.delimiter
            )));
        }
        if self.event_capacity < 1 {
            return Err(invalid("event_capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Delimiter as the byte the CSV parser expects. Only meaningful after `validate`.
    pub fn delimiter_byte(&self) -> u8 {
        u8::try_from(self.delimiter).unwrap_or(b',')
    }
}

fn invalid(message: String) -> AnalysisError {
    AnalysisError::InvalidParameter(message)
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p)?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let mut config: Config = serde_yaml::from_slice(&bytes)?;
    if config.run_id.trim().is_empty() {
        config.run_id = generate_run_id();
    }

    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig { config, config_hash })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)
}

fn generate_run_id() -> String {
    let now = chrono::Utc::now();
    format!("{}_{}", now.format("%Y%m%dT%H%M%SZ"), rand_suffix())
}

fn rand_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("{:08x}", nanos)
}

pub mod aggregate;
pub mod chunk;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod reader;
pub mod report;
pub mod sample;
pub mod source;
pub mod util;

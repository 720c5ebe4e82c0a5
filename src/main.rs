use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use topvals::cli::{self, ReportFormat};
use topvals::config;
use topvals::logging::{self, LogFormat};
use topvals::pipeline::cancel::CancellationToken;
use topvals::pipeline::events::AnalysisEvent;
use topvals::pipeline::{self, AnalysisOutcome};
use topvals::report::AnalysisReport;

fn main() -> Result<()> {
    let cli_opts = cli::parse();
    logging::init_logging(if cli_opts.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    });

    let mut loaded = config::load_config(cli_opts.config_path.as_deref())?;
    cli_opts.apply(&mut loaded.config);

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        info!("interrupt received; stopping after the current chunk");
        handler_token.cancel();
    })?;

    info!("analysing {}", cli_opts.input.display());

    let handle = pipeline::start_analysis_loaded(&cli_opts.input, loaded, cancel)?;
    for event in handle.events() {
        log_event(&event);
    }

    match handle.wait() {
        AnalysisOutcome::Completed(report) => print_report(&report, cli_opts.format)?,
        AnalysisOutcome::Cancelled(report) => {
            warn!("analysis cancelled; printing partial report");
            print_report(&report, cli_opts.format)?;
        }
        AnalysisOutcome::Failed {
            error,
            partial_report,
        } => {
            if let Some(report) = partial_report {
                print_report(&report, cli_opts.format)?;
            }
            bail!("analysis failed: {error}");
        }
    }

    info!("topvals run finished");
    Ok(())
}

fn log_event(event: &AnalysisEvent) {
    match event {
        AnalysisEvent::EncodingLowConfidence {
            detected,
            confidence,
            fallback,
        } => warn!("low encoding confidence {confidence:.2} for {detected}; using {fallback}"),
        AnalysisEvent::Progress {
            chunks_processed,
            estimated_total_chunks,
            rows_processed,
            ..
        } => info!(
            "progress: chunk {chunks_processed}/~{estimated_total_chunks} rows_processed={rows_processed}"
        ),
        AnalysisEvent::RowParseWarning {
            line,
            raw_content,
            reason,
            ..
        } => debug!("row {line} skipped ({reason}): {raw_content}"),
        _ => {}
    }
}

fn print_report(report: &AnalysisReport, format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Text => print!("{}", report.render_text()),
        ReportFormat::Json => println!("{}", report.to_json()?),
    }
    Ok(())
}

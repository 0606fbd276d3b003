use std::process::ExitCode;

use anyhow::Context;
use ffly_bench::config::Settings;
use ffly_bench::orchestrator::{progress_bar, run_until};
use ffly_bench::report::{render, OutputFormat};
use ffly_bench::BenchError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(e) => {
            let invalid = e.downcast_ref::<BenchError>().is_some_and(|e| {
                matches!(
                    e,
                    BenchError::InvalidConfiguration(_) | BenchError::ConfigFile { .. }
                )
            });
            eprintln!("error: {e:#}");
            if invalid {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn try_main() -> anyhow::Result<ExitCode> {
    let settings = Settings::load()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if let Some(threads) = settings.threads {
        if threads == 0 {
            return Err(BenchError::InvalidConfiguration(
                "runtime thread count must be at least 1".to_string(),
            )
            .into());
        }
        runtime.worker_threads(threads);
    }
    let runtime = runtime
        .build()
        .map_err(BenchError::Runtime)
        .context("failed to build tokio runtime")?;

    let Settings {
        run, format, progress, ..
    } = settings;

    let token = CancellationToken::new();
    let report = runtime.block_on(async {
        let ctrl_c = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c.cancel();
            }
        });
        run_until(run, token, progress_bar(progress)).await
    })?;

    if format == OutputFormat::Human {
        println!();
    }
    println!(
        "{}",
        render(&report, format).context("failed to serialize report")?
    );

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

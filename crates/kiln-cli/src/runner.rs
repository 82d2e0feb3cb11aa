//! `kiln run`: host one environment in the foreground

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use kiln_process::{
    Environment, EnvironmentSettings, ExecutionRequest, ProcessError, StatusEvent,
    SENTINEL_EXIT_CODE,
};
use nix::sys::signal::Signal;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::cli::RunArgs;

const CHANNEL_CAPACITY: usize = 256;
const MIB: f64 = 1024.0 * 1024.0;

/// Launch the command, relay the terminal, and return the child's exit code
pub async fn run(args: RunArgs, settings: EnvironmentSettings) -> Result<i32> {
    run_with_input(args, settings, BufReader::new(tokio::io::stdin())).await
}

async fn run_with_input<R>(args: RunArgs, settings: EnvironmentSettings, input: R) -> Result<i32>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (console_tx, console_rx) = broadcast::channel::<Vec<u8>>(CHANNEL_CAPACITY);
    let (status_tx, status_rx) = broadcast::channel::<StatusEvent>(CHANNEL_CAPACITY);

    let environment = Environment::builder(&args.root)
        .settings(settings)
        .console_sink(Arc::new(console_tx))
        .status_sink(Arc::new(status_tx))
        .build();

    ensure_root(&environment).await?;

    tokio::spawn(relay_console(console_rx));
    tokio::spawn(log_status(status_rx));

    let (exit_tx, mut exit_rx) = oneshot::channel();
    let Some((program, program_args)) = args.command.split_first() else {
        bail!("no command given");
    };

    let mut request = ExecutionRequest::new(program)
        .args(program_args)
        .working_dir(&args.workdir)
        .on_exit(move |code| {
            let _ = exit_tx.send(code);
        });
    for (key, value) in &args.env {
        request = request.env(key, value);
    }

    environment
        .launch(request)
        .await
        .with_context(|| format!("failed to launch '{}'", args.command.join(" ")))?;

    tokio::spawn(relay_input(environment.clone(), input));
    if let Some(secs) = args.stats_secs {
        tokio::spawn(report_stats(environment.clone(), Duration::from_secs(secs.max(1))));
    }

    let interrupted = tokio::select! {
        code = &mut exit_rx => return Ok(code.unwrap_or(SENTINEL_EXIT_CODE)),
        interrupted = tokio::signal::ctrl_c() => interrupted,
    };
    interrupted.context("failed to listen for Ctrl-C")?;
    info!(grace_secs = args.grace_secs, "Interrupt received, stopping process");

    environment.send_signal(Signal::SIGTERM as i32)?;
    environment
        .wait_for_main_process_for(Duration::from_secs(args.grace_secs))
        .await?;

    Ok(exit_rx
        .await
        .ok()
        .or_else(|| environment.last_exit_code())
        .unwrap_or(SENTINEL_EXIT_CODE))
}

/// Create the root directory; an existing one is reused
async fn ensure_root(environment: &Environment) -> Result<()> {
    match environment.create().await {
        Ok(()) => {
            info!(root = %environment.root_directory().display(), "Created environment root");
            Ok(())
        }
        Err(ProcessError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {
            debug!(root = %environment.root_directory().display(), "Using existing environment root");
            Ok(())
        }
        Err(e) => Err(e).with_context(|| {
            format!(
                "failed to create root directory {}",
                environment.root_directory().display()
            )
        }),
    }
}

async fn relay_console(mut console: broadcast::Receiver<Vec<u8>>) {
    let mut stdout = tokio::io::stdout();
    loop {
        match console.recv().await {
            Ok(chunk) => {
                if stdout.write_all(&chunk).await.is_err() || stdout.flush().await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Console output dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn log_status(mut status: broadcast::Receiver<StatusEvent>) {
    while let Ok(event) = status.recv().await {
        info!(running = event.running, installing = event.installing, "Status changed");
    }
}

/// Forward input lines to the process until the input closes
async fn relay_input<R>(environment: Environment, input: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Err(e) = environment.send_input(&line).await {
                    warn!(error = %e, "Input not delivered");
                }
            }
            Ok(None) => {
                debug!("Input closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read input");
                break;
            }
        }
    }
}

async fn report_stats(environment: Environment, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        if !matches!(environment.is_running(), Ok(true)) {
            break;
        }
        match environment.get_stats().await {
            Ok(stats) => info!(cpu = stats.cpu, memory_mib = stats.memory / MIB, "Stats"),
            Err(e) => debug!(error = %e, "Stats unavailable"),
        }
    }
}

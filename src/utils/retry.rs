// file: src/utils/retry.rs
// version: 1.0.0
// guid: 6e2d9a47-1c8b-4f05-a3e7-94b0c2d5f813

//! Retry and polling helpers

use super::command::{Cmd, CommandOutput, CommandRunner};
use crate::error::SetupError;
use crate::Result;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Run `operation` up to `max_attempts` times, sleeping a constant `delay`
/// between attempts. The closure receives the 1-based attempt number.
pub async fn retry<F, Fut, T>(
    max_attempts: u32,
    delay: Duration,
    label: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if max_attempts == 0 {
        return Err(SetupError::invalid_argument(format!(
            "{}: max_attempts must be at least 1",
            label
        )));
    }

    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", label, attempt);
                }
                return Ok(value);
            }
            Err(e) if attempt >= max_attempts => {
                warn!("{} failed after {} attempts: {}", label, max_attempts, e);
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "{} failed on attempt {}/{}: {} - retrying in {:?}",
                    label, attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Run a command, retrying on a non-zero exit or spawn failure
pub async fn execute_with_retry(
    runner: &dyn CommandRunner,
    cmd: &Cmd,
    max_attempts: u32,
    delay: Duration,
    label: &str,
) -> Result<CommandOutput> {
    retry(max_attempts, delay, label, |_| async move {
        let output = runner.run(cmd).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(SetupError::execution(format!(
                "`{}` exited with code {}: {}",
                cmd,
                output.code.unwrap_or(-1),
                output.stderr.trim()
            )))
        }
    })
    .await
}

/// Poll `systemctl is-active` until the unit is active or `timeout` passes
pub async fn wait_for_service(
    runner: &dyn CommandRunner,
    unit: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let check = Cmd::systemctl(["is-active", "--quiet", unit]);
    let start = Instant::now();

    loop {
        if runner.run(&check).await.map(|o| o.success()).unwrap_or(false) {
            debug!("Service {} is active", unit);
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(SetupError::timeout(format!(
                "Service {} not active after {:?}",
                unit, timeout
            )));
        }
        tokio::time::sleep(interval).await;
    }
}

/// Poll a TCP connect until the port accepts connections or `timeout` passes
pub async fn wait_for_port(
    host: &str,
    port: u16,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let start = Instant::now();
    let attempt_timeout = interval.max(Duration::from_millis(100));

    loop {
        let connect = tokio::net::TcpStream::connect((host, port));
        if let Ok(Ok(_)) = tokio::time::timeout(attempt_timeout, connect).await {
            debug!("Port {}:{} is accepting connections", host, port);
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(SetupError::timeout(format!(
                "Port {}:{} not reachable after {:?}",
                host, port, timeout
            )));
        }
        tokio::time::sleep(interval).await;
    }
}

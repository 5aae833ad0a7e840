//! Compose CLI detection and invocation.
//!
//! The manager invokes exactly
//! `docker compose -f <compose_path> --env-file <env_path> <subcommand>`
//! (or the `docker-compose` fallback). Stderr is captured and scanned for
//! "error" case-insensitively even when the exit code is zero: some runtime
//! versions return 0 on container-name conflicts.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::error::ComposeError;

/// Which compose CLI flavor is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeFlavor {
    /// `docker compose` (v2 plugin)
    DockerPlugin,
    /// Standalone `docker-compose`
    Standalone,
}

impl ComposeFlavor {
    /// Program + leading args for this flavor.
    pub fn command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Self::DockerPlugin => ("docker", &["compose"]),
            Self::Standalone => ("docker-compose", &[]),
        }
    }
}

/// Output of one compose invocation.
#[derive(Debug, Clone)]
pub struct ComposeOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Whether stderr contains an error marker, case-insensitively.
pub fn stderr_has_error(stderr: &str) -> bool {
    stderr.to_lowercase().contains("error")
}

/// Detect an available compose CLI.
///
/// Tries `docker compose version`, then `docker-compose --version`, then
/// attempts to install the v2 plugin via apt-get before giving up with
/// remediation instructions.
pub async fn detect() -> Result<ComposeFlavor, ComposeError> {
    if probe("docker", &["compose", "version"]).await {
        return Ok(ComposeFlavor::DockerPlugin);
    }
    if probe("docker-compose", &["--version"]).await {
        return Ok(ComposeFlavor::Standalone);
    }

    warn!("no compose CLI found, attempting apt-get install");
    for package in ["docker-compose-v2", "docker-compose-plugin"] {
        if probe("apt-get", &["install", "-y", package]).await
            && probe("docker", &["compose", "version"]).await
        {
            return Ok(ComposeFlavor::DockerPlugin);
        }
    }

    Err(ComposeError::NotAvailable(
        "tried `docker compose version`, `docker-compose --version` and apt-get install"
            .to_string(),
    ))
}

async fn probe(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .output()
        .await
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Run one compose subcommand against a deployment.
pub async fn run(
    flavor: ComposeFlavor,
    compose_path: &Path,
    env_path: &Path,
    subcommand: &[&str],
    timeout: Option<Duration>,
) -> Result<ComposeOutput, ComposeError> {
    let (program, leading) = flavor.command();
    let sub_name = subcommand.first().copied().unwrap_or("").to_string();

    let mut cmd = Command::new(program);
    cmd.args(leading)
        .arg("-f")
        .arg(compose_path)
        .arg("--env-file")
        .arg(env_path)
        .args(subcommand);

    debug!(subcommand = %sub_name, compose = %compose_path.display(), "running compose");

    let output_fut = cmd.output();
    let output = match timeout {
        Some(budget) => tokio::time::timeout(budget, output_fut).await.map_err(|_| {
            ComposeError::Spawn {
                subcommand: sub_name.clone(),
                reason: format!("timed out after {}s", budget.as_secs()),
            }
        })?,
        None => output_fut.await,
    }
    .map_err(|e| ComposeError::Spawn { subcommand: sub_name.clone(), reason: e.to_string() })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        return Err(ComposeError::CommandFailed {
            subcommand: sub_name,
            rc: output.status.code().unwrap_or(-1),
            stderr,
        });
    }

    // rc=0 is not trustworthy: the runtime returns 0 on name conflicts.
    if stderr_has_error(&stderr) {
        return Err(ComposeError::ErrorInStderr { subcommand: sub_name, stderr });
    }

    Ok(ComposeOutput { stdout, stderr })
}

/// Whether `compose ps --format json` output reports a running container.
///
/// Output is one JSON object per line (or a JSON array, depending on the
/// compose version); both shapes are handled.
pub fn ps_reports_running(stdout: &str) -> bool {
    let states = |v: &serde_json::Value| -> bool {
        v.get("State")
            .and_then(|s| s.as_str())
            .is_some_and(|s| s.eq_ignore_ascii_case("running"))
    };

    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(stdout) {
        return items.iter().any(|v| states(v));
    }
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .any(|v| states(&v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_error_scan_is_case_insensitive() {
        assert!(stderr_has_error("Error: container name already in use"));
        assert!(stderr_has_error("ERROR while creating network"));
        assert!(stderr_has_error("some error happened"));
        assert!(!stderr_has_error("Creating network... done"));
        assert!(!stderr_has_error(""));
    }

    #[test]
    fn test_ps_parses_line_delimited_json() {
        let stdout = r#"{"Name":"gw-1","State":"running"}
{"Name":"gw-2","State":"exited"}
"#;
        assert!(ps_reports_running(stdout));

        let stdout = r#"{"Name":"gw-1","State":"exited"}"#;
        assert!(!ps_reports_running(stdout));
    }

    #[test]
    fn test_ps_parses_array_json() {
        let stdout = r#"[{"Name":"gw-1","State":"running"}]"#;
        assert!(ps_reports_running(stdout));
        assert!(!ps_reports_running("[]"));
        assert!(!ps_reports_running("not json"));
    }

    #[test]
    fn test_flavor_commands() {
        assert_eq!(ComposeFlavor::DockerPlugin.command(), ("docker", &["compose"][..]));
        assert_eq!(ComposeFlavor::Standalone.command(), ("docker-compose", &[][..]));
    }
}

use serde::Serialize;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Instant;

use crate::error::{BuildFailedDetails, Error, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub command: String,
    pub working_dir: String,
    pub duration_secs: f64,
}

/// Run the local build command through the platform shell.
///
/// Output is passed straight through to the terminal. Any non-zero exit, or a
/// shell that cannot be started, is a build failure.
pub fn run_build(command: &str, working_dir: &Path) -> Result<BuildReport> {
    let working_dir_display = working_dir.to_string_lossy().to_string();
    let started = Instant::now();

    log_status!("build", "Running: {}", command);

    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    let status = cmd
        .current_dir(working_dir)
        .stdin(Stdio::null())
        // stdout carries the JSON report.
        .stdout(Stdio::from(std::io::stderr()))
        .stderr(Stdio::inherit())
        .status();

    let exit_code = match status {
        Ok(status) => status.code().unwrap_or(-1),
        Err(e) => {
            log_warn!("build", "could not start shell in {}: {}", working_dir_display, e);
            -1
        }
    };

    if exit_code != 0 {
        return Err(Error::build_failed(BuildFailedDetails {
            command: command.to_string(),
            working_dir: working_dir_display,
            exit_code,
        }));
    }

    let duration_secs = started.elapsed().as_secs_f64();
    log_status!("build", "Build completed in {:.1}s", duration_secs);

    Ok(BuildReport {
        command: command.to_string(),
        working_dir: working_dir_display,
        duration_secs,
    })
}

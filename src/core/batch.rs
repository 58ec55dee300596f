//! Ordered remote command batches.
//!
//! A batch runs its commands one at a time over an open session. Non-zero
//! exits are recorded per command; whether they stop the batch depends on the
//! [`CommandFailureMode`]. A dispatch failure always stops the batch.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, RemoteCommandFailedDetails, Result};
use crate::ssh::{RemoteSession, StreamKind};
use crate::utils::template;

/// The three command phases of a deployment, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Batch {
    PreDeploy,
    Deploy,
    PostDeploy,
}

impl Batch {
    pub const ALL: [Batch; 3] = [Batch::PreDeploy, Batch::Deploy, Batch::PostDeploy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Batch::PreDeploy => "pre-deploy",
            Batch::Deploy => "deploy",
            Batch::PostDeploy => "post-deploy",
        }
    }
}

/// Whether a non-zero remote exit aborts the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandFailureMode {
    /// Failures are logged and recorded, the batch goes on.
    #[default]
    Continue,
    /// The first non-zero exit stops the batch and fails the deployment.
    Abort,
}

/// Outcome of one remote command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub command: String,
    pub exit_code: i32,
    pub success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

/// Outcome of one batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch: Batch,
    pub commands: Vec<CommandResult>,
    pub all_succeeded: bool,
}

impl BatchReport {
    pub fn empty(batch: Batch) -> Self {
        Self {
            batch,
            commands: Vec::new(),
            all_succeeded: true,
        }
    }

    pub fn failed_count(&self) -> usize {
        self.commands.iter().filter(|c| !c.success).count()
    }
}

/// Expand `{{key}}` placeholders in every command.
pub fn render_commands(commands: &[String], vars: &HashMap<String, String>) -> Vec<String> {
    commands
        .iter()
        .map(|c| template::render_map(c, vars))
        .collect()
}

/// Run `commands` in order over `session`.
///
/// Returns `Err` on a dispatch failure (any mode) or on the first non-zero
/// exit in [`CommandFailureMode::Abort`]. Commands after the failing one are
/// never started.
pub fn run_batch<S: RemoteSession + ?Sized>(
    session: &mut S,
    batch: Batch,
    commands: &[String],
    failure_mode: CommandFailureMode,
) -> Result<BatchReport> {
    let mut report = BatchReport::empty(batch);
    if commands.is_empty() {
        return Ok(report);
    }

    log_status!("deploy", "Running {} commands ({})", batch.as_str(), commands.len());

    for command in commands {
        log_status!("deploy", "  exec: {}", command);

        let mut sink = |stream: StreamKind, line: &str| {
            let line = line.trim_end();
            if line.is_empty() {
                return;
            }
            match stream {
                StreamKind::Stdout => eprintln!("[{}]   out: {}", batch.as_str(), line),
                StreamKind::Stderr => eprintln!("[{}]   err: {}", batch.as_str(), line),
            }
        };

        let output = session.exec(command, &mut sink)?;

        let result = CommandResult {
            command: command.clone(),
            exit_code: output.exit_code,
            success: output.exit_code == 0,
            stdout: output.stdout,
            stderr: output.stderr,
        };

        if !result.success {
            report.all_succeeded = false;

            if failure_mode == CommandFailureMode::Abort {
                let details = RemoteCommandFailedDetails {
                    batch: batch.as_str().to_string(),
                    command: result.command.clone(),
                    exit_code: result.exit_code,
                    stdout: result.stdout.clone(),
                    stderr: result.stderr.clone(),
                };
                report.commands.push(result);
                return Err(Error::remote_command_failed(details));
            }

            log_warn!(
                "deploy",
                "command exited with code {}: {}",
                result.exit_code,
                result.command
            );
        }

        report.commands.push(result);
    }

    if report.all_succeeded {
        log_status!("deploy", "Finished {} commands", batch.as_str());
    } else {
        log_warn!(
            "deploy",
            "{} of {} {} commands failed",
            report.failed_count(),
            report.commands.len(),
            batch.as_str()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::ssh::CommandOutput;
    use std::path::Path;

    /// Session that answers commands from a script and records what ran.
    #[derive(Default)]
    struct ScriptedSession {
        exit_codes: HashMap<String, i32>,
        dispatch_failures: Vec<String>,
        ran: Vec<String>,
    }

    impl RemoteSession for ScriptedSession {
        fn upload(&mut self, _local: &Path, _remote: &str) -> Result<()> {
            Ok(())
        }

        fn exec(
            &mut self,
            command: &str,
            sink: &mut dyn FnMut(StreamKind, &str),
        ) -> Result<CommandOutput> {
            if self.dispatch_failures.iter().any(|c| c == command) {
                return Err(Error::remote_command_dispatch_failed(command, "channel closed"));
            }
            self.ran.push(command.to_string());
            sink(StreamKind::Stdout, "ok");
            Ok(CommandOutput {
                stdout: "ok\n".to_string(),
                stderr: String::new(),
                exit_code: self.exit_codes.get(command).copied().unwrap_or(0),
            })
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn cmds(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_batch_touches_nothing() {
        let mut session = ScriptedSession::default();
        let report = run_batch(&mut session, Batch::Deploy, &[], CommandFailureMode::Continue).unwrap();
        assert!(report.all_succeeded);
        assert!(report.commands.is_empty());
        assert!(session.ran.is_empty());
    }

    #[test]
    fn commands_run_in_listed_order() {
        let mut session = ScriptedSession::default();
        let report = run_batch(
            &mut session,
            Batch::PreDeploy,
            &cmds(&["a", "b", "c"]),
            CommandFailureMode::Continue,
        )
        .unwrap();
        assert_eq!(session.ran, vec!["a", "b", "c"]);
        assert_eq!(report.commands.len(), 3);
        assert_eq!(report.commands[0].stdout, "ok\n");
    }

    #[test]
    fn continue_mode_runs_past_non_zero_exit() {
        let mut session = ScriptedSession::default();
        session.exit_codes.insert("b".to_string(), 2);
        let report = run_batch(
            &mut session,
            Batch::Deploy,
            &cmds(&["a", "b", "c"]),
            CommandFailureMode::Continue,
        )
        .unwrap();
        assert_eq!(session.ran, vec!["a", "b", "c"]);
        assert!(!report.all_succeeded);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.commands[1].exit_code, 2);
        assert!(report.commands[2].success);
    }

    #[test]
    fn abort_mode_stops_at_non_zero_exit() {
        let mut session = ScriptedSession::default();
        session.exit_codes.insert("b".to_string(), 1);
        let err = run_batch(
            &mut session,
            Batch::Deploy,
            &cmds(&["a", "b", "c"]),
            CommandFailureMode::Abort,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::RemoteCommandFailed);
        assert_eq!(session.ran, vec!["a", "b"]);
    }

    #[test]
    fn dispatch_failure_prevents_following_commands() {
        let mut session = ScriptedSession::default();
        session.dispatch_failures.push("b".to_string());
        let err = run_batch(
            &mut session,
            Batch::PostDeploy,
            &cmds(&["a", "b", "c"]),
            CommandFailureMode::Continue,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::RemoteCommandDispatchFailed);
        assert_eq!(session.ran, vec!["a"]);
    }

    #[test]
    fn render_commands_expands_placeholders() {
        let mut vars = HashMap::new();
        vars.insert("uploadPath".to_string(), "/tmp/dist.zip".to_string());
        let rendered = render_commands(&cmds(&["unzip -o {{uploadPath}}", "ls"]), &vars);
        assert_eq!(rendered, vec!["unzip -o /tmp/dist.zip", "ls"]);
    }

    #[test]
    fn failure_mode_deserializes_lowercase() {
        let mode: CommandFailureMode = serde_json::from_str("\"abort\"").unwrap();
        assert_eq!(mode, CommandFailureMode::Abort);
        assert_eq!(CommandFailureMode::default(), CommandFailureMode::Continue);
    }
}

//! The deployment state machine.
//!
//! `Build → Package → Upload → PreDeploy → Deploy → PostDeploy → Cleanup`.
//! The first fatal error skips every remaining phase except cleanup, which
//! runs exactly once whatever the outcome. Upload and all three command
//! batches share one session, closed after the last batch or on the first
//! fatal error after it was opened.

use chrono::{Local, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

use crate::batch::{self, Batch, BatchReport, CommandFailureMode};
use crate::build::{self, BuildReport};
use crate::cleanup::{self, CleanupOutcome};
use crate::config::DeploymentProfile;
use crate::defaults;
use crate::error::{Error, Result};
use crate::package::{self, PackageReport};
use crate::ssh::{Connector, RemoteSession, SessionGuard};
use crate::utils::template::TemplateVars;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Build,
    Package,
    Upload,
    PreDeploy,
    Deploy,
    PostDeploy,
    Cleanup,
}

impl From<Batch> for Phase {
    fn from(batch: Batch) -> Self {
        match batch {
            Batch::PreDeploy => Phase::PreDeploy,
            Batch::Deploy => Phase::Deploy,
            Batch::PostDeploy => Phase::PostDeploy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Overrides `commands.onFailure` from the profile.
    pub failure_mode: Option<CommandFailureMode>,
    /// Fixed `{{timestamp}}` value. Defaults to the local time at start.
    pub timestamp: Option<String>,
}

impl DeployOptions {
    fn resolve_failure_mode(&self, profile: &DeploymentProfile) -> CommandFailureMode {
        self.failure_mode.unwrap_or(profile.commands.on_failure)
    }

    fn resolve_timestamp(&self) -> String {
        self.timestamp
            .clone()
            .unwrap_or_else(|| Local::now().format(defaults::TIMESTAMP_FORMAT).to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    pub environment: String,
    pub host: String,
    pub started_at: String,
    pub elapsed_secs: f64,
    pub outcome: Outcome,
    pub completed_phases: Vec<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageReport>,
    pub batches: Vec<BatchReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupOutcome>,
    pub site_url: String,
    #[serde(skip)]
    pub error: Option<Error>,
}

impl DeployReport {
    fn new(profile: &DeploymentProfile) -> Self {
        Self {
            environment: profile.name.clone(),
            host: profile.server.host.clone(),
            started_at: Utc::now().to_rfc3339(),
            elapsed_secs: 0.0,
            outcome: Outcome::Failed,
            completed_phases: Vec::new(),
            failed_phase: None,
            build: None,
            package: None,
            batches: Vec::new(),
            cleanup: None,
            site_url: profile.site_url(),
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Run one phase, recording it as completed or failed.
    fn step<T>(&mut self, phase: Phase, f: impl FnOnce() -> Result<T>) -> Result<T> {
        match f() {
            Ok(value) => {
                self.completed_phases.push(phase);
                Ok(value)
            }
            Err(err) => {
                self.failed_phase = Some(phase);
                Err(err)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedBatch {
    pub batch: Batch,
    pub commands: Vec<String>,
}

/// What a run would do, with placeholders already expanded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployPlan {
    pub environment: String,
    pub target: String,
    pub build_command: String,
    pub working_dir: String,
    pub build_dir: String,
    pub artifact_path: String,
    pub upload_path: String,
    pub on_failure: CommandFailureMode,
    pub batches: Vec<PlannedBatch>,
    pub site_url: String,
}

/// Values available to `{{key}}` placeholders in remote commands.
pub fn template_vars(profile: &DeploymentProfile, timestamp: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert(
        TemplateVars::UPLOAD_PATH.to_string(),
        profile.remote.upload_path.clone(),
    );
    vars.insert(
        TemplateVars::DEPLOY_PATH.to_string(),
        profile.remote.deploy_path.clone(),
    );
    vars.insert(
        TemplateVars::BACKUP_PATH.to_string(),
        profile.remote.backup_path.clone(),
    );
    vars.insert(TemplateVars::ARTIFACT.to_string(), profile.artifact_name());
    vars.insert(TemplateVars::TIMESTAMP.to_string(), timestamp.to_string());
    vars
}

fn commands_for(profile: &DeploymentProfile, batch: Batch) -> &[String] {
    match batch {
        Batch::PreDeploy => &profile.commands.before_deploy,
        Batch::Deploy => &profile.commands.deploy,
        Batch::PostDeploy => &profile.commands.after_deploy,
    }
}

pub fn plan(profile: &DeploymentProfile, options: &DeployOptions) -> DeployPlan {
    let vars = template_vars(profile, &options.resolve_timestamp());
    let batches = Batch::ALL
        .iter()
        .map(|&b| PlannedBatch {
            batch: b,
            commands: batch::render_commands(commands_for(profile, b), &vars),
        })
        .collect();

    DeployPlan {
        environment: profile.name.clone(),
        target: format!(
            "{}@{}:{}",
            profile.server.username, profile.server.host, profile.server.port
        ),
        build_command: profile.local.build_command.clone(),
        working_dir: profile.base_dir.to_string_lossy().to_string(),
        build_dir: profile.build_dir().to_string_lossy().to_string(),
        artifact_path: profile.artifact_path().to_string_lossy().to_string(),
        upload_path: profile.remote.upload_path.clone(),
        on_failure: options.resolve_failure_mode(profile),
        batches,
        site_url: profile.site_url(),
    }
}

/// Deploy `profile` end to end.
///
/// Never returns early: the report always carries the outcome, and on
/// failure the error that ended the run.
pub fn run<C: Connector>(
    profile: &DeploymentProfile,
    connector: &C,
    options: &DeployOptions,
) -> DeployReport {
    let started = Instant::now();
    let mut report = DeployReport::new(profile);

    log_status!(
        "deploy",
        "Deploying '{}' to {}@{}",
        profile.name,
        profile.server.username,
        profile.server.host
    );

    let result = execute(profile, connector, options, &mut report);

    let outcome = cleanup::remove_artifact(&profile.artifact_path());
    report.completed_phases.push(Phase::Cleanup);
    report.cleanup = Some(outcome);
    report.elapsed_secs = started.elapsed().as_secs_f64();

    match result {
        Ok(()) => {
            report.outcome = Outcome::Success;
            log_status!(
                "deploy",
                "Deployment finished in {:.1}s. Site: {}",
                report.elapsed_secs,
                report.site_url
            );
        }
        Err(err) => {
            report.outcome = Outcome::Failed;
            eprintln!(
                "[deploy] error: {} (after {:.1}s)",
                err.message, report.elapsed_secs
            );
            report.error = Some(err);
        }
    }

    report
}

fn execute<C: Connector>(
    profile: &DeploymentProfile,
    connector: &C,
    options: &DeployOptions,
    report: &mut DeployReport,
) -> Result<()> {
    let vars = template_vars(profile, &options.resolve_timestamp());
    let failure_mode = options.resolve_failure_mode(profile);
    let artifact = profile.artifact_path();

    let build = report.step(Phase::Build, || {
        build::run_build(&profile.local.build_command, &profile.base_dir)
    })?;
    report.build = Some(build);

    let package = report.step(Phase::Package, || {
        package::create_archive(&profile.build_dir(), &artifact)
    })?;
    report.package = Some(package);

    let mut session = report.step(Phase::Upload, || {
        let mut session = SessionGuard::new(connector.connect(&profile.server)?);
        session.upload(&artifact, &profile.remote.upload_path)?;
        Ok(session)
    })?;

    for batch in Batch::ALL {
        let commands = batch::render_commands(commands_for(profile, batch), &vars);
        let batch_report = report.step(batch.into(), || {
            batch::run_batch(&mut *session, batch, &commands, failure_mode)
        })?;
        report.batches.push(batch_report);
    }

    if let Err(err) = session.close() {
        log_warn!("ssh", "failed to close session: {}", err.message);
    }

    Ok(())
}

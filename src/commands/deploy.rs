use clap::{Args, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

use apex_deploy::batch::CommandFailureMode;
use apex_deploy::config;
use apex_deploy::defaults::DEFAULT_ENVIRONMENT;
use apex_deploy::pipeline::{self, DeployOptions, DeployPlan, DeployReport};
use apex_deploy::ssh::OpenSshConnector;
use apex_deploy::{Error, Result};

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Environment to deploy, as named in the deploy config
    #[arg(default_value = DEFAULT_ENVIRONMENT)]
    pub environment: String,

    /// Path to the deploy config (JSON or TOML)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// What a non-zero remote command exit does; overrides commands.onFailure
    #[arg(long, value_enum)]
    pub on_failure: Option<OnFailure>,

    /// Print the resolved plan without building, connecting or deleting anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OnFailure {
    Continue,
    Abort,
}

impl From<OnFailure> for CommandFailureMode {
    fn from(value: OnFailure) -> Self {
        match value {
            OnFailure::Continue => CommandFailureMode::Continue,
            OnFailure::Abort => CommandFailureMode::Abort,
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum DeployOutput {
    Plan(DeployPlan),
    Report(DeployReport),
}

/// Resolve the environment and deploy it.
///
/// `Err` means the run never started. A run that started and failed comes
/// back as `Ok` with its report and the error that ended it.
pub fn run(args: DeployArgs) -> Result<(DeployOutput, Option<Error>)> {
    let path = config::resolve_config_path(args.config.as_deref())?;
    let profile = config::load_profile(&path, &args.environment)?;

    let options = DeployOptions {
        failure_mode: args.on_failure.map(Into::into),
        timestamp: None,
    };

    if args.dry_run {
        return Ok((DeployOutput::Plan(pipeline::plan(&profile, &options)), None));
    }

    let mut report = pipeline::run(&profile, &OpenSshConnector::default(), &options);
    let error = report.error.take();
    Ok((DeployOutput::Report(report), error))
}

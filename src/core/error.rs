use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigNotFound,
    ConfigInvalid,
    ConfigMissingKey,
    ConfigInvalidValue,
    ConfigProfileNotFound,

    SshIdentityFileNotFound,
    SshAuthFailed,
    SshConnectFailed,

    RemoteCommandDispatchFailed,
    RemoteCommandFailed,

    DeployBuildFailed,
    DeployPackageFailed,
    DeployUploadFailed,

    InternalIoError,
    InternalJsonError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigNotFound => "config.not_found",
            ErrorCode::ConfigInvalid => "config.invalid",
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",
            ErrorCode::ConfigProfileNotFound => "config.profile_not_found",

            ErrorCode::SshIdentityFileNotFound => "ssh.identity_file_not_found",
            ErrorCode::SshAuthFailed => "ssh.auth_failed",
            ErrorCode::SshConnectFailed => "ssh.connect_failed",

            ErrorCode::RemoteCommandDispatchFailed => "remote.dispatch_failed",
            ErrorCode::RemoteCommandFailed => "remote.command_failed",

            ErrorCode::DeployBuildFailed => "deploy.build_failed",
            ErrorCode::DeployPackageFailed => "deploy.package_failed",
            ErrorCode::DeployUploadFailed => "deploy.upload_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
        }
    }

    /// Failure class as seen by the deployment pipeline.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorCode::ConfigNotFound
            | ErrorCode::ConfigInvalid
            | ErrorCode::ConfigMissingKey
            | ErrorCode::ConfigInvalidValue
            | ErrorCode::ConfigProfileNotFound => ErrorKind::Configuration,

            ErrorCode::SshIdentityFileNotFound
            | ErrorCode::SshAuthFailed
            | ErrorCode::SshConnectFailed => ErrorKind::Connection,

            ErrorCode::RemoteCommandDispatchFailed => ErrorKind::CommandDispatch,
            ErrorCode::RemoteCommandFailed => ErrorKind::CommandNonZeroExit,

            ErrorCode::DeployBuildFailed => ErrorKind::Build,
            ErrorCode::DeployPackageFailed => ErrorKind::Packaging,
            ErrorCode::DeployUploadFailed => ErrorKind::Transfer,

            ErrorCode::InternalIoError
            | ErrorCode::InternalJsonError => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Build,
    Packaging,
    Connection,
    Transfer,
    CommandDispatch,
    CommandNonZeroExit,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigNotFoundDetails {
    pub tried: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileNotFoundDetails {
    pub profile: String,
    pub available: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDetails {
    pub host: String,
    pub port: u16,
    pub username: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshFailureDetails {
    pub target: TargetDetails,
    pub exit_code: i32,
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshIdentityFileNotFoundDetails {
    pub host: String,
    pub identity_file: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchFailedDetails {
    pub command: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommandFailedDetails {
    pub batch: String,
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildFailedDetails {
    pub command: String,
    pub working_dir: String,
    pub exit_code: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathErrorDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFailedDetails {
    pub local_path: String,
    pub remote_path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    pub fn config_not_found(tried: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ConfigNotFound,
            "Deploy configuration file not found",
            to_details(ConfigNotFoundDetails { tried }),
        )
        .with_hint("Create deploy.config.json or pass --config <path>")
    }

    pub fn config_invalid(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigInvalid,
            format!("Invalid deploy configuration in {}", path),
            to_details(ConfigInvalidDetails {
                path,
                error: error.into(),
            }),
        )
    }

    pub fn config_missing_key(key: impl Into<String>, profile: Option<String>) -> Self {
        let key = key.into();
        Self::new(
            ErrorCode::ConfigMissingKey,
            format!("Missing required configuration key '{}'", key),
            to_details(ConfigMissingKeyDetails { key, profile }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let key = key.into();
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid configuration value for '{}'", key),
            to_details(ConfigInvalidValueDetails {
                key,
                value,
                problem: problem.into(),
            }),
        )
    }

    pub fn profile_not_found(profile: impl Into<String>, available: Vec<String>) -> Self {
        let profile = profile.into();
        let hint = if available.is_empty() {
            "The configuration file defines no environments".to_string()
        } else {
            format!("Available environments: {}", available.join(", "))
        };
        Self::new(
            ErrorCode::ConfigProfileNotFound,
            format!("Environment \"{}\" not found in deploy config", profile),
            to_details(ProfileNotFoundDetails { profile, available }),
        )
        .with_hint(hint)
    }

    pub fn ssh_identity_file_not_found(host: impl Into<String>, identity_file: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::SshIdentityFileNotFound,
            "SSH identity file not found",
            to_details(SshIdentityFileNotFoundDetails {
                host: host.into(),
                identity_file: identity_file.into(),
            }),
        )
    }

    pub fn ssh_connect_failed(target: TargetDetails, exit_code: i32, stderr: impl Into<String>) -> Self {
        let message = format!("SSH connection to {}:{} failed", target.host, target.port);
        Self::new(
            ErrorCode::SshConnectFailed,
            message,
            to_details(SshFailureDetails {
                target,
                exit_code,
                stderr: stderr.into(),
            }),
        )
    }

    pub fn ssh_auth_failed(target: TargetDetails, exit_code: i32, stderr: impl Into<String>) -> Self {
        let message = format!(
            "SSH authentication failed for {}@{}",
            target.username, target.host
        );
        Self::new(
            ErrorCode::SshAuthFailed,
            message,
            to_details(SshFailureDetails {
                target,
                exit_code,
                stderr: stderr.into(),
            }),
        )
        .with_hint("Check server.username and server.privateKey / server.password")
    }

    pub fn remote_command_dispatch_failed(command: impl Into<String>, error: impl Into<String>) -> Self {
        let command = command.into();
        Self::new(
            ErrorCode::RemoteCommandDispatchFailed,
            format!("Failed to dispatch remote command: {}", command),
            to_details(DispatchFailedDetails {
                command,
                error: error.into(),
            }),
        )
    }

    pub fn remote_command_failed(details: RemoteCommandFailedDetails) -> Self {
        let message = format!(
            "Remote command exited with code {}: {}",
            details.exit_code, details.command
        );
        Self::new(ErrorCode::RemoteCommandFailed, message, to_details(details))
    }

    pub fn build_failed(details: BuildFailedDetails) -> Self {
        let message = format!(
            "Build failed (exit code {}): {}",
            details.exit_code, details.command
        );
        let hint = match details.exit_code {
            127 => Some("Command not found. Check that the build command and its dependencies are installed and in PATH."),
            126 => Some("Permission denied. Check file permissions on the build script."),
            _ => None,
        };
        let err = Self::new(ErrorCode::DeployBuildFailed, message, to_details(details));
        match hint {
            Some(hint) => err.with_hint(hint),
            None => err,
        }
    }

    pub fn package_failed(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::DeployPackageFailed,
            format!("Failed to package {}", path),
            to_details(PathErrorDetails {
                path,
                error: error.into(),
            }),
        )
    }

    pub fn upload_failed(
        local_path: impl Into<String>,
        remote_path: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let remote_path = remote_path.into();
        Self::new(
            ErrorCode::DeployUploadFailed,
            format!("Upload to {} failed", remote_path),
            to_details(UploadFailedDetails {
                local_path: local_path.into(),
                remote_path,
                error: error.into(),
            }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            to_details(InternalErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            to_details(InternalErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}

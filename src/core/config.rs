//! Deploy configuration: named environment profiles loaded from JSON or TOML.
//!
//! A configuration file maps environment names to profiles:
//!
//! ```json
//! {
//!   "production": {
//!     "server": { "host": "203.0.113.7", "port": 22, "username": "root" },
//!     "local": { "buildCommand": "npm run build", "buildDir": "dist", "zipFileName": "dist.zip" },
//!     "remote": { "uploadPath": "/tmp/dist.zip", "deployPath": "/var/www/app", "backupPath": "/var/www/backup/app", "serverPort": 8888 },
//!     "commands": { "beforeDeploy": [], "deploy": [], "afterDeploy": [] }
//!   }
//! }
//! ```
//!
//! Only the selected profile is deserialized, so a broken sibling profile does
//! not prevent deploying a healthy one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::batch::CommandFailureMode;
use crate::defaults;
use crate::error::{Error, Result};
use crate::utils::io;

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "defaults::default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Seconds before the initial connection attempt is abandoned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalConfig {
    pub build_command: String,
    pub build_dir: String,
    pub zip_file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    pub upload_path: String,
    #[serde(default)]
    pub deploy_path: String,
    #[serde(default)]
    pub backup_path: String,
    #[serde(default = "defaults::default_server_port")]
    pub server_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nginx_config_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandsConfig {
    #[serde(default)]
    pub before_deploy: Vec<String>,
    #[serde(default)]
    pub deploy: Vec<String>,
    #[serde(default)]
    pub after_deploy: Vec<String>,
    #[serde(default)]
    pub on_failure: CommandFailureMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentProfile {
    #[serde(skip_deserializing, default)]
    pub name: String,
    /// Directory relative paths and the build command resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
    pub server: ServerConfig,
    pub local: LocalConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
}

impl DeploymentProfile {
    pub fn build_dir(&self) -> PathBuf {
        self.base_dir.join(&self.local.build_dir)
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.base_dir.join(&self.local.zip_file_name)
    }

    /// File name of the artifact, without any local directory components.
    pub fn artifact_name(&self) -> String {
        Path::new(&self.local.zip_file_name)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.local.zip_file_name.clone())
    }

    pub fn site_url(&self) -> String {
        format!("http://{}:{}", self.server.host, self.remote.server_port)
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("server.host", &self.server.host),
            ("server.username", &self.server.username),
            ("local.buildCommand", &self.local.build_command),
            ("local.buildDir", &self.local.build_dir),
            ("local.zipFileName", &self.local.zip_file_name),
            ("remote.uploadPath", &self.remote.upload_path),
        ];

        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(Error::config_missing_key(key, Some(self.name.clone())));
            }
        }

        if self.server.port == 0 {
            return Err(Error::config_invalid_value(
                "server.port",
                Some("0".to_string()),
                "Port must be between 1 and 65535",
            ));
        }

        if self.server.password.is_some() && self.server.private_key.is_some() {
            return Err(Error::config_invalid_value(
                "server.password",
                None,
                "Set either server.password or server.privateKey, not both",
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> ConfigFormat {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

/// Locate the configuration file.
///
/// Order: explicit path, `APEX_DEPLOY_CONFIG`, then the default file names in
/// the working directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::config_not_found(vec![path.display().to_string()]));
    }

    if let Ok(from_env) = std::env::var(defaults::CONFIG_ENV_VAR) {
        if !from_env.trim().is_empty() {
            let path = PathBuf::from(shellexpand::tilde(&from_env).to_string());
            if path.is_file() {
                return Ok(path);
            }
            return Err(Error::config_not_found(vec![path.display().to_string()]));
        }
    }

    find_in_dir(Path::new("."))
}

fn find_in_dir(dir: &Path) -> Result<PathBuf> {
    let mut tried = Vec::new();
    for candidate in defaults::CONFIG_FILE_CANDIDATES {
        let path = dir.join(candidate);
        if path.is_file() {
            return Ok(path);
        }
        tried.push(path.display().to_string());
    }
    Err(Error::config_not_found(tried))
}

/// Parse a configuration document into its raw per-environment sections.
pub fn parse_document(
    content: &str,
    format: ConfigFormat,
    origin: &str,
) -> Result<BTreeMap<String, Value>> {
    let document: Value = match format {
        ConfigFormat::Json => serde_json::from_str(content)
            .map_err(|e| Error::config_invalid(origin, e.to_string()))?,
        ConfigFormat::Toml => {
            let table: toml::Table = toml::from_str(content)
                .map_err(|e| Error::config_invalid(origin, e.to_string()))?;
            serde_json::to_value(table)
                .map_err(|e| Error::config_invalid(origin, e.to_string()))?
        }
    };

    match document {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(Error::config_invalid(
            origin,
            "Top level must map environment names to profiles",
        )),
    }
}

/// Select and validate one profile from a parsed document.
pub fn select_profile(
    sections: &BTreeMap<String, Value>,
    name: &str,
    origin: &str,
    base_dir: &Path,
) -> Result<DeploymentProfile> {
    let raw = sections.get(name).ok_or_else(|| {
        Error::profile_not_found(name, sections.keys().cloned().collect())
    })?;

    let mut profile: DeploymentProfile = serde_json::from_value(raw.clone())
        .map_err(|e| Error::config_invalid(origin, format!("environment '{}': {}", name, e)))?;

    profile.name = name.to_string();
    profile.base_dir = base_dir.to_path_buf();
    if let Some(key) = &profile.server.private_key {
        profile.server.private_key = Some(shellexpand::tilde(key).to_string());
    }

    profile.validate()?;
    Ok(profile)
}

/// Load the named profile from a configuration file.
pub fn load_profile(path: &Path, name: &str) -> Result<DeploymentProfile> {
    let origin = path.display().to_string();
    let content = io::read_file(path, "read deploy config")?;
    let sections = parse_document(&content, ConfigFormat::from_path(path), &origin)?;
    let base_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    select_profile(&sections, name, &origin, &base_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "production": {
            "server": { "host": "203.0.113.7", "port": 22, "username": "root" },
            "local": { "buildCommand": "npm run build", "buildDir": "dist", "zipFileName": "apex-admin-dist.zip" },
            "remote": {
                "uploadPath": "/tmp/apex-admin-dist.zip",
                "deployPath": "/var/www/apex-admin",
                "backupPath": "/var/www/backup/apex-admin",
                "serverPort": 8888
            },
            "commands": {
                "beforeDeploy": ["mkdir -p /var/www/backup/apex-admin"],
                "deploy": ["mkdir -p /var/www/apex-admin"],
                "afterDeploy": ["rm -f /tmp/apex-admin-dist.zip"]
            }
        },
        "staging": {
            "server": { "host": "203.0.113.7", "username": "root" },
            "local": { "buildCommand": "npm run build", "buildDir": "dist", "zipFileName": "apex-admin-staging.zip" },
            "remote": { "uploadPath": "/tmp/apex-admin-staging.zip", "serverPort": 8889 }
        },
        "broken": { "server": {} }
    }"#;

    fn sections() -> BTreeMap<String, Value> {
        parse_document(SAMPLE, ConfigFormat::Json, "deploy.config.json").unwrap()
    }

    #[test]
    fn select_profile_reads_all_sections() {
        let profile = select_profile(&sections(), "production", "test", Path::new("/srv/app")).unwrap();
        assert_eq!(profile.name, "production");
        assert_eq!(profile.server.port, 22);
        assert_eq!(profile.remote.server_port, 8888);
        assert_eq!(profile.commands.before_deploy.len(), 1);
        assert_eq!(profile.commands.on_failure, CommandFailureMode::Continue);
        assert_eq!(profile.build_dir(), PathBuf::from("/srv/app/dist"));
        assert_eq!(profile.artifact_path(), PathBuf::from("/srv/app/apex-admin-dist.zip"));
        assert_eq!(profile.site_url(), "http://203.0.113.7:8888");
    }

    #[test]
    fn profile_without_commands_gets_empty_batches() {
        let profile = select_profile(&sections(), "staging", "test", Path::new(".")).unwrap();
        assert!(profile.commands.before_deploy.is_empty());
        assert!(profile.commands.deploy.is_empty());
        assert!(profile.commands.after_deploy.is_empty());
        assert_eq!(profile.server.port, 22);
    }

    #[test]
    fn unknown_profile_is_configuration_error() {
        let err = select_profile(&sections(), "qa", "test", Path::new(".")).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigProfileNotFound);
        assert_eq!(err.details["available"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn broken_sibling_does_not_block_healthy_profile() {
        assert!(select_profile(&sections(), "production", "test", Path::new(".")).is_ok());
        let err = select_profile(&sections(), "broken", "test", Path::new(".")).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalid);
    }

    #[test]
    fn empty_host_is_missing_key() {
        let doc = r#"{ "production": {
            "server": { "host": " ", "username": "root" },
            "local": { "buildCommand": "true", "buildDir": "dist", "zipFileName": "a.zip" },
            "remote": { "uploadPath": "/tmp/a.zip" }
        } }"#;
        let sections = parse_document(doc, ConfigFormat::Json, "test").unwrap();
        let err = select_profile(&sections, "production", "test", Path::new(".")).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigMissingKey);
        assert_eq!(err.details["key"], "server.host");
    }

    #[test]
    fn password_and_private_key_are_exclusive() {
        let doc = r#"{ "production": {
            "server": { "host": "h", "username": "u", "password": "p", "privateKey": "/k" },
            "local": { "buildCommand": "true", "buildDir": "dist", "zipFileName": "a.zip" },
            "remote": { "uploadPath": "/tmp/a.zip" }
        } }"#;
        let sections = parse_document(doc, ConfigFormat::Json, "test").unwrap();
        let err = select_profile(&sections, "production", "test", Path::new(".")).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidValue);
    }

    #[test]
    fn on_failure_policy_is_read_from_commands() {
        let doc = r#"{ "production": {
            "server": { "host": "h", "username": "u" },
            "local": { "buildCommand": "true", "buildDir": "dist", "zipFileName": "a.zip" },
            "remote": { "uploadPath": "/tmp/a.zip" },
            "commands": { "deploy": ["false"], "onFailure": "abort" }
        } }"#;
        let sections = parse_document(doc, ConfigFormat::Json, "test").unwrap();
        let profile = select_profile(&sections, "production", "test", Path::new(".")).unwrap();
        assert_eq!(profile.commands.on_failure, CommandFailureMode::Abort);
    }

    #[test]
    fn toml_documents_are_supported() {
        let doc = r#"
            [production.server]
            host = "203.0.113.7"
            username = "deploy"
            port = 2222

            [production.local]
            buildCommand = "npm run build"
            buildDir = "dist"
            zipFileName = "dist.zip"

            [production.remote]
            uploadPath = "/tmp/dist.zip"
            serverPort = 8080

            [production.commands]
            deploy = ["unzip -o {{uploadPath}} -d {{deployPath}}"]
        "#;
        let sections = parse_document(doc, ConfigFormat::Toml, "deploy.config.toml").unwrap();
        let profile = select_profile(&sections, "production", "test", Path::new(".")).unwrap();
        assert_eq!(profile.server.port, 2222);
        assert_eq!(profile.commands.deploy.len(), 1);
    }

    #[test]
    fn non_object_document_is_invalid() {
        let err = parse_document("[1, 2]", ConfigFormat::Json, "test").unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalid);
    }

    #[test]
    fn load_profile_resolves_paths_against_config_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deploy.config.json");
        fs::write(&path, SAMPLE).unwrap();

        let profile = load_profile(&path, "production").unwrap();
        assert_eq!(profile.base_dir, dir.path());
        assert_eq!(profile.build_dir(), dir.path().join("dist"));
    }

    #[test]
    fn explicit_missing_config_path_is_not_found() {
        let err = resolve_config_path(Some(Path::new("/nonexistent/deploy.config.json"))).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigNotFound);
    }

    #[test]
    fn find_in_dir_prefers_json_over_toml() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("deploy.config.toml"), "").unwrap();
        assert_eq!(
            find_in_dir(dir.path()).unwrap(),
            dir.path().join("deploy.config.toml")
        );
        fs::write(dir.path().join("deploy.config.json"), "{}").unwrap();
        assert_eq!(
            find_in_dir(dir.path()).unwrap(),
            dir.path().join("deploy.config.json")
        );
    }

    #[test]
    fn debug_output_redacts_password() {
        let server = ServerConfig {
            host: "h".to_string(),
            port: 22,
            username: "u".to_string(),
            password: Some("hunter2".to_string()),
            private_key: None,
            connect_timeout: None,
        };
        let rendered = format!("{:?}", server);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}

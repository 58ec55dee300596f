//! Built-in defaults for deploy configuration and CLI behavior.

/// Environment used when none is given on the command line.
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// Environment variable that points at a deploy configuration file.
pub const CONFIG_ENV_VAR: &str = "APEX_DEPLOY_CONFIG";

/// Files searched, in order, in the working directory.
pub const CONFIG_FILE_CANDIDATES: &[&str] = &["deploy.config.json", "deploy.config.toml"];

/// Format of the `{{timestamp}}` command placeholder.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

pub fn default_ssh_port() -> u16 {
    22
}

pub fn default_server_port() -> u16 {
    80
}

//! sftp quoting utilities.

/// Quote a path for an sftp batch file.
///
/// sftp tokenizes batch lines itself: double quotes group a path and
/// backslash escapes `"` and `\` inside them.
pub fn quote_sftp_path(path: &str) -> String {
    let escaped = path.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

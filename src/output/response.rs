//! JSON envelope printed on stdout.

use apex_deploy::error::Hint;
use apex_deploy::{Error, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CliResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CliError>,
}

#[derive(Debug, Serialize)]
pub struct CliError {
    pub code: String,
    pub kind: apex_deploy::ErrorKind,
    pub message: String,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<Hint>>,
}

impl From<&Error> for CliError {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code.as_str().to_string(),
            kind: err.kind(),
            message: err.message.clone(),
            details: err.details.clone(),
            hints: if err.hints.is_empty() {
                None
            } else {
                Some(err.hints.clone())
            },
        }
    }
}

impl<T: Serialize> CliResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failed run that still has a report worth printing.
    pub fn failure(data: Option<T>, err: &Error) -> Self {
        Self {
            success: false,
            data,
            error: Some(CliError::from(err)),
        }
    }

    fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::internal_json(e.to_string(), Some("serialize response".to_string()))
        })
    }
}

fn print_response<T: Serialize>(response: &CliResponse<T>) -> Result<()> {
    use std::io::{self, Write};

    let payload = response.to_json()?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", payload) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            return Ok(()); // Exit gracefully on SIGPIPE
        }
        return Err(Error::internal_io(
            e.to_string(),
            Some("write stdout".to_string()),
        ));
    }
    Ok(())
}

fn report_print_error(result: Result<()>) {
    if let Err(err) = result {
        eprintln!("[output] error: {}", err.message);
    }
}

pub fn print_success<T: Serialize>(data: T) {
    report_print_error(print_response(&CliResponse::success(data)));
}

pub fn print_failure<T: Serialize>(data: Option<T>, err: &Error) {
    report_print_error(print_response(&CliResponse::failure(data, err)));
}

pub fn print_result<T: Serialize>(result: Result<T>) {
    match result {
        Ok(data) => print_success(data),
        Err(err) => print_failure::<T>(None, &err),
    }
}

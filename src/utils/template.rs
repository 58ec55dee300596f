//! String template rendering utilities.

use std::collections::HashMap;

pub struct TemplateVars;

impl TemplateVars {
    pub const UPLOAD_PATH: &'static str = "uploadPath";
    pub const DEPLOY_PATH: &'static str = "deployPath";
    pub const BACKUP_PATH: &'static str = "backupPath";
    pub const ARTIFACT: &'static str = "artifact";
    pub const TIMESTAMP: &'static str = "timestamp";
}

/// Substitute `{{name}}` placeholders in one left-to-right pass.
///
/// Substituted values are never rescanned, and unknown placeholders are kept.
pub fn render_map(template: &str, variables: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => match variables.get(&after_open[..end]) {
                Some(value) => {
                    result.push_str(value);
                    rest = &after_open[end + 2..];
                }
                None => {
                    result.push_str("{{");
                    rest = after_open;
                }
            },
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    result.push_str(rest);
    result
}

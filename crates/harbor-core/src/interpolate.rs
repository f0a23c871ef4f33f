//! `{...}` placeholder interpolation for configured strings.
//!
//! Two reference forms are supported: `{env:NAME}` resolves against the
//! process environment (NAME is uppercased first), and `{key}` resolves
//! against a caller-supplied context map. Replacement is literal text
//! substitution; the first `}` after an opening `{` ends the token, and a
//! `{` with no closing `}` (or an empty `{}`) passes through verbatim.
//! There is no escape syntax, so a literal `{` that looks like a
//! placeholder start is not expressible.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InterpolateError {
    #[error("Unset environment variable '{name}' referenced by value '{value}'")]
    UnsetEnvironmentVariable { name: String, value: String },

    #[error("Unknown interpolation variable '{name}' referenced by value '{value}'")]
    UnknownVariable { name: String, value: String },
}

/// Resolve every `{...}` placeholder in `value`.
pub fn interpolate(
    value: &str,
    context: &HashMap<String, String>,
) -> Result<String, InterpolateError> {
    let mut output = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        match after_open.find('}') {
            None => {
                // No closing brace: the remainder is literal text.
                output.push_str(&rest[open..]);
                rest = "";
                break;
            }
            Some(0) => {
                output.push_str("{}");
                rest = &after_open[1..];
            }
            Some(close) => {
                let token = &after_open[..close];
                output.push_str(&resolve(token, value, context)?);
                rest = &after_open[close + 1..];
            }
        }
    }
    output.push_str(rest);
    Ok(output)
}

fn resolve(
    token: &str,
    value: &str,
    context: &HashMap<String, String>,
) -> Result<String, InterpolateError> {
    if let Some(name) = token.strip_prefix("env:")
        && !name.is_empty()
    {
        let name = name.to_uppercase();
        return std::env::var(&name).map_err(|_| InterpolateError::UnsetEnvironmentVariable {
            name,
            value: value.to_string(),
        });
    }
    context
        .get(token)
        .cloned()
        .ok_or_else(|| InterpolateError::UnknownVariable {
            name: token.to_string(),
            value: value.to_string(),
        })
}

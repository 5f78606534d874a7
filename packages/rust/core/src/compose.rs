//! Outreach message composition.
//!
//! Templates use `{field}` placeholders; `{{` and `}}` produce literal
//! braces. Anything else involving a brace is malformed, and a placeholder
//! without a value is an error rather than being left in the output.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use gradreach_shared::{GradReachError, MessageConfig, Result};

/// Escapes, placeholders, and stray braces, in that priority.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}|[{}]").expect("template token regex")
});

/// A validated template plus its fixed substitution values.
#[derive(Debug, Clone)]
pub struct MessageComposer {
    template: String,
    fields: BTreeMap<String, String>,
}

impl MessageComposer {
    /// Build a composer, rejecting templates that could never render.
    pub fn new(template: impl Into<String>, fields: BTreeMap<String, String>) -> Result<Self> {
        let template = template.into();
        validate_template(&template, &fields)?;
        Ok(Self { template, fields })
    }

    /// Build a composer from runtime message config.
    pub fn from_config(config: &MessageConfig) -> Result<Self> {
        Self::new(config.template.clone(), config.fields.clone())
    }

    /// Render the message for one contact.
    pub fn compose(&self, name: &str) -> Result<String> {
        compose(name, &self.template, &self.fields)
    }
}

/// Render `template` for `name`.
///
/// `name` and `first_name` always come from the contact and shadow any
/// same-named entry in `fields`.
pub fn compose(name: &str, template: &str, fields: &BTreeMap<String, String>) -> Result<String> {
    let name = name.trim();
    let first_name = name.split_whitespace().next().unwrap_or(name);

    render(template, |key| match key {
        "name" => Some(name),
        "first_name" => Some(first_name),
        other => fields.get(other).map(String::as_str),
    })
}

/// Check that every placeholder in `template` resolves and no brace is stray.
pub fn validate_template(template: &str, fields: &BTreeMap<String, String>) -> Result<()> {
    compose("Sample Student", template, fields).map(|_| ())
}

fn render<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> Result<String> {
    let mut out = String::with_capacity(template.len() + 64);
    let mut last = 0;

    for caps in TOKEN_RE.captures_iter(template) {
        let Some(token) = caps.get(0) else {
            continue;
        };
        out.push_str(&template[last..token.start()]);
        last = token.end();

        match token.as_str() {
            "{{" => out.push('{'),
            "}}" => out.push('}'),
            "{" | "}" => {
                return Err(GradReachError::template(format!(
                    "stray '{}' at byte {} (use '{{{{' or '}}}}' for a literal brace)",
                    token.as_str(),
                    token.start()
                )));
            }
            _ => {
                let key = &caps[1];
                let value = lookup(key).ok_or_else(|| {
                    GradReachError::template(format!("unresolved placeholder {{{key}}}"))
                })?;
                out.push_str(value);
            }
        }
    }

    out.push_str(&template[last..]);
    Ok(out)
}

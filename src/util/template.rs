//! `{{ name }}` placeholder rendering.
//!
//! Used for recipe paths, command lines and service-unit templates.
//! Variables are looked up by name; an unknown name is an error so that a
//! typo never silently produces an empty path.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid regex"));

/// Error rendering a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("undefined template variable `{0}`")]
    Undefined(String),
}

/// Renders text with variables.
pub trait Templater {
    fn render(
        &self,
        template: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<String, TemplateError>;
}

/// The default templater: replaces `{{ name }}` with the variable's value.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderTemplater;

impl PlaceholderTemplater {
    pub fn new() -> Self {
        PlaceholderTemplater
    }
}

impl Templater for PlaceholderTemplater {
    fn render(
        &self,
        template: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<String, TemplateError> {
        let mut missing = None;
        let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            match variables.get(name) {
                Some(value) => value.clone(),
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            }
        });

        match missing {
            Some(name) => Err(TemplateError::Undefined(name)),
            None => Ok(rendered.into_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes() {
        let t = PlaceholderTemplater::new();
        let out = t
            .render(
                "ExecStart={{install_dir}}/bin/agentd -c {{ etc_dir }}/agentd.yaml",
                &vars(&[("install_dir", "/opt/agentd"), ("etc_dir", "/etc/agentd")]),
            )
            .unwrap();
        assert_eq!(out, "ExecStart=/opt/agentd/bin/agentd -c /etc/agentd/agentd.yaml");
    }

    #[test]
    fn test_render_leaves_shell_syntax_alone() {
        let t = PlaceholderTemplater::new();
        let out = t
            .render("PATH=${HOME}/bin:$PATH {x}", &BTreeMap::new())
            .unwrap();
        assert_eq!(out, "PATH=${HOME}/bin:$PATH {x}");
    }

    #[test]
    fn test_render_undefined_variable() {
        let t = PlaceholderTemplater::new();
        let err = t.render("{{ nope }}/bin", &BTreeMap::new()).unwrap_err();
        assert_eq!(err, TemplateError::Undefined("nope".to_string()));
    }
}

//! Message templates
//!
//! Templates are plain text files `<templates_dir>/<id>.tmpl` with
//! `{{name}}` placeholders. Unknown placeholders are left as written.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_TEMPLATE: &str = "default";

/// Values substituted into a template
pub type TemplateVars<'a> = HashMap<&'static str, &'a str>;

/// Template lookup over a directory
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.tmpl", id))
    }

    /// Finds the template text for `id`, falling back to the default one
    pub fn resolve(&self, id: &str) -> Option<String> {
        if let Some(text) = read(&self.path(id)) {
            return Some(text);
        }
        if id != DEFAULT_TEMPLATE {
            warn!("Template '{}' not found, falling back to '{}'", id, DEFAULT_TEMPLATE);
            if let Some(text) = read(&self.path(DEFAULT_TEMPLATE)) {
                return Some(text);
            }
        }
        None
    }

    /// Renders the message body
    ///
    /// Without a template id, or when no template file exists at all, the
    /// raw body is returned unchanged.
    pub fn render(&self, id: Option<&str>, body: &str, vars: &TemplateVars<'_>) -> String {
        let Some(id) = id else {
            return body.to_string();
        };
        match self.resolve(id) {
            Some(template) => {
                let mut vars: TemplateVars<'_> = vars.iter().map(|(k, v)| (*k, *v)).collect();
                vars.insert("findings", body.trim_end());
                substitute(&template, &vars)
            }
            None => {
                debug!("No template available for '{}', sending raw body", id);
                body.to_string()
            }
        }
    }
}

fn read(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

/// Replaces every `{{ name }}` whose name is known
pub fn substitute(template: &str, vars: &TemplateVars<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

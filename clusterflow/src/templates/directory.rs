//! YAML templates loaded from a directory.

use super::{Bindings, TemplateSource};
use crate::cluster::Manifest;
use crate::errors::TemplateError;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PLACEHOLDER_PATTERN: &str = r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}";

/// Renders `*.yaml` / `*.yml` files with `{{NAME}}` placeholders.
///
/// Files are read once, when the source is loaded. The template id is the
/// file name without its extension.
#[derive(Debug, Clone)]
pub struct DirectoryTemplates {
    root: PathBuf,
    templates: BTreeMap<String, String>,
    placeholder: Regex,
}

impl DirectoryTemplates {
    /// Loads every template file in `root`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Load`] if the directory or one of its
    /// template files cannot be read.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let root = root.as_ref().to_path_buf();
        let load_error = |template: &str, err: std::io::Error| TemplateError::Load {
            template: template.to_string(),
            reason: err.to_string(),
        };

        let entries = std::fs::read_dir(&root).map_err(|err| load_error(&root.display().to_string(), err))?;

        let mut templates = BTreeMap::new();
        for entry in entries {
            let path = entry.map_err(|err| load_error(&root.display().to_string(), err))?.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if !is_yaml || !path.is_file() {
                continue;
            }

            let content = std::fs::read_to_string(&path).map_err(|err| load_error(id, err))?;
            debug!(template = id, path = %path.display(), "loaded template");
            templates.insert(id.to_string(), content);
        }

        let placeholder = Regex::new(PLACEHOLDER_PATTERN).map_err(|err| TemplateError::parse("placeholder", err))?;

        info!(dir = %root.display(), count = templates.len(), "template directory loaded");
        Ok(Self {
            root,
            templates,
            placeholder,
        })
    }

    /// The directory the templates were loaded from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Substitutes placeholders, failing if any remain unbound.
    fn substitute(&self, template_id: &str, source: &str, bindings: &Bindings) -> Result<String, TemplateError> {
        let mut missing = BTreeSet::new();
        let rendered = self.placeholder.replace_all(source, |caps: &Captures<'_>| {
            let name = &caps[1];
            if let Some(value) = bindings.get(name) {
                value.clone()
            } else {
                missing.insert(name.to_string());
                caps[0].to_string()
            }
        });

        if missing.is_empty() {
            Ok(rendered.into_owned())
        } else {
            Err(TemplateError::missing(template_id, missing.into_iter().collect()))
        }
    }
}

impl TemplateSource for DirectoryTemplates {
    fn render(&self, template_id: &str, bindings: &Bindings) -> Result<Manifest, TemplateError> {
        let source = self
            .templates
            .get(template_id)
            .ok_or_else(|| TemplateError::NotFound(template_id.to_string()))?;

        let rendered = self.substitute(template_id, source, bindings)?;
        let document: serde_json::Value =
            serde_yaml::from_str(&rendered).map_err(|err| TemplateError::parse(template_id, err))?;
        Manifest::from_document(document).map_err(|err| TemplateError::parse(template_id, err))
    }

    fn template_ids(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }
}

//! Manifest templates.
//!
//! A [`TemplateSource`] turns a template id and a set of string bindings into
//! a [`Manifest`]. Binding names follow the `{{NAME}}` placeholder convention
//! used by the file-based source; the built-in source reads the same names.
//!
//! Rendering is pure: the same template and bindings always yield the same
//! manifest.

mod builtin;
mod directory;

pub use builtin::BuiltinTemplates;
pub use directory::DirectoryTemplates;

use crate::cluster::Manifest;
use crate::errors::TemplateError;
use std::collections::BTreeMap;

/// Variable bindings passed to a template.
pub type Bindings = BTreeMap<String, String>;

/// Template id of the plugin version check job.
pub const PLUGIN_CHECK_JOB: &str = "plugin-check-job";
/// Template id of the builder job.
pub const BUILDER_JOB: &str = "builder-job";
/// Template id of the volume copy job.
pub const VOLUME_COPY_JOB: &str = "volume-copy-job";

/// Produces manifests from templates.
pub trait TemplateSource: Send + Sync {
    /// Renders `template_id` with `bindings`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::NotFound`] for unknown ids and
    /// [`TemplateError::MissingBindings`] naming every binding the template
    /// needs but did not receive.
    fn render(&self, template_id: &str, bindings: &Bindings) -> Result<Manifest, TemplateError>;

    /// Lists the ids this source can render, sorted.
    fn template_ids(&self) -> Vec<String>;
}

/// Builds a [`Bindings`] map from string pairs.
#[must_use]
pub fn bindings<K, V, I>(pairs: I) -> Bindings
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_helper() {
        let map = bindings([("JOB_NAME", "a"), ("PVC_NAME", "b")]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["JOB_NAME"], "a");
    }
}

//! Job templates compiled into the binary.

use super::{Bindings, TemplateSource, BUILDER_JOB, PLUGIN_CHECK_JOB, VOLUME_COPY_JOB};
use crate::cluster::{JobManifest, Manifest};
use crate::errors::TemplateError;

const UTILITY_IMAGE: &str = "busybox:1.36";
const WORKSPACE: &str = "/workspace";
const TIMESTAMP_ANNOTATION: &str = "clusterflow.io/timestamp";

/// The validation pipeline jobs as typed manifest builders.
///
/// Every job loads the project config map as environment variables. The
/// builder and volume copy jobs also mount the project claim at
/// `/workspace`.
#[derive(Debug, Clone)]
pub struct BuiltinTemplates {
    utility_image: String,
}

impl Default for BuiltinTemplates {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinTemplates {
    /// Creates the built-in source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            utility_image: UTILITY_IMAGE.to_string(),
        }
    }

    /// Overrides the image used by the check and copy jobs.
    #[must_use]
    pub fn with_utility_image(mut self, image: impl Into<String>) -> Self {
        self.utility_image = image.into();
        self
    }

    fn plugin_check(&self, bindings: &Bindings) -> Result<Manifest, TemplateError> {
        let [job_name, config_map] = require(PLUGIN_CHECK_JOB, bindings, ["JOB_NAME", "CONFIG_MAP"])?;
        let job = JobManifest::new(job_name, &self.utility_image)
            .with_command(shell(
                r#"echo "Checking plugin versions for $PROJECT_NAME ($PROJECT_ID)" && test -n "$SOURCE_PATH""#,
            ))
            .with_env_from_config_map(config_map);
        Ok(annotate(job, bindings).build())
    }

    fn builder(&self, bindings: &Bindings) -> Result<Manifest, TemplateError> {
        let [job_name, config_map, claim, image] =
            require(BUILDER_JOB, bindings, ["JOB_NAME", "CONFIG_MAP", "PVC_NAME", "BUILDER_IMAGE"])?;
        let job = JobManifest::new(job_name, image)
            .with_command(shell(
                r#"mkdir -p /workspace/build && echo "Building $PROJECT_NAME from $SOURCE_PATH" | tee /workspace/build/build.log"#,
            ))
            .with_env_from_config_map(config_map)
            .with_volume_claim(claim, WORKSPACE);
        Ok(annotate(job, bindings).build())
    }

    fn volume_copy(&self, bindings: &Bindings) -> Result<Manifest, TemplateError> {
        let [job_name, config_map, claim] =
            require(VOLUME_COPY_JOB, bindings, ["JOB_NAME", "CONFIG_MAP", "PVC_NAME"])?;
        let job = JobManifest::new(job_name, &self.utility_image)
            .with_command(shell(
                "mkdir -p /workspace/output && cp -r /workspace/build/. /workspace/output/ && ls -la /workspace/output",
            ))
            .with_env_from_config_map(config_map)
            .with_volume_claim(claim, WORKSPACE);
        Ok(annotate(job, bindings).build())
    }
}

impl TemplateSource for BuiltinTemplates {
    fn render(&self, template_id: &str, bindings: &Bindings) -> Result<Manifest, TemplateError> {
        match template_id {
            PLUGIN_CHECK_JOB => self.plugin_check(bindings),
            BUILDER_JOB => self.builder(bindings),
            VOLUME_COPY_JOB => self.volume_copy(bindings),
            other => Err(TemplateError::NotFound(other.to_string())),
        }
    }

    fn template_ids(&self) -> Vec<String> {
        let mut ids = vec![
            BUILDER_JOB.to_string(),
            PLUGIN_CHECK_JOB.to_string(),
            VOLUME_COPY_JOB.to_string(),
        ];
        ids.sort();
        ids
    }
}

/// Looks up every required binding, reporting all missing names at once.
fn require<'a, const N: usize>(
    template: &str,
    bindings: &'a Bindings,
    names: [&str; N],
) -> Result<[&'a str; N], TemplateError> {
    let missing: Vec<String> = names
        .iter()
        .filter(|name| bindings.get(**name).map_or(true, String::is_empty))
        .map(|name| (*name).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(TemplateError::missing(template, missing));
    }
    Ok(names.map(|name| bindings.get(name).map_or("", String::as_str)))
}

fn annotate(job: JobManifest, bindings: &Bindings) -> JobManifest {
    match bindings.get("TIMESTAMP") {
        Some(timestamp) => job.with_annotation(TIMESTAMP_ANNOTATION, timestamp),
        None => job,
    }
}

fn shell(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

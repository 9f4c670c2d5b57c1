//! Source registry and pipeline catalog.
//!
//! Both are plain YAML documents. The defaults ship inside the binary
//! (`config/registry.yaml`, `config/pipelines.yaml`); `--registry` and
//! `--pipelines` point at replacement files. Loaded values are read-only for
//! the rest of the run.

use crate::error::{ConfigurationError, RegistryError};
use crate::models::{PipelineConfig, SourceDescriptor};
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

const BUILTIN_REGISTRY: &str = include_str!("../config/registry.yaml");
const BUILTIN_PIPELINES: &str = include_str!("../config/pipelines.yaml");

#[derive(Debug, Deserialize)]
struct RegistryFile {
    sources: Vec<SourceDescriptor>,
}

#[derive(Debug, Deserialize)]
struct PipelinesFile {
    pipelines: Vec<PipelineConfig>,
}

/// The catalog of known sources.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<SourceDescriptor>,
}

impl SourceRegistry {
    /// Parse and validate a registry document.
    ///
    /// # Errors
    ///
    /// Fails on invalid YAML, duplicate ids, sources without groups, URLs
    /// that are not absolute http(s) and pagination caps of zero.
    pub fn from_yaml(text: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_yaml::from_str(text)?;
        let mut seen = HashSet::new();
        for source in &file.sources {
            if !seen.insert(source.id.as_str()) {
                return Err(RegistryError::DuplicateSource(source.id.clone()));
            }
            if source.groups.iter().all(|g| g.trim().is_empty()) {
                return Err(RegistryError::NoGroups(source.id.clone()));
            }
            let valid_url = Url::parse(&source.url)
                .map(|u| matches!(u.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !valid_url {
                return Err(RegistryError::InvalidUrl {
                    id: source.id.clone(),
                    url: source.url.clone(),
                });
            }
            if source.pagination.as_ref().is_some_and(|p| p.max_pages == 0) {
                return Err(RegistryError::InvalidPagination(source.id.clone()));
            }
        }
        Ok(Self {
            sources: file.sources,
        })
    }

    /// The registry compiled into the binary.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_yaml(BUILTIN_REGISTRY)
    }

    /// Load from `path`, or the built-in registry when no path is given.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&str>) -> Result<Self, RegistryError> {
        let registry = match path {
            Some(path) => Self::from_yaml(&read(path).await?)?,
            None => Self::builtin()?,
        };
        info!(
            sources = registry.sources().len(),
            groups = ?registry.groups(),
            "Loaded source registry"
        );
        Ok(registry)
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Every group tag used by at least one source.
    pub fn groups(&self) -> BTreeSet<&str> {
        self.sources
            .iter()
            .flat_map(|s| s.groups.iter().map(String::as_str))
            .collect()
    }

    /// Sources a pipeline covers, in registry order.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError`] if the pipeline selects no groups or names a
    /// group no source belongs to.
    pub fn select(
        &self,
        pipeline: &PipelineConfig,
    ) -> Result<Vec<&SourceDescriptor>, ConfigurationError> {
        if pipeline.groups.is_empty() {
            return Err(ConfigurationError::NoGroups {
                pipeline: pipeline.name.clone(),
            });
        }
        let known = self.groups();
        if let Some(unknown) = pipeline.groups.iter().find(|g| !known.contains(g.as_str())) {
            return Err(ConfigurationError::UnknownGroup {
                pipeline: pipeline.name.clone(),
                group: unknown.clone(),
            });
        }
        Ok(self
            .sources
            .iter()
            .filter(|s| s.in_any_group(&pipeline.groups))
            .collect())
    }
}

/// Parse and validate a pipelines document.
pub fn pipelines_from_yaml(text: &str) -> Result<Vec<PipelineConfig>, RegistryError> {
    let file: PipelinesFile = serde_yaml::from_str(text)?;
    let mut seen = HashSet::new();
    for p in &file.pipelines {
        if !seen.insert(p.name.as_str()) {
            return Err(RegistryError::DuplicatePipeline(p.name.clone()));
        }
    }
    Ok(file.pipelines)
}

/// Load pipelines from `path`, or the built-in set when no path is given.
#[instrument(level = "info")]
pub async fn load_pipelines(path: Option<&str>) -> Result<Vec<PipelineConfig>, RegistryError> {
    let pipelines = match path {
        Some(path) => pipelines_from_yaml(&read(path).await?)?,
        None => pipelines_from_yaml(BUILTIN_PIPELINES)?,
    };
    info!(count = pipelines.len(), "Loaded pipeline configurations");
    Ok(pipelines)
}

async fn read(path: &str) -> Result<String, RegistryError> {
    fs::read_to_string(path)
        .await
        .map_err(|source| RegistryError::Io {
            path: path.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CmsFamily, FetchStrategy};

    fn pipeline(name: &str, groups: &[&str]) -> PipelineConfig {
        PipelineConfig {
            name: name.to_string(),
            description: String::new(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            destination_env: "SLACK_WEBHOOK_URL".to_string(),
            days_ahead: 10,
            enabled: true,
        }
    }

    #[test]
    fn test_builtin_registry_loads() {
        let registry = SourceRegistry::builtin().unwrap();
        assert!(registry.sources().len() >= 15);
        let sauda = registry.get("sauda").unwrap();
        assert_eq!(sauda.family, CmsFamily::Acos);
        assert_eq!(sauda.fetch, FetchStrategy::Rendered);
        let elements = registry.get("rogaland-fylkeskommune").unwrap();
        assert_eq!(elements.family, CmsFamily::Elements);
    }

    #[test]
    fn test_builtin_registry_covers_every_family() {
        let registry = SourceRegistry::builtin().unwrap();
        for family in [
            CmsFamily::Acos,
            CmsFamily::Onacos,
            CmsFamily::Elements,
            CmsFamily::Aggregator,
            CmsFamily::Opengov,
        ] {
            assert!(
                registry.sources().iter().any(|s| s.family == family),
                "no source for {family}"
            );
        }
    }

    #[test]
    fn test_builtin_pipelines_reference_known_groups() {
        let registry = SourceRegistry::builtin().unwrap();
        let pipelines = pipelines_from_yaml(BUILTIN_PIPELINES).unwrap();
        assert!(pipelines.iter().any(|p| p.name == "standard"));
        for p in &pipelines {
            assert!(registry.select(p).is_ok(), "pipeline {} does not resolve", p.name);
        }
    }

    #[test]
    fn test_select_respects_groups() {
        let registry = SourceRegistry::builtin().unwrap();
        let extended: BTreeSet<&str> = registry
            .select(&pipeline("utvidet", &["extended"]))
            .unwrap()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(extended, BTreeSet::from(["Sandnes kommune", "Randaberg kommune"]));

        let core = registry.select(&pipeline("standard", &["core"])).unwrap();
        assert!(core.iter().any(|s| s.id == "sauda"));
        assert!(!core.iter().any(|s| s.id == "sandnes"));
    }

    #[test]
    fn test_overlapping_groups_select_each_source_once() {
        let registry = SourceRegistry::builtin().unwrap();
        let both = registry.select(&pipeline("utvidet", &["core", "turnus"])).unwrap();
        let ids: HashSet<&str> = both.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), both.len());
    }

    #[test]
    fn test_unknown_group_is_configuration_error() {
        let registry = SourceRegistry::builtin().unwrap();
        let err = registry.select(&pipeline("vest", &["vestland"])).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownGroup {
                pipeline: "vest".to_string(),
                group: "vestland".to_string()
            }
        );
        assert!(matches!(
            registry.select(&pipeline("tom", &[])),
            Err(ConfigurationError::NoGroups { .. })
        ));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let yaml = r#"
sources:
  - { id: a, name: A, family: acos, groups: [core], url: "https://a.example" }
  - { id: a, name: B, family: acos, groups: [core], url: "https://b.example" }
"#;
        assert!(matches!(
            SourceRegistry::from_yaml(yaml),
            Err(RegistryError::DuplicateSource(id)) if id == "a"
        ));
    }

    #[test]
    fn test_invalid_entries_are_rejected() {
        let no_groups = r#"
sources:
  - { id: a, name: A, family: acos, groups: [], url: "https://a.example" }
"#;
        assert!(matches!(SourceRegistry::from_yaml(no_groups), Err(RegistryError::NoGroups(_))));

        let bad_url = r#"
sources:
  - { id: a, name: A, family: acos, groups: [core], url: "innsyn/moter" }
"#;
        assert!(matches!(SourceRegistry::from_yaml(bad_url), Err(RegistryError::InvalidUrl { .. })));

        let bad_family = r#"
sources:
  - { id: a, name: A, family: sharepoint, groups: [core], url: "https://a.example" }
"#;
        assert!(matches!(SourceRegistry::from_yaml(bad_family), Err(RegistryError::Yaml(_))));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("registry.yaml");
        std::fs::write(
            &path,
            "sources:\n  - { id: x, name: X kommune, family: onacos, groups: [vest], url: \"https://x.example/moter\" }\n",
        )
        .unwrap();
        let registry = SourceRegistry::load(path.to_str()).await.unwrap();
        assert_eq!(registry.groups(), BTreeSet::from(["vest"]));

        let missing = SourceRegistry::load(Some("/nonexistent/registry.yaml")).await;
        assert!(matches!(missing, Err(RegistryError::Io { .. })));
    }
}

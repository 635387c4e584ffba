//! Process-wide view of the form configuration.
//!
//! The registry is an explicitly constructed instance held by the
//! application's composition root and shared by reference (`Arc`) with the
//! webhook handler and the sync scheduler. Readers receive an `Arc` snapshot
//! of one configuration generation; a reload swaps the generation whole, so
//! a sync run that resolved its descriptor keeps using it for the run's
//! duration regardless of concurrent reloads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::error::{ConfigResult, ConfigurationError};
use crate::model::{FormDescriptor, RegistryConfiguration};

/// Conventional file name of the configuration document.
pub const REGISTRY_FILE_NAME: &str = "sync_registry.json";

struct RegistryState {
    config: Option<Arc<RegistryConfiguration>>,
    resolved_path: Option<PathBuf>,
}

/// Hot-reloadable source of truth for all form/webhook configuration.
pub struct FormRegistry {
    state: RwLock<RegistryState>,
}

impl FormRegistry {
    /// Create an empty registry. The first lookup triggers a lazy load from
    /// the conventional search locations unless [`load`](Self::load) is
    /// called first.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                config: None,
                resolved_path: None,
            }),
        }
    }

    /// Create a registry from an already parsed configuration. Useful for
    /// tests and for embedding callers that manage the document themselves.
    pub fn with_configuration(config: RegistryConfiguration) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                config: Some(Arc::new(config)),
                resolved_path: None,
            }),
        }
    }

    /// Locate, parse, and atomically install a configuration document.
    ///
    /// With an explicit `path` the document must exist there. Otherwise the
    /// conventional locations are searched in order and the first hit wins.
    #[instrument(skip(self))]
    pub async fn load(&self, path: Option<&Path>) -> ConfigResult<()> {
        let mut state = self.state.write().await;
        Self::load_locked(&mut state, path).await
    }

    /// Re-run [`load`](Self::load) against the previously resolved document
    /// location. Safe to call while sync runs are in progress: readers
    /// observe either the old or the new generation in full.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> ConfigResult<()> {
        let mut state = self.state.write().await;
        let path = state.resolved_path.clone();
        Self::load_locked(&mut state, path.as_deref()).await
    }

    async fn load_locked(state: &mut RegistryState, path: Option<&Path>) -> ConfigResult<()> {
        let resolved = match path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(ConfigurationError::DocumentNotFound {
                        searched: vec![explicit.to_path_buf()],
                    });
                }
                explicit.to_path_buf()
            }
            None => Self::find_document()?,
        };

        debug!(path = %resolved.display(), "loading form registry");
        let document = tokio::fs::read_to_string(&resolved).await?;
        let config = RegistryConfiguration::parse(&document)?;

        info!(
            path = %resolved.display(),
            forms = config.len(),
            "form registry loaded"
        );

        state.config = Some(Arc::new(config));
        state.resolved_path = Some(resolved);
        Ok(())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(REGISTRY_FILE_NAME));
            paths.push(cwd.join("config").join(REGISTRY_FILE_NAME));
        }
        paths.push(PathBuf::from("/etc/formbridge").join(REGISTRY_FILE_NAME));
        paths
    }

    fn find_document() -> ConfigResult<PathBuf> {
        let searched = Self::search_paths();
        searched
            .iter()
            .find(|p| p.exists())
            .cloned()
            .ok_or(ConfigurationError::DocumentNotFound { searched })
    }

    /// Current configuration generation, lazily loading on first use.
    pub async fn current(&self) -> ConfigResult<Arc<RegistryConfiguration>> {
        {
            let state = self.state.read().await;
            if let Some(config) = &state.config {
                return Ok(Arc::clone(config));
            }
        }

        let mut state = self.state.write().await;
        if state.config.is_none() {
            Self::load_locked(&mut state, None).await?;
        }
        match &state.config {
            Some(config) => Ok(Arc::clone(config)),
            None => Err(ConfigurationError::DocumentNotFound {
                searched: Self::search_paths(),
            }),
        }
    }

    /// Look up a form descriptor by form key.
    pub async fn get_form(&self, form_key: &str) -> ConfigResult<FormDescriptor> {
        let config = self.current().await?;
        config.get_form(form_key).cloned()
    }

    /// Resolve a webhook routing key to its owning form descriptor.
    pub async fn get_form_by_webhook_key(
        &self,
        webhook_key: &str,
    ) -> ConfigResult<Option<FormDescriptor>> {
        let config = self.current().await?;
        Ok(config.get_form_by_webhook_key(webhook_key).cloned())
    }
}

impl Default for FormRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_doc(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    fn doc(forms: &str) -> String {
        format!(
            r#"{{"settings": {{"base_url": "https://s.example"}}, "forms": {forms}}}"#
        )
    }

    #[tokio::test]
    async fn loads_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(&dir, REGISTRY_FILE_NAME, &doc(r#"{"a": {"external_path": "/a"}}"#));

        let registry = FormRegistry::new();
        registry.load(Some(&path)).await.unwrap();

        let form = registry.get_form("a").await.unwrap();
        assert_eq!(form.external_path, "/a");
    }

    #[tokio::test]
    async fn missing_explicit_path_reports_location() {
        let registry = FormRegistry::new();
        let err = registry
            .load(Some(Path::new("/nonexistent/sync_registry.json")))
            .await
            .unwrap_err();
        match err {
            ConfigurationError::DocumentNotFound { searched } => {
                assert_eq!(searched.len(), 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn reload_replaces_generation_without_mutating_old_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(&dir, REGISTRY_FILE_NAME, &doc(r#"{"a": {"external_path": "/a"}}"#));

        let registry = FormRegistry::new();
        registry.load(Some(&path)).await.unwrap();

        let before = registry.current().await.unwrap();
        assert!(before.get_form("b").is_err());

        write_doc(
            &dir,
            REGISTRY_FILE_NAME,
            &doc(r#"{"a": {"external_path": "/a"}, "b": {"external_path": "/b"}}"#),
        );
        registry.reload().await.unwrap();

        // The snapshot taken before the reload still reflects the old
        // generation; new lookups see the new one.
        assert!(before.get_form("b").is_err());
        assert!(registry.get_form("b").await.is_ok());
    }

    #[tokio::test]
    async fn reload_keeps_old_generation_on_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(&dir, REGISTRY_FILE_NAME, &doc(r#"{"a": {"external_path": "/a"}}"#));

        let registry = FormRegistry::new();
        registry.load(Some(&path)).await.unwrap();

        write_doc(&dir, REGISTRY_FILE_NAME, "{broken");
        assert!(registry.reload().await.is_err());

        // Lookups still serve the last good generation.
        assert!(registry.get_form("a").await.is_ok());
    }

    #[tokio::test]
    async fn with_configuration_skips_file_loading() {
        let config = RegistryConfiguration::parse(&doc(r#"{"a": {"external_path": "/a"}}"#)).unwrap();
        let registry = FormRegistry::with_configuration(config);
        assert!(registry.get_form("a").await.is_ok());
        assert!(registry
            .get_form_by_webhook_key("none")
            .await
            .unwrap()
            .is_none());
    }
}

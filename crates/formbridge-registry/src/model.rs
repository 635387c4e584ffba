//! Typed, validated configuration model for external forms.
//!
//! The configuration document is a JSON file mapping form keys to form
//! descriptors, plus global connection settings. Parsing is strict: duplicate
//! form keys, duplicate webhook keys, and unnormalizable paths are rejected
//! at load time rather than surfacing later inside a sync run.

use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ConfigResult, ConfigurationError};

/// Declared data-flow direction and authority between local storage and the
/// external store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// External store is the source of truth; local storage is a read-only
    /// cache kept current by pulls and webhook deltas.
    ExternalMaster,
    /// Local storage is the source of truth; changes push outward.
    LocalMaster,
    /// Bidirectional pass-through with no local persistence.
    Direct,
    /// Bidirectional with conflict resolution.
    Hybrid,
}

impl SyncStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStrategy::ExternalMaster => "external_master",
            SyncStrategy::LocalMaster => "local_master",
            SyncStrategy::Direct => "direct",
            SyncStrategy::Hybrid => "hybrid",
        }
    }

    /// Whether the external store is authoritative for this strategy.
    pub fn external_is_master(&self) -> bool {
        matches!(
            self,
            SyncStrategy::ExternalMaster | SyncStrategy::Direct | SyncStrategy::Hybrid
        )
    }

    /// Whether the strategy persists records into local storage.
    pub fn uses_local_storage(&self) -> bool {
        !matches!(self, SyncStrategy::Direct)
    }

    /// Whether webhook-triggered deltas apply to local storage.
    pub fn accepts_webhook_updates(&self) -> bool {
        matches!(self, SyncStrategy::ExternalMaster | SyncStrategy::Hybrid)
    }
}

impl Default for SyncStrategy {
    fn default() -> Self {
        SyncStrategy::ExternalMaster
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for a single external form.
///
/// Immutable between registry loads; a reload replaces the whole generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormDescriptor {
    /// Unique identifier, injected from the document's map key.
    #[serde(default)]
    pub form_key: String,

    /// Human-readable description for status/debugging output.
    #[serde(default)]
    pub description: String,

    /// Location of the form on the external store. Always normalized to
    /// begin with `/`.
    pub external_path: String,

    /// How data flows between local storage and the external store.
    #[serde(default)]
    pub sync_strategy: SyncStrategy,

    /// Logical field name → external field identifier.
    #[serde(default)]
    pub field_mapping: HashMap<String, String>,

    /// Alternative display names per logical field, consulted by fuzzy
    /// extraction when the external store renames a label.
    #[serde(default)]
    pub field_variants: HashMap<String, Vec<String>>,

    /// Logical name of the field serving as natural key, if any.
    #[serde(default)]
    pub key_field: Option<String>,

    /// Routing identifier for inbound webhooks. Unique across all forms
    /// when present.
    #[serde(default)]
    pub webhook_key: Option<String>,
}

impl FormDescriptor {
    /// Look up the external field identifier for a logical field name.
    pub fn field_id(&self, logical: &str) -> Option<&str> {
        self.field_mapping.get(logical).map(String::as_str)
    }

    /// Like [`field_id`](Self::field_id) but a missing mapping is an error
    /// carrying both the form key and the logical name, so a mapping bug is
    /// diagnosable without re-reading the configuration document.
    pub fn resolve_field(&self, logical: &str) -> ConfigResult<&str> {
        self.field_id(logical)
            .ok_or_else(|| ConfigurationError::FieldNotMapped {
                form_key: self.form_key.clone(),
                logical: logical.to_string(),
            })
    }

    /// Name variants for a logical field, used for fuzzy extraction.
    /// Empty when none are configured.
    pub fn variants(&self, logical: &str) -> &[String] {
        self.field_variants
            .get(logical)
            .map_or(&[], Vec::as_slice)
    }

    /// Full URL of this form on the external store.
    pub fn external_url(&self, settings: &GlobalSettings) -> String {
        format!("{}{}", settings.base_url, self.external_path)
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_naming() -> String {
    "EID".to_string()
}

/// Global connection settings shared by all form descriptors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Base endpoint of the external store. Trailing separator is stripped.
    pub base_url: String,

    /// Default timeout for outbound calls, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Field naming convention requested from the external API.
    #[serde(default = "default_naming")]
    pub naming: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            default_timeout_secs: default_timeout_secs(),
            naming: default_naming(),
        }
    }
}

/// Raw document shape before validation.
#[derive(Deserialize)]
struct RawConfiguration {
    #[serde(default = "default_schema_version")]
    schema_version: String,
    #[serde(default)]
    settings: GlobalSettings,
    #[serde(default, deserialize_with = "form_entries")]
    forms: Vec<(String, FormDescriptor)>,
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

/// Deserializes the forms map as an ordered entry list so duplicate keys are
/// observable. A plain map deserialization would silently keep the last
/// occurrence.
fn form_entries<'de, D>(deserializer: D) -> Result<Vec<(String, FormDescriptor)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct EntriesVisitor;

    impl<'de> Visitor<'de> for EntriesVisitor {
        type Value = Vec<(String, FormDescriptor)>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a map of form key to form descriptor")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, descriptor)) = map.next_entry::<String, FormDescriptor>()? {
                entries.push((key, descriptor));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(EntriesVisitor)
}

/// Top-level validated configuration: schema version, global settings, and
/// the form descriptors keyed by form key.
///
/// Only constructed via [`RegistryConfiguration::parse`]; every instance has
/// passed validation.
#[derive(Debug, Clone)]
pub struct RegistryConfiguration {
    pub schema_version: String,
    pub settings: GlobalSettings,
    forms: HashMap<String, FormDescriptor>,
    webhook_index: HashMap<String, String>,
}

impl RegistryConfiguration {
    /// Strictly parse and validate a configuration document.
    pub fn parse(document: &str) -> ConfigResult<Self> {
        let raw: RawConfiguration = serde_json::from_str(document).map_err(|e| {
            ConfigurationError::InvalidDocument {
                message: e.to_string(),
            }
        })?;

        let mut settings = raw.settings;
        while settings.base_url.ends_with('/') {
            settings.base_url.pop();
        }
        if settings.base_url.is_empty() {
            return Err(ConfigurationError::EmptyBaseUrl);
        }

        let mut forms: HashMap<String, FormDescriptor> = HashMap::with_capacity(raw.forms.len());
        let mut webhook_index: HashMap<String, String> = HashMap::new();

        for (form_key, mut descriptor) in raw.forms {
            descriptor.form_key = form_key.clone();

            if descriptor.external_path.is_empty() {
                return Err(ConfigurationError::EmptyExternalPath { form_key });
            }
            if !descriptor.external_path.starts_with('/') {
                descriptor.external_path = format!("/{}", descriptor.external_path);
            }

            if let Some(webhook_key) = descriptor.webhook_key.as_deref() {
                if !webhook_key.is_empty() {
                    if let Some(first) = webhook_index.get(webhook_key) {
                        return Err(ConfigurationError::DuplicateWebhookKey {
                            webhook_key: webhook_key.to_string(),
                            first: first.clone(),
                            second: form_key,
                        });
                    }
                    webhook_index.insert(webhook_key.to_string(), form_key.clone());
                }
            }

            if forms.insert(form_key.clone(), descriptor).is_some() {
                return Err(ConfigurationError::DuplicateFormKey { form_key });
            }
        }

        Ok(Self {
            schema_version: raw.schema_version,
            settings,
            forms,
            webhook_index,
        })
    }

    /// Look up a form descriptor, erring with the available keys when absent.
    pub fn get_form(&self, form_key: &str) -> ConfigResult<&FormDescriptor> {
        self.forms
            .get(form_key)
            .ok_or_else(|| ConfigurationError::FormNotFound {
                form_key: form_key.to_string(),
                available: self.form_keys(),
            })
    }

    /// Resolve a webhook routing key to its owning form. Absence is a normal
    /// outcome meaning no sync service owns the key.
    pub fn get_form_by_webhook_key(&self, webhook_key: &str) -> Option<&FormDescriptor> {
        self.webhook_index
            .get(webhook_key)
            .and_then(|form_key| self.forms.get(form_key))
    }

    /// All registered form keys, sorted for stable diagnostics.
    pub fn form_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.forms.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Iterate all form descriptors.
    pub fn forms(&self) -> impl Iterator<Item = &FormDescriptor> {
        self.forms.values()
    }

    /// Number of configured forms.
    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

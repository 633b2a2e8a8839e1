//! Label name to id resolution with on-demand creation
use crate::client::{LabelInfo, MailClient};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Local view of the label store: id -> display name plus a lowercase name index
///
/// The label store stays authoritative; the cache is rebuilt on every refresh.
#[derive(Debug, Clone, Default)]
pub struct LabelCache {
    names_by_id: HashMap<String, String>,
    ids_by_name: HashMap<String, String>,
}

impl LabelCache {
    pub fn from_labels(labels: impl IntoIterator<Item = LabelInfo>) -> Self {
        let mut cache = Self::default();
        for label in labels {
            cache.insert(label);
        }
        cache
    }

    pub fn insert(&mut self, label: LabelInfo) {
        self.ids_by_name
            .insert(label.name.to_lowercase(), label.id.clone());
        self.names_by_id.insert(label.id, label.name);
    }

    /// Case-insensitive lookup by display name
    pub fn id_for(&self, name: &str) -> Option<&str> {
        self.ids_by_name.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn name_for(&self, id: &str) -> Option<&str> {
        self.names_by_id.get(id).map(String::as_str)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.names_by_id.contains_key(id)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.ids_by_name.contains_key(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.names_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names_by_id.is_empty()
    }
}

/// Resolves label names to ids, creating missing labels through the client
pub struct LabelResolver {
    client: Arc<dyn MailClient>,
    cache: LabelCache,
}

impl LabelResolver {
    pub fn new(client: Arc<dyn MailClient>) -> Self {
        Self {
            client,
            cache: LabelCache::default(),
        }
    }

    pub fn cache(&self) -> &LabelCache {
        &self.cache
    }

    /// Replace the cache with the current contents of the label store
    pub async fn refresh(&mut self) -> Result<usize> {
        let labels = self.client.list_labels().await?;
        self.cache = LabelCache::from_labels(labels);
        debug!("Label cache refreshed with {} labels", self.cache.len());
        Ok(self.cache.len())
    }

    /// Map `name` to a label id, creating the label if the store lacks it
    ///
    /// Returns `Ok(None)` when the label could not be resolved or created; the
    /// caller skips labeling in that case. Only authentication failures are
    /// returned as errors.
    pub async fn resolve(&mut self, name: &str) -> Result<Option<String>> {
        let name = name.trim();
        if name.is_empty() {
            warn!("Refusing to resolve an empty label name");
            return Ok(None);
        }

        if let Some(id) = self.cache.id_for(name) {
            return Ok(Some(id.to_string()));
        }

        // Another client may have created it since the last refresh
        if let Err(e) = self.refresh().await {
            if e.requires_reauth() {
                return Err(e);
            }
            warn!("Label cache refresh before creating '{}' failed: {}", name, e);
        }
        if let Some(id) = self.cache.id_for(name) {
            return Ok(Some(id.to_string()));
        }

        info!("Creating label: {}", name);
        match self.client.create_label(name).await {
            Ok(label) => {
                info!("Created label '{}' with ID: {}", label.name, label.id);
                let id = label.id.clone();
                self.cache.insert(label);
                Ok(Some(id))
            }
            Err(e) if e.requires_reauth() => Err(e),
            Err(e) => {
                warn!("Could not create label '{}': {}", name, e);
                Ok(None)
            }
        }
    }
}

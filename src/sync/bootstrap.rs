// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Index and mapping creation strategy.
//!
//! The synchronizer calls the strategy the first time it finds the index or
//! the document type missing, and on explicit resets. A model that needs a
//! custom index layout supplies its own [`IndexBootstrap`] when the
//! synchronizer is built.

use async_trait::async_trait;
use tracing::info;

use crate::client::SearchClient;
use crate::config::IndexSettings;
use crate::error::SearchError;
use crate::mapping::{index_settings_body, TypeMapping};

#[async_trait]
pub trait IndexBootstrap: Send + Sync {
    /// Create `index`, replacing an existing one when `overwrite` is set.
    async fn create_index(&self, client: &dyn SearchClient, index: &str, overwrite: bool) -> Result<(), SearchError>;

    /// Install the mapping of `doc_type`. `mapping` is the generated one.
    async fn create_type(
        &self,
        client: &dyn SearchClient,
        index: &str,
        doc_type: &str,
        mapping: &TypeMapping,
    ) -> Result<(), SearchError>;
}

/// Creates the index from [`IndexSettings`] and installs generated mappings as-is.
#[derive(Debug, Clone, Default)]
pub struct DefaultBootstrap {
    settings: IndexSettings,
}

impl DefaultBootstrap {
    pub fn new(settings: IndexSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl IndexBootstrap for DefaultBootstrap {
    async fn create_index(&self, client: &dyn SearchClient, index: &str, overwrite: bool) -> Result<(), SearchError> {
        let body = index_settings_body(&self.settings);
        client.create_index(index, &body, overwrite).await?;
        info!(
            index,
            shards = self.settings.shards,
            replicas = self.settings.replicas,
            overwrite,
            "Index created"
        );
        Ok(())
    }

    async fn create_type(
        &self,
        client: &dyn SearchClient,
        index: &str,
        doc_type: &str,
        mapping: &TypeMapping,
    ) -> Result<(), SearchError> {
        client.put_mapping(index, doc_type, mapping).await?;
        info!(index, doc_type, fields = mapping.properties.len(), "Mapping installed");
        Ok(())
    }
}

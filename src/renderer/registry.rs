//! Template registry
//!
//! Maps template ids to descriptors built from configuration. Relative
//! template and asset paths are resolved against `renderer.templates_dir`.

use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::schema::FieldRule;
use super::types::{media_type_for, Asset, AssetKind, PageOptions};
use crate::config::{AssetConfig, RendererConfig, TemplateConfig};
use crate::constants::DEFAULT_LOCALE;
use crate::error::GenerationError;

/// Everything needed to render one template
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDescriptor {
    pub id: String,
    pub path: PathBuf,
    pub assets: Vec<AssetConfig>,
    pub locale: String,
    pub page: PageOptions,
    pub schema: Vec<FieldRule>,
}

impl TemplateDescriptor {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            assets: Vec::new(),
            locale: DEFAULT_LOCALE.to_string(),
            page: PageOptions::default(),
            schema: Vec::new(),
        }
    }

    pub fn with_asset(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.assets.push(AssetConfig {
            name: name.into(),
            path: path.into(),
            kind: None,
        });
        self
    }

    pub fn with_schema(mut self, schema: Vec<FieldRule>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_page(mut self, page: PageOptions) -> Self {
        self.page = page;
        self
    }

    fn from_config(base_dir: &Path, config: &TemplateConfig) -> Self {
        Self {
            id: config.id.clone(),
            path: resolve(base_dir, &config.path),
            assets: config
                .assets
                .iter()
                .map(|asset| AssetConfig {
                    name: asset.name.clone(),
                    path: resolve(base_dir, &asset.path),
                    kind: asset.kind,
                })
                .collect(),
            locale: config
                .locale
                .clone()
                .unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
            page: config.page.clone(),
            schema: config.schema.clone(),
        }
    }

    /// Read every declared asset from disk
    ///
    /// A missing or unreadable asset is a render fault.
    pub async fn load_assets(&self) -> Result<Vec<Asset>, GenerationError> {
        let mut assets = Vec::with_capacity(self.assets.len());
        for spec in &self.assets {
            let content = tokio::fs::read(&spec.path).await.map_err(|e| {
                GenerationError::Render(format!(
                    "cannot load asset '{}' from {}: {}",
                    spec.name,
                    spec.path.display(),
                    e
                ))
            })?;
            assets.push(Asset {
                name: spec.name.clone(),
                kind: spec.kind.unwrap_or_else(|| AssetKind::from_path(&spec.path)),
                media_type: media_type_for(&spec.path).to_string(),
                content: Bytes::from(content),
            });
        }
        Ok(assets)
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Registered templates by id
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Arc<TemplateDescriptor>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(renderer: &RendererConfig, templates: &[TemplateConfig]) -> Self {
        let mut registry = Self::new();
        for config in templates {
            registry.register(TemplateDescriptor::from_config(
                &renderer.templates_dir,
                config,
            ));
        }
        registry
    }

    /// Add or replace a template
    pub fn register(&mut self, descriptor: TemplateDescriptor) {
        debug!(template_id = %descriptor.id, path = %descriptor.path.display(), "Registered template");
        self.templates
            .insert(descriptor.id.clone(), Arc::new(descriptor));
    }

    pub fn get(&self, id: &str) -> Option<Arc<TemplateDescriptor>> {
        self.templates.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.templates.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

//! Template registry configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::renderer::schema::FieldRule;
use crate::renderer::{AssetKind, PageOptions};

/// One static asset a template needs (stylesheet, logo, font)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Name templates use to reference the asset (`{{@asset.<name>}}`)
    pub name: String,
    /// Path relative to `renderer.templates_dir` (or absolute)
    pub path: PathBuf,
    /// Inferred from the file extension when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AssetKind>,
}

/// A registered document template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub id: String,
    /// Template source, relative to `renderer.templates_dir` (or absolute)
    pub path: PathBuf,
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
    /// Default locale for this template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Default page setup for this template
    #[serde(default)]
    pub page: PageOptions,
    /// Fields the input data must satisfy
    #[serde(default)]
    pub schema: Vec<FieldRule>,
}

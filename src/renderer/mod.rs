//! Renderer boundary
//!
//! The orchestrator drives generation through four seams:
//!
//! - [`SchemaValidator`] checks input data against the template schema
//! - [`TemplateRenderer`] turns a template plus data into HTML
//! - [`DocumentEngine`] converts HTML to PDF; it is launched lazily by an
//!   [`EngineLauncher`] and shared through an [`EngineHandle`]
//! - [`ResultSink`] persists the finished document
//!
//! Default implementations: [`TemplateSchemaValidator`],
//! [`PlaceholderRenderer`], [`ChromiumLauncher`] and [`FsResultSink`].

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::GenerationError;

pub mod chromium;
pub mod engine;
pub mod registry;
pub mod schema;
pub mod sink;
pub mod template;
mod types;

pub use chromium::{ChromiumEngine, ChromiumLauncher};
pub use engine::{EngineHandle, EngineLease};
pub use registry::{TemplateDescriptor, TemplateRegistry};
pub use schema::TemplateSchemaValidator;
pub use sink::{sanitize_filename, FsResultSink};
pub use template::PlaceholderRenderer;
pub use types::{
    media_type_for, Asset, AssetKind, PageFormat, PageMargin, PageOptions, PageOverrides,
    RenderedDocument,
};

/// Validates input data before anything is rendered
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, template: &TemplateDescriptor, data: &Value) -> Result<(), GenerationError>;
}

/// Renders a template to HTML
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(
        &self,
        template_path: &Path,
        data: &Value,
        locale: &str,
        assets: &[Asset],
    ) -> Result<RenderedDocument, GenerationError>;
}

/// Converts rendered HTML to the final document
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentEngine: Send + Sync {
    async fn convert(
        &self,
        document: &RenderedDocument,
        page: &PageOptions,
    ) -> Result<Bytes, GenerationError>;

    /// Whether the engine can still take work; a disconnected engine is
    /// relaunched on the next acquire
    fn is_connected(&self) -> bool;

    async fn shutdown(&self);
}

/// Starts a [`DocumentEngine`]; failures are reported as `Conversion` errors
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn DocumentEngine>, GenerationError>;
}

/// Persists generated documents
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn persist(&self, filename: &str, document: &Bytes) -> Result<PathBuf, GenerationError>;
}

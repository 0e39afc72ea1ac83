//! Shared document engine handle
//!
//! The engine is expensive to start, so one instance is shared by every job.
//! Renders hold an [`EngineLease`] (a read guard), launches and teardown take
//! the write lock. The engine therefore never goes away under a render in
//! progress, and [`EngineHandle::shutdown`] waits for outstanding leases.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use tracing::{info, warn};

use super::{DocumentEngine, EngineLauncher, PageOptions, RenderedDocument};
use crate::error::GenerationError;

type EngineSlot = Option<Arc<dyn DocumentEngine>>;

/// Lazily launched, shared document engine
#[derive(Clone)]
pub struct EngineHandle {
    launcher: Arc<dyn EngineLauncher>,
    engine: Arc<RwLock<EngineSlot>>,
}

/// Access to a running engine; the engine stays up while any lease exists
pub struct EngineLease {
    _guard: OwnedRwLockReadGuard<EngineSlot>,
    engine: Arc<dyn DocumentEngine>,
}

impl EngineLease {
    pub async fn convert(
        &self,
        document: &RenderedDocument,
        page: &PageOptions,
    ) -> Result<Bytes, GenerationError> {
        self.engine.convert(document, page).await
    }

    pub fn engine(&self) -> &dyn DocumentEngine {
        self.engine.as_ref()
    }
}

impl EngineHandle {
    pub fn new(launcher: Arc<dyn EngineLauncher>) -> Self {
        Self {
            launcher,
            engine: Arc::new(RwLock::new(None)),
        }
    }

    /// Lease the engine, launching or relaunching it if needed
    pub async fn acquire(&self) -> Result<EngineLease, GenerationError> {
        {
            let guard = Arc::clone(&self.engine).read_owned().await;
            if let Some(engine) = guard.as_ref().filter(|e| e.is_connected()).cloned() {
                return Ok(EngineLease {
                    _guard: guard,
                    engine,
                });
            }
        }

        let mut guard = Arc::clone(&self.engine).write_owned().await;
        // Another task may have launched while we waited for the write lock
        let healthy = guard.as_ref().is_some_and(|e| e.is_connected());
        if !healthy {
            if let Some(stale) = guard.take() {
                warn!("Document engine disconnected, relaunching");
                stale.shutdown().await;
            }
            let engine = self.launcher.launch().await.map_err(|e| match e {
                GenerationError::Conversion(_) => e,
                other => GenerationError::Conversion(other.to_string()),
            })?;
            info!("Document engine launched");
            *guard = Some(engine);
        }

        let guard = guard.downgrade();
        let engine = guard.as_ref().cloned().ok_or_else(|| {
            GenerationError::Conversion("document engine unavailable".to_string())
        })?;
        Ok(EngineLease {
            _guard: guard,
            engine,
        })
    }

    /// Whether an engine is currently launched
    pub async fn is_running(&self) -> bool {
        self.engine.read().await.is_some()
    }

    /// Tear the engine down once every lease has been released
    pub async fn shutdown(&self) {
        let mut guard = self.engine.write().await;
        if let Some(engine) = guard.take() {
            engine.shutdown().await;
            info!("Document engine shut down");
        }
    }
}

//! Headless Chromium document engine.
//!
//! Each conversion writes the HTML into a temporary directory, runs the
//! browser with `--print-to-pdf` and reads the PDF back. Page options are
//! expressed as an `@page` rule injected into the document.

use async_trait::async_trait;
use bytes::Bytes;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::tempdir;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{DocumentEngine, EngineLauncher, PageOptions, RenderedDocument};
use crate::config::RendererConfig;
use crate::error::GenerationError;

const BASE_ARGS: &[&str] = &[
    "--headless",
    "--disable-gpu",
    "--no-first-run",
    "--no-pdf-header-footer",
    "--run-all-compositor-stages-before-draw",
];

/// Launches [`ChromiumEngine`]s after checking the browser runs
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    chromium_path: String,
    extra_args: Vec<String>,
}

impl ChromiumLauncher {
    pub fn new(chromium_path: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            chromium_path: chromium_path.into(),
            extra_args,
        }
    }

    pub fn from_config(config: &RendererConfig) -> Self {
        Self::new(config.chromium_path.clone(), config.chromium_args.clone())
    }
}

#[async_trait]
impl EngineLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn DocumentEngine>, GenerationError> {
        let output = Command::new(&self.chromium_path)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                GenerationError::Conversion(format!(
                    "failed to launch browser '{}': {}",
                    self.chromium_path, e
                ))
            })?;

        if !output.status.success() {
            return Err(GenerationError::Conversion(format!(
                "browser '{}' exited with {}",
                self.chromium_path, output.status
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(browser = %self.chromium_path, version = %version, "Browser available");

        Ok(Arc::new(ChromiumEngine {
            chromium_path: self.chromium_path.clone(),
            extra_args: self.extra_args.clone(),
            connected: AtomicBool::new(true),
        }))
    }
}

/// Converts HTML to PDF with a headless browser process per document
#[derive(Debug)]
pub struct ChromiumEngine {
    chromium_path: String,
    extra_args: Vec<String>,
    connected: AtomicBool,
}

/// Put the `@page` rule (and background printing) in front of the document styles
fn with_page_css(html: &str, page: &PageOptions) -> String {
    let mut css = page.to_css();
    if page.print_background {
        css.push_str(" html { -webkit-print-color-adjust: exact; print-color-adjust: exact; }");
    }
    let block = format!("<style>{}</style>", css);

    match html.to_ascii_lowercase().find("<head>") {
        Some(pos) => {
            let at = pos + "<head>".len();
            format!("{}{}{}", &html[..at], block, &html[at..])
        }
        None => format!("{}{}", block, html),
    }
}

#[async_trait]
impl DocumentEngine for ChromiumEngine {
    async fn convert(
        &self,
        document: &RenderedDocument,
        page: &PageOptions,
    ) -> Result<Bytes, GenerationError> {
        let workdir = tempdir()
            .map_err(|e| GenerationError::Conversion(format!("cannot create temp dir: {}", e)))?;
        let input = workdir.path().join("document.html");
        let output = workdir.path().join("document.pdf");

        tokio::fs::write(&input, with_page_css(&document.html, page))
            .await
            .map_err(|e| GenerationError::Conversion(format!("cannot write document: {}", e)))?;

        let result = Command::new(&self.chromium_path)
            .args(BASE_ARGS)
            .args(&self.extra_args)
            .arg(format!("--print-to-pdf={}", output.display()))
            .arg(format!("file://{}", input.display()))
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let status = match result {
            Ok(out) if out.status.success() => out.status,
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                return Err(GenerationError::Conversion(format!(
                    "browser exited with {}: {}",
                    out.status,
                    stderr.lines().last().unwrap_or_default()
                )));
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::NotFound {
                    // Binary vanished; force a relaunch check
                    self.connected.store(false, Ordering::SeqCst);
                }
                return Err(GenerationError::Conversion(format!(
                    "failed to run browser: {}",
                    e
                )));
            }
        };

        let pdf = tokio::fs::read(&output)
            .await
            .map_err(|e| GenerationError::Conversion(format!("no PDF produced: {}", e)))?;
        if pdf.is_empty() {
            return Err(GenerationError::Conversion("browser produced an empty PDF".to_string()));
        }

        debug!(status = %status, size_bytes = pdf.len(), "Converted document");
        Ok(Bytes::from(pdf))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            debug!(browser = %self.chromium_path, "Browser engine stopped");
        } else {
            warn!(browser = %self.chromium_path, "Browser engine stopped after disconnect");
        }
    }
}

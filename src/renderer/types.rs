//! Value types exchanged across the renderer boundary

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Paper size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageFormat {
    #[serde(alias = "a3")]
    A3,
    #[default]
    #[serde(alias = "a4")]
    A4,
    #[serde(alias = "a5")]
    A5,
    #[serde(alias = "letter")]
    Letter,
    #[serde(alias = "legal")]
    Legal,
}

impl PageFormat {
    /// CSS `size` keyword
    pub fn css_name(&self) -> &'static str {
        match self {
            PageFormat::A3 => "A3",
            PageFormat::A4 => "A4",
            PageFormat::A5 => "A5",
            PageFormat::Letter => "letter",
            PageFormat::Legal => "legal",
        }
    }
}

fn default_margin() -> String {
    "10mm".to_string()
}

/// Page margins as CSS lengths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMargin {
    #[serde(default = "default_margin")]
    pub top: String,
    #[serde(default = "default_margin")]
    pub right: String,
    #[serde(default = "default_margin")]
    pub bottom: String,
    #[serde(default = "default_margin")]
    pub left: String,
}

impl Default for PageMargin {
    fn default() -> Self {
        Self {
            top: default_margin(),
            right: default_margin(),
            bottom: default_margin(),
            left: default_margin(),
        }
    }
}

fn default_print_background() -> bool {
    true
}

/// Page setup handed to the document engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOptions {
    #[serde(default)]
    pub format: PageFormat,
    #[serde(default)]
    pub landscape: bool,
    #[serde(default)]
    pub margin: PageMargin,
    #[serde(default = "default_print_background")]
    pub print_background: bool,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            format: PageFormat::default(),
            landscape: false,
            margin: PageMargin::default(),
            print_background: default_print_background(),
        }
    }
}

impl PageOptions {
    /// `@page` rule expressing these options
    pub fn to_css(&self) -> String {
        let orientation = if self.landscape { " landscape" } else { "" };
        format!(
            "@page {{ size: {}{}; margin: {} {} {} {}; }}",
            self.format.css_name(),
            orientation,
            self.margin.top,
            self.margin.right,
            self.margin.bottom,
            self.margin.left
        )
    }
}

/// Per-request page settings layered over a template's defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<PageFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landscape: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<PageMargin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print_background: Option<bool>,
}

impl PageOverrides {
    pub fn apply(&self, base: &PageOptions) -> PageOptions {
        PageOptions {
            format: self.format.unwrap_or(base.format),
            landscape: self.landscape.unwrap_or(base.landscape),
            margin: self.margin.clone().unwrap_or_else(|| base.margin.clone()),
            print_background: self.print_background.unwrap_or(base.print_background),
        }
    }
}

/// Kind of a template asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Stylesheet,
    Image,
    Font,
    Other,
}

impl AssetKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "css" => AssetKind::Stylesheet,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" => AssetKind::Image,
            "woff" | "woff2" | "ttf" | "otf" => AssetKind::Font,
            _ => AssetKind::Other,
        }
    }
}

/// MIME type guessed from a file extension
pub fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "css" => "text/css",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        _ => "application/octet-stream",
    }
}

/// A loaded template asset
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub name: String,
    pub kind: AssetKind,
    pub media_type: String,
    pub content: Bytes,
}

impl Asset {
    /// `data:` URI embedding the asset, for images and fonts in HTML
    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.media_type,
            STANDARD.encode(&self.content)
        )
    }

    /// Content as text, for stylesheets
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

/// HTML produced by a template renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub html: String,
}

impl RenderedDocument {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }
}

//! Placeholder template renderer.
//!
//! Renders HTML templates with a small mustache-like syntax:
//!
//! - `{{path.to.value}}` - HTML-escaped value (missing values render empty)
//! - `{{{path}}}` - raw value
//! - `{{#each items}}...{{/each}}` - repeat for every array element, with
//!   `{{this}}`, `{{this.field}}`, `{{field}}` and `{{@index}}` inside
//! - `{{#if path}}...{{/if}}` - render when the value is truthy
//! - `{{@locale}}` - locale of the request
//! - `{{@asset.<name>}}` - asset embedded as a `data:` URI
//! - `{{! comment }}` - dropped
//!
//! Stylesheet assets are injected into `<head>` as a `<style>` block.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use super::types::{Asset, AssetKind, RenderedDocument};
use super::TemplateRenderer;
use crate::error::GenerationError;

/// Regex pattern for matching tags: {{{raw}}} or {{tag}}
static TAG_PATTERN: OnceLock<Regex> = OnceLock::new();

fn tag_pattern() -> &'static Regex {
    TAG_PATTERN.get_or_init(|| {
        // Compile-time constant pattern, covered by test_tag_regex_is_valid
        Regex::new(r"\{\{\{\s*(.+?)\s*\}\}\}|\{\{\s*(.+?)\s*\}\}")
            .expect("Invalid tag regex - this is a compile-time bug")
    })
}

/// Resolve a dotted path (`customer.address.city`, `items.0.name`) in a JSON value
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Var { path: String, raw: bool },
    Each { path: String, body: Vec<Node> },
    If { path: String, body: Vec<Node> },
}

struct Frame {
    block: &'static str,
    path: String,
    nodes: Vec<Node>,
}

fn parse(source: &str) -> Result<Vec<Node>, GenerationError> {
    let mut stack = vec![Frame {
        block: "root",
        path: String::new(),
        nodes: Vec::new(),
    }];
    let mut last = 0;

    for caps in tag_pattern().captures_iter(source) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let top = stack.last_mut().ok_or_else(malformed_stack)?;
        if whole.start() > last {
            top.nodes
                .push(Node::Text(source[last..whole.start()].to_string()));
        }
        last = whole.end();

        if let Some(raw) = caps.get(1) {
            top.nodes.push(Node::Var {
                path: raw.as_str().to_string(),
                raw: true,
            });
            continue;
        }

        let tag = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        if tag.starts_with('!') {
            continue;
        }

        if let Some(path) = tag.strip_prefix("#each ") {
            stack.push(Frame {
                block: "each",
                path: path.trim().to_string(),
                nodes: Vec::new(),
            });
        } else if let Some(path) = tag.strip_prefix("#if ") {
            stack.push(Frame {
                block: "if",
                path: path.trim().to_string(),
                nodes: Vec::new(),
            });
        } else if let Some(block) = tag.strip_prefix('/') {
            let frame = stack.pop().ok_or_else(malformed_stack)?;
            if frame.block != block.trim() || stack.is_empty() {
                return Err(GenerationError::Render(format!(
                    "malformed template: unexpected {{{{/{}}}}}",
                    block.trim()
                )));
            }
            let node = match frame.block {
                "each" => Node::Each {
                    path: frame.path,
                    body: frame.nodes,
                },
                _ => Node::If {
                    path: frame.path,
                    body: frame.nodes,
                },
            };
            stack.last_mut().ok_or_else(malformed_stack)?.nodes.push(node);
        } else if tag.starts_with('#') {
            return Err(GenerationError::Render(format!(
                "malformed template: unsupported block {{{{{}}}}}",
                tag
            )));
        } else {
            top.nodes.push(Node::Var {
                path: tag.to_string(),
                raw: false,
            });
        }
    }

    if stack.len() != 1 {
        let open = stack.last().map(|f| f.block).unwrap_or("block");
        return Err(GenerationError::Render(format!(
            "malformed template: unclosed {{{{#{}}}}}",
            open
        )));
    }

    let mut root = stack.pop().ok_or_else(malformed_stack)?;
    if last < source.len() {
        root.nodes.push(Node::Text(source[last..].to_string()));
    }
    Ok(root.nodes)
}

fn malformed_stack() -> GenerationError {
    GenerationError::Render("malformed template: unbalanced blocks".to_string())
}

struct Scope<'a> {
    value: &'a Value,
    index: Option<usize>,
}

struct RenderContext<'a> {
    locale: &'a str,
    assets: HashMap<&'a str, &'a Asset>,
}

fn lookup<'a>(path: &str, scopes: &[Scope<'a>]) -> Option<&'a Value> {
    let innermost = scopes.last()?;
    if path == "this" {
        return Some(innermost.value);
    }
    if let Some(rest) = path.strip_prefix("this.") {
        return resolve_path(innermost.value, rest);
    }
    scopes
        .iter()
        .rev()
        .find_map(|scope| resolve_path(scope.value, path))
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().map_or(true, |f| f != 0.0),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(_)) => true,
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Escape text for HTML element and attribute content
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn render_nodes<'a>(
    nodes: &[Node],
    scopes: &mut Vec<Scope<'a>>,
    ctx: &RenderContext<'_>,
    out: &mut String,
) -> Result<(), GenerationError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var { path, raw } => {
                let text = if path == "@locale" {
                    ctx.locale.to_string()
                } else if path == "@index" {
                    scopes
                        .iter()
                        .rev()
                        .find_map(|s| s.index)
                        .map(|i| i.to_string())
                        .unwrap_or_default()
                } else if let Some(name) = path.strip_prefix("@asset.") {
                    let asset = ctx.assets.get(name).ok_or_else(|| {
                        GenerationError::Render(format!("missing asset '{}'", name))
                    })?;
                    asset.data_uri()
                } else {
                    lookup(path, scopes).map(value_to_text).unwrap_or_default()
                };

                if *raw {
                    out.push_str(&text);
                } else {
                    out.push_str(&escape_html(&text));
                }
            }
            Node::Each { path, body } => {
                if let Some(Value::Array(items)) = lookup(path, scopes) {
                    for (index, item) in items.iter().enumerate() {
                        scopes.push(Scope {
                            value: item,
                            index: Some(index),
                        });
                        let rendered = render_nodes(body, scopes, ctx, out);
                        scopes.pop();
                        rendered?;
                    }
                }
            }
            Node::If { path, body } => {
                if is_truthy(lookup(path, scopes)) {
                    render_nodes(body, scopes, ctx, out)?;
                }
            }
        }
    }
    Ok(())
}

/// Insert stylesheet assets before `</head>`, or at the top without a head
fn inject_styles(html: String, assets: &[Asset]) -> String {
    let css: Vec<String> = assets
        .iter()
        .filter(|a| a.kind == AssetKind::Stylesheet)
        .map(|a| a.text())
        .collect();
    if css.is_empty() {
        return html;
    }

    let block = format!("<style>\n{}\n</style>\n", css.join("\n"));
    match html.to_ascii_lowercase().find("</head>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + block.len());
            out.push_str(&html[..pos]);
            out.push_str(&block);
            out.push_str(&html[pos..]);
            out
        }
        None => block + &html,
    }
}

/// Render a template source string
pub fn render_str(
    source: &str,
    data: &Value,
    locale: &str,
    assets: &[Asset],
) -> Result<RenderedDocument, GenerationError> {
    let nodes = parse(source)?;
    let ctx = RenderContext {
        locale,
        assets: assets.iter().map(|a| (a.name.as_str(), a)).collect(),
    };

    let mut out = String::with_capacity(source.len());
    let mut scopes = vec![Scope {
        value: data,
        index: None,
    }];
    render_nodes(&nodes, &mut scopes, &ctx, &mut out)?;

    Ok(RenderedDocument::new(inject_styles(out, assets)))
}

/// [`TemplateRenderer`] reading template files from disk
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderRenderer;

impl PlaceholderRenderer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TemplateRenderer for PlaceholderRenderer {
    async fn render(
        &self,
        template_path: &Path,
        data: &Value,
        locale: &str,
        assets: &[Asset],
    ) -> Result<RenderedDocument, GenerationError> {
        let source = tokio::fs::read_to_string(template_path)
            .await
            .map_err(|e| {
                GenerationError::Render(format!(
                    "cannot read template {}: {}",
                    template_path.display(),
                    e
                ))
            })?;
        render_str(&source, data, locale, assets)
    }
}

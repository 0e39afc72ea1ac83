// Configuration module

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

mod coalescing;
mod jobs;
mod logging;
mod renderer;
mod store;
mod templates;

pub use coalescing::CoalescingConfig;
pub use jobs::JobsConfig;
pub use logging::LoggingConfig;
pub use renderer::RendererConfig;
pub use store::StoreConfig;
pub use templates::{AssetConfig, TemplateConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub coalescing: CoalescingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub templates: Vec<TemplateConfig>,
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, String> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| e.to_string())?;

        let mut missing = None;
        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    missing.get_or_insert_with(|| var_name.to_string());
                    String::new()
                }
            }
        });

        if let Some(var_name) = missing {
            return Err(format!(
                "Environment variable '{}' is referenced but not set",
                var_name
            ));
        }

        serde_yaml::from_str(&substituted).map_err(|e| e.to_string())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.store.validate()?;
        self.jobs.validate()?;
        self.renderer.validate()?;

        let mut seen_ids = HashSet::new();
        for template in &self.templates {
            if template.id.trim().is_empty() {
                return Err("Template id cannot be empty".to_string());
            }
            if !seen_ids.insert(template.id.as_str()) {
                return Err(format!("Duplicate template id '{}'", template.id));
            }
            if template.path.as_os_str().is_empty() {
                return Err(format!("Template '{}' has empty path", template.id));
            }

            let mut seen_assets = HashSet::new();
            for asset in &template.assets {
                if !seen_assets.insert(asset.name.as_str()) {
                    return Err(format!(
                        "Template '{}' declares asset '{}' more than once",
                        template.id, asset.name
                    ));
                }
            }

            for rule in &template.schema {
                if rule.name.trim().is_empty() {
                    return Err(format!(
                        "Template '{}' has a schema field with an empty name",
                        template.id
                    ));
                }
            }
        }

        Ok(())
    }
}

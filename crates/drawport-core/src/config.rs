use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::options::{BackendKind, ImageFormat, RenderOptions};

pub const DEFAULT_EMBED_URL: &str =
    "https://embed.diagrams.net/?embed=1&ui=min&spin=1&proto=json&configure=1";

pub const ENV_BACKEND: &str = "DRAWPORT_BACKEND";
pub const ENV_TIMEOUT_MS: &str = "DRAWPORT_TIMEOUT_MS";
pub const ENV_DRAWIO: &str = "DRAWPORT_DRAWIO";
pub const ENV_EMBED_BRIDGE: &str = "DRAWPORT_EMBED_BRIDGE";

/// Pipeline configuration, as read from JSON (`camelCase` keys) and the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ExportConfig {
    pub format: ImageFormat,
    pub scale: f32,
    pub border: f32,
    pub timeout_ms: u64,
    pub backend: BackendKind,
    /// Parent directory for per-request scratch directories. `None` uses the system temp dir.
    pub temp_root: Option<PathBuf>,
    pub embed: EmbedConfig,
    pub cli: CliConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        let options = RenderOptions::default();
        Self {
            format: options.format,
            scale: options.scale,
            border: options.border,
            timeout_ms: options.timeout.as_millis() as u64,
            backend: options.backend,
            temp_root: None,
            embed: EmbedConfig::default(),
            cli: CliConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct EmbedConfig {
    /// The bridge program hosting the embed surface (typically a headless browser driver).
    pub command: Option<String>,
    pub args: Vec<String>,
    pub url: String,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            url: DEFAULT_EMBED_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CliConfig {
    /// The draw.io desktop executable. `None` uses [`default_drawio_executable`].
    pub executable: Option<PathBuf>,
    /// Arguments placed before the export arguments (e.g. when `executable` is `xvfb-run`).
    pub prefix_args: Vec<String>,
    /// Arguments appended after the export arguments.
    pub extra_args: Vec<String>,
}

impl CliConfig {
    pub fn resolved_executable(&self) -> PathBuf {
        self.executable
            .clone()
            .unwrap_or_else(default_drawio_executable)
    }
}

/// Where the draw.io desktop application usually lives on this platform.
pub fn default_drawio_executable() -> PathBuf {
    if cfg!(target_os = "macos") {
        PathBuf::from("/Applications/draw.io.app/Contents/MacOS/draw.io")
    } else if cfg!(target_os = "windows") {
        PathBuf::from(r"C:\Program Files\draw.io\draw.io.exe")
    } else {
        PathBuf::from("drawio")
    }
}

impl ExportConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> Value {
        // Serializing plain data into a `Value` cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Object(Map::new()))
    }

    /// Deep-merges a JSON overlay into this config. Objects merge key by key; any other value
    /// replaces what was there.
    pub fn merge_json(&mut self, overlay: &Value) -> Result<(), ConfigError> {
        let mut base = self.to_value();
        deep_merge_value(&mut base, overlay);
        *self = Self::from_value(base)?;
        Ok(())
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Applies `DRAWPORT_*` overrides read through `lookup`.
    pub fn apply_env_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(backend) = lookup(ENV_BACKEND) {
            self.backend = backend.parse()?;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "timeoutMs",
                    message: e.to_string(),
                })?;
        }
        if let Some(path) = lookup(ENV_DRAWIO).filter(|p| !p.trim().is_empty()) {
            self.cli.executable = Some(PathBuf::from(path));
        }
        if let Some(command) = lookup(ENV_EMBED_BRIDGE).filter(|c| !c.trim().is_empty()) {
            self.embed.command = Some(command);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validates the request-level settings and turns them into [`RenderOptions`].
    pub fn render_options(&self) -> Result<RenderOptions, ConfigError> {
        if !(self.scale.is_finite() && self.scale >= 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "scale",
                message: format!("expected a number >= 0, got {}", self.scale),
            });
        }
        if !(self.border.is_finite() && self.border >= 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "border",
                message: format!("expected a number >= 0, got {}", self.border),
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timeoutMs",
                message: "expected an integer > 0".to_string(),
            });
        }
        Ok(RenderOptions {
            format: self.format,
            scale: self.scale,
            border: self.border,
            timeout: self.timeout(),
            backend: self.backend,
        })
    }
}

fn deep_merge_value(base: &mut Value, incoming: &Value) {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(incoming_map)) => {
            for (k, v) in incoming_map {
                match base_map.get_mut(k) {
                    Some(existing) => deep_merge_value(existing, v),
                    None => {
                        base_map.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (base_slot, v) => {
            *base_slot = v.clone();
        }
    }
}

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
}

impl ImageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    /// Returns true when `bytes` carry this format's file signature.
    pub fn matches_signature(self, bytes: &[u8]) -> bool {
        match self {
            ImageFormat::Png => crate::image::is_png(bytes),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            other => Err(ConfigError::UnsupportedFormat {
                value: other.to_string(),
            }),
        }
    }
}

/// Which rendering engine a request is routed to. Chosen by the caller; never inferred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The embeddable draw.io surface driven over its JSON message protocol.
    Embed,
    /// The statically linked renderer in `drawport-render`.
    #[default]
    Local,
    /// The installed draw.io desktop executable.
    Cli,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Embed => "embed",
            BackendKind::Local => "local",
            BackendKind::Cli => "cli",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "embed" => Ok(Self::Embed),
            "local" => Ok(Self::Local),
            "cli" => Ok(Self::Cli),
            other => Err(ConfigError::UnknownBackend {
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub format: ImageFormat,
    /// Raster scale multiplier. `0` lets the backend use its default (`1`).
    pub scale: f32,
    /// Blank margin around the drawing, in diagram units.
    pub border: f32,
    /// Overall budget for the whole request, session setup and teardown included.
    pub timeout: Duration,
    pub backend: BackendKind,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::Png,
            scale: 1.0,
            border: 0.0,
            timeout: DEFAULT_TIMEOUT,
            backend: BackendKind::Local,
        }
    }
}

impl RenderOptions {
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_border(mut self, border: f32) -> Self {
        self.border = border;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The scale a backend should actually apply.
    pub fn effective_scale(&self) -> f32 {
        if self.scale == 0.0 { 1.0 } else { self.scale }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.scale.is_finite() && self.scale >= 0.0) {
            return Err(Error::invalid_options(format!(
                "scale must be a finite number >= 0, got {}",
                self.scale
            )));
        }
        if !(self.border.is_finite() && self.border >= 0.0) {
            return Err(Error::invalid_options(format!(
                "border must be a finite number >= 0, got {}",
                self.border
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::invalid_options("timeout must be greater than zero"));
        }
        Ok(())
    }
}

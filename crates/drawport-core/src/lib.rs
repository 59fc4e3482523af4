#![forbid(unsafe_code)]

//! Data model, options and error taxonomy shared by every drawport backend.
//!
//! A render turns a [`DiagramDocument`] (draw.io XML, treated as opaque text) into a
//! [`RenderResult`] (encoded image bytes plus mime type). Failures are classified by
//! [`ErrorKind`] (see [`error`]).

pub mod config;
pub mod envelope;
pub mod error;
pub mod image;
pub mod options;
pub mod request;

pub use config::{CliConfig, EmbedConfig, ExportConfig, default_drawio_executable};
pub use envelope::EnvelopeError;
pub use error::{ConfigError, Error, ErrorKind, Result};
pub use image::{PNG_SIGNATURE, is_png};
pub use options::{BackendKind, DEFAULT_TIMEOUT, ImageFormat, RenderOptions};
pub use request::{DiagramDocument, RenderRequest, RenderResult};

#[cfg(test)]
mod tests;

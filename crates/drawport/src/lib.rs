#![deny(unsafe_code)]

//! `drawport` turns draw.io diagram XML into PNG images.
//!
//! The caller picks one of three backends per request:
//! - `embed`: the draw.io embed surface, driven over its JSON message protocol through a bridge
//!   process (see [`process`]) or any other [`EngineLauncher`]
//! - `local`: the statically linked renderer from `drawport-render`
//! - `cli`: the installed draw.io desktop executable
//!
//! ```no_run
//! # async fn demo() -> drawport::Result<()> {
//! use drawport::{DiagramDocument, Pipeline, RenderOptions};
//!
//! let pipeline = Pipeline::default();
//! let doc = DiagramDocument::new(std::fs::read_to_string("diagram.drawio").unwrap_or_default());
//! let png = pipeline.render(&doc, &RenderOptions::default()).await?;
//! assert_eq!(png.mime_type, "image/png");
//! # Ok(())
//! # }
//! ```

pub use drawport_core::*;

pub mod cli;
pub mod engine;
mod group;
pub mod local;
pub mod pipeline;
pub mod process;
pub mod protocol;
mod scratch;

pub use engine::{EngineLauncher, EngineSession};
pub use pipeline::Pipeline;

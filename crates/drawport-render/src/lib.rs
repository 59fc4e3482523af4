#![forbid(unsafe_code)]

//! Statically linked draw.io renderer: `mxGraphModel` XML → SVG → PNG.
//!
//! This is the engine behind drawport's `local` backend. It covers the common subset of the
//! draw.io format (basic shapes, straight and waypoint edges, text labels, groups and
//! containers) without a browser.

pub mod decode;
pub mod model;
pub mod raster;
pub mod style;
pub mod svg;
mod text;

pub use model::GraphModel;
pub use svg::{Canvas, RenderedSvg, SvgOptions};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid diagram XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("document has no diagram page (expected <mxfile><diagram> or <mxGraphModel>)")]
    MissingModel,
    #[error("unexpected root element <{name}>")]
    UnexpectedRoot { name: String },
    #[error("failed to decode compressed diagram: {message}")]
    Compressed { message: String },
    #[error("failed to parse generated SVG: {message}")]
    SvgParse { message: String },
    #[error("failed to allocate a {width}x{height} pixmap")]
    PixmapAlloc { width: u32, height: u32 },
    #[error("failed to encode PNG")]
    PngEncode,
}

impl Error {
    pub(crate) fn compressed(message: impl Into<String>) -> Self {
        Error::Compressed {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub struct RasterOptions {
    pub scale: f32,
    pub border: f32,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            border: 0.0,
        }
    }
}

/// Renders the first page of a draw.io document to SVG.
pub fn render_svg(xml: &str, options: &SvgOptions) -> Result<RenderedSvg> {
    let model_xml = decode::first_page_model(xml)?;
    let model = GraphModel::parse(&model_xml)?;
    tracing::debug!(cells = model.cells.len(), "parsed graph model");
    Ok(svg::render_svg(&model, options))
}

/// Renders the first page of a draw.io document to PNG bytes.
pub fn render_png(xml: &str, options: &RasterOptions) -> Result<Vec<u8>> {
    let svg_options = SvgOptions {
        border: f64::from(options.border.max(0.0)),
        ..Default::default()
    };
    let rendered = render_svg(xml, &svg_options)?;
    let scale = if options.scale > 0.0 {
        options.scale
    } else {
        1.0
    };
    raster::svg_to_png(&rendered.svg, rendered.canvas, scale)
}

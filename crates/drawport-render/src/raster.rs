use std::sync::{Arc, OnceLock};

use crate::svg::Canvas;
use crate::{Error, Result};

/// Upper bound on raster size; larger requests fail instead of attempting the allocation.
const MAX_PIXELS: u64 = 16_384 * 16_384;

fn font_database() -> Arc<usvg::fontdb::Database> {
    static FONTS: OnceLock<Arc<usvg::fontdb::Database>> = OnceLock::new();
    Arc::clone(FONTS.get_or_init(|| {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        tracing::debug!(faces = db.len(), "loaded system fonts");
        Arc::new(db)
    }))
}

/// Rasterizes an SVG laid out on `canvas` to PNG bytes at `scale`.
pub fn svg_to_png(svg: &str, canvas: Canvas, scale: f32) -> Result<Vec<u8>> {
    let mut opt = usvg::Options::default();
    opt.fontdb = font_database();
    // draw.io's default font stack starts with Helvetica; fall back to a common sans face.
    opt.font_family = "Arial".to_string();

    let tree = usvg::Tree::from_str(svg, &opt).map_err(|e| Error::SvgParse {
        message: e.to_string(),
    })?;

    let width_px = ((canvas.width as f32) * scale).ceil().max(1.0) as u32;
    let height_px = ((canvas.height as f32) * scale).ceil().max(1.0) as u32;
    if u64::from(width_px) * u64::from(height_px) > MAX_PIXELS {
        return Err(Error::PixmapAlloc {
            width: width_px,
            height: height_px,
        });
    }

    let mut pixmap = tiny_skia::Pixmap::new(width_px, height_px).ok_or(Error::PixmapAlloc {
        width: width_px,
        height: height_px,
    })?;

    // `usvg` already maps the root viewBox (including its min corner) onto the canvas size, so
    // only the scale is applied here.
    let tree_size = tree.size();
    let sx = width_px as f32 / tree_size.width().max(f32::EPSILON);
    let sy = height_px as f32 / tree_size.height().max(f32::EPSILON);
    let transform = tiny_skia::Transform::from_scale(sx, sy);
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    pixmap.encode_png().map_err(|_| Error::PngEncode)
}

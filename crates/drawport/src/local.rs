use drawport_core::{DiagramDocument, Error, RenderOptions, RenderResult, Result};
use drawport_render::RasterOptions;

/// Renders with the statically linked renderer on the blocking pool.
///
/// On timeout the request fails immediately; the blocking render runs to completion in the
/// background and its output is discarded.
pub async fn render_local(
    document: &DiagramDocument,
    options: &RenderOptions,
) -> Result<RenderResult> {
    let xml = document.as_str().to_string();
    let raster = RasterOptions {
        scale: options.effective_scale(),
        border: options.border,
    };
    let task = tokio::task::spawn_blocking(move || drawport_render::render_png(&xml, &raster));

    let bytes = match tokio::time::timeout(options.timeout, task).await {
        Err(_) => return Err(Error::timeout(options.timeout, "rendering locally")),
        Ok(Err(join)) => return Err(Error::render(format!("local renderer crashed: {join}"))),
        Ok(Ok(Err(e))) => return Err(Error::render(e.to_string())),
        Ok(Ok(Ok(bytes))) => bytes,
    };
    if !options.format.matches_signature(&bytes) {
        return Err(Error::protocol("local renderer produced a non-PNG payload"));
    }
    Ok(RenderResult::new(bytes, options.format))
}

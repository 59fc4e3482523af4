use std::collections::HashMap;
use std::fmt::Write as _;

use crate::model::{Cell, CellKind, GraphModel, Point, Rect};
use crate::style::{Shape, Style};
use crate::text::{escape_xml, html_label_lines, plain_label_lines};

#[derive(Debug, Clone)]
pub struct SvgOptions {
    /// Blank margin added on every side of the drawing bounds.
    pub border: f64,
    pub font_family: String,
    pub default_font_size: f64,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            border: 0.0,
            font_family: "Helvetica, Arial, sans-serif".to_string(),
            default_font_size: 12.0,
        }
    }
}

/// The canvas an SVG was laid out on, in diagram units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Canvas {
    pub min_x: f64,
    pub min_y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone)]
pub struct RenderedSvg {
    pub svg: String,
    pub canvas: Canvas,
}

struct VertexItem<'a> {
    cell: &'a Cell,
    bounds: Rect,
    shape: Shape,
}

struct EdgeItem<'a> {
    cell: &'a Cell,
    route: Vec<Point>,
    start_arrow: bool,
    end_arrow: bool,
}

struct EdgeLabel<'a> {
    style: &'a Style,
    lines: Vec<String>,
    /// Position along the route in `[-1, 1]`: source end, middle, target end.
    position: f64,
}

pub fn render_svg(model: &GraphModel, options: &SvgOptions) -> RenderedSvg {
    let mut vertices = Vec::new();
    let mut edges = Vec::new();
    let mut edge_labels: HashMap<&str, Vec<EdgeLabel<'_>>> = HashMap::new();

    for cell in &model.cells {
        match &cell.kind {
            CellKind::Vertex => {
                let parent_edge = cell
                    .parent
                    .as_deref()
                    .and_then(|id| model.cell(id))
                    .filter(|p| p.is_edge());
                if let Some(edge) = parent_edge {
                    let lines = label_lines(cell);
                    if !lines.is_empty() {
                        edge_labels.entry(edge.id.as_str()).or_default().push(EdgeLabel {
                            style: &cell.style,
                            lines,
                            position: cell.geometry.bounds.x.clamp(-1.0, 1.0),
                        });
                    }
                    continue;
                }
                if cell.geometry.relative {
                    continue;
                }
                vertices.push(VertexItem {
                    cell,
                    bounds: model.absolute_bounds(cell),
                    shape: cell.style.shape(),
                });
            }
            CellKind::Edge { .. } => {
                if let Some(route) = edge_route(model, cell) {
                    let end_arrow = cell
                        .style
                        .get("endArrow")
                        .is_none_or(|v| !v.eq_ignore_ascii_case("none"));
                    let start_arrow = cell
                        .style
                        .get("startArrow")
                        .is_some_and(|v| !v.eq_ignore_ascii_case("none"));
                    edges.push(EdgeItem {
                        cell,
                        route,
                        start_arrow,
                        end_arrow,
                    });
                }
            }
            CellKind::Structural => {}
        }
    }

    let canvas = compute_canvas(&vertices, &edges, options.border.max(0.0));

    let mut out = String::new();
    let _ = writeln!(
        &mut out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="{} {} {} {}">"#,
        fmt(canvas.width),
        fmt(canvas.height),
        fmt(canvas.min_x),
        fmt(canvas.min_y),
        fmt(canvas.width),
        fmt(canvas.height)
    );
    if let Some(bg) = &model.background {
        let _ = writeln!(
            &mut out,
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}"/>"#,
            fmt(canvas.min_x),
            fmt(canvas.min_y),
            fmt(canvas.width),
            fmt(canvas.height),
            escape_xml(bg)
        );
    }

    // mxGraph paints in document order; edges and vertices interleave.
    let mut vertex_iter = vertices.iter().peekable();
    let mut edge_iter = edges.iter().peekable();
    for cell in &model.cells {
        if vertex_iter.peek().is_some_and(|v| std::ptr::eq(v.cell, cell)) {
            if let Some(v) = vertex_iter.next() {
                render_vertex(&mut out, v, options);
            }
        } else if edge_iter.peek().is_some_and(|e| std::ptr::eq(e.cell, cell)) {
            if let Some(e) = edge_iter.next() {
                let labels = edge_labels.get(e.cell.id.as_str());
                render_edge(&mut out, e, labels.map(Vec::as_slice), options);
            }
        }
    }

    out.push_str("</svg>\n");
    RenderedSvg { svg: out, canvas }
}

fn label_lines(cell: &Cell) -> Vec<String> {
    if cell.style.is_html() {
        html_label_lines(&cell.label)
    } else {
        plain_label_lines(&cell.label)
    }
}

fn compute_canvas(vertices: &[VertexItem<'_>], edges: &[EdgeItem<'_>], border: f64) -> Canvas {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    let mut include = |x: f64, y: f64| {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    };

    for v in vertices {
        if v.shape == Shape::Group {
            continue;
        }
        include(v.bounds.x, v.bounds.y);
        include(v.bounds.x + v.bounds.width, v.bounds.y + v.bounds.height);
    }
    for e in edges {
        for p in &e.route {
            include(p.x, p.y);
        }
    }

    // Rasterizers reject zero-sized documents, so the canvas is never smaller than one unit.
    if !(min_x.is_finite() && min_y.is_finite()) {
        // Nothing drawable: a blank canvas of just the border.
        return Canvas {
            min_x: 0.0,
            min_y: 0.0,
            width: (border * 2.0).max(1.0),
            height: (border * 2.0).max(1.0),
        };
    }

    Canvas {
        min_x: min_x - border,
        min_y: min_y - border,
        width: ((max_x - min_x) + border * 2.0).max(1.0),
        height: ((max_y - min_y) + border * 2.0).max(1.0),
    }
}

fn terminal_shape(model: &GraphModel, id: Option<&str>) -> Option<(Rect, Shape)> {
    let cell = model.cell(id?)?;
    if !cell.is_vertex() || cell.geometry.relative {
        return None;
    }
    Some((model.absolute_bounds(cell), cell.style.shape()))
}

/// The polyline an edge is drawn along, clipped to its terminal shapes.
fn edge_route(model: &GraphModel, cell: &Cell) -> Option<Vec<Point>> {
    let CellKind::Edge { source, target } = &cell.kind else {
        return None;
    };
    let offset = model.parent_offset(cell);
    let shift = |p: Point| Point::new(p.x + offset.x, p.y + offset.y);

    let source = terminal_shape(model, source.as_deref());
    let target = terminal_shape(model, target.as_deref());
    let waypoints: Vec<Point> = cell.geometry.points.iter().copied().map(shift).collect();

    let source_anchor = source
        .map(|(r, _)| r.center())
        .or(cell.geometry.source_point.map(shift))?;
    let target_anchor = target
        .map(|(r, _)| r.center())
        .or(cell.geometry.target_point.map(shift))?;

    let start = match source {
        Some((rect, shape)) => {
            let toward = waypoints.first().copied().unwrap_or(target_anchor);
            clip_to_shape(rect, shape, toward)
        }
        None => source_anchor,
    };
    let end = match target {
        Some((rect, shape)) => {
            let toward = waypoints.last().copied().unwrap_or(source_anchor);
            clip_to_shape(rect, shape, toward)
        }
        None => target_anchor,
    };

    let mut route = Vec::with_capacity(waypoints.len() + 2);
    route.push(start);
    route.extend(waypoints);
    route.push(end);
    Some(route)
}

/// Where the ray from the shape's center toward `toward` leaves the shape outline.
fn clip_to_shape(rect: Rect, shape: Shape, toward: Point) -> Point {
    let c = rect.center();
    let dx = toward.x - c.x;
    let dy = toward.y - c.y;
    let a = rect.width / 2.0;
    let b = rect.height / 2.0;
    if a <= 0.0 || b <= 0.0 || (dx.abs() < 1e-9 && dy.abs() < 1e-9) {
        return c;
    }
    let t = match shape {
        Shape::Ellipse => 1.0 / ((dx / a).powi(2) + (dy / b).powi(2)).sqrt(),
        Shape::Rhombus => 1.0 / (dx.abs() / a + dy.abs() / b),
        _ => 1.0 / (dx.abs() / a).max(dy.abs() / b),
    };
    let t = t.min(1.0);
    Point::new(c.x + dx * t, c.y + dy * t)
}

fn paint_attrs(style: &Style, fill_default: &'static str) -> String {
    let mut attrs = String::new();
    let fill = style.color("fillColor", fill_default);
    let stroke = style.color("strokeColor", "#000000");
    let _ = write!(
        &mut attrs,
        r#" fill="{}" stroke="{}" stroke-width="{}""#,
        escape_xml(fill.as_deref().unwrap_or("none")),
        escape_xml(stroke.as_deref().unwrap_or("none")),
        fmt(style.get_f64("strokeWidth").unwrap_or(1.0).max(0.0))
    );
    if style.flag("dashed") {
        let pattern = style.get("dashPattern").unwrap_or("3 3");
        let _ = write!(&mut attrs, r#" stroke-dasharray="{}""#, escape_xml(pattern));
    }
    if let Some(opacity) = style.opacity() {
        let _ = write!(&mut attrs, r#" opacity="{}""#, fmt(opacity));
    }
    attrs
}

fn render_vertex(out: &mut String, v: &VertexItem<'_>, options: &SvgOptions) {
    let r = v.bounds;
    let style = &v.cell.style;
    let _ = write!(out, r#"<g data-cell-id="{}">"#, escape_xml(&v.cell.id));

    match v.shape {
        Shape::Group | Shape::Text => {}
        Shape::Ellipse => {
            let c = r.center();
            let _ = write!(
                out,
                r#"<ellipse cx="{}" cy="{}" rx="{}" ry="{}"{}/>"#,
                fmt(c.x),
                fmt(c.y),
                fmt(r.width / 2.0),
                fmt(r.height / 2.0),
                paint_attrs(style, "#ffffff")
            );
        }
        Shape::Rhombus => {
            let c = r.center();
            let _ = write!(
                out,
                r#"<polygon points="{},{} {},{} {},{} {},{}"{}/>"#,
                fmt(c.x),
                fmt(r.y),
                fmt(r.x + r.width),
                fmt(c.y),
                fmt(c.x),
                fmt(r.y + r.height),
                fmt(r.x),
                fmt(c.y),
                paint_attrs(style, "#ffffff")
            );
        }
        Shape::Rectangle | Shape::Swimlane => {
            let radius = if style.flag("rounded") {
                let arc = style.get_f64("arcSize").unwrap_or(15.0);
                r.width.min(r.height) * arc / 100.0
            } else {
                0.0
            };
            let _ = write!(
                out,
                r#"<rect x="{}" y="{}" width="{}" height="{}" rx="{}"{}/>"#,
                fmt(r.x),
                fmt(r.y),
                fmt(r.width),
                fmt(r.height),
                fmt(radius),
                paint_attrs(style, "#ffffff")
            );
            if v.shape == Shape::Swimlane {
                let header = swimlane_header(style, r);
                let _ = write!(
                    out,
                    r#"<line x1="{}" y1="{}" x2="{}" y2="{}"{}/>"#,
                    fmt(r.x),
                    fmt(header.y + header.height),
                    fmt(r.x + r.width),
                    fmt(header.y + header.height),
                    paint_attrs(style, "none")
                );
            }
        }
    }

    let lines = label_lines(v.cell);
    if !lines.is_empty() && v.shape != Shape::Group {
        let area = if v.shape == Shape::Swimlane {
            swimlane_header(style, r)
        } else {
            r
        };
        let anchor = label_anchor(style, area, options);
        write_text(out, style, &lines, anchor, options, "#000000");
    }

    out.push_str("</g>\n");
}

fn swimlane_header(style: &Style, r: Rect) -> Rect {
    let start = style.get_f64("startSize").unwrap_or(23.0).clamp(0.0, r.height);
    Rect {
        height: start,
        ..r
    }
}

fn font_size(style: &Style, options: &SvgOptions) -> f64 {
    style
        .get_f64("fontSize")
        .filter(|s| *s > 0.0)
        .unwrap_or(options.default_font_size)
}

struct TextAnchor {
    x: f64,
    y: f64,
    anchor: &'static str,
}

fn label_anchor(style: &Style, area: Rect, options: &SvgOptions) -> TextAnchor {
    let size = font_size(style, options);
    let (x, anchor) = match style.get("align") {
        Some("left") => (area.x + 2.0, "start"),
        Some("right") => (area.x + area.width - 2.0, "end"),
        _ => (area.x + area.width / 2.0, "middle"),
    };
    let y = match style.get("verticalAlign") {
        Some("top") => area.y + size,
        Some("bottom") => area.y + area.height - size,
        _ => area.y + area.height / 2.0,
    };
    TextAnchor { x, y, anchor }
}

fn write_text(
    out: &mut String,
    style: &Style,
    lines: &[String],
    at: TextAnchor,
    options: &SvgOptions,
    color_default: &'static str,
) {
    let size = font_size(style, options);
    let family = style
        .get("fontFamily")
        .unwrap_or(options.font_family.as_str());
    let color = style.color("fontColor", color_default);
    let font_style = style.get_f64("fontStyle").unwrap_or(0.0) as u32;
    let weight = if font_style & 1 != 0 { "bold" } else { "normal" };
    let slant = if font_style & 2 != 0 { "italic" } else { "normal" };

    let n = lines.len() as f64;
    let line_height = size * 1.2;
    let _ = write!(
        out,
        r#"<text x="{}" y="{}" fill="{}" font-family="{}" font-size="{}" font-weight="{}" font-style="{}" text-anchor="{}" dominant-baseline="central">"#,
        fmt(at.x),
        fmt(at.y),
        escape_xml(color.as_deref().unwrap_or(color_default)),
        escape_xml(family),
        fmt(size),
        weight,
        slant,
        at.anchor
    );
    for (idx, line) in lines.iter().enumerate() {
        let dy = if idx == 0 {
            -(line_height * (n - 1.0)) / 2.0
        } else {
            line_height
        };
        let _ = write!(
            out,
            r#"<tspan x="{}" dy="{}">{}</tspan>"#,
            fmt(at.x),
            fmt(dy),
            escape_xml(line)
        );
    }
    out.push_str("</text>");
}

fn render_edge(
    out: &mut String,
    e: &EdgeItem<'_>,
    labels: Option<&[EdgeLabel<'_>]>,
    options: &SvgOptions,
) {
    let style = &e.cell.style;
    let stroke_width = style.get_f64("strokeWidth").unwrap_or(1.0).max(0.0);
    let stroke = style.color("strokeColor", "#000000");
    let stroke = stroke.as_deref().unwrap_or("none");

    let mut route = e.route.clone();
    let mut heads = Vec::new();
    if e.end_arrow {
        if let Some(head) = arrow_head(&mut route, false, style.get_f64("endSize"), stroke_width) {
            heads.push(head);
        }
    }
    if e.start_arrow {
        if let Some(head) = arrow_head(&mut route, true, style.get_f64("startSize"), stroke_width)
        {
            heads.push(head);
        }
    }

    let _ = write!(out, r#"<g data-cell-id="{}">"#, escape_xml(&e.cell.id));
    out.push_str(r#"<polyline fill="none" points=""#);
    for (idx, p) in route.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{},{}", fmt(p.x), fmt(p.y));
    }
    let _ = write!(
        out,
        r#"" stroke="{}" stroke-width="{}""#,
        escape_xml(stroke),
        fmt(stroke_width)
    );
    if style.flag("dashed") {
        let pattern = style.get("dashPattern").unwrap_or("3 3");
        let _ = write!(out, r#" stroke-dasharray="{}""#, escape_xml(pattern));
    }
    if let Some(opacity) = style.opacity() {
        let _ = write!(out, r#" opacity="{}""#, fmt(opacity));
    }
    out.push_str("/>");

    for head in heads {
        let _ = write!(out, r#"<polygon points=""#);
        for (idx, p) in head.iter().enumerate() {
            if idx > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{},{}", fmt(p.x), fmt(p.y));
        }
        let _ = write!(
            out,
            r#"" fill="{}" stroke="{}" stroke-width="{}"/>"#,
            escape_xml(stroke),
            escape_xml(stroke),
            fmt(stroke_width)
        );
    }

    let own = label_lines(e.cell);
    if !own.is_empty() {
        let at = point_along(&e.route, 0.5);
        write_edge_label(out, style, &own, at, options);
    }
    for label in labels.unwrap_or_default() {
        let at = point_along(&e.route, (label.position + 1.0) / 2.0);
        write_edge_label(out, label.style, &label.lines, at, options);
    }

    out.push_str("</g>\n");
}

fn write_edge_label(
    out: &mut String,
    style: &Style,
    lines: &[String],
    at: Point,
    options: &SvgOptions,
) {
    let size = font_size(style, options);
    if let Some(bg) = style.color("labelBackgroundColor", "#ffffff") {
        // Approximate text extents; the rasterizer measures real glyphs only at paint time.
        let widest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as f64;
        let w = widest * size * 0.6 + 4.0;
        let h = lines.len() as f64 * size * 1.2 + 2.0;
        let _ = write!(
            out,
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}"/>"#,
            fmt(at.x - w / 2.0),
            fmt(at.y - h / 2.0),
            fmt(w),
            fmt(h),
            escape_xml(&bg)
        );
    }
    let anchor = TextAnchor {
        x: at.x,
        y: at.y,
        anchor: "middle",
    };
    write_text(out, style, lines, anchor, options, "#000000");
}

/// Shortens the route at one end to make room for an arrow head and returns the head triangle.
fn arrow_head(
    route: &mut [Point],
    at_start: bool,
    size: Option<f64>,
    stroke_width: f64,
) -> Option<[Point; 3]> {
    let n = route.len();
    if n < 2 {
        return None;
    }
    let (tip_idx, prev_idx) = if at_start { (0, 1) } else { (n - 1, n - 2) };
    let tip = route[tip_idx];
    let prev = route[prev_idx];
    let dx = tip.x - prev.x;
    let dy = tip.y - prev.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1e-9 {
        return None;
    }
    let (ux, uy) = (dx / len, dy / len);
    let size = size.unwrap_or(6.0).max(1.0) + stroke_width;
    let length = (size * 1.5).min(len);
    let half = size * 0.6;

    let base = Point::new(tip.x - ux * length, tip.y - uy * length);
    route[tip_idx] = base;
    Some([
        tip,
        Point::new(base.x - uy * half, base.y + ux * half),
        Point::new(base.x + uy * half, base.y - ux * half),
    ])
}

/// The point at `fraction` (0..=1) of the route's total length.
fn point_along(route: &[Point], fraction: f64) -> Point {
    let total: f64 = route
        .windows(2)
        .map(|w| ((w[1].x - w[0].x).powi(2) + (w[1].y - w[0].y).powi(2)).sqrt())
        .sum();
    let Some(first) = route.first().copied() else {
        return Point::default();
    };
    if total <= 0.0 {
        return first;
    }
    let mut remaining = total * fraction.clamp(0.0, 1.0);
    for w in route.windows(2) {
        let seg = ((w[1].x - w[0].x).powi(2) + (w[1].y - w[0].y).powi(2)).sqrt();
        if remaining <= seg && seg > 0.0 {
            let t = remaining / seg;
            return Point::new(w[0].x + (w[1].x - w[0].x) * t, w[0].y + (w[1].y - w[0].y) * t);
        }
        remaining -= seg;
    }
    route.last().copied().unwrap_or(first)
}

fn fmt(v: f64) -> String {
    if !v.is_finite() {
        return "0".to_string();
    }
    let mut v = if v.abs() < 1e-9 { 0.0 } else { v };
    let nearest = v.round();
    if (v - nearest).abs() < 1e-6 {
        v = nearest;
    } else {
        v = (v * 1000.0).round() / 1000.0;
    }
    let s = v.to_string();
    if s == "-0" { "0".to_string() } else { s }
}

use std::collections::HashMap;

/// A parsed mxGraph style string such as `ellipse;whiteSpace=wrap;html=1;fillColor=#dae8fc;`.
///
/// Bare tokens without `=` name a base style (`ellipse`, `text`, `rhombus`, `edgeLabel`, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Style {
    bases: Vec<String>,
    values: HashMap<String, String>,
}

/// The outline a vertex is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Rectangle,
    Ellipse,
    Rhombus,
    Text,
    Swimlane,
    /// Invisible containers (`group`) that only offset their children.
    Group,
}

impl Style {
    pub fn parse(raw: &str) -> Self {
        let mut style = Style::default();
        for token in raw.split(';') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.split_once('=') {
                Some((key, value)) => {
                    style
                        .values
                        .insert(key.trim().to_string(), value.trim().to_string());
                }
                None => style.bases.push(token.to_string()),
            }
        }
        style
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key)?.parse::<f64>().ok().filter(|v| v.is_finite())
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some("1") | Some("true"))
    }

    pub fn has_base(&self, name: &str) -> bool {
        self.bases.iter().any(|b| b == name)
    }

    pub fn shape(&self) -> Shape {
        let name = self
            .get("shape")
            .or_else(|| self.bases.first().map(String::as_str))
            .unwrap_or("rectangle");
        match name {
            "ellipse" | "doubleEllipse" => Shape::Ellipse,
            "rhombus" => Shape::Rhombus,
            "text" | "edgeLabel" | "label" => Shape::Text,
            "swimlane" => Shape::Swimlane,
            "group" => Shape::Group,
            _ => Shape::Rectangle,
        }
    }

    /// A color value, or `None` when the style disables it with `none`.
    pub fn color(&self, key: &str, default: &'static str) -> Option<String> {
        match self.get(key) {
            Some(v) if v.eq_ignore_ascii_case("none") => None,
            Some(v) if !v.is_empty() && v != "default" => Some(v.to_string()),
            _ => Some(default.to_string()),
        }
    }

    /// `opacity` is expressed as a percentage in mxGraph styles.
    pub fn opacity(&self) -> Option<f64> {
        self.get_f64("opacity")
            .map(|pct| (pct / 100.0).clamp(0.0, 1.0))
            .filter(|o| *o < 1.0)
    }

    pub fn is_html(&self) -> bool {
        self.flag("html")
    }
}

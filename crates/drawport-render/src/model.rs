use std::collections::HashMap;

use crate::style::Style;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Rect {
        Rect {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub bounds: Rect,
    pub relative: bool,
    pub source_point: Option<Point>,
    pub target_point: Option<Point>,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellKind {
    Vertex,
    Edge {
        source: Option<String>,
        target: Option<String>,
    },
    /// Root and layer cells: structural only.
    Structural,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub id: String,
    pub parent: Option<String>,
    pub label: String,
    pub style: Style,
    pub kind: CellKind,
    pub geometry: Geometry,
}

impl Cell {
    pub fn is_vertex(&self) -> bool {
        matches!(self.kind, CellKind::Vertex)
    }

    pub fn is_edge(&self) -> bool {
        matches!(self.kind, CellKind::Edge { .. })
    }
}

/// The cells of one diagram page, in document (z) order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphModel {
    pub background: Option<String>,
    pub cells: Vec<Cell>,
    index: HashMap<String, usize>,
}

/// Parent chains deeper than this are treated as cycles.
const MAX_NESTING: usize = 64;

impl GraphModel {
    pub fn parse(model_xml: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(model_xml)?;
        let root = doc.root_element();
        if !root.has_tag_name("mxGraphModel") {
            return Err(Error::UnexpectedRoot {
                name: root.tag_name().name().to_string(),
            });
        }

        let background = root
            .attribute("background")
            .map(str::trim)
            .filter(|bg| !bg.is_empty() && !bg.eq_ignore_ascii_case("none"))
            .map(str::to_string);

        let mut cells = Vec::new();
        if let Some(cell_root) = root.children().find(|n| n.has_tag_name("root")) {
            for node in cell_root.children().filter(|n| n.is_element()) {
                if let Some(cell) = parse_cell(node) {
                    cells.push(cell);
                }
            }
        }

        let index = cells
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        Ok(Self {
            background,
            cells,
            index,
        })
    }

    pub fn cell(&self, id: &str) -> Option<&Cell> {
        self.index.get(id).map(|&i| &self.cells[i])
    }

    /// Sum of the origins of all vertex ancestors: child geometry in mxGraph is relative to a
    /// vertex parent (group, container, swimlane) and absolute under a layer.
    pub fn parent_offset(&self, cell: &Cell) -> Point {
        let mut offset = Point::default();
        let mut parent = cell.parent.as_deref();
        for _ in 0..MAX_NESTING {
            let Some(p) = parent.and_then(|id| self.cell(id)) else {
                break;
            };
            if p.is_vertex() && !p.geometry.relative {
                offset.x += p.geometry.bounds.x;
                offset.y += p.geometry.bounds.y;
            }
            parent = p.parent.as_deref();
        }
        offset
    }

    /// A vertex's bounds in page coordinates.
    pub fn absolute_bounds(&self, cell: &Cell) -> Rect {
        let offset = self.parent_offset(cell);
        cell.geometry.bounds.translate(offset.x, offset.y)
    }
}

fn parse_cell(node: roxmltree::Node<'_, '_>) -> Option<Cell> {
    // `UserObject` / `object` wrappers carry the id and label; the inner mxCell carries the rest.
    let (wrapper, cell) = match node.tag_name().name() {
        "mxCell" => (None, node),
        "UserObject" | "object" => (
            Some(node),
            node.children().find(|n| n.has_tag_name("mxCell"))?,
        ),
        _ => return None,
    };

    let id = wrapper
        .and_then(|w| w.attribute("id"))
        .or_else(|| cell.attribute("id"))?
        .to_string();
    let label = wrapper
        .and_then(|w| w.attribute("label"))
        .or_else(|| cell.attribute("value"))
        .unwrap_or_default()
        .to_string();

    let kind = if cell.attribute("vertex") == Some("1") {
        CellKind::Vertex
    } else if cell.attribute("edge") == Some("1") {
        CellKind::Edge {
            source: cell.attribute("source").map(str::to_string),
            target: cell.attribute("target").map(str::to_string),
        }
    } else {
        CellKind::Structural
    };

    let geometry = cell
        .children()
        .find(|n| n.has_tag_name("mxGeometry"))
        .map(parse_geometry)
        .unwrap_or_default();

    Some(Cell {
        id,
        parent: cell.attribute("parent").map(str::to_string),
        label,
        style: Style::parse(cell.attribute("style").unwrap_or_default()),
        kind,
        geometry,
    })
}

fn attr_f64(node: roxmltree::Node<'_, '_>, name: &str) -> f64 {
    node.attribute(name)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn parse_point(node: roxmltree::Node<'_, '_>) -> Point {
    Point::new(attr_f64(node, "x"), attr_f64(node, "y"))
}

fn parse_geometry(node: roxmltree::Node<'_, '_>) -> Geometry {
    let mut geometry = Geometry {
        bounds: Rect {
            x: attr_f64(node, "x"),
            y: attr_f64(node, "y"),
            width: attr_f64(node, "width").max(0.0),
            height: attr_f64(node, "height").max(0.0),
        },
        relative: node.attribute("relative") == Some("1"),
        ..Default::default()
    };

    for child in node.children().filter(|n| n.is_element()) {
        match (child.tag_name().name(), child.attribute("as")) {
            ("mxPoint", Some("sourcePoint")) => geometry.source_point = Some(parse_point(child)),
            ("mxPoint", Some("targetPoint")) => geometry.target_point = Some(parse_point(child)),
            ("Array", Some("points")) => {
                geometry.points = child
                    .children()
                    .filter(|n| n.has_tag_name("mxPoint"))
                    .map(parse_point)
                    .collect();
            }
            _ => {}
        }
    }

    geometry
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r##"<mxGraphModel background="#fafafa">
      <root>
        <mxCell id="0"/>
        <mxCell id="1" parent="0"/>
        <mxCell id="g" style="group" vertex="1" parent="1">
          <mxGeometry x="100" y="50" width="200" height="100" as="geometry"/>
        </mxCell>
        <mxCell id="a" value="A" style="rounded=1" vertex="1" parent="g">
          <mxGeometry x="10" y="20" width="40" height="30" as="geometry"/>
        </mxCell>
        <UserObject id="b" label="B &amp; co">
          <mxCell style="ellipse" vertex="1" parent="1">
            <mxGeometry x="0" y="0" width="10" height="10" as="geometry"/>
          </mxCell>
        </UserObject>
        <mxCell id="e" edge="1" source="a" target="b" parent="1">
          <mxGeometry relative="1" as="geometry">
            <mxPoint x="1" y="2" as="sourcePoint"/>
            <Array as="points"><mxPoint x="5" y="6"/><mxPoint x="7" y="8"/></Array>
          </mxGeometry>
        </mxCell>
      </root>
    </mxGraphModel>"##;

    #[test]
    fn parses_cells_in_document_order() {
        let model = GraphModel::parse(MODEL).unwrap();
        let ids: Vec<&str> = model.cells.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["0", "1", "g", "a", "b", "e"]);
        assert_eq!(model.background.as_deref(), Some("#fafafa"));
    }

    #[test]
    fn user_object_wrapper_supplies_id_and_label() {
        let model = GraphModel::parse(MODEL).unwrap();
        let b = model.cell("b").unwrap();
        assert_eq!(b.label, "B & co");
        assert!(b.is_vertex());
    }

    #[test]
    fn child_bounds_are_offset_by_vertex_parents() {
        let model = GraphModel::parse(MODEL).unwrap();
        let a = model.cell("a").unwrap();
        assert_eq!(
            model.absolute_bounds(a),
            Rect {
                x: 110.0,
                y: 70.0,
                width: 40.0,
                height: 30.0
            }
        );
    }

    #[test]
    fn edge_geometry_keeps_terminal_points_and_waypoints() {
        let model = GraphModel::parse(MODEL).unwrap();
        let e = model.cell("e").unwrap();
        assert_eq!(
            e.kind,
            CellKind::Edge {
                source: Some("a".to_string()),
                target: Some("b".to_string())
            }
        );
        assert_eq!(e.geometry.source_point, Some(Point::new(1.0, 2.0)));
        assert_eq!(e.geometry.target_point, None);
        assert_eq!(
            e.geometry.points,
            vec![Point::new(5.0, 6.0), Point::new(7.0, 8.0)]
        );
    }

    #[test]
    fn parent_cycles_do_not_hang() {
        let xml = r#"<mxGraphModel><root>
            <mxCell id="x" vertex="1" parent="y"><mxGeometry x="1" width="1" height="1" as="geometry"/></mxCell>
            <mxCell id="y" vertex="1" parent="x"><mxGeometry x="1" width="1" height="1" as="geometry"/></mxCell>
        </root></mxGraphModel>"#;
        let model = GraphModel::parse(xml).unwrap();
        let x = model.cell("x").unwrap();
        assert!(model.parent_offset(x).x.is_finite());
    }
}

//! JSON 形式的 CAD 导出（实体列表 + 块表）。
//!
//! 不同版本的导出工具对 LINE 的端点字段命名不同：有的给出 `start`/`end`，
//! 有的给出两个元素的 `vertices`，两种都接受。角度以度为单位。

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use floorplan_core::{
    document::{
        Arc, BlockDefinition, BlockReference, Circle, Dimension, Document, Entity, Line,
        PointEntity, Polyline, PolylineVertex, Text,
    },
    geometry::{Point2, Vector2},
};

#[derive(Debug, Deserialize)]
struct JsonCadDocument {
    #[serde(default)]
    entities: Vec<Value>,
    #[serde(default)]
    blocks: Option<JsonBlocks>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonBlocks {
    List(Vec<JsonBlock>),
    Map(BTreeMap<String, JsonBlock>),
}

#[derive(Debug, Deserialize)]
struct JsonBlock {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    position: Option<JsonPoint>,
    #[serde(default)]
    entities: Vec<Value>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct JsonPoint {
    x: f64,
    y: f64,
}

impl From<JsonPoint> for Point2 {
    fn from(value: JsonPoint) -> Self {
        Point2::new(value.x, value.y)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum JsonEntity {
    #[serde(rename = "LINE")]
    Line {
        #[serde(default)]
        layer: Option<String>,
        #[serde(default)]
        start: Option<JsonPoint>,
        #[serde(default)]
        end: Option<JsonPoint>,
        #[serde(default)]
        vertices: Vec<JsonPoint>,
    },
    #[serde(rename = "LWPOLYLINE", alias = "POLYLINE")]
    Polyline {
        #[serde(default)]
        layer: Option<String>,
        vertices: Vec<JsonVertex>,
        #[serde(default, alias = "shape")]
        closed: bool,
    },
    #[serde(rename = "ARC")]
    Arc {
        #[serde(default)]
        layer: Option<String>,
        center: JsonPoint,
        radius: f64,
        #[serde(rename = "startAngle")]
        start_angle: f64,
        #[serde(rename = "endAngle")]
        end_angle: f64,
    },
    #[serde(rename = "CIRCLE")]
    Circle {
        #[serde(default)]
        layer: Option<String>,
        center: JsonPoint,
        radius: f64,
    },
    #[serde(rename = "INSERT")]
    Insert {
        #[serde(default)]
        layer: Option<String>,
        name: String,
        position: JsonPoint,
        #[serde(default)]
        rotation: f64,
        #[serde(default, rename = "xScale")]
        x_scale: Option<f64>,
        #[serde(default, rename = "yScale")]
        y_scale: Option<f64>,
    },
    #[serde(rename = "TEXT", alias = "MTEXT")]
    Text {
        #[serde(default)]
        layer: Option<String>,
        #[serde(alias = "startPoint")]
        position: JsonPoint,
        #[serde(default)]
        text: String,
        #[serde(default, rename = "textHeight", alias = "height")]
        height: f64,
        #[serde(default)]
        rotation: f64,
    },
    #[serde(rename = "DIMENSION")]
    Dimension {
        #[serde(default)]
        layer: Option<String>,
        #[serde(rename = "anchorPoint")]
        anchor_point: JsonPoint,
        #[serde(default, rename = "middleOfText")]
        middle_of_text: Option<JsonPoint>,
        #[serde(default)]
        text: Option<String>,
    },
    #[serde(rename = "POINT")]
    Point {
        #[serde(default)]
        layer: Option<String>,
        position: JsonPoint,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct JsonVertex {
    x: f64,
    y: f64,
    #[serde(default)]
    bulge: f64,
}

fn layer_name(layer: Option<String>) -> String {
    layer
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "0".to_string())
}

impl JsonEntity {
    /// 转换为核心实体；字段不完整时返回 `None`。
    fn into_entity(self) -> Option<Entity> {
        let entity = match self {
            JsonEntity::Line {
                layer,
                start,
                end,
                vertices,
            } => {
                let (start, end) = match (start, end) {
                    (Some(start), Some(end)) => (start, end),
                    _ => match vertices.as_slice() {
                        [first, second, ..] => (*first, *second),
                        _ => return None,
                    },
                };
                Entity::Line(Line {
                    start: start.into(),
                    end: end.into(),
                    layer: layer_name(layer),
                })
            }
            JsonEntity::Polyline {
                layer,
                vertices,
                closed,
            } => {
                if vertices.is_empty() {
                    return None;
                }
                Entity::Polyline(Polyline {
                    vertices: vertices
                        .into_iter()
                        .map(|v| PolylineVertex::with_bulge(Point2::new(v.x, v.y), v.bulge))
                        .collect(),
                    is_closed: closed,
                    layer: layer_name(layer),
                })
            }
            JsonEntity::Arc {
                layer,
                center,
                radius,
                start_angle,
                end_angle,
            } => Entity::Arc(Arc {
                center: center.into(),
                radius,
                start_angle: start_angle.to_radians(),
                end_angle: end_angle.to_radians(),
                layer: layer_name(layer),
            }),
            JsonEntity::Circle {
                layer,
                center,
                radius,
            } => Entity::Circle(Circle {
                center: center.into(),
                radius,
                layer: layer_name(layer),
            }),
            JsonEntity::Insert {
                layer,
                name,
                position,
                rotation,
                x_scale,
                y_scale,
            } => {
                let sx = x_scale.unwrap_or(1.0);
                Entity::BlockReference(BlockReference {
                    name,
                    insert: position.into(),
                    scale: Vector2::new(sx, y_scale.unwrap_or(sx)),
                    rotation: rotation.to_radians(),
                    layer: layer_name(layer),
                })
            }
            JsonEntity::Text {
                layer,
                position,
                text,
                height,
                rotation,
            } => Entity::Text(Text {
                insert: position.into(),
                content: text,
                height,
                rotation: rotation.to_radians(),
                layer: layer_name(layer),
            }),
            JsonEntity::Dimension {
                layer,
                anchor_point,
                middle_of_text,
                text,
            } => Entity::Dimension(Dimension {
                definition_point: anchor_point.into(),
                text_midpoint: middle_of_text.unwrap_or(anchor_point).into(),
                text,
                layer: layer_name(layer),
            }),
            JsonEntity::Point { layer, position } => Entity::Point(PointEntity {
                position: position.into(),
                layer: layer_name(layer),
            }),
            JsonEntity::Unsupported => return None,
        };
        Some(entity)
    }
}

fn convert_entities(values: Vec<Value>) -> Vec<Entity> {
    let mut entities = Vec::with_capacity(values.len());
    for value in values {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("<missing>")
            .to_string();
        match serde_json::from_value::<JsonEntity>(value) {
            Ok(parsed) => match parsed.into_entity() {
                Some(entity) => entities.push(entity),
                None => debug!(kind = %kind, "跳过不完整或不支持的实体"),
            },
            Err(err) => debug!(kind = %kind, error = %err, "跳过无法解析的实体"),
        }
    }
    entities
}

/// 解析 JSON 文本为 CAD 文档。顶层结构错误时返回 `serde_json::Error`。
pub(crate) fn parse_json_cad(source: &str) -> Result<Document, serde_json::Error> {
    let raw: JsonCadDocument = serde_json::from_str(source)?;
    let mut document = Document::new();

    for entity in convert_entities(raw.entities) {
        document.add_entity(entity);
    }

    let blocks: Vec<(Option<String>, JsonBlock)> = match raw.blocks {
        Some(JsonBlocks::List(list)) => list.into_iter().map(|block| (None, block)).collect(),
        Some(JsonBlocks::Map(map)) => map.into_iter().map(|(key, block)| (Some(key), block)).collect(),
        None => Vec::new(),
    };
    for (key, block) in blocks {
        let Some(name) = block.name.or(key) else {
            debug!("跳过缺少名称的块定义");
            continue;
        };
        if name.starts_with('*') {
            continue;
        }
        let definition = BlockDefinition {
            base_point: block.position.map(Point2::from).unwrap_or(Point2::new(0.0, 0.0)),
            entities: convert_entities(block.entities),
            name,
        };
        document.add_block_definition(definition);
    }

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_line_layouts_are_accepted() {
        let source = r#"{
            "entities": [
                {"type": "LINE", "layer": "A-WALL", "vertices": [{"x": 0, "y": 0}, {"x": 10, "y": 0}]},
                {"type": "LINE", "layer": "A-WALL", "start": {"x": 1, "y": 1}, "end": {"x": 2, "y": 2}},
                {"type": "LINE", "layer": "A-WALL", "vertices": [{"x": 0, "y": 0}]},
                {"type": "HATCH", "layer": "A-AREA"},
                {"type": "CIRCLE", "layer": "A-COLS"}
            ]
        }"#;
        let document = parse_json_cad(source).expect("parse");
        let lines: Vec<_> = document
            .entities()
            .filter_map(|(_, entity)| match entity {
                Entity::Line(line) => Some(line),
                _ => None,
            })
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].end, Point2::new(10.0, 0.0));
        assert_eq!(lines[1].start, Point2::new(1.0, 1.0));
        assert_eq!(document.entities().count(), 2);
    }

    #[test]
    fn blocks_accept_map_form_and_angles_in_degrees() {
        let source = r#"{
            "entities": [
                {"type": "INSERT", "layer": "E-EQUIP", "name": "PRESS", "position": {"x": 5, "y": 6}, "rotation": 90}
            ],
            "blocks": {
                "PRESS": {"entities": [{"type": "ARC", "center": {"x": 0, "y": 0}, "radius": 2, "startAngle": 0, "endAngle": 180}]},
                "*Model_Space": {"entities": []}
            }
        }"#;
        let document = parse_json_cad(source).expect("parse");
        assert_eq!(document.blocks().count(), 1);
        let block = document.block("PRESS").expect("block");
        match &block.entities[0] {
            Entity::Arc(arc) => assert!((arc.end_angle - std::f64::consts::PI).abs() < 1e-12),
            other => panic!("unexpected entity {other:?}"),
        }
        match &document.entities().next().expect("insert").1 {
            Entity::BlockReference(reference) => {
                assert!((reference.rotation - std::f64::consts::FRAC_PI_2).abs() < 1e-12)
            }
            other => panic!("unexpected entity {other:?}"),
        }
    }
}

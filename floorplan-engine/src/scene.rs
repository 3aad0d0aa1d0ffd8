//! 分层场景树与 SVG 序列化。
//!
//! 导入流程与楼层渲染都先构造 `Scene`，最后一步才由 `SvgWriter` 输出文本。

use std::fmt;

use floorplan_config::LayerRule;
use floorplan_core::{
    equipment::PositionKey,
    floor::{BuilderFloor, PinShape, WallStyle},
    geometry::Point2,
};

/// 组级样式，组内所有图元共享。
#[derive(Debug, Clone, PartialEq)]
pub struct LayerStyle {
    pub stroke: String,
    pub stroke_width: f64,
    pub dash: Option<String>,
    /// 仅作用于闭合图形（闭合路径、圆、设备矩形）与文字。
    pub fill: Option<String>,
    pub opacity: f64,
}

impl LayerStyle {
    pub fn stroke(stroke: &str, stroke_width: f64) -> Self {
        Self {
            stroke: stroke.to_string(),
            stroke_width,
            dash: None,
            fill: None,
            opacity: 1.0,
        }
    }

    pub fn with_fill(mut self, fill: &str) -> Self {
        self.fill = Some(fill.to_string());
        self
    }

    pub fn with_dash(mut self, dash: &str) -> Self {
        self.dash = Some(dash.to_string());
        self
    }
}

impl From<&LayerRule> for LayerStyle {
    fn from(rule: &LayerRule) -> Self {
        Self {
            stroke: rule.stroke.clone(),
            stroke_width: rule.stroke_width,
            dash: rule.dash.clone(),
            fill: rule.fill.clone(),
            opacity: rule.opacity,
        }
    }
}

/// 设备轮廓矩形，坐标与尺寸均为输出单位。
#[derive(Debug, Clone, PartialEq)]
pub struct EquipmentRect {
    pub center: Point2,
    pub half_width: f64,
    pub half_height: f64,
    /// SVG `rotate()` 角度（度），已按 Y 轴翻转取反。
    pub rotation_deg: f64,
    pub block: String,
    pub key: PositionKey,
    pub name: String,
    pub equipment_type: String,
}

impl EquipmentRect {
    /// 输出空间中的四个角点，顺序为左上、右上、右下、左下（旋转前）。
    pub fn corners(&self) -> [Point2; 4] {
        let (hw, hh) = (self.half_width, self.half_height);
        [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)].map(|(dx, dy)| self.to_world(dx, dy))
    }

    /// 判断输出空间的点是否落在旋转后的矩形内（含边界）。
    pub fn contains(&self, point: Point2) -> bool {
        let (sin, cos) = self.rotation_deg.to_radians().sin_cos();
        let dx = point.x() - self.center.x();
        let dy = point.y() - self.center.y();
        // 逆旋转回矩形局部坐标
        let local_x = dx * cos + dy * sin;
        let local_y = -dx * sin + dy * cos;
        local_x.abs() <= self.half_width + 1e-9 && local_y.abs() <= self.half_height + 1e-9
    }

    fn to_world(&self, dx: f64, dy: f64) -> Point2 {
        // SVG 的 rotate 在 y 向下的坐标系里是顺时针
        let (sin, cos) = self.rotation_deg.to_radians().sin_cos();
        Point2::new(
            self.center.x() + dx * cos - dy * sin,
            self.center.y() + dx * sin + dy * cos,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Path {
        points: Vec<Point2>,
        closed: bool,
        /// 覆盖组填充色（例如每个分区自己的颜色）。
        fill: Option<String>,
    },
    Line {
        start: Point2,
        end: Point2,
    },
    Arc {
        center: Point2,
        start: Point2,
        end: Point2,
        radius: f64,
        large_arc: bool,
        sweep: bool,
    },
    Circle {
        center: Point2,
        radius: f64,
    },
    Equipment(EquipmentRect),
    Text {
        position: Point2,
        content: String,
        font_size: f64,
    },
}

impl Primitive {
    /// 图元的定义点（输出空间）。
    pub fn defining_points(&self) -> Vec<Point2> {
        match self {
            Primitive::Path { points, .. } => points.clone(),
            Primitive::Line { start, end } => vec![*start, *end],
            Primitive::Arc {
                center, start, end, ..
            } => vec![*center, *start, *end],
            Primitive::Circle { center, .. } => vec![*center],
            Primitive::Equipment(rect) => vec![rect.center],
            Primitive::Text { position, .. } => vec![*position],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneGroup {
    pub id: String,
    pub style: LayerStyle,
    pub primitives: Vec<Primitive>,
}

impl SceneGroup {
    pub fn new(id: impl Into<String>, style: LayerStyle) -> Self {
        Self {
            id: id.into(),
            style,
            primitives: Vec::new(),
        }
    }
}

/// 固定画布尺寸的分层场景。组的顺序即绘制顺序。
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub width: f64,
    pub height: f64,
    pub groups: Vec<SceneGroup>,
}

impl Scene {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            groups: Vec::new(),
        }
    }

    /// 追加一个组；同名组已存在时返回已有组的下标。
    pub fn ensure_group(&mut self, id: &str, style: LayerStyle) -> usize {
        if let Some(index) = self.groups.iter().position(|group| group.id == id) {
            return index;
        }
        self.groups.push(SceneGroup::new(id, style));
        self.groups.len() - 1
    }

    pub fn group(&self, id: &str) -> Option<&SceneGroup> {
        self.groups.iter().find(|group| group.id == id)
    }

    pub fn group_mut(&mut self, id: &str) -> Option<&mut SceneGroup> {
        self.groups.iter_mut().find(|group| group.id == id)
    }

    pub fn primitive_count(&self) -> usize {
        self.groups.iter().map(|group| group.primitives.len()).sum()
    }

    pub fn primitives(&self) -> impl Iterator<Item = (&SceneGroup, &Primitive)> {
        self.groups
            .iter()
            .flat_map(|group| group.primitives.iter().map(move |primitive| (group, primitive)))
    }

    /// 所有设备矩形，按绘制顺序。
    pub fn equipment(&self) -> impl Iterator<Item = &EquipmentRect> {
        self.primitives().filter_map(|(_, primitive)| match primitive {
            Primitive::Equipment(rect) => Some(rect),
            _ => None,
        })
    }

    #[inline]
    pub fn to_svg(&self) -> String {
        SvgWriter::new(self).to_string()
    }
}

/// 两位小数，去掉多余的零。
struct Num(f64);

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = format!("{:.2}", self.0);
        let text = if text.contains('.') {
            text.trim_end_matches('0').trim_end_matches('.')
        } else {
            text.as_str()
        };
        if text == "-0" { f.write_str("0") } else { f.write_str(text) }
    }
}

struct Escaped<'a>(&'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ch in self.0.chars() {
            match ch {
                '&' => f.write_str("&amp;")?,
                '<' => f.write_str("&lt;")?,
                '>' => f.write_str("&gt;")?,
                '"' => f.write_str("&quot;")?,
                '\'' => f.write_str("&apos;")?,
                other => write!(f, "{other}")?,
            }
        }
        Ok(())
    }
}

/// 单遍输出 SVG 文本。
pub struct SvgWriter<'a> {
    scene: &'a Scene,
}

impl<'a> SvgWriter<'a> {
    pub fn new(scene: &'a Scene) -> Self {
        Self { scene }
    }

    fn write_group(f: &mut fmt::Formatter<'_>, group: &SceneGroup) -> fmt::Result {
        let style = &group.style;
        write!(
            f,
            r#"  <g id="{}" stroke="{}" stroke-width="{}" fill="none" opacity="{}""#,
            Escaped(&group.id),
            Escaped(&style.stroke),
            Num(style.stroke_width),
            Num(style.opacity)
        )?;
        if let Some(dash) = &style.dash {
            write!(f, r#" stroke-dasharray="{}""#, Escaped(dash))?;
        }
        if group.primitives.is_empty() {
            return f.write_str("/>\n");
        }
        f.write_str(">\n")?;
        for primitive in &group.primitives {
            f.write_str("    ")?;
            Self::write_primitive(f, primitive, style)?;
            f.write_str("\n")?;
        }
        f.write_str("  </g>\n")
    }

    fn write_fill(f: &mut fmt::Formatter<'_>, fill: Option<&str>) -> fmt::Result {
        match fill {
            Some(color) => write!(f, r#" fill="{}""#, Escaped(color)),
            None => Ok(()),
        }
    }

    fn write_primitive(
        f: &mut fmt::Formatter<'_>,
        primitive: &Primitive,
        style: &LayerStyle,
    ) -> fmt::Result {
        let group_fill = style.fill.as_deref();
        match primitive {
            Primitive::Path {
                points,
                closed,
                fill,
            } => {
                f.write_str(r#"<path d=""#)?;
                for (index, point) in points.iter().enumerate() {
                    let command = if index == 0 { "M" } else { " L" };
                    write!(f, "{command} {} {}", Num(point.x()), Num(point.y()))?;
                }
                if *closed {
                    f.write_str(" Z")?;
                }
                f.write_str("\"")?;
                if *closed {
                    Self::write_fill(f, fill.as_deref().or(group_fill))?;
                }
                f.write_str("/>")
            }
            Primitive::Line { start, end } => write!(
                f,
                r#"<line x1="{}" y1="{}" x2="{}" y2="{}"/>"#,
                Num(start.x()),
                Num(start.y()),
                Num(end.x()),
                Num(end.y())
            ),
            Primitive::Arc {
                start,
                end,
                radius,
                large_arc,
                sweep,
                ..
            } => write!(
                f,
                r#"<path d="M {} {} A {} {} 0 {} {} {} {}"/>"#,
                Num(start.x()),
                Num(start.y()),
                Num(*radius),
                Num(*radius),
                u8::from(*large_arc),
                u8::from(*sweep),
                Num(end.x()),
                Num(end.y())
            ),
            Primitive::Circle { center, radius } => {
                write!(
                    f,
                    r#"<circle cx="{}" cy="{}" r="{}""#,
                    Num(center.x()),
                    Num(center.y()),
                    Num(*radius)
                )?;
                Self::write_fill(f, group_fill)?;
                f.write_str("/>")
            }
            Primitive::Equipment(rect) => {
                write!(
                    f,
                    r#"<rect x="{}" y="{}" width="{}" height="{}""#,
                    Num(rect.center.x() - rect.half_width),
                    Num(rect.center.y() - rect.half_height),
                    Num(rect.half_width * 2.0),
                    Num(rect.half_height * 2.0)
                )?;
                if Num(rect.rotation_deg).to_string() != "0" {
                    write!(
                        f,
                        r#" transform="rotate({} {} {})""#,
                        Num(rect.rotation_deg),
                        Num(rect.center.x()),
                        Num(rect.center.y())
                    )?;
                }
                Self::write_fill(f, group_fill)?;
                write!(
                    f,
                    r#" data-block="{}" data-key="{}" data-name="{}" data-type="{}"/>"#,
                    Escaped(&rect.block),
                    rect.key,
                    Escaped(&rect.name),
                    Escaped(&rect.equipment_type)
                )
            }
            Primitive::Text {
                position,
                content,
                font_size,
            } => {
                write!(
                    f,
                    r#"<text x="{}" y="{}" font-size="{}" stroke="none""#,
                    Num(position.x()),
                    Num(position.y()),
                    Num(*font_size)
                )?;
                Self::write_fill(f, group_fill)?;
                write!(f, ">{}</text>", Escaped(content))
            }
        }
    }
}

impl fmt::Display for SvgWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scene = self.scene;
        writeln!(
            f,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = Num(scene.width),
            h = Num(scene.height)
        )?;
        for group in &scene.groups {
            Self::write_group(f, group)?;
        }
        f.write_str("</svg>\n")
    }
}

const ZONE_STROKE: &str = "#475569";
const WALL_STROKE: &str = "#111827";
const FLOW_STROKE: &str = "#2563eb";
const LABEL_FILL: &str = "#111827";
const PIN_FILL: &str = "#f97316";
const FLOW_ARROW_LENGTH: f64 = 10.0;

/// 将编辑器维护的楼层文档渲染为同一场景结构，坐标保持文档自身的画布单位。
pub fn render_floor(floor: &BuilderFloor, width: f64, height: f64) -> Scene {
    let mut scene = Scene::new(width, height);

    let zones = scene.ensure_group("zones", {
        let mut style = LayerStyle::stroke(ZONE_STROKE, 1.0);
        style.opacity = 0.6;
        style
    });
    scene.groups[zones].primitives = floor
        .zones
        .iter()
        .map(|zone| Primitive::Path {
            points: zone.points.clone(),
            closed: true,
            fill: Some(zone.color.clone()),
        })
        .collect();

    let solid = scene.ensure_group("walls", LayerStyle::stroke(WALL_STROKE, 3.0));
    let dashed = scene.ensure_group(
        "walls-dashed",
        LayerStyle::stroke(WALL_STROKE, 3.0).with_dash("8 6"),
    );
    for wall in &floor.walls {
        let target = match wall.style {
            WallStyle::Solid => solid,
            WallStyle::Dashed => dashed,
        };
        scene.groups[target].primitives.push(Primitive::Path {
            points: wall.points.clone(),
            closed: false,
            fill: None,
        });
    }

    let flows = scene.ensure_group(
        "flows",
        LayerStyle::stroke(FLOW_STROKE, 2.0).with_fill(FLOW_STROKE),
    );
    for flow in &floor.flows {
        let group = &mut scene.groups[flows];
        group.primitives.push(Primitive::Path {
            points: flow.points.clone(),
            closed: false,
            fill: None,
        });
        if let Some(head) = flow.arrowhead(FLOW_ARROW_LENGTH) {
            group.primitives.push(Primitive::Path {
                points: head.to_vec(),
                closed: true,
                fill: None,
            });
        }
        if let (Some(text), [first, second, ..]) = (&flow.label, flow.points.as_slice()) {
            group.primitives.push(Primitive::Text {
                position: first.midpoint(*second),
                content: text.clone(),
                font_size: 12.0,
            });
        }
    }

    let labels = scene.ensure_group(
        "labels",
        LayerStyle::stroke("none", 0.0).with_fill(LABEL_FILL),
    );
    scene.groups[labels].primitives = floor
        .labels
        .iter()
        .map(|label| Primitive::Text {
            position: label.position(),
            content: label.text.clone(),
            font_size: label.font_size,
        })
        .collect();

    let pins = scene.ensure_group(
        "pins",
        LayerStyle::stroke("#ffffff", 1.5).with_fill(PIN_FILL),
    );
    scene.groups[pins].primitives = floor
        .pins
        .iter()
        .map(|pin| {
            let center = pin.position();
            let r = pin.size.radius();
            let (x, y) = (center.x(), center.y());
            match pin.shape {
                PinShape::Circle => Primitive::Circle { center, radius: r },
                PinShape::Square => Primitive::Path {
                    points: vec![
                        Point2::new(x - r, y - r),
                        Point2::new(x + r, y - r),
                        Point2::new(x + r, y + r),
                        Point2::new(x - r, y + r),
                    ],
                    closed: true,
                    fill: None,
                },
                PinShape::Diamond => Primitive::Path {
                    points: vec![
                        Point2::new(x, y - r),
                        Point2::new(x + r, y),
                        Point2::new(x, y + r),
                        Point2::new(x - r, y),
                    ],
                    closed: true,
                    fill: None,
                },
            }
        })
        .collect();

    scene
}

#[cfg(test)]
mod tests {
    use floorplan_core::floor::{AssetPin, Flow, ItemId, Label, PinSize, Wall, Zone};

    use super::*;

    #[test]
    fn numbers_use_two_decimals_without_trailing_zeros() {
        assert_eq!(Num(183.6).to_string(), "183.6");
        assert_eq!(Num(780.0).to_string(), "780");
        assert_eq!(Num(1.23456).to_string(), "1.23");
        assert_eq!(Num(-0.001).to_string(), "0");
        assert_eq!(Num(-12.5).to_string(), "-12.5");
    }

    #[test]
    fn attributes_are_escaped() {
        assert_eq!(
            Escaped(r#"Mill "A" & <B>"#).to_string(),
            "Mill &quot;A&quot; &amp; &lt;B&gt;"
        );
    }

    #[test]
    fn group_style_and_closed_fill_are_written() {
        let mut scene = Scene::new(100.0, 50.0);
        let index = scene.ensure_group(
            "areas",
            LayerStyle::stroke("#94a3b8", 0.5).with_fill("#e2e8f0").with_dash("3 2"),
        );
        scene.groups[index].primitives.push(Primitive::Path {
            points: vec![
                Point2::new(0.0, 0.0),
                Point2::new(10.0, 0.0),
                Point2::new(10.0, 10.0),
            ],
            closed: true,
            fill: None,
        });
        scene.groups[index].primitives.push(Primitive::Line {
            start: Point2::new(0.0, 0.0),
            end: Point2::new(5.556, 1.0),
        });
        scene.ensure_group("glazing", LayerStyle::stroke("#38bdf8", 0.75));

        let svg = scene.to_svg();
        assert!(svg.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="50""#));
        assert!(svg.contains(
            r##"<g id="areas" stroke="#94a3b8" stroke-width="0.5" fill="none" opacity="1" stroke-dasharray="3 2">"##
        ));
        assert!(svg.contains(r##"<path d="M 0 0 L 10 0 L 10 10 Z" fill="#e2e8f0"/>"##));
        assert!(svg.contains(r#"<line x1="0" y1="0" x2="5.56" y2="1"/>"#));
        assert!(svg.contains(
            r##"<g id="glazing" stroke="#38bdf8" stroke-width="0.75" fill="none" opacity="1"/>"##
        ));
    }

    #[test]
    fn rotated_rect_contains_its_corners_only() {
        let rect = EquipmentRect {
            center: Point2::new(100.0, 100.0),
            half_width: 10.0,
            half_height: 4.0,
            rotation_deg: -90.0,
            block: "B".to_string(),
            key: PositionKey { x: 0, y: 0 },
            name: String::new(),
            equipment_type: String::new(),
        };
        // 旋转 90° 后长边沿 y 轴
        assert!(rect.contains(Point2::new(100.0, 109.0)));
        assert!(!rect.contains(Point2::new(109.0, 100.0)));
        for corner in rect.corners() {
            assert!(rect.contains(corner));
        }
    }

    #[test]
    fn floor_rendering_covers_every_item_kind() {
        let mut floor = BuilderFloor::new();
        floor.zones.push(Zone {
            id: ItemId::new(1),
            name: "Receiving".to_string(),
            color: "#fde68a".to_string(),
            points: vec![
                Point2::new(0.0, 0.0),
                Point2::new(100.0, 0.0),
                Point2::new(100.0, 80.0),
            ],
        });
        floor.walls.push(Wall {
            id: ItemId::new(2),
            style: WallStyle::Dashed,
            points: vec![Point2::new(0.0, 90.0), Point2::new(100.0, 90.0)],
        });
        floor.flows.push(Flow {
            id: ItemId::new(3),
            points: vec![Point2::new(10.0, 10.0), Point2::new(60.0, 10.0)],
            label: Some("Raw stock".to_string()),
        });
        floor.labels.push(Label {
            id: ItemId::new(4),
            text: "Dock <1>".to_string(),
            x: 20.0,
            y: 40.0,
            font_size: 14.0,
        });
        floor.place_pin(AssetPin {
            asset_id: "asset-1".to_string(),
            x: 50.0,
            y: 50.0,
            shape: PinShape::Diamond,
            size: PinSize::Sm,
        });

        let scene = render_floor(&floor, 400.0, 300.0);
        assert_eq!(scene.group("walls").map(|g| g.primitives.len()), Some(0));
        assert_eq!(scene.group("walls-dashed").map(|g| g.primitives.len()), Some(1));
        // 流线本体 + 箭头 + 文字
        assert_eq!(scene.group("flows").map(|g| g.primitives.len()), Some(3));
        assert_eq!(scene.primitive_count(), 1 + 1 + 3 + 1 + 1);

        let svg = scene.to_svg();
        assert!(svg.contains(r##"fill="#fde68a""##));
        assert!(svg.contains("Dock &lt;1&gt;"));
        assert!(svg.contains(r#"<path d="M 50 44 L 56 50 L 50 56 L 44 50 Z""#));
        assert!(svg.contains(r#"<path d="M 60 10 L 50 15 L 50 5 Z""#));
    }
}

pub mod equipment;
pub mod floor;
pub mod transform;

pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示。图纸空间与输出空间共用该类型，
    /// 两者之间只能通过 [`crate::transform::CoordinateTransform`] 转换。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        #[inline]
        pub fn midpoint(self, other: Point2) -> Point2 {
            Self((self.0 + other.0) * 0.5)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        #[inline]
        pub fn scale(self, factor: f64) -> Self {
            Self(self.0 * factor)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        /// 闭区间判定，边界上的点视为在内。
        #[inline]
        pub fn contains(&self, point: Point2) -> bool {
            point.x() >= self.min.x()
                && point.x() <= self.max.x()
                && point.y() >= self.min.y()
                && point.y() <= self.max.y()
        }
    }

    /// 偶奇规则判定点是否位于多边形内部（多边形隐式闭合）。
    pub fn point_in_polygon(point: Point2, polygon: &[Point2]) -> bool {
        if polygon.len() < 3 {
            return false;
        }
        let (px, py) = (point.x(), point.y());
        let mut inside = false;
        let mut j = polygon.len() - 1;
        for i in 0..polygon.len() {
            let (xi, yi) = (polygon[i].x(), polygon[i].y());
            let (xj, yj) = (polygon[j].x(), polygon[j].y());
            if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// 点到线段的最短距离；退化线段按端点距离计算。
    pub fn distance_to_segment(point: Point2, start: Point2, end: Point2) -> f64 {
        let segment = end.as_vec2() - start.as_vec2();
        let length_squared = segment.length_squared();
        if length_squared <= f64::EPSILON {
            return point.distance(start);
        }
        let t = ((point.as_vec2() - start.as_vec2()).dot(segment) / length_squared).clamp(0.0, 1.0);
        let projection = start.as_vec2() + segment * t;
        point.as_vec2().distance(projection)
    }

    /// 点到折线的最短距离，折线少于两个点时返回 `None`。
    pub fn distance_to_polyline(point: Point2, points: &[Point2]) -> Option<f64> {
        points
            .windows(2)
            .map(|pair| distance_to_segment(point, pair[0], pair[1]))
            .reduce(f64::min)
    }

}

pub mod document {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Point2, Vector2};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于序列化或日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Layer {
        pub name: String,
        pub is_visible: bool,
    }

    impl Layer {
        #[inline]
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                is_visible: true,
            }
        }
    }

    /// CAD 图元。文字、标注与点只用于识别注释，不产生物理轮廓。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Entity {
        Line(Line),
        Circle(Circle),
        Arc(Arc),
        Polyline(Polyline),
        Text(Text),
        Dimension(Dimension),
        Point(PointEntity),
        BlockReference(BlockReference),
    }

    impl Entity {
        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Line(line) => &line.layer,
                Entity::Circle(circle) => &circle.layer,
                Entity::Arc(arc) => &arc.layer,
                Entity::Polyline(polyline) => &polyline.layer,
                Entity::Text(text) => &text.layer,
                Entity::Dimension(dimension) => &dimension.layer,
                Entity::Point(point) => &point.layer,
                Entity::BlockReference(reference) => &reference.layer,
            }
        }

        /// 注释类图元（文字、标注、点、嵌套块参照）不参与块范围估算。
        #[inline]
        pub fn is_annotation(&self) -> bool {
            matches!(
                self,
                Entity::Text(_)
                    | Entity::Dimension(_)
                    | Entity::Point(_)
                    | Entity::BlockReference(_)
            )
        }

        /// 图元的“定义点”：区域过滤时只要有一个落在保留区内即保留。
        pub fn defining_points(&self) -> Vec<Point2> {
            match self {
                Entity::Line(line) => vec![line.start, line.end],
                Entity::Circle(circle) => vec![circle.center],
                Entity::Arc(arc) => vec![arc.center, arc.start_point(), arc.end_point()],
                Entity::Polyline(polyline) => {
                    polyline.vertices.iter().map(|v| v.position).collect()
                }
                Entity::Text(text) => vec![text.insert],
                Entity::Dimension(dimension) => {
                    vec![dimension.definition_point, dimension.text_midpoint]
                }
                Entity::Point(point) => vec![point.position],
                Entity::BlockReference(reference) => vec![reference.insert],
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point2,
        pub end: Point2,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point2,
        pub radius: f64,
        pub layer: String,
    }

    /// 圆弧实体，角度以弧度形式储存，自 +X 轴逆时针。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point2,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
        pub layer: String,
    }

    impl Arc {
        #[inline]
        pub fn point_at(&self, angle: f64) -> Point2 {
            Point2::new(
                self.center.x() + self.radius * angle.cos(),
                self.center.y() + self.radius * angle.sin(),
            )
        }

        #[inline]
        pub fn start_point(&self) -> Point2 {
            self.point_at(self.start_angle)
        }

        #[inline]
        pub fn end_point(&self) -> Point2 {
            self.point_at(self.end_angle)
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<PolylineVertex>,
        pub is_closed: bool,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PolylineVertex {
        pub position: Point2,
        pub bulge: f64,
    }

    impl PolylineVertex {
        #[inline]
        pub fn new(position: Point2) -> Self {
            Self {
                position,
                bulge: 0.0,
            }
        }

        #[inline]
        pub fn with_bulge(position: Point2, bulge: f64) -> Self {
            Self { position, bulge }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point2,
        pub content: String,
        pub height: f64,
        pub rotation: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Dimension {
        pub definition_point: Point2,
        pub text_midpoint: Point2,
        pub text: Option<String>,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PointEntity {
        pub position: Point2,
        pub layer: String,
    }

    /// 块参照。`rotation` 以弧度储存，逆时针为正。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockReference {
        pub name: String,
        pub insert: Point2,
        pub scale: Vector2,
        pub rotation: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        pub base_point: Point2,
        pub entities: Vec<Entity>,
    }

    /// 解析后的 CAD 文档：图层、平铺实体列表与块定义表。
    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Document {
        layers: HashMap<String, Layer>,
        entities: Vec<(EntityId, Entity)>,
        next_entity_id: u64,
        blocks: Vec<BlockDefinition>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        block_index: HashMap<String, usize>,
    }

    impl Document {
        pub fn new() -> Self {
            let mut doc = Self::default();
            doc.ensure_layer("0");
            doc
        }

        pub fn ensure_layer(&mut self, name: impl AsRef<str>) {
            let key = name.as_ref();
            self.layers
                .entry(key.to_string())
                .or_insert_with(|| Layer::new(key));
        }

        pub fn add_line(
            &mut self,
            start: Point2,
            end: Point2,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.push(Entity::Line(Line { start, end, layer }))
        }

        pub fn add_circle(
            &mut self,
            center: Point2,
            radius: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.push(Entity::Circle(Circle {
                center,
                radius,
                layer,
            }))
        }

        pub fn add_arc(
            &mut self,
            center: Point2,
            radius: f64,
            start_angle: f64,
            end_angle: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.push(Entity::Arc(Arc {
                center,
                radius,
                start_angle,
                end_angle,
                layer,
            }))
        }

        pub fn add_polyline<I>(
            &mut self,
            points: I,
            is_closed: bool,
            layer: impl Into<String>,
        ) -> EntityId
        where
            I: IntoIterator<Item = Point2>,
        {
            let vertices = points.into_iter().map(PolylineVertex::new).collect();
            let layer = layer.into();
            self.push(Entity::Polyline(Polyline {
                vertices,
                is_closed,
                layer,
            }))
        }

        pub fn add_block_reference(
            &mut self,
            name: impl Into<String>,
            insert: Point2,
            rotation: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.push(Entity::BlockReference(BlockReference {
                name: name.into(),
                insert,
                scale: Vector2::new(1.0, 1.0),
                rotation,
                layer,
            }))
        }

        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            self.push(entity)
        }

        #[inline]
        pub fn layer(&self, name: &str) -> Option<&Layer> {
            self.layers.get(name)
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &(EntityId, Entity)> {
            self.entities.iter()
        }

        /// 注册块定义。同名定义只保留首次出现的那一份，返回是否被采纳。
        pub fn add_block_definition(&mut self, definition: BlockDefinition) -> bool {
            if self.block_index.contains_key(&definition.name) {
                return false;
            }
            for entity in &definition.entities {
                self.ensure_layer(entity.layer_name());
            }
            self.block_index
                .insert(definition.name.clone(), self.blocks.len());
            self.blocks.push(definition);
            true
        }

        #[inline]
        pub fn block(&self, name: &str) -> Option<&BlockDefinition> {
            self.block_index.get(name).map(|&index| &self.blocks[index])
        }

        /// 按注册顺序遍历块定义。
        #[inline]
        pub fn blocks(&self) -> impl Iterator<Item = &BlockDefinition> {
            self.blocks.iter()
        }

        #[inline]
        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.entities
                .iter()
                .find_map(|(entity_id, entity)| (*entity_id == id).then_some(entity))
        }

        fn push(&mut self, entity: Entity) -> EntityId {
            self.ensure_layer(entity.layer_name());
            let id = self.next_id();
            self.entities.push((id, entity));
            id
        }

        #[inline]
        fn next_id(&mut self) -> EntityId {
            let id = self.next_entity_id;
            self.next_entity_id += 1;
            EntityId(id)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::f64::consts::FRAC_PI_2;

        #[test]
        fn document_stores_entities() {
            let mut doc = Document::new();
            let id = doc.add_line(Point2::new(0.0, 0.0), Point2::new(10.0, 0.0), "A-WALL");
            let circle_id = doc.add_circle(Point2::new(5.0, 5.0), 2.0, "A-COLS");
            let arc_id = doc.add_arc(Point2::new(5.0, 0.0), 3.5, 0.0, FRAC_PI_2, "A-DOOR");
            let polyline_id = doc.add_polyline(
                [
                    Point2::new(0.0, 0.0),
                    Point2::new(2.0, 2.0),
                    Point2::new(4.0, 0.0),
                ],
                true,
                "A-AREA",
            );

            assert_eq!(id.get(), 0);
            assert_eq!(circle_id.get(), 1);
            assert_eq!(arc_id.get(), 2);
            assert_eq!(polyline_id.get(), 3);
            assert!(doc.layer("A-WALL").is_some());
            assert!(doc.layer("0").is_some());
            assert_eq!(doc.entities().count(), 4);

            match doc.entity(arc_id) {
                Some(Entity::Arc(arc)) => {
                    assert_eq!(arc.layer, "A-DOOR");
                    let end = arc.end_point();
                    assert!((end.x() - 5.0).abs() < 1e-9);
                    assert!((end.y() - 3.5).abs() < 1e-9);
                }
                other => panic!("unexpected entity lookup result: {other:?}"),
            }
        }

        #[test]
        fn first_block_definition_wins() {
            let mut doc = Document::new();
            let first = BlockDefinition {
                name: "LATHE".to_string(),
                base_point: Point2::new(0.0, 0.0),
                entities: vec![Entity::Circle(Circle {
                    center: Point2::new(0.0, 0.0),
                    radius: 1.0,
                    layer: "0".to_string(),
                })],
            };
            let mut second = first.clone();
            second.entities.clear();

            assert!(doc.add_block_definition(first));
            assert!(!doc.add_block_definition(second));
            assert_eq!(doc.blocks().count(), 1);
            assert_eq!(doc.block("LATHE").map(|b| b.entities.len()), Some(1));
        }

        #[test]
        fn annotation_entities_are_flagged() {
            let text = Entity::Text(Text {
                insert: Point2::new(0.0, 0.0),
                content: "NOTE".to_string(),
                height: 2.0,
                rotation: 0.0,
                layer: "A-ANNO".to_string(),
            });
            let line = Entity::Line(Line {
                start: Point2::new(0.0, 0.0),
                end: Point2::new(1.0, 0.0),
                layer: "0".to_string(),
            });
            assert!(text.is_annotation());
            assert!(!line.is_annotation());
            assert_eq!(line.defining_points().len(), 2);
        }
    }
}

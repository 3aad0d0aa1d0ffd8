//! CAD 导入流程：区域过滤 → 图层路由 → 坐标变换 → 分层场景与块尺寸表。

use std::collections::BTreeMap;
use std::f64::consts::{PI, TAU};
use std::fmt;

use tracing::{debug, info, trace};
use floorplan_config::{IngestConfig, LayerRule, RegionConfig};
use floorplan_core::{
    document::{Arc, BlockReference, Document, Entity},
    equipment::FootprintTable,
    geometry::{Bounds2D, Point2},
    transform::CoordinateTransform,
};

use crate::bounds::{BlockBounds, BlockBoundsEntry, BlockBoundsTable, compute_block_bounds};
use crate::errors::EngineError;
use crate::scene::{EquipmentRect, LayerStyle, Primitive, Scene};

const SWEEP_EPSILON: f64 = 1e-9;

/// 图纸空间的保留区域（含边界）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeepRegion {
    bounds: Bounds2D,
}

impl KeepRegion {
    pub fn new(min: Point2, max: Point2) -> Self {
        Self {
            bounds: Bounds2D::new(min, max),
        }
    }

    #[inline]
    pub fn bounds(&self) -> Bounds2D {
        self.bounds
    }

    #[inline]
    pub fn contains(&self, point: Point2) -> bool {
        self.bounds.contains(point)
    }

    /// 只要有一个定义点落在区域内就保留。
    pub fn keeps(&self, entity: &Entity) -> bool {
        entity
            .defining_points()
            .into_iter()
            .any(|point| self.contains(point))
    }
}

impl From<&RegionConfig> for KeepRegion {
    fn from(config: &RegionConfig) -> Self {
        Self::new(
            Point2::new(config.min_x, config.min_y),
            Point2::new(config.max_x, config.max_y),
        )
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub transform: CoordinateTransform,
    pub region: KeepRegion,
    pub equipment_layer: String,
    pub percentile_low: f64,
    pub percentile_high: f64,
    pub layers: Vec<LayerRule>,
}

impl IngestOptions {
    pub fn from_config(config: &IngestConfig) -> Result<Self, EngineError> {
        let low = config.percentile_low;
        let high = config.percentile_high;
        if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) || low > high {
            return Err(EngineError::InvalidPercentiles { low, high });
        }
        let transform = CoordinateTransform::new(
            config.transform.x_offset,
            config.transform.y_flip_origin,
            config.transform.scale,
        )?;
        Ok(Self {
            transform,
            region: KeepRegion::from(&config.keep_region),
            equipment_layer: config.equipment_layer.clone(),
            percentile_low: low,
            percentile_high: high,
            layers: config.layers.clone(),
        })
    }

    fn rule_index(&self, layer: &str) -> Option<usize> {
        self.layers.iter().position(|rule| rule.layer == layer)
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        let config = IngestConfig::default();
        Self {
            transform: CoordinateTransform::default(),
            region: KeepRegion::from(&config.keep_region),
            equipment_layer: config.equipment_layer,
            percentile_low: config.percentile_low,
            percentile_high: config.percentile_high,
            layers: config.layers,
        }
    }
}

/// 图元被丢弃的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropReason {
    OutsideRegion,
    LayerNotAllowed,
    Annotation,
    OffEquipmentLayer,
    NoFootprint,
    NoBoundingBox,
    Degenerate,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::OutsideRegion => "outside_region",
            DropReason::LayerNotAllowed => "layer_not_allowed",
            DropReason::Annotation => "annotation",
            DropReason::OffEquipmentLayer => "off_equipment_layer",
            DropReason::NoFootprint => "no_footprint",
            DropReason::NoBoundingBox => "no_bounding_box",
            DropReason::Degenerate => "degenerate",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 导入统计，供批处理工具打印摘要。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub source_entities: usize,
    /// 组 ID → 保留的图元数，包含空组。
    pub kept_by_group: BTreeMap<String, usize>,
    /// 图元类型 → 保留数。
    pub kept_by_kind: BTreeMap<&'static str, usize>,
    pub dropped: BTreeMap<DropReason, usize>,
}

impl IngestReport {
    pub fn kept(&self) -> usize {
        self.kept_by_group.values().sum()
    }

    pub fn dropped(&self, reason: DropReason) -> usize {
        self.dropped.get(&reason).copied().unwrap_or(0)
    }

    pub fn total_dropped(&self) -> usize {
        self.dropped.values().sum()
    }

    fn record_drop(&mut self, reason: DropReason) {
        *self.dropped.entry(reason).or_default() += 1;
    }
}

#[derive(Debug, Clone)]
pub struct IngestOutput {
    pub scene: Scene,
    pub bounds: BlockBoundsTable,
    pub report: IngestReport,
}

fn primitive_kind(primitive: &Primitive) -> &'static str {
    match primitive {
        Primitive::Path { .. } => "path",
        Primitive::Line { .. } => "line",
        Primitive::Arc { .. } => "arc",
        Primitive::Circle { .. } => "circle",
        Primitive::Equipment(_) => "equipment",
        Primitive::Text { .. } => "text",
    }
}

/// 执行一次完整导入。结果只依赖输入，可重复运行。
pub fn ingest(
    document: &Document,
    footprints: &FootprintTable,
    options: &IngestOptions,
) -> IngestOutput {
    let transform = &options.transform;
    let block_bounds =
        compute_block_bounds(document, options.percentile_low, options.percentile_high);

    let mut bounds = BlockBoundsTable::new();
    for (name, extent) in &block_bounds {
        bounds.insert(name.clone(), BlockBoundsEntry::new(extent, transform));
    }

    let canvas = transform.forward_bounds(&options.region.bounds());
    let mut scene = Scene::new(canvas.width(), canvas.height());
    for rule in &options.layers {
        scene.ensure_group(&rule.group, LayerStyle::from(rule));
    }

    let mut report = IngestReport {
        kept_by_group: scene
            .groups
            .iter()
            .map(|group| (group.id.clone(), 0))
            .collect(),
        ..IngestReport::default()
    };

    for (id, entity) in document.entities() {
        report.source_entities += 1;
        let outcome = convert_entity(entity, footprints, &block_bounds, options);
        match outcome {
            Ok((rule_index, primitive)) => {
                let group_id = &options.layers[rule_index].group;
                *report.kept_by_kind.entry(primitive_kind(&primitive)).or_default() += 1;
                *report.kept_by_group.entry(group_id.clone()).or_default() += 1;
                if let Some(group) = scene.group_mut(group_id) {
                    group.primitives.push(primitive);
                }
            }
            Err(reason) => {
                trace!(
                    entity = id.get(),
                    layer = entity.layer_name(),
                    %reason,
                    "丢弃图元"
                );
                report.record_drop(reason);
            }
        }
    }

    for (reason, count) in &report.dropped {
        debug!(%reason, count, "导入丢弃统计");
    }
    info!(
        source = report.source_entities,
        kept = report.kept(),
        dropped = report.total_dropped(),
        blocks = bounds.len(),
        "CAD 导入完成"
    );

    IngestOutput {
        scene,
        bounds,
        report,
    }
}

fn convert_entity(
    entity: &Entity,
    footprints: &FootprintTable,
    block_bounds: &BTreeMap<String, BlockBounds>,
    options: &IngestOptions,
) -> Result<(usize, Primitive), DropReason> {
    if !options.region.keeps(entity) {
        return Err(DropReason::OutsideRegion);
    }
    let rule_index = options
        .rule_index(entity.layer_name())
        .ok_or(DropReason::LayerNotAllowed)?;
    let transform = &options.transform;

    let primitive = match entity {
        Entity::Line(line) => Primitive::Line {
            start: transform.forward(line.start),
            end: transform.forward(line.end),
        },
        Entity::Polyline(polyline) => {
            if polyline.vertices.len() < 2 {
                return Err(DropReason::Degenerate);
            }
            Primitive::Path {
                points: polyline
                    .vertices
                    .iter()
                    .map(|vertex| transform.forward(vertex.position))
                    .collect(),
                closed: polyline.is_closed,
                fill: None,
            }
        }
        Entity::Arc(arc) => convert_arc(arc, transform)?,
        Entity::Circle(circle) => {
            if circle.radius <= 0.0 {
                return Err(DropReason::Degenerate);
            }
            Primitive::Circle {
                center: transform.forward(circle.center),
                radius: transform.scale_length(circle.radius),
            }
        }
        Entity::BlockReference(reference) => {
            if entity.layer_name() != options.equipment_layer {
                return Err(DropReason::OffEquipmentLayer);
            }
            convert_equipment(reference, footprints, block_bounds, transform)?
        }
        Entity::Text(_) | Entity::Dimension(_) | Entity::Point(_) => {
            return Err(DropReason::Annotation);
        }
    };
    Ok((rule_index, primitive))
}

/// 圆弧：输出空间 Y 翻转后方向反转，sweep 标志固定为 0；
/// 归一化扫角为零但跨越整圈的圆弧输出为圆。
fn convert_arc(arc: &Arc, transform: &CoordinateTransform) -> Result<Primitive, DropReason> {
    if arc.radius <= 0.0 {
        return Err(DropReason::Degenerate);
    }
    let raw_sweep = arc.end_angle - arc.start_angle;
    let sweep = raw_sweep.rem_euclid(TAU);
    let radius = transform.scale_length(arc.radius);
    if sweep < SWEEP_EPSILON || TAU - sweep < SWEEP_EPSILON {
        if raw_sweep.abs() < SWEEP_EPSILON {
            return Err(DropReason::Degenerate);
        }
        return Ok(Primitive::Circle {
            center: transform.forward(arc.center),
            radius,
        });
    }
    Ok(Primitive::Arc {
        center: transform.forward(arc.center),
        start: transform.forward(arc.start_point()),
        end: transform.forward(arc.end_point()),
        radius,
        large_arc: sweep > PI,
        sweep: false,
    })
}

/// 设备块参照：必须同时命中轮廓表与块包围盒，绝不猜测尺寸。
fn convert_equipment(
    reference: &BlockReference,
    footprints: &FootprintTable,
    block_bounds: &BTreeMap<String, BlockBounds>,
    transform: &CoordinateTransform,
) -> Result<Primitive, DropReason> {
    let footprint = footprints
        .lookup(reference.insert)
        .ok_or(DropReason::NoFootprint)?;
    let extent = block_bounds
        .get(&reference.name)
        .ok_or(DropReason::NoBoundingBox)?;

    let half_width = transform.scale_length(extent.half_width() * reference.scale.x().abs());
    let half_height = transform.scale_length(extent.half_height() * reference.scale.y().abs());
    Ok(Primitive::Equipment(EquipmentRect {
        center: transform.forward(reference.insert),
        half_width,
        half_height,
        rotation_deg: -reference.rotation.to_degrees(),
        block: reference.name.clone(),
        key: footprint.key(),
        name: footprint.name.clone(),
        equipment_type: footprint.equipment_type.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use floorplan_config::TransformConfig;
    use floorplan_core::document::{BlockDefinition, Line, Text};
    use floorplan_core::equipment::FootprintRecord;

    use super::*;

    fn footprint(x: f64, y: f64, block: &str) -> FootprintRecord {
        FootprintRecord {
            x,
            y,
            name: format!("{block} @ {x},{y}"),
            equipment_type: "Press".to_string(),
            half_width: 48.0,
            half_height: 24.0,
            block: block.to_string(),
            machine_id: None,
        }
    }

    fn rect_block(name: &str, hw: f64, hh: f64) -> BlockDefinition {
        let mut document = Document::new();
        document.add_polyline(
            [
                Point2::new(-hw, -hh),
                Point2::new(hw, -hh),
                Point2::new(hw, hh),
                Point2::new(-hw, hh),
            ],
            true,
            "0",
        );
        BlockDefinition {
            name: name.to_string(),
            base_point: Point2::new(0.0, 0.0),
            entities: document.entities().map(|(_, e)| e.clone()).collect(),
        }
    }

    #[test]
    fn no_primitive_lies_entirely_outside_the_region() {
        let options = IngestOptions::default();
        let mut document = Document::new();
        let coords = [-5_000.0, 0.0, 1_200.0, 4_000.0, 13_200.0, 13_201.0, 30_000.0];
        for &x in &coords {
            for &y in &coords {
                document.add_line(Point2::new(x, y), Point2::new(x + 700.0, y - 300.0), "A-WALL");
                document.add_circle(Point2::new(x, y), 25.0, "A-COLS");
                document.add_arc(Point2::new(x, y), 40.0, 0.3, 2.0, "A-DOOR");
                document.add_polyline(
                    [Point2::new(x, y), Point2::new(y, x), Point2::new(x, x)],
                    false,
                    "A-AREA",
                );
            }
        }

        let output = ingest(&document, &FootprintTable::new(), &options);
        assert!(output.report.kept() > 0);
        assert!(output.report.dropped(DropReason::OutsideRegion) > 0);
        let region = options.region.bounds();
        let tolerance = 1e-6;
        for (_, primitive) in output.scene.primitives() {
            let inside = primitive
                .defining_points()
                .into_iter()
                .map(|point| options.transform.inverse(point))
                .any(|point| {
                    point.x() >= region.min().x() - tolerance
                        && point.x() <= region.max().x() + tolerance
                        && point.y() >= region.min().y() - tolerance
                        && point.y() <= region.max().y() + tolerance
                });
            assert!(inside, "primitive outside keep region: {primitive:?}");
        }
    }

    #[test]
    fn partially_visible_line_is_kept() {
        let mut document = Document::new();
        document.add_line(Point2::new(13_000.0, 5_000.0), Point2::new(15_000.0, 5_000.0), "A-WALL");
        document.add_line(Point2::new(14_000.0, 5_000.0), Point2::new(15_000.0, 5_000.0), "A-WALL");
        let output = ingest(&document, &FootprintTable::new(), &IngestOptions::default());
        assert_eq!(output.report.kept_by_group["walls"], 1);
        assert_eq!(output.report.dropped(DropReason::OutsideRegion), 1);
    }

    #[test]
    fn arc_sweep_is_reversed_and_large_flag_follows_span() {
        let mut document = Document::new();
        document.add_arc(Point2::new(3_000.0, 1_800.0), 36.0, 0.0, PI / 2.0, "A-DOOR");
        document.add_arc(Point2::new(3_000.0, 2_400.0), 36.0, 0.0, 1.5 * PI, "A-DOOR");
        let output = ingest(&document, &FootprintTable::new(), &IngestOptions::default());

        let svg = output.scene.to_svg();
        assert!(svg.contains(r#"<path d="M 183.6 780 A 3.6 3.6 0 0 0 180 776.4"/>"#), "{svg}");
        assert!(svg.contains(" A 3.6 3.6 0 1 0 "), "{svg}");
    }

    #[test]
    fn wrapped_angles_normalize_and_full_turn_becomes_circle() {
        let transform = CoordinateTransform::default();
        let wrapped = Arc {
            center: Point2::new(2_000.0, 2_000.0),
            radius: 10.0,
            start_angle: 1.75 * PI,
            end_angle: 0.25 * PI,
            layer: "A-DOOR".to_string(),
        };
        match convert_arc(&wrapped, &transform) {
            Ok(Primitive::Arc { large_arc, sweep, .. }) => {
                assert!(!large_arc);
                assert!(!sweep);
            }
            other => panic!("unexpected {other:?}"),
        }

        let full = Arc {
            start_angle: 0.0,
            end_angle: TAU,
            ..wrapped.clone()
        };
        assert!(matches!(
            convert_arc(&full, &transform),
            Ok(Primitive::Circle { radius, .. }) if (radius - 1.0).abs() < 1e-12
        ));

        let empty = Arc {
            start_angle: 1.0,
            end_angle: 1.0,
            ..wrapped
        };
        assert_eq!(convert_arc(&empty, &transform), Err(DropReason::Degenerate));
    }

    #[test]
    fn rotated_equipment_matches_rotated_block_geometry() {
        let mut document = Document::new();
        document.add_block_definition(rect_block("HAAS_VF2", 48.0, 24.0));
        let insert = Point2::new(2_400.0, 4_800.0);
        let rotation = 30f64.to_radians();
        document.add_block_reference("HAAS_VF2", insert, rotation, "E-EQUIP");
        let footprints: FootprintTable = [footprint(2_400.0, 4_800.0, "HAAS_VF2")].into_iter().collect();

        let options = IngestOptions::default();
        let output = ingest(&document, &footprints, &options);
        let rect = output.scene.equipment().next().expect("equipment rect");
        assert!((rect.rotation_deg + 30.0).abs() < 1e-9);

        // CAD 中绕插入点逆时针旋转的块角点，经变换后必须与矩形角点重合
        let corners = rect.corners();
        for (dx, dy) in [(-48.0, -24.0), (48.0, -24.0), (48.0, 24.0), (-48.0, 24.0)] {
            let (sin, cos) = rotation.sin_cos();
            let cad = Point2::new(
                insert.x() + dx * cos - dy * sin,
                insert.y() + dx * sin + dy * cos,
            );
            let expected = options.transform.forward(cad);
            assert!(
                corners.iter().any(|c| c.distance(expected) < 1e-6),
                "corner {expected:?} not in {corners:?}"
            );
        }
    }

    #[test]
    fn block_references_need_layer_footprint_and_bounds() {
        let mut document = Document::new();
        document.add_block_definition(rect_block("PRESS", 10.0, 5.0));
        document.add_block_definition(BlockDefinition {
            name: "TAG".to_string(),
            base_point: Point2::new(0.0, 0.0),
            entities: vec![Entity::Text(Text {
                insert: Point2::new(0.0, 0.0),
                content: "T".to_string(),
                height: 1.0,
                rotation: 0.0,
                layer: "0".to_string(),
            })],
        });
        document.add_block_reference("PRESS", Point2::new(2_000.4, 3_000.0), 0.0, "E-EQUIP");
        document.add_block_reference("PRESS", Point2::new(2_500.0, 3_000.0), 0.0, "E-EQUIP");
        document.add_block_reference("TAG", Point2::new(3_000.0, 3_000.0), 0.0, "E-EQUIP");
        document.add_block_reference("PRESS", Point2::new(3_500.0, 3_000.0), 0.0, "A-WALL");
        document.add_block_reference("MISSING", Point2::new(4_000.0, 3_000.0), 0.0, "E-EQUIP");
        document.add_entity(Entity::Line(Line {
            start: Point2::new(2_000.0, 2_000.0),
            end: Point2::new(2_100.0, 2_000.0),
            layer: "A-ANNO".to_string(),
        }));

        let footprints: FootprintTable = [
            footprint(2_000.0, 3_000.0, "PRESS"),
            footprint(3_000.0, 3_000.0, "TAG"),
            footprint(4_000.0, 3_000.0, "MISSING"),
        ]
        .into_iter()
        .collect();

        let output = ingest(&document, &footprints, &IngestOptions::default());
        let report = &output.report;
        assert_eq!(report.kept_by_group["equipment"], 1);
        assert_eq!(report.kept_by_kind["equipment"], 1);
        assert_eq!(report.dropped(DropReason::NoFootprint), 1);
        assert_eq!(report.dropped(DropReason::NoBoundingBox), 2);
        assert_eq!(report.dropped(DropReason::OffEquipmentLayer), 1);
        assert_eq!(report.dropped(DropReason::LayerNotAllowed), 1);
        assert_eq!(report.source_entities, 6);

        let rect = output.scene.equipment().next().expect("rect");
        assert_eq!(rect.key.to_string(), "2000,3000");
        assert!((rect.half_width - 1.0).abs() < 1e-12);
        assert!((rect.half_height - 0.5).abs() < 1e-12);

        assert_eq!(output.bounds.len(), 1);
        let entry = output.bounds.get("PRESS").expect("bounds entry");
        assert_eq!(entry.half_width, 10.0);
        assert_eq!(entry.half_width_px, 1.0);
    }

    #[test]
    fn empty_groups_are_still_emitted_in_rule_order() {
        let output = ingest(&Document::new(), &FootprintTable::new(), &IngestOptions::default());
        let ids: Vec<&str> = output.scene.groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, ["areas", "walls", "columns", "doors", "glazing", "equipment"]);
        assert!((output.scene.width - 1_200.0).abs() < 1e-9);
        assert!((output.scene.height - 780.0).abs() < 1e-9);
        assert_eq!(output.report.kept(), 0);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let mut config = IngestConfig::default();
        config.transform = TransformConfig {
            scale: 0.0,
            ..TransformConfig::default()
        };
        assert!(matches!(
            IngestOptions::from_config(&config),
            Err(EngineError::InvalidTransform(_))
        ));

        let mut config = IngestConfig::default();
        config.percentile_low = 0.9;
        config.percentile_high = 0.1;
        assert!(matches!(
            IngestOptions::from_config(&config),
            Err(EngineError::InvalidPercentiles { .. })
        ));

        let options = IngestOptions::from_config(&IngestConfig::default()).expect("defaults");
        assert_eq!(options.equipment_layer, "E-EQUIP");
    }
}

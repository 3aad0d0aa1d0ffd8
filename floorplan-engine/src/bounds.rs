//! 块定义的稳健包围盒估算。
//!
//! 只统计块内部的几何图元；每个轴独立排序后取低/高分位数作为最小/最大值，
//! 以剔除引线、延伸标注之类的离群几何。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use floorplan_core::{
    document::{BlockDefinition, Document, Entity},
    transform::CoordinateTransform,
};

/// 块在自身坐标系下的范围（图纸单位）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BlockBounds {
    #[inline]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    #[inline]
    pub fn half_width(&self) -> f64 {
        self.width() * 0.5
    }

    #[inline]
    pub fn half_height(&self) -> f64 {
        self.height() * 0.5
    }
}

/// 在已排序的序列上取分位数，`index = round(p * (n - 1))`。
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let p = p.clamp(0.0, 1.0);
    let index = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted.get(index.min(sorted.len() - 1)).copied()
}

fn collect_coordinates(entities: &[Entity], xs: &mut Vec<f64>, ys: &mut Vec<f64>) {
    let mut push = |x: f64, y: f64| {
        if x.is_finite() && y.is_finite() {
            xs.push(x);
            ys.push(y);
        }
    };
    // 注释与嵌套块参照不贡献物理轮廓
    for entity in entities.iter().filter(|entity| !entity.is_annotation()) {
        match entity {
            Entity::Line(line) => {
                push(line.start.x(), line.start.y());
                push(line.end.x(), line.end.y());
            }
            Entity::Polyline(polyline) => {
                for vertex in &polyline.vertices {
                    push(vertex.position.x(), vertex.position.y());
                }
            }
            Entity::Arc(arc) => {
                let start = arc.start_point();
                let end = arc.end_point();
                push(arc.center.x(), arc.center.y());
                push(start.x(), start.y());
                push(end.x(), end.y());
            }
            Entity::Circle(circle) => {
                let (cx, cy, r) = (circle.center.x(), circle.center.y(), circle.radius.abs());
                push(cx - r, cy - r);
                push(cx + r, cy + r);
            }
            _ => {}
        }
    }
}

/// 计算单个块的包围盒；没有可用几何时返回 `None`。
pub fn block_bounds(block: &BlockDefinition, low: f64, high: f64) -> Option<BlockBounds> {
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    collect_coordinates(&block.entities, &mut xs, &mut ys);
    if xs.is_empty() {
        return None;
    }
    xs.sort_by(f64::total_cmp);
    ys.sort_by(f64::total_cmp);

    let bounds = BlockBounds {
        min_x: percentile(&xs, low)?,
        min_y: percentile(&ys, low)?,
        max_x: percentile(&xs, high)?,
        max_y: percentile(&ys, high)?,
    };
    trace!(block = %block.name, points = xs.len(), ?bounds, "块范围");
    Some(bounds)
}

/// 对文档中所有块定义求包围盒，同名块保留首个。
pub fn compute_block_bounds(document: &Document, low: f64, high: f64) -> BTreeMap<String, BlockBounds> {
    let mut result = BTreeMap::new();
    for block in document.blocks() {
        if result.contains_key(&block.name) {
            continue;
        }
        match block_bounds(block, low, high) {
            Some(bounds) => {
                result.insert(block.name.clone(), bounds);
            }
            None => debug!(block = %block.name, "块没有可用几何，不生成包围盒"),
        }
    }
    result
}

/// 外部消费的半宽/半高表条目，同时给出图纸单位与输出单位。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockBoundsEntry {
    pub half_width: f64,
    pub half_height: f64,
    pub half_width_px: f64,
    pub half_height_px: f64,
}

impl BlockBoundsEntry {
    pub fn new(bounds: &BlockBounds, transform: &CoordinateTransform) -> Self {
        Self {
            half_width: round2(bounds.half_width()),
            half_height: round2(bounds.half_height()),
            half_width_px: round2(transform.scale_length(bounds.half_width())),
            half_height_px: round2(transform.scale_length(bounds.half_height())),
        }
    }
}

/// 块名 → 半尺寸。序列化为以块名为键的 JSON 对象。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockBoundsTable {
    entries: BTreeMap<String, BlockBoundsEntry>,
}

impl BlockBoundsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入条目；同名已存在时保留首个并返回 `false`。
    pub fn insert(&mut self, name: impl Into<String>, entry: BlockBoundsEntry) -> bool {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return false;
        }
        self.entries.insert(name, entry);
        true
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&BlockBoundsEntry> {
        self.entries.get(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BlockBoundsEntry)> {
        self.entries.iter()
    }
}

/// 输出数值固定两位小数。
#[inline]
pub(crate) fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 { 0.0 } else { rounded }
}

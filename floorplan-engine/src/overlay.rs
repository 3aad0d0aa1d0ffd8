//! 设备轮廓与实时资产记录的叠加匹配。

use std::collections::{HashMap, HashSet};

use tracing::debug;
use floorplan_core::{
    equipment::{AssetRecord, AssetStatus, FootprintTable, PositionKey, normalize_identifier},
    geometry::Point2,
};

use crate::scene::{EquipmentRect, Scene};

/// 未匹配资产的中性色。
pub const NEUTRAL_COLOR: &str = "#94a3b8";

pub fn status_color(status: AssetStatus) -> &'static str {
    match status {
        AssetStatus::Operational => "#22c55e",
        AssetStatus::Maintenance => "#f59e0b",
        AssetStatus::Down => "#ef4444",
        AssetStatus::Offline => "#6b7280",
    }
}

/// 状态集合为空表示不按状态过滤；搜索词为空表示不按文字过滤。
#[derive(Debug, Clone, Default)]
pub struct OverlayFilter {
    pub statuses: HashSet<AssetStatus>,
    pub search: String,
}

impl OverlayFilter {
    fn admits(&self, status: Option<AssetStatus>, label: &str, equipment_type: &str) -> bool {
        if !self.statuses.is_empty() {
            match status {
                Some(status) if self.statuses.contains(&status) => {}
                _ => return false,
            }
        }
        let needle = self.search.trim().to_lowercase();
        needle.is_empty()
            || label.to_lowercase().contains(&needle)
            || equipment_type.to_lowercase().contains(&needle)
    }
}

/// 单个轮廓的叠加结果。
#[derive(Debug, Clone, PartialEq)]
pub struct FootprintOverlay {
    pub key: PositionKey,
    pub rect: EquipmentRect,
    pub asset_id: Option<String>,
    pub status: Option<AssetStatus>,
    pub color: &'static str,
    pub label: String,
    pub dimmed: bool,
}

/// 按机台编号（缺省为块名）索引的资产表，同一标识保留首条。
#[derive(Debug, Clone, Default)]
pub struct OverlayMatcher {
    by_identifier: HashMap<String, AssetRecord>,
}

impl OverlayMatcher {
    pub fn new<'a>(assets: impl IntoIterator<Item = &'a AssetRecord>) -> Self {
        let mut by_identifier = HashMap::new();
        for asset in assets {
            if let Some(key) = asset.join_key() {
                by_identifier.entry(key).or_insert_with(|| asset.clone());
            }
        }
        Self { by_identifier }
    }

    pub fn lookup(&self, identifier: &str) -> Option<&AssetRecord> {
        self.by_identifier.get(&normalize_identifier(identifier))
    }

    /// 对单个设备矩形求叠加结果。
    pub fn resolve(
        &self,
        rect: &EquipmentRect,
        footprints: &FootprintTable,
        filter: &OverlayFilter,
    ) -> FootprintOverlay {
        let identifier = footprints
            .get(rect.key)
            .map(|record| record.join_key())
            .unwrap_or_else(|| normalize_identifier(&rect.block));
        let asset = self.lookup(&identifier);

        let (color, label, status) = match asset {
            Some(asset) => (status_color(asset.status), asset.name.clone(), Some(asset.status)),
            None => (NEUTRAL_COLOR, rect.name.clone(), None),
        };
        let dimmed = asset.is_none() || !filter.admits(status, &label, &rect.equipment_type);

        FootprintOverlay {
            key: rect.key,
            rect: rect.clone(),
            asset_id: asset.map(|asset| asset.id.clone()),
            status,
            color,
            label,
            dimmed,
        }
    }
}

/// 场景中所有设备的叠加结果，支持按点拾取。
#[derive(Debug, Clone, Default)]
pub struct OverlayIndex {
    items: Vec<FootprintOverlay>,
}

impl OverlayIndex {
    pub fn build(
        scene: &Scene,
        footprints: &FootprintTable,
        assets: &[AssetRecord],
        filter: &OverlayFilter,
    ) -> Self {
        let matcher = OverlayMatcher::new(assets);
        let items: Vec<FootprintOverlay> = scene
            .equipment()
            .map(|rect| matcher.resolve(rect, footprints, filter))
            .collect();
        debug!(
            footprints = items.len(),
            matched = items.iter().filter(|item| item.asset_id.is_some()).count(),
            dimmed = items.iter().filter(|item| item.dimmed).count(),
            "设备叠加完成"
        );
        Self { items }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FootprintOverlay> {
        self.items.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: PositionKey) -> Option<&FootprintOverlay> {
        self.items.iter().find(|item| item.key == key)
    }

    /// 输出空间中的点命中的设备；重叠时取最后绘制（最上层）的一个。
    pub fn at(&self, point: Point2) -> Option<&FootprintOverlay> {
        self.items.iter().rev().find(|item| item.rect.contains(point))
    }
}

#[cfg(test)]
mod tests {
    use floorplan_core::equipment::FootprintRecord;

    use super::*;
    use crate::scene::{LayerStyle, Primitive};

    fn rect(x: f64, y: f64, block: &str, name: &str, rotation_deg: f64) -> EquipmentRect {
        EquipmentRect {
            center: Point2::new(x, y),
            half_width: 5.0,
            half_height: 2.0,
            rotation_deg,
            block: block.to_string(),
            key: PositionKey {
                x: (x * 10.0) as i64,
                y: (y * 10.0) as i64,
            },
            name: name.to_string(),
            equipment_type: "CNC Mill".to_string(),
        }
    }

    fn record(rect: &EquipmentRect, machine_id: Option<&str>) -> FootprintRecord {
        FootprintRecord {
            x: rect.key.x as f64,
            y: rect.key.y as f64,
            name: rect.name.clone(),
            equipment_type: rect.equipment_type.clone(),
            half_width: 50.0,
            half_height: 20.0,
            block: rect.block.clone(),
            machine_id: machine_id.map(str::to_string),
        }
    }

    fn asset(id: &str, name: &str, machine_id: Option<&str>, status: AssetStatus) -> AssetRecord {
        AssetRecord {
            id: id.to_string(),
            name: name.to_string(),
            machine_id: machine_id.map(str::to_string),
            status,
        }
    }

    fn scene_with(rects: &[EquipmentRect]) -> Scene {
        let mut scene = Scene::new(1_200.0, 780.0);
        let index = scene.ensure_group("equipment", LayerStyle::stroke("#0f766e", 0.75));
        scene.groups[index].primitives = rects.iter().cloned().map(Primitive::Equipment).collect();
        scene
    }

    #[test]
    fn matches_by_machine_id_then_block_name() {
        let mill = rect(100.0, 100.0, "HAAS_VF2", "VF-2 Mill", 0.0);
        let lathe = rect(200.0, 100.0, "LATHE_01", "Lathe", 0.0);
        let saw = rect(300.0, 100.0, "SAW", "Band Saw", 0.0);
        let footprints: FootprintTable = [
            record(&mill, Some(" m-101 ")),
            record(&lathe, None),
            record(&saw, None),
        ]
        .into_iter()
        .collect();
        let assets = vec![
            asset("a1", "Haas VF-2 (Line A)", Some("M-101"), AssetStatus::Down),
            asset("a2", "Okuma Lathe", Some("lathe_01"), AssetStatus::Operational),
            asset("a3", "Duplicate", Some("M-101"), AssetStatus::Operational),
        ];

        let index = OverlayIndex::build(
            &scene_with(&[mill.clone(), lathe.clone(), saw.clone()]),
            &footprints,
            &assets,
            &OverlayFilter::default(),
        );
        assert_eq!(index.len(), 3);

        let mill = index.get(mill.key).expect("mill overlay");
        assert_eq!(mill.asset_id.as_deref(), Some("a1"));
        assert_eq!(mill.color, status_color(AssetStatus::Down));
        assert_eq!(mill.label, "Haas VF-2 (Line A)");
        assert!(!mill.dimmed);

        let lathe = index.get(lathe.key).expect("lathe overlay");
        assert_eq!(lathe.status, Some(AssetStatus::Operational));

        let saw = index.get(saw.key).expect("saw overlay");
        assert!(saw.asset_id.is_none());
        assert_eq!(saw.color, NEUTRAL_COLOR);
        assert_eq!(saw.label, "Band Saw");
        assert!(saw.dimmed);
    }

    #[test]
    fn filter_dims_by_status_and_search() {
        let mill = rect(100.0, 100.0, "M1", "Mill", 0.0);
        let press = rect(200.0, 100.0, "P1", "Press", 0.0);
        let footprints: FootprintTable =
            [record(&mill, None), record(&press, None)].into_iter().collect();
        let assets = vec![
            asset("a1", "Mill One", Some("M1"), AssetStatus::Maintenance),
            asset("a2", "Press One", Some("P1"), AssetStatus::Operational),
        ];
        let scene = scene_with(&[mill.clone(), press.clone()]);

        let by_status = OverlayFilter {
            statuses: [AssetStatus::Maintenance].into_iter().collect(),
            search: String::new(),
        };
        let index = OverlayIndex::build(&scene, &footprints, &assets, &by_status);
        assert!(!index.get(mill.key).expect("mill").dimmed);
        assert!(index.get(press.key).expect("press").dimmed);

        let by_search = OverlayFilter {
            statuses: HashSet::new(),
            search: "  PRESS ".to_string(),
        };
        let index = OverlayIndex::build(&scene, &footprints, &assets, &by_search);
        assert!(index.get(mill.key).expect("mill").dimmed);
        assert!(!index.get(press.key).expect("press").dimmed);

        // 设备类型同样参与搜索
        let by_type = OverlayFilter {
            statuses: HashSet::new(),
            search: "cnc".to_string(),
        };
        let index = OverlayIndex::build(&scene, &footprints, &assets, &by_type);
        assert!(index.iter().all(|item| !item.dimmed));
    }

    #[test]
    fn hit_test_respects_rotation_and_draw_order() {
        let upright = rect(100.0, 100.0, "A", "A", 0.0);
        let mut turned = rect(100.0, 100.0, "B", "B", -90.0);
        turned.key = PositionKey { x: 1, y: 1 };
        let index = OverlayIndex::build(
            &scene_with(&[upright.clone(), turned.clone()]),
            &FootprintTable::new(),
            &[],
            &OverlayFilter::default(),
        );

        // 两者重叠区域命中后绘制的那个
        assert_eq!(index.at(Point2::new(100.0, 100.0)).map(|o| o.key), Some(turned.key));
        // 只有竖直放置的矩形覆盖 (104, 100)
        assert_eq!(index.at(Point2::new(104.0, 100.0)).map(|o| o.key), Some(upright.key));
        // 只有旋转后的矩形覆盖 (100, 104)
        assert_eq!(index.at(Point2::new(100.0, 104.0)).map(|o| o.key), Some(turned.key));
        assert!(index.at(Point2::new(120.0, 120.0)).is_none());
    }
}

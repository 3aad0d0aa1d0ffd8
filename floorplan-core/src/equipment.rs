//! 设备轮廓元数据与外部资产记录。

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Point2;

/// 以四舍五入到整数单位的图纸坐标作为键，吸收 CAD 与元数据之间的浮点抖动。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey {
    pub x: i64,
    pub y: i64,
}

impl PositionKey {
    #[inline]
    pub fn from_point(point: Point2) -> Self {
        Self {
            x: point.x().round() as i64,
            y: point.y().round() as i64,
        }
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// 轮廓元数据，半宽/半高以图纸单位计。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootprintRecord {
    pub x: f64,
    pub y: f64,
    pub name: String,
    #[serde(default)]
    pub equipment_type: String,
    pub half_width: f64,
    pub half_height: f64,
    pub block: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
}

impl FootprintRecord {
    #[inline]
    pub fn position(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }

    #[inline]
    pub fn key(&self) -> PositionKey {
        PositionKey::from_point(self.position())
    }

    /// 与资产记录关联用的标识：优先机台编号，缺省退化为块名。
    pub fn join_key(&self) -> String {
        let raw = self.machine_id.as_deref().unwrap_or(&self.block);
        normalize_identifier(raw)
    }
}

/// 位置键 → 轮廓元数据。同一键重复时保留首条。
#[derive(Debug, Clone, Default)]
pub struct FootprintTable {
    entries: HashMap<PositionKey, FootprintRecord>,
}

impl FootprintTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: FootprintRecord) -> bool {
        let key = record.key();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, record);
        true
    }

    /// 以插入点查询：先取整再精确匹配，未命中即返回 `None`，不做近邻猜测。
    #[inline]
    pub fn lookup(&self, point: Point2) -> Option<&FootprintRecord> {
        self.entries.get(&PositionKey::from_point(point))
    }

    #[inline]
    pub fn get(&self, key: PositionKey) -> Option<&FootprintRecord> {
        self.entries.get(&key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PositionKey, &FootprintRecord)> {
        self.entries.iter()
    }
}

impl FromIterator<FootprintRecord> for FootprintTable {
    fn from_iter<T: IntoIterator<Item = FootprintRecord>>(iter: T) -> Self {
        let mut table = Self::new();
        for record in iter {
            table.insert(record);
        }
        table
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Operational,
    Maintenance,
    Down,
    Offline,
}

impl AssetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetStatus::Operational => "operational",
            AssetStatus::Maintenance => "maintenance",
            AssetStatus::Down => "down",
            AssetStatus::Offline => "offline",
        }
    }
}

/// 资产管理系统提供的实时记录，只消费与叠加着色相关的字段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
    pub status: AssetStatus,
}

impl AssetRecord {
    pub fn join_key(&self) -> Option<String> {
        self.machine_id
            .as_deref()
            .map(normalize_identifier)
            .filter(|key| !key.is_empty())
    }
}

/// 去除首尾空白并统一为大写。
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(x: f64, y: f64, block: &str) -> FootprintRecord {
        FootprintRecord {
            x,
            y,
            name: format!("{block} @ {x},{y}"),
            equipment_type: "CNC".to_string(),
            half_width: 24.0,
            half_height: 12.0,
            block: block.to_string(),
            machine_id: None,
        }
    }

    #[test]
    fn lookup_rounds_to_whole_units() {
        let table: FootprintTable = [record(2_400.2, 4_800.0, "HAAS_VF2")].into_iter().collect();
        assert!(table.lookup(Point2::new(2_399.6, 4_800.4)).is_some());
        assert!(table.lookup(Point2::new(2_401.0, 4_800.0)).is_none());
    }

    #[test]
    fn duplicate_keys_keep_first_record() {
        let mut table = FootprintTable::new();
        assert!(table.insert(record(10.0, 10.0, "FIRST")));
        assert!(!table.insert(record(10.2, 9.9, "SECOND")));
        assert_eq!(table.len(), 1);
        let hit = table.get(PositionKey { x: 10, y: 10 }).expect("record");
        assert_eq!(hit.block, "FIRST");
    }

    #[test]
    fn join_key_prefers_machine_id() {
        let mut footprint = record(0.0, 0.0, "mazak_qtn");
        assert_eq!(footprint.join_key(), "MAZAK_QTN");
        footprint.machine_id = Some("  m-104 ".to_string());
        assert_eq!(footprint.join_key(), "M-104");
        assert_eq!(PositionKey { x: -3, y: 7 }.to_string(), "-3,7");
    }
}

//! 交互编辑器维护的楼层文档（`BuilderFloor`）。
//!
//! 文档只通过已提交的工具动作修改；绘制中的临时顶点不属于这里。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::{Point2, Vector2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(u64);

impl ItemId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ItemId,
    pub name: String,
    pub color: String,
    pub points: Vec<Point2>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WallStyle {
    #[default]
    Solid,
    Dashed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub id: ItemId,
    #[serde(default)]
    pub style: WallStyle,
    pub points: Vec<Point2>,
}

/// 带方向的流线，箭头位于最后一个顶点。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: ItemId,
    pub points: Vec<Point2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Flow {
    /// 末段箭头三角形（尖端、左翼、右翼），末段退化时返回 `None`。
    pub fn arrowhead(&self, length: f64) -> Option<[Point2; 3]> {
        let [.., from, tip] = self.points.as_slice() else {
            return None;
        };
        let direction = from.vector_to(*tip);
        let len = direction.length();
        if len <= f64::EPSILON {
            return None;
        }
        let unit = direction.scale(1.0 / len);
        let back = tip.translate(unit.scale(-length));
        let normal = Vector2::new(-unit.y(), unit.x()).scale(length * 0.5);
        Some([
            *tip,
            back.translate(normal),
            back.translate(normal.scale(-1.0)),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: ItemId,
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub font_size: f64,
}

impl Label {
    #[inline]
    pub fn position(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinShape {
    #[default]
    Circle,
    Square,
    Diamond,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinSize {
    Sm,
    #[default]
    Md,
    Lg,
}

impl PinSize {
    /// 图纸单位下的标记半径。
    pub fn radius(self) -> f64 {
        match self {
            PinSize::Sm => 6.0,
            PinSize::Md => 9.0,
            PinSize::Lg => 13.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPin {
    pub asset_id: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub shape: PinShape,
    #[serde(default)]
    pub size: PinSize,
}

impl AssetPin {
    #[inline]
    pub fn position(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

/// 楼层上各类条目的闭合和类型。
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Zone(Zone),
    Wall(Wall),
    Flow(Flow),
    Label(Label),
    Pin(AssetPin),
}

impl Entity {
    pub fn selection(&self) -> SelectedItem {
        match self {
            Entity::Zone(zone) => SelectedItem::Zone(zone.id),
            Entity::Wall(wall) => SelectedItem::Wall(wall.id),
            Entity::Flow(flow) => SelectedItem::Flow(flow.id),
            Entity::Label(label) => SelectedItem::Label(label.id),
            Entity::Pin(pin) => SelectedItem::Pin(pin.asset_id.clone()),
        }
    }
}

/// 当前选中的条目，图钉以资产 ID 引用。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SelectedItem {
    Zone(ItemId),
    Wall(ItemId),
    Flow(ItemId),
    Label(ItemId),
    Pin(String),
}

impl SelectedItem {
    /// 只有点状条目（标签、图钉）支持整体拖动。
    #[inline]
    pub fn is_draggable(&self) -> bool {
        matches!(self, SelectedItem::Label(_) | SelectedItem::Pin(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuilderFloor {
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub walls: Vec<Wall>,
    #[serde(default)]
    pub flows: Vec<Flow>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub pins: Vec<AssetPin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
}

impl BuilderFloor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 下一个可用 ID：已有最大 ID + 1，保证载入的文档继续编辑时不冲突。
    pub fn next_item_id(&self) -> ItemId {
        let max = self
            .zones
            .iter()
            .map(|z| z.id)
            .chain(self.walls.iter().map(|w| w.id))
            .chain(self.flows.iter().map(|f| f.id))
            .chain(self.labels.iter().map(|l| l.id))
            .map(ItemId::get)
            .max();
        ItemId(max.map_or(1, |value| value + 1))
    }

    /// 放置图钉：同一资产已有图钉时原地替换，保持每个资产至多一枚。
    pub fn place_pin(&mut self, pin: AssetPin) {
        if let Some(existing) = self.pins.iter_mut().find(|p| p.asset_id == pin.asset_id) {
            *existing = pin;
        } else {
            self.pins.push(pin);
        }
    }

    pub fn pin(&self, asset_id: &str) -> Option<&AssetPin> {
        self.pins.iter().find(|p| p.asset_id == asset_id)
    }

    pub fn label(&self, id: ItemId) -> Option<&Label> {
        self.labels.iter().find(|l| l.id == id)
    }

    /// 追加一个已校验的条目。
    pub fn insert(&mut self, entity: Entity) {
        match entity {
            Entity::Zone(zone) => self.zones.push(zone),
            Entity::Wall(wall) => self.walls.push(wall),
            Entity::Flow(flow) => self.flows.push(flow),
            Entity::Label(label) => self.labels.push(label),
            Entity::Pin(pin) => self.place_pin(pin),
        }
    }

    pub fn contains(&self, item: &SelectedItem) -> bool {
        match item {
            SelectedItem::Zone(id) => self.zones.iter().any(|z| z.id == *id),
            SelectedItem::Wall(id) => self.walls.iter().any(|w| w.id == *id),
            SelectedItem::Flow(id) => self.flows.iter().any(|f| f.id == *id),
            SelectedItem::Label(id) => self.labels.iter().any(|l| l.id == *id),
            SelectedItem::Pin(asset_id) => self.pin(asset_id).is_some(),
        }
    }

    /// 返回点状条目的锚点（标签位置或图钉中心）。
    pub fn anchor_of(&self, item: &SelectedItem) -> Option<Point2> {
        match item {
            SelectedItem::Label(id) => self.label(*id).map(Label::position),
            SelectedItem::Pin(asset_id) => self.pin(asset_id).map(AssetPin::position),
            _ => None,
        }
    }

    /// 移动点状条目的锚点，返回是否成功。
    pub fn move_anchor(&mut self, item: &SelectedItem, to: Point2) -> bool {
        match item {
            SelectedItem::Label(id) => match self.labels.iter_mut().find(|l| l.id == *id) {
                Some(label) => {
                    label.x = to.x();
                    label.y = to.y();
                    true
                }
                None => false,
            },
            SelectedItem::Pin(asset_id) => {
                match self.pins.iter_mut().find(|p| &p.asset_id == asset_id) {
                    Some(pin) => {
                        pin.x = to.x();
                        pin.y = to.y();
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }

    /// 删除条目，返回是否存在。
    pub fn remove(&mut self, item: &SelectedItem) -> bool {
        let before = self.item_count();
        match item {
            SelectedItem::Zone(id) => self.zones.retain(|z| z.id != *id),
            SelectedItem::Wall(id) => self.walls.retain(|w| w.id != *id),
            SelectedItem::Flow(id) => self.flows.retain(|f| f.id != *id),
            SelectedItem::Label(id) => self.labels.retain(|l| l.id != *id),
            SelectedItem::Pin(asset_id) => self.pins.retain(|p| &p.asset_id != asset_id),
        }
        self.item_count() != before
    }

    pub fn item_count(&self) -> usize {
        self.zones.len() + self.walls.len() + self.flows.len() + self.labels.len() + self.pins.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(asset_id: &str, x: f64, y: f64) -> AssetPin {
        AssetPin {
            asset_id: asset_id.to_string(),
            x,
            y,
            shape: PinShape::Circle,
            size: PinSize::Md,
        }
    }

    #[test]
    fn placing_pin_twice_replaces_it() {
        let mut floor = BuilderFloor::new();
        floor.place_pin(pin("A", 5.0, 5.0));
        floor.place_pin(pin("B", 1.0, 1.0));
        floor.place_pin(pin("A", 20.0, 20.0));

        let pins_for_a: Vec<_> = floor.pins.iter().filter(|p| p.asset_id == "A").collect();
        assert_eq!(pins_for_a.len(), 1);
        assert_eq!(pins_for_a[0].position(), Point2::new(20.0, 20.0));
        assert_eq!(floor.pins.len(), 2);
    }

    #[test]
    fn next_item_id_follows_largest_existing() {
        let mut floor = BuilderFloor::new();
        assert_eq!(floor.next_item_id(), ItemId::new(1));
        floor.walls.push(Wall {
            id: ItemId::new(7),
            style: WallStyle::Dashed,
            points: vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)],
        });
        floor.labels.push(Label {
            id: ItemId::new(3),
            text: "Dock".to_string(),
            x: 0.0,
            y: 0.0,
            font_size: 14.0,
        });
        assert_eq!(floor.next_item_id(), ItemId::new(8));
    }

    #[test]
    fn arrowhead_points_along_last_segment() {
        let flow = Flow {
            id: ItemId::new(1),
            points: vec![Point2::new(0.0, 0.0), Point2::new(10.0, 0.0)],
            label: None,
        };
        let [tip, left, right] = flow.arrowhead(4.0).expect("arrowhead");
        assert_eq!(tip, Point2::new(10.0, 0.0));
        assert!((left.x() - 6.0).abs() < 1e-9);
        assert!((left.y() - 2.0).abs() < 1e-9);
        assert!((right.y() + 2.0).abs() < 1e-9);

        let degenerate = Flow {
            id: ItemId::new(2),
            points: vec![Point2::new(1.0, 1.0), Point2::new(1.0, 1.0)],
            label: None,
        };
        assert!(degenerate.arrowhead(4.0).is_none());
    }

    #[test]
    fn anchors_move_only_point_entities() {
        let mut floor = BuilderFloor::new();
        floor.place_pin(pin("P-1", 0.0, 0.0));
        floor.zones.push(Zone {
            id: ItemId::new(1),
            name: "Zone 1".to_string(),
            color: "#60a5fa".to_string(),
            points: vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(1.0, 1.0),
            ],
        });

        let pin_item = SelectedItem::Pin("P-1".to_string());
        assert!(floor.move_anchor(&pin_item, Point2::new(30.0, 40.0)));
        assert_eq!(floor.anchor_of(&pin_item), Some(Point2::new(30.0, 40.0)));
        assert!(!floor.move_anchor(&SelectedItem::Zone(ItemId::new(1)), Point2::new(5.0, 5.0)));

        assert!(floor.remove(&pin_item));
        assert!(!floor.remove(&pin_item));
        assert_eq!(floor.item_count(), 1);
    }

    #[test]
    fn floor_document_round_trips_through_serde() {
        let mut floor = BuilderFloor::new();
        floor.place_pin(pin("A", 5.0, 5.0));
        floor.background_image = Some("plan.png".to_string());
        let json = serde_json::to_string(&floor).expect("serialize");
        let restored: BuilderFloor = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, floor);

        let minimal: BuilderFloor = serde_json::from_str("{}").expect("empty document");
        assert_eq!(minimal.item_count(), 0);
    }
}

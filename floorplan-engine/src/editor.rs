//! 楼层编辑器：把输入事件转换为对 `BuilderFloor` 的已提交修改。
//!
//! 所有事件都经过 [`FloorEditor::handle`]，一次处理完毕后才接收下一个事件。
//! 绘制中的顶点、标签草稿与拖动锚点只存在于 [`ToolState`]，提交前不会写入文档。

use std::collections::HashSet;

use floorplan_config::EditorConfig;
use floorplan_core::{
    floor::{
        AssetPin, BuilderFloor, Entity, Flow, Label, PinShape, PinSize, SelectedItem, Wall,
        WallStyle, Zone,
    },
    geometry::{Point2, distance_to_polyline, point_in_polygon},
};
use tracing::{debug, trace, warn};

use crate::errors::EngineError;
use crate::tool::{
    DragKind, DragSession, InputEvent, Key, LabelDraft, Tool, ToolState, snap_point,
};
use crate::viewport::{PinchGesture, ViewportController};

/// 新区域依次使用的填充色。
const ZONE_COLORS: [&str; 6] = [
    "#bfdbfe", "#bbf7d0", "#fde68a", "#fecaca", "#ddd6fe", "#fbcfe8",
];
/// 标签命中框按字号估算字符宽度。
const LABEL_CHAR_WIDTH: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditorSettings {
    pub grid_size: f64,
    pub snap_enabled: bool,
    pub closing_radius: f64,
    pub label_font_size: f64,
    pub hit_tolerance: f64,
    pub wall_style: WallStyle,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self::from(&EditorConfig::default())
    }
}

impl From<&EditorConfig> for EditorSettings {
    fn from(config: &EditorConfig) -> Self {
        Self {
            grid_size: config.grid_size,
            snap_enabled: config.snap_enabled,
            closing_radius: config.closing_radius,
            label_font_size: config.label_font_size,
            hit_tolerance: config.hit_tolerance,
            wall_style: WallStyle::Solid,
        }
    }
}

/// 单个事件的处理结果。
#[derive(Debug, Clone, PartialEq)]
pub enum EditorOutcome {
    /// 事件与当前状态无关。
    Ignored,
    /// 只改变了瞬时状态（缓冲、悬停、选中、草稿）。
    Updated,
    /// 文档被修改，附带新提交或被移动的条目。
    Committed(SelectedItem),
    Removed(SelectedItem),
    ViewportChanged,
}

#[derive(Debug, Clone)]
pub struct FloorEditor {
    floor: BuilderFloor,
    tools: ToolState,
    viewport: ViewportController,
    settings: EditorSettings,
    pinch: PinchGesture,
    catalog: Option<HashSet<String>>,
}

impl FloorEditor {
    pub fn new(floor: BuilderFloor, viewport: ViewportController, settings: EditorSettings) -> Self {
        Self {
            floor,
            tools: ToolState::new(),
            viewport,
            settings,
            pinch: PinchGesture::default(),
            catalog: None,
        }
    }

    #[inline]
    pub fn floor(&self) -> &BuilderFloor {
        &self.floor
    }

    #[inline]
    pub fn tools(&self) -> &ToolState {
        &self.tools
    }

    #[inline]
    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    #[inline]
    pub fn viewport_mut(&mut self) -> &mut ViewportController {
        &mut self.viewport
    }

    #[inline]
    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    #[inline]
    pub fn settings_mut(&mut self) -> &mut EditorSettings {
        &mut self.settings
    }

    #[inline]
    pub fn selected(&self) -> Option<&SelectedItem> {
        self.tools.selected.as_ref()
    }

    /// 注册可放置的资产 ID；注册后拖入未知 ID 会被忽略。
    pub fn register_asset_catalog<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.catalog = Some(ids.into_iter().map(Into::into).collect());
    }

    pub fn set_tool(&mut self, tool: Tool) {
        if self.tools.active_tool != tool {
            debug!(from = %self.tools.active_tool, to = %tool, "切换工具");
        }
        self.tools.set_tool(tool);
    }

    /// 切换网格吸附，返回切换后的状态。
    pub fn toggle_snap(&mut self) -> bool {
        self.settings.snap_enabled = !self.settings.snap_enabled;
        self.settings.snap_enabled
    }

    pub fn cancel_shape(&mut self) -> bool {
        self.tools.cancel_shape()
    }

    pub fn reset_viewport(&mut self) {
        self.viewport.reset();
    }

    pub fn clear_selection(&mut self) {
        self.tools.clear_selection();
    }

    /// 删除当前选中项；没有选中项时返回 `Ok(None)`。
    pub fn delete_selection(&mut self) -> Result<Option<SelectedItem>, EngineError> {
        let Some(item) = self.tools.selected.take() else {
            return Ok(None);
        };
        self.tools.drag = None;
        if self.floor.remove(&item) {
            debug!(?item, "删除条目");
            Ok(Some(item))
        } else {
            Err(EngineError::ItemNotFound(describe(&item)))
        }
    }

    /// 编辑器的状态转移函数。
    pub fn handle(&mut self, event: InputEvent) -> Result<EditorOutcome, EngineError> {
        trace!(?event, tool = %self.tools.active_tool, "输入事件");
        match event {
            InputEvent::PointerDown { screen } => self.pointer_down(screen),
            InputEvent::PointerMove { screen } => Ok(self.pointer_move(screen)),
            InputEvent::PointerUp { .. } => Ok(match self.tools.drag.take() {
                Some(_) => EditorOutcome::Updated,
                None => EditorOutcome::Ignored,
            }),
            InputEvent::DoubleClick { .. } => self.double_click(),
            InputEvent::Wheel { screen, delta_y } => {
                self.viewport.wheel(screen, delta_y);
                Ok(EditorOutcome::ViewportChanged)
            }
            InputEvent::TouchStart { touches } => Ok(self.touch_start(&touches)),
            InputEvent::TouchMove { touches } => Ok(self.touch_move(&touches)),
            InputEvent::TouchEnd { touches } => Ok(self.touch_end(&touches)),
            InputEvent::KeyDown { key } => self.key_down(key),
            InputEvent::TextInput { text } => Ok(match self.tools.label_draft.as_mut() {
                Some(draft) => {
                    draft.text = text;
                    EditorOutcome::Updated
                }
                None => EditorOutcome::Ignored,
            }),
            InputEvent::Blur => Ok(self.finish_label()),
            InputEvent::Drop { asset_id, screen } => Ok(self.drop_asset(asset_id, screen)),
        }
    }

    fn place(&self, point: Point2) -> Point2 {
        if self.settings.snap_enabled {
            snap_point(point, self.settings.grid_size)
        } else {
            point
        }
    }

    fn pointer_down(&mut self, screen: Point2) -> Result<EditorOutcome, EngineError> {
        let point = self.viewport.screen_to_drawing(screen);
        match self.tools.active_tool {
            Tool::Select => {
                match self.hit_test(point) {
                    Some(item) => {
                        self.tools.drag = self.floor.anchor_of(&item).map(|origin| DragSession {
                            kind: DragKind::Item {
                                item: item.clone(),
                                start_screen: screen,
                                origin,
                            },
                        });
                        self.tools.select(item);
                    }
                    None => {
                        self.tools.clear_selection();
                        self.tools.drag = Some(DragSession {
                            kind: DragKind::Pan { last: screen },
                        });
                    }
                }
                Ok(EditorOutcome::Updated)
            }
            Tool::Zone | Tool::Wall | Tool::Flow => {
                let closes_zone = self.tools.active_tool == Tool::Zone
                    && self.tools.in_progress.len() >= 3
                    && self.tools.in_progress[0].distance(point) <= self.settings.closing_radius;
                if closes_zone {
                    return self.commit_shape();
                }
                let vertex = self.place(point);
                self.tools.in_progress.push(vertex);
                Ok(EditorOutcome::Updated)
            }
            Tool::Label => {
                self.tools.label_draft = Some(LabelDraft::new(self.place(point)));
                Ok(EditorOutcome::Updated)
            }
        }
    }

    fn pointer_move(&mut self, screen: Point2) -> EditorOutcome {
        let point = self.viewport.screen_to_drawing(screen);
        self.tools.hover = Some(if self.tools.active_tool.draws_shape() {
            self.place(point)
        } else {
            point
        });

        let Some(kind) = self.tools.drag.as_ref().map(|session| session.kind.clone()) else {
            return EditorOutcome::Updated;
        };
        match kind {
            DragKind::Item {
                item,
                start_screen,
                origin,
            } => {
                let delta = self.viewport.screen_delta_to_drawing(
                    screen.x() - start_screen.x(),
                    screen.y() - start_screen.y(),
                );
                let target = self.place(origin.translate(delta));
                if self.floor.move_anchor(&item, target) {
                    EditorOutcome::Committed(item)
                } else {
                    self.tools.drag = None;
                    EditorOutcome::Ignored
                }
            }
            DragKind::Pan { last } => {
                self.tools.drag = Some(DragSession {
                    kind: DragKind::Pan { last: screen },
                });
                self.viewport.pan_by(screen.x() - last.x(), screen.y() - last.y());
                EditorOutcome::ViewportChanged
            }
        }
    }

    fn double_click(&mut self) -> Result<EditorOutcome, EngineError> {
        match self.tools.active_tool {
            Tool::Wall | Tool::Flow if self.tools.is_drawing() => self.commit_shape(),
            _ => Ok(EditorOutcome::Ignored),
        }
    }

    /// 提交缓冲中的形状；顶点不足时丢弃缓冲并返回错误。
    fn commit_shape(&mut self) -> Result<EditorOutcome, EngineError> {
        let mut points = std::mem::take(&mut self.tools.in_progress);
        points.dedup();

        let tool = self.tools.active_tool;
        // 区域隐式闭合，末点回到首点视为重复
        if tool == Tool::Zone && points.len() > 1 && points.last() == points.first() {
            points.pop();
        }
        let required = if tool == Tool::Zone { 3 } else { 2 };
        let distinct = points
            .iter()
            .enumerate()
            .filter(|&(i, p)| !points[..i].contains(p))
            .count();
        if distinct < required {
            warn!(tool = %tool, vertices = distinct, "顶点不足，放弃当前形状");
            return Err(EngineError::DegenerateShape {
                kind: tool.as_str(),
                required,
                actual: distinct,
            });
        }

        let id = self.floor.next_item_id();
        let entity = match tool {
            Tool::Zone => {
                let index = self.floor.zones.len();
                Entity::Zone(Zone {
                    id,
                    name: format!("Zone {}", index + 1),
                    color: ZONE_COLORS[index % ZONE_COLORS.len()].to_string(),
                    points,
                })
            }
            Tool::Wall => Entity::Wall(Wall {
                id,
                style: self.settings.wall_style,
                points,
            }),
            Tool::Flow => Entity::Flow(Flow {
                id,
                points,
                label: None,
            }),
            Tool::Select | Tool::Label => return Ok(EditorOutcome::Ignored),
        };
        Ok(self.commit(entity))
    }

    fn commit(&mut self, entity: Entity) -> EditorOutcome {
        let item = entity.selection();
        self.floor.insert(entity);
        self.tools.select(item.clone());
        debug!(?item, items = self.floor.item_count(), "提交条目");
        EditorOutcome::Committed(item)
    }

    /// Enter / 失焦：非空文本提交标签，否则丢弃草稿。
    fn finish_label(&mut self) -> EditorOutcome {
        let Some(draft) = self.tools.label_draft.take() else {
            return EditorOutcome::Ignored;
        };
        let text = draft.text.trim();
        if text.is_empty() {
            return EditorOutcome::Updated;
        }
        let label = Label {
            id: self.floor.next_item_id(),
            text: text.to_string(),
            x: draft.position.x(),
            y: draft.position.y(),
            font_size: self.settings.label_font_size,
        };
        self.commit(Entity::Label(label))
    }

    fn key_down(&mut self, key: Key) -> Result<EditorOutcome, EngineError> {
        match key {
            Key::Enter => Ok(self.finish_label()),
            Key::Escape => {
                if self.tools.label_draft.take().is_some() || self.tools.cancel_shape() {
                    Ok(EditorOutcome::Updated)
                } else {
                    Ok(EditorOutcome::Ignored)
                }
            }
            // 草稿编辑期间退格属于文本输入
            Key::Delete | Key::Backspace if self.tools.label_draft.is_none() => {
                Ok(match self.delete_selection()? {
                    Some(item) => EditorOutcome::Removed(item),
                    None => EditorOutcome::Ignored,
                })
            }
            Key::Delete | Key::Backspace | Key::Character(_) => Ok(EditorOutcome::Ignored),
        }
    }

    fn touch_start(&mut self, touches: &[Point2]) -> EditorOutcome {
        match touches {
            [a, b, ..] => {
                self.tools.drag = None;
                self.pinch.start(*a, *b);
                EditorOutcome::Updated
            }
            [single] => {
                self.tools.drag = Some(DragSession {
                    kind: DragKind::Pan { last: *single },
                });
                EditorOutcome::Updated
            }
            [] => EditorOutcome::Ignored,
        }
    }

    fn touch_move(&mut self, touches: &[Point2]) -> EditorOutcome {
        match touches {
            [a, b, ..] if self.pinch.is_active() => {
                self.pinch.update(*a, *b, &mut self.viewport);
                EditorOutcome::ViewportChanged
            }
            [single] => match self.tools.drag.as_mut().map(|session| &mut session.kind) {
                Some(DragKind::Pan { last }) => {
                    let (dx, dy) = (single.x() - last.x(), single.y() - last.y());
                    *last = *single;
                    self.viewport.pan_by(dx, dy);
                    EditorOutcome::ViewportChanged
                }
                _ => EditorOutcome::Ignored,
            },
            _ => EditorOutcome::Ignored,
        }
    }

    /// `touches` 为抬起后仍在屏幕上的触点。
    fn touch_end(&mut self, touches: &[Point2]) -> EditorOutcome {
        if touches.len() < 2 {
            self.pinch.end();
        }
        self.tools.drag = match touches {
            [single] => Some(DragSession {
                kind: DragKind::Pan { last: *single },
            }),
            _ => None,
        };
        EditorOutcome::Updated
    }

    fn drop_asset(&mut self, asset_id: Option<String>, screen: Point2) -> EditorOutcome {
        let Some(asset_id) = asset_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
        else {
            debug!("拖入事件缺少资产 ID，忽略");
            return EditorOutcome::Ignored;
        };
        if self
            .catalog
            .as_ref()
            .is_some_and(|catalog| !catalog.contains(&asset_id))
        {
            debug!(%asset_id, "资产不在目录中，忽略");
            return EditorOutcome::Ignored;
        }

        let point = self.place(self.viewport.screen_to_drawing(screen));
        let (shape, size) = self
            .floor
            .pin(&asset_id)
            .map(|pin| (pin.shape, pin.size))
            .unwrap_or((PinShape::default(), PinSize::default()));
        self.commit(Entity::Pin(AssetPin {
            asset_id,
            x: point.x(),
            y: point.y(),
            shape,
            size,
        }))
    }

    /// 命中测试顺序：图钉、标签、流线、墙体、区域；同类中后绘制者优先。
    pub fn hit_test(&self, point: Point2) -> Option<SelectedItem> {
        let tolerance = self.settings.hit_tolerance;
        let near = |points: &[Point2]| {
            distance_to_polyline(point, points).is_some_and(|distance| distance <= tolerance)
        };

        if let Some(pin) = self
            .floor
            .pins
            .iter()
            .rev()
            .find(|pin| pin.position().distance(point) <= pin.size.radius() + tolerance)
        {
            return Some(SelectedItem::Pin(pin.asset_id.clone()));
        }
        if let Some(label) = self.floor.labels.iter().rev().find(|label| {
            let width = label.text.chars().count() as f64 * label.font_size * LABEL_CHAR_WIDTH;
            point.x() >= label.x - tolerance
                && point.x() <= label.x + width + tolerance
                && point.y() >= label.y - label.font_size - tolerance
                && point.y() <= label.y + tolerance
        }) {
            return Some(SelectedItem::Label(label.id));
        }
        if let Some(flow) = self.floor.flows.iter().rev().find(|flow| near(&flow.points)) {
            return Some(SelectedItem::Flow(flow.id));
        }
        if let Some(wall) = self.floor.walls.iter().rev().find(|wall| near(&wall.points)) {
            return Some(SelectedItem::Wall(wall.id));
        }
        self.floor
            .zones
            .iter()
            .rev()
            .find(|zone| {
                point_in_polygon(point, &zone.points) || {
                    let mut ring = zone.points.clone();
                    ring.extend(zone.points.first().copied());
                    near(&ring)
                }
            })
            .map(|zone| SelectedItem::Zone(zone.id))
    }
}

fn describe(item: &SelectedItem) -> String {
    match item {
        SelectedItem::Zone(id) => format!("zone #{id}"),
        SelectedItem::Wall(id) => format!("wall #{id}"),
        SelectedItem::Flow(id) => format!("flow #{id}"),
        SelectedItem::Label(id) => format!("label #{id}"),
        SelectedItem::Pin(asset_id) => format!("pin {asset_id}"),
    }
}

//! 绘图工具、输入事件与编辑器的瞬时状态。

use std::fmt;
use std::str::FromStr;

use floorplan_core::{
    floor::SelectedItem,
    geometry::Point2,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tool {
    #[default]
    Select,
    Zone,
    Wall,
    Flow,
    Label,
}

impl Tool {
    pub const ALL: [Tool; 5] = [Tool::Select, Tool::Zone, Tool::Wall, Tool::Flow, Tool::Label];

    pub fn as_str(self) -> &'static str {
        match self {
            Tool::Select => "select",
            Tool::Zone => "zone",
            Tool::Wall => "wall",
            Tool::Flow => "flow",
            Tool::Label => "label",
        }
    }

    /// 是否为逐点绘制折线/多边形的工具。
    #[inline]
    pub fn draws_shape(self) -> bool {
        matches!(self, Tool::Zone | Tool::Wall | Tool::Flow)
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTool(pub String);

impl fmt::Display for UnknownTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "未知工具: {}", self.0)
    }
}

impl std::error::Error for UnknownTool {}

impl FromStr for Tool {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Tool::ALL
            .into_iter()
            .find(|tool| tool.as_str() == name)
            .ok_or_else(|| UnknownTool(s.to_string()))
    }
}

/// 按网格取整；网格非正或非有限时原样返回。
#[inline]
pub fn snap(value: f64, grid: f64) -> f64 {
    if !grid.is_finite() || grid <= 0.0 {
        return value;
    }
    (value / grid).round() * grid
}

#[inline]
pub fn snap_point(point: Point2, grid: f64) -> Point2 {
    Point2::new(snap(point.x(), grid), snap(point.y(), grid))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
    Delete,
    Backspace,
    Character(char),
}

/// 编辑器的输入事件，坐标均为屏幕像素。
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerDown { screen: Point2 },
    PointerMove { screen: Point2 },
    PointerUp { screen: Point2 },
    DoubleClick { screen: Point2 },
    Wheel { screen: Point2, delta_y: f64 },
    TouchStart { touches: Vec<Point2> },
    TouchMove { touches: Vec<Point2> },
    TouchEnd { touches: Vec<Point2> },
    KeyDown { key: Key },
    TextInput { text: String },
    Blur,
    Drop { asset_id: Option<String>, screen: Point2 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DragKind {
    /// 拖动点状条目；`origin` 为按下时条目的锚点。
    Item {
        item: SelectedItem,
        start_screen: Point2,
        origin: Point2,
    },
    /// 拖动空白画布平移视口。
    Pan { last: Point2 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub kind: DragKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelDraft {
    pub position: Point2,
    pub text: String,
}

impl LabelDraft {
    pub fn new(position: Point2) -> Self {
        Self {
            position,
            text: String::new(),
        }
    }
}

/// 工具模式、绘制缓冲、选中项与拖动锚点集中在一处。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolState {
    pub active_tool: Tool,
    pub in_progress: Vec<Point2>,
    pub hover: Option<Point2>,
    pub selected: Option<SelectedItem>,
    pub drag: Option<DragSession>,
    pub label_draft: Option<LabelDraft>,
}

impl ToolState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 切换工具，丢弃未完成的形状、标签草稿与拖动。
    pub fn set_tool(&mut self, tool: Tool) {
        self.active_tool = tool;
        self.in_progress.clear();
        self.label_draft = None;
        self.drag = None;
    }

    #[inline]
    pub fn is_drawing(&self) -> bool {
        !self.in_progress.is_empty()
    }

    pub fn cancel_shape(&mut self) -> bool {
        let had_shape = self.is_drawing();
        self.in_progress.clear();
        had_shape
    }

    pub fn select(&mut self, item: SelectedItem) {
        self.selected = Some(item);
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }
}

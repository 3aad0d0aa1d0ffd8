//! 图纸空间上的可平移/缩放视口。
//!
//! 视口始终以图纸单位描述 `{x, y, w, h}`，屏幕尺寸只用于把像素增量换算成
//! 图纸增量。宽度限制在 `[min_w, max_w]`，高度随画布宽高比联动；位置限制在
//! 画布外最多露出自身 30% 的范围内。

use floorplan_config::ViewportConfig;
use floorplan_core::geometry::{Point2, Vector2};
use tracing::trace;

/// 视口允许越出画布的比例（相对视口自身尺寸）。
const OVERSCROLL: f64 = 0.3;
/// 最大视口宽度相对画布宽度的上限，保证越界约束始终可满足。
const MAX_EXTENT_RATIO: f64 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone)]
pub struct ViewportController {
    viewport: Viewport,
    canvas_width: f64,
    canvas_height: f64,
    screen_width: f64,
    screen_height: f64,
    min_width: f64,
    max_width: f64,
    wheel_factor: f64,
}

impl ViewportController {
    pub fn new(canvas_width: f64, canvas_height: f64, config: &ViewportConfig) -> Self {
        let canvas_width = positive_or(canvas_width, 1.0);
        let canvas_height = positive_or(canvas_height, 1.0);
        let max_width = (canvas_width * positive_or(config.max_scale, 1.0))
            .min(canvas_width * MAX_EXTENT_RATIO);
        let min_width = (canvas_width * positive_or(config.min_scale, 1.0)).min(max_width);
        let wheel_factor = if config.wheel_factor.is_finite() && config.wheel_factor > 1.0 {
            config.wheel_factor
        } else {
            ViewportConfig::default().wheel_factor
        };

        Self {
            viewport: Viewport {
                x: 0.0,
                y: 0.0,
                w: canvas_width,
                h: canvas_height,
            },
            canvas_width,
            canvas_height,
            screen_width: positive_or(config.screen_width, canvas_width),
            screen_height: positive_or(config.screen_height, canvas_height),
            min_width,
            max_width,
            wheel_factor,
        }
    }

    #[inline]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[inline]
    pub fn canvas_size(&self) -> (f64, f64) {
        (self.canvas_width, self.canvas_height)
    }

    #[inline]
    pub fn screen_size(&self) -> (f64, f64) {
        (self.screen_width, self.screen_height)
    }

    /// 宽度范围 `(min, max)`，高度范围按宽高比换算。
    #[inline]
    pub fn width_limits(&self) -> (f64, f64) {
        (self.min_width, self.max_width)
    }

    #[inline]
    fn aspect(&self) -> f64 {
        self.canvas_height / self.canvas_width
    }

    /// 恢复为完整画布。
    pub fn reset(&mut self) {
        self.viewport = Viewport {
            x: 0.0,
            y: 0.0,
            w: self.canvas_width,
            h: self.canvas_height,
        };
    }

    /// 屏幕尺寸变化；非正或非有限值被忽略。
    pub fn set_screen_size(&mut self, width: f64, height: f64) {
        if width.is_finite() && width > 0.0 && height.is_finite() && height > 0.0 {
            self.screen_width = width;
            self.screen_height = height;
        }
    }

    pub fn screen_to_drawing(&self, screen: Point2) -> Point2 {
        let vp = self.viewport;
        Point2::new(
            vp.x + screen.x() * vp.w / self.screen_width,
            vp.y + screen.y() * vp.h / self.screen_height,
        )
    }

    pub fn drawing_to_screen(&self, drawing: Point2) -> Point2 {
        let vp = self.viewport;
        Point2::new(
            (drawing.x() - vp.x) * self.screen_width / vp.w,
            (drawing.y() - vp.y) * self.screen_height / vp.h,
        )
    }

    /// 屏幕像素位移换算为图纸位移。
    pub fn screen_delta_to_drawing(&self, dx: f64, dy: f64) -> Vector2 {
        Vector2::new(
            dx * self.viewport.w / self.screen_width,
            dy * self.viewport.h / self.screen_height,
        )
    }

    /// 拖拽语义：内容跟随指针移动，视口反向移动。
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }
        let delta = self.screen_delta_to_drawing(dx, dy);
        self.viewport.x -= delta.x();
        self.viewport.y -= delta.y();
        self.clamp();
    }

    /// 以屏幕点为锚缩放，`factor > 1` 表示视口变大（缩小显示）。
    pub fn zoom_at(&mut self, screen: Point2, factor: f64) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let anchor = self.screen_to_drawing(screen);
        let width = (self.viewport.w * factor).clamp(self.min_width, self.max_width);
        let height = width * self.aspect();

        self.viewport = Viewport {
            x: anchor.x() - screen.x() / self.screen_width * width,
            y: anchor.y() - screen.y() / self.screen_height * height,
            w: width,
            h: height,
        };
        self.clamp();
        trace!(factor, viewport = ?self.viewport, "视口缩放");
    }

    /// 滚轮向下（`delta_y > 0`）放大视口，向上缩小；零增量忽略。
    pub fn wheel(&mut self, screen: Point2, delta_y: f64) {
        if delta_y > 0.0 {
            self.zoom_at(screen, self.wheel_factor);
        } else if delta_y < 0.0 {
            self.zoom_at(screen, 1.0 / self.wheel_factor);
        }
    }

    fn clamp(&mut self) {
        let vp = &mut self.viewport;
        vp.w = vp.w.clamp(self.min_width, self.max_width);
        vp.h = vp.w * self.canvas_height / self.canvas_width;
        vp.x = clamp_overscroll(vp.x, vp.w, self.canvas_width);
        vp.y = clamp_overscroll(vp.y, vp.h, self.canvas_height);
    }
}

/// 最大尺寸时上下界在浮点下可能相差一个 ulp，上界不低于下界。
fn clamp_overscroll(position: f64, extent: f64, canvas: f64) -> f64 {
    let lo = -OVERSCROLL * extent;
    let hi = (canvas - (1.0 - OVERSCROLL) * extent).max(lo);
    position.clamp(lo, hi)
}

fn positive_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

/// 双指缩放：记录上一次两指间距，每次更新以中点为锚缩放 `previous / current`。
#[derive(Debug, Clone, Copy, Default)]
pub struct PinchGesture {
    previous: Option<f64>,
}

impl PinchGesture {
    pub fn start(&mut self, a: Point2, b: Point2) {
        self.previous = Some(a.distance(b));
    }

    pub fn update(&mut self, a: Point2, b: Point2, controller: &mut ViewportController) {
        let current = a.distance(b);
        if current <= f64::EPSILON {
            return;
        }
        if let Some(previous) = self.previous {
            controller.zoom_at(a.midpoint(b), previous / current);
        }
        self.previous = Some(current);
    }

    pub fn end(&mut self) {
        self.previous = None;
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.previous.is_some()
    }
}

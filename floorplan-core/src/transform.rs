//! 图纸空间（CAD 原始单位，Y 轴向上）与输出空间（Y 轴向下）之间的仿射映射。
//!
//! 下游模块只通过 [`CoordinateTransform`] 换算坐标，不自行嵌入偏移/比例常量。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Bounds2D, Point2};

/// 参考图纸的默认水平偏移（英寸）。
pub const DEFAULT_X_OFFSET: f64 = 1_200.0;
/// 参考图纸的默认翻转基准 Y（英寸）。
pub const DEFAULT_Y_FLIP_ORIGIN: f64 = 9_600.0;
/// 每英寸对应的输出单位。
pub const DEFAULT_SCALE: f64 = 0.1;

#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("scale must be finite and positive, got {0}")]
    InvalidScale(f64),
}

/// 均匀缩放 + 垂直翻转 + 水平偏移。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateTransform {
    x_offset: f64,
    y_flip_origin: f64,
    scale: f64,
}

impl CoordinateTransform {
    pub fn new(x_offset: f64, y_flip_origin: f64, scale: f64) -> Result<Self, TransformError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(TransformError::InvalidScale(scale));
        }
        Ok(Self {
            x_offset,
            y_flip_origin,
            scale,
        })
    }

    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// 图纸空间 → 输出空间。
    #[inline]
    pub fn forward(&self, point: Point2) -> Point2 {
        Point2::new(
            (point.x() - self.x_offset) * self.scale,
            (self.y_flip_origin - point.y()) * self.scale,
        )
    }

    /// 输出空间 → 图纸空间。
    #[inline]
    pub fn inverse(&self, point: Point2) -> Point2 {
        Point2::new(
            point.x() / self.scale + self.x_offset,
            self.y_flip_origin - point.y() / self.scale,
        )
    }

    /// 长度量（半径、半宽）只缩放，不翻转。
    #[inline]
    pub fn scale_length(&self, length: f64) -> f64 {
        length * self.scale
    }

    /// 图纸空间中的矩形映射到输出空间后的包围盒。
    pub fn forward_bounds(&self, bounds: &Bounds2D) -> Bounds2D {
        let mut mapped = Bounds2D::empty();
        mapped.include_point(self.forward(bounds.min()));
        mapped.include_point(self.forward(bounds.max()));
        mapped
    }
}

impl Default for CoordinateTransform {
    fn default() -> Self {
        Self {
            x_offset: DEFAULT_X_OFFSET,
            y_flip_origin: DEFAULT_Y_FLIP_ORIGIN,
            scale: DEFAULT_SCALE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_flips_and_scales() {
        let transform = CoordinateTransform::default();
        let mapped = transform.forward(Point2::new(1_300.0, 9_500.0));
        assert!((mapped.x() - 10.0).abs() < 1e-9);
        assert!((mapped.y() - 10.0).abs() < 1e-9);

        let higher = transform.forward(Point2::new(1_300.0, 9_550.0));
        assert!(higher.y() < mapped.y(), "Y 轴向上的点映射后应更靠上");
    }

    #[test]
    fn inverse_round_trips_within_tolerance() {
        let transform = CoordinateTransform::new(-37.5, 812.25, 0.37).expect("valid transform");
        for &(x, y) in &[
            (0.0, 0.0),
            (1_234.567, -98.765),
            (-1.0e5, 3.0e5),
            (0.001, 0.002),
        ] {
            let point = Point2::new(x, y);
            let back = transform.inverse(transform.forward(point));
            assert!((back.x() - x).abs() < 1e-6, "x 偏差过大: {x}");
            assert!((back.y() - y).abs() < 1e-6, "y 偏差过大: {y}");
        }
    }

    #[test]
    fn rejects_degenerate_scale() {
        assert_eq!(
            CoordinateTransform::new(0.0, 0.0, 0.0),
            Err(TransformError::InvalidScale(0.0))
        );
        assert!(CoordinateTransform::new(0.0, 0.0, f64::NAN).is_err());
    }

    #[test]
    fn lengths_are_scaled_without_flip() {
        let transform = CoordinateTransform::default();
        assert!((transform.scale_length(25.0) - 2.5).abs() < 1e-12);
        let bounds = Bounds2D::new(Point2::new(1_200.0, 9_500.0), Point2::new(1_400.0, 9_600.0));
        let mapped = transform.forward_bounds(&bounds);
        assert!((mapped.min().y() - 0.0).abs() < 1e-9);
        assert!((mapped.max().y() - 10.0).abs() < 1e-9);
        assert!((mapped.width() - 20.0).abs() < 1e-9);
    }
}

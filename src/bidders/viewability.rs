// src/bidders/viewability.rs

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

use crate::model::{Point, Size, SlotGeometry};

/// 广告位可见性分类
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub enum SlotVisibility {
    NotDetermined = 0,
    AboveTheFold = 1,
    BelowTheFold = 2,
}

impl TryFrom<u8> for SlotVisibility {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SlotVisibility::NotDetermined),
            1 => Ok(SlotVisibility::AboveTheFold),
            2 => Ok(SlotVisibility::BelowTheFold),
            _ => Err(format!("Invalid value for SlotVisibility: {}", value)),
        }
    }
}

impl From<SlotVisibility> for u8 {
    fn from(v: SlotVisibility) -> Self {
        v as u8
    }
}

/// 两个矩形的重叠面积，不相交时为 0
pub fn overlap_area(top_left1: Point, bottom_right1: Point, top_left2: Point, bottom_right2: Point) -> f64 {
    if top_left1.x > bottom_right2.x
        || bottom_right1.x < top_left2.x
        || top_left1.y > bottom_right2.y
        || bottom_right1.y < top_left2.y
    {
        return 0.0;
    }
    (bottom_right1.x.min(bottom_right2.x) - top_left1.x.max(top_left2.x))
        * (bottom_right1.y.min(bottom_right2.y) - top_left1.y.max(top_left2.y))
}

/// 以 `top_left` 为起点、尺寸为 `size` 的广告位落在视口内的比例
pub fn slot_visibility(top_left: Point, size: Size, viewport: Option<Size>) -> f64 {
    let max_area = size.area() as f64;
    let Some(viewport) = viewport else {
        return 0.0;
    };
    if max_area == 0.0 {
        return 0.0;
    }
    let bottom_right = Point {
        x: top_left.x + size.w as f64,
        y: top_left.y + size.h as f64,
    };
    let view_bottom_right = Point {
        x: viewport.w as f64,
        y: viewport.h as f64,
    };
    overlap_area(top_left, bottom_right, Point { x: 0.0, y: 0.0 }, view_bottom_right) / max_area
}

pub fn min_size(sizes: &[Size]) -> Option<Size> {
    sizes.iter().copied().min_by_key(Size::area)
}

/// 计算可见比例与分类。几何信息或尺寸缺失时为 NotDetermined。
pub fn classify(geometry: Option<&SlotGeometry>, sizes: &[Size], viewport: Option<Size>) -> (SlotVisibility, Option<f64>) {
    let (Some(geometry), Some(size)) = (geometry, min_size(sizes)) else {
        return (SlotVisibility::NotDetermined, None);
    };
    let ratio = slot_visibility(geometry.top_left, size, viewport);
    let class = if ratio > 0.5 {
        SlotVisibility::AboveTheFold
    } else {
        SlotVisibility::BelowTheFold
    };
    (class, Some(ratio))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point {
        Point { x, y }
    }

    #[test]
    fn overlap_of_disjoint_rects_is_zero() {
        assert_eq!(overlap_area(p(0.0, 0.0), p(10.0, 10.0), p(20.0, 20.0), p(30.0, 30.0)), 0.0);
    }

    #[test]
    fn overlap_of_partial_rects() {
        assert_eq!(overlap_area(p(0.0, 0.0), p(10.0, 10.0), p(5.0, 5.0), p(20.0, 20.0)), 25.0);
    }

    #[test]
    fn half_visible_slot() {
        let ratio = slot_visibility(p(0.0, 875.0), Size::new(300, 250), Some(Size::new(1280, 1000)));
        assert!((ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn unknown_viewport_or_empty_slot() {
        assert_eq!(slot_visibility(p(0.0, 0.0), Size::new(300, 250), None), 0.0);
        assert_eq!(slot_visibility(p(0.0, 0.0), Size::new(0, 250), Some(Size::new(100, 100))), 0.0);
    }

    #[test]
    fn classification_uses_smallest_size() {
        let geometry = SlotGeometry { top_left: p(0.0, 100.0), bottom_right: p(300.0, 700.0) };
        let sizes = [Size::new(300, 600), Size::new(300, 250)];
        let (class, ratio) = classify(Some(&geometry), &sizes, Some(Size::new(1024, 768)));
        assert_eq!(class, SlotVisibility::AboveTheFold);
        assert_eq!(ratio, Some(1.0));
        assert_eq!(classify(None, &sizes, None).0, SlotVisibility::NotDetermined);
        assert_eq!(serde_json::to_value(SlotVisibility::BelowTheFold).unwrap(), 2);
    }
}

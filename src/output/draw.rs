// 该文件是 Pindai 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Pindai Contributors

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use tracing::info;

use crate::{
  model::{DetectItem, DetectResult},
  output::OutputError,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_TEXT_HORIZONTAL_PADDING: u32 = 4;
const BOX_THICKNESS: i32 = 2;
const PALETTE_SIZE: usize = 80;

// 默认标签字体
const DEFAULT_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

pub struct Draw {
  font: FontArc,
  font_size: f32,
  colors: Vec<Rgb<u8>>,
}

impl Draw {
  /// 使用内置字体
  pub fn new() -> Result<Self, OutputError> {
    let font = FontArc::try_from_slice(DEFAULT_FONT)
      .map_err(|e| OutputError::Font(format!("built-in font: {e}")))?;
    Ok(Self::with_font(font))
  }

  /// 从 TTF 文件加载标签字体
  pub fn with_font_file(path: &Path) -> Result<Self, OutputError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)
      .map_err(|e| OutputError::Font(format!("{}: {}", path.display(), e)))?;
    info!("加载标签字体: {}", path.display());
    Ok(Self::with_font(font))
  }

  fn with_font(font: FontArc) -> Self {
    // 生成 80 种不同的颜色（对应 COCO 数据集的 80 个类别）
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      colors,
    }
  }

  pub fn color_for(&self, class_id: usize) -> Rgb<u8> {
    self.colors[class_id % self.colors.len()]
  }

  /// 在图像上绘制全部检测框与标签
  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult) {
    for item in result.items.iter() {
      self.draw_bbox_with_label(image, item);
    }
  }

  // bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &DetectItem) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    if w < 1.0 || h < 1.0 {
      return;
    }

    let x_min = ((item.bbox[0] * w).floor() as i32).clamp(0, w as i32 - 1);
    let y_min = ((item.bbox[1] * h).floor() as i32).clamp(0, h as i32 - 1);
    let x_max = ((item.bbox[2] * w).ceil() as i32).clamp(0, w as i32 - 1);
    let y_max = ((item.bbox[3] * h).ceil() as i32).clamp(0, h as i32 - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = self.color_for(item.class_id);

    // 绘制边框（加粗为2像素）
    for thickness in 0..BOX_THICKNESS {
      let width = (x_max - x_min - 2 * thickness + 1).max(0) as u32;
      let height = (y_max - y_min - 2 * thickness + 1).max(0) as u32;
      if width == 0 || height == 0 {
        break;
      }
      let rect = Rect::at(x_min + thickness, y_min + thickness).of_size(width, height);
      draw_hollow_rect_mut(image, rect, color);
    }

    let font = &self.font;
    let label = format!("{} {:.2}", item.label, item.score);
    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = text_size(scale, font, &label);

    // 标签放在边框上方，空间不足时放在框内
    let label_height = text_height as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;
    let label_x = x_min;
    let label_y = if y_min >= label_height {
      y_min - label_height
    } else {
      y_min
    };

    let max_width = (w as i32 - label_x).max(0) as u32;
    let label_width = (text_width + 2 * LABEL_TEXT_HORIZONTAL_PADDING).min(max_width);
    if label_width == 0 {
      return;
    }

    let rect = Rect::at(label_x, label_y).of_size(label_width, label_height as u32);
    draw_filled_rect_mut(image, rect, color);
    draw_text_mut(
      image,
      Rgb([255u8, 255u8, 255u8]),
      label_x + LABEL_TEXT_HORIZONTAL_PADDING as i32,
      label_y + LABEL_TEXT_VERTICAL_PADDING,
      scale,
      font,
      &label,
    );
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[cfg(test)]
mod tests {
  use super::*;

  fn single(bbox: [f32; 4]) -> DetectResult {
    DetectResult::new(vec![DetectItem {
      class_id: 3,
      label: "motorcycle".to_string(),
      score: 0.9,
      bbox,
    }])
  }

  #[test]
  fn draws_box_edges_without_touching_the_interior() {
    let draw = Draw::new().unwrap();
    let mut image = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
    draw.draw_detections(&mut image, &single([0.2, 0.5, 0.6, 0.9]));

    let color = draw.color_for(3);
    assert_eq!(*image.get_pixel(20, 70), color);
    assert_eq!(*image.get_pixel(21, 70), color);
    assert_eq!(*image.get_pixel(40, 90), color);
    assert_eq!(*image.get_pixel(40, 75), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(10, 95), Rgb([0, 0, 0]));
  }

  #[test]
  fn label_tag_sits_above_the_box() {
    let draw = Draw::new().unwrap();
    let mut image = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
    draw.draw_detections(&mut image, &single([0.2, 0.5, 0.6, 0.9]));

    // 标签左侧留白区域为类别颜色，框左侧以外不受影响
    let color = draw.color_for(3);
    assert_eq!(*image.get_pixel(21, 48), color);
    assert_eq!(*image.get_pixel(10, 48), Rgb([0, 0, 0]));
  }

  #[test]
  fn degenerate_boxes_are_skipped() {
    let draw = Draw::new().unwrap();
    let mut image = RgbImage::from_pixel(50, 50, Rgb([7, 7, 7]));
    draw.draw_detections(&mut image, &single([0.5, 0.5, 0.5, 0.9]));
    assert!(image.pixels().all(|p| *p == Rgb([7, 7, 7])));
  }

  #[test]
  fn missing_font_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Draw::with_font_file(&dir.path().join("none.ttf")).is_err());
    std::fs::write(dir.path().join("bad.ttf"), b"nope").unwrap();
    assert!(matches!(
      Draw::with_font_file(&dir.path().join("bad.ttf")),
      Err(OutputError::Font(_))
    ));
  }

  #[test]
  fn palette_wraps_around() {
    let draw = Draw::new().unwrap();
    assert_eq!(draw.color_for(5), draw.color_for(5 + PALETTE_SIZE));
  }
}

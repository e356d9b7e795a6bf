// 该文件是 Pindai 项目的一部分。
// src/model/letterbox.rs - 等比缩放与灰边填充
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

use image::{Rgb, RgbImage, imageops::FilterType};

/// 填充颜色 (114, 114, 114)
pub const LETTERBOX_FILL: Rgb<u8> = Rgb([114, 114, 114]);

/// 原图到模型输入的映射：等比缩放后居中放入 size×size 画布
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub size: u32,
  pub scale: f32,
  pub pad_x: u32,
  pub pad_y: u32,
  pub width: u32,
  pub height: u32,
}

impl Letterbox {
  pub fn fit(width: u32, height: u32, size: u32) -> Self {
    let (width, height, size) = (width.max(1), height.max(1), size.max(1));
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);

    let mut letterbox = Self {
      size,
      scale,
      pad_x: 0,
      pad_y: 0,
      width,
      height,
    };
    let (new_w, new_h) = letterbox.scaled_size();
    letterbox.pad_x = (size - new_w) / 2;
    letterbox.pad_y = (size - new_h) / 2;
    letterbox
  }

  fn scaled_size(&self) -> (u32, u32) {
    let new_w = ((self.width as f32 * self.scale).round() as u32).clamp(1, self.size);
    let new_h = ((self.height as f32 * self.scale).round() as u32).clamp(1, self.size);
    (new_w, new_h)
  }

  /// 生成模型输入画布
  pub fn apply(&self, image: &RgbImage) -> RgbImage {
    let (new_w, new_h) = self.scaled_size();
    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let mut canvas = RgbImage::from_pixel(self.size, self.size, LETTERBOX_FILL);
    image::imageops::replace(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
    canvas
  }

  /// 输入画布上的 cx, cy, w, h 转为原图归一化坐标 [x_min, y_min, x_max, y_max]
  pub fn to_normalised(&self, cx: f32, cy: f32, w: f32, h: f32) -> [f32; 4] {
    let (pad_x, pad_y) = (self.pad_x as f32, self.pad_y as f32);
    let (width, height) = (self.width as f32, self.height as f32);

    let x_min = (cx - w / 2.0 - pad_x) / self.scale;
    let y_min = (cy - h / 2.0 - pad_y) / self.scale;
    let x_max = (cx + w / 2.0 - pad_x) / self.scale;
    let y_max = (cy + h / 2.0 - pad_y) / self.scale;

    [
      (x_min / width).clamp(0.0, 1.0),
      (y_min / height).clamp(0.0, 1.0),
      (x_max / width).clamp(0.0, 1.0),
      (y_max / height).clamp(0.0, 1.0),
    ]
  }
}

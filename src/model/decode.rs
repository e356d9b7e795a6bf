// 该文件是 Pindai 项目的一部分。
// src/model/decode.rs - 检测输出解码与非极大值抑制
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

use tracing::debug;

use crate::model::{DetectItem, ModelError, labels::Labels, letterbox::Letterbox};

const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU: f32 = 0.45;
const DEFAULT_MAX_DETECTIONS: usize = 1000;

// 每行: cx, cy, w, h, objectness, 各类别分数
const BOX_FIELDS: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
  pub confidence: f32,
  pub iou: f32,
  pub max_detections: usize,
}

impl Default for DecodeOptions {
  fn default() -> Self {
    Self {
      confidence: DEFAULT_CONFIDENCE,
      iou: DEFAULT_IOU,
      max_detections: DEFAULT_MAX_DETECTIONS,
    }
  }
}

/// 解码 [1, N, 5 + C] 或 [N, 5 + C] 形状的输出，框坐标按 letterbox 映射回原图
pub fn decode_predictions(
  data: &[f32],
  shape: &[usize],
  letterbox: &Letterbox,
  options: &DecodeOptions,
  labels: &Labels,
) -> Result<Vec<DetectItem>, ModelError> {
  let (rows, width) = match shape {
    [1, rows, width] | [rows, width] => (*rows, *width),
    _ => {
      return Err(ModelError::UnexpectedOutput(format!(
        "输出形状不支持: {:?}",
        shape
      )));
    }
  };

  if width <= BOX_FIELDS {
    return Err(ModelError::UnexpectedOutput(format!(
      "每行只有 {} 个值, 没有类别分数",
      width
    )));
  }

  if data.len() != rows * width {
    return Err(ModelError::UnexpectedOutput(format!(
      "数据长度不匹配: 期望长度 {}, 实际长度 {}",
      rows * width,
      data.len()
    )));
  }

  let mut items = Vec::new();
  for row in data.chunks_exact(width) {
    let objectness = row[4];
    if objectness < options.confidence {
      continue;
    }

    // 找到最高类别分数
    let (class_id, class_score) = row[BOX_FIELDS..]
      .iter()
      .copied()
      .enumerate()
      .fold((0usize, f32::MIN), |best, (idx, score)| {
        if score > best.1 { (idx, score) } else { best }
      });

    let score = objectness * class_score;
    if !score.is_finite() || score < options.confidence {
      continue;
    }

    let bbox = letterbox.to_normalised(row[0], row[1], row[2], row[3]);
    if bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
      continue;
    }

    items.push(DetectItem {
      class_id,
      label: labels.name(class_id),
      score,
      bbox,
    });
  }

  debug!("置信度过滤后候选框数量: {}", items.len());

  let mut items = non_max_suppression(items, options.iou);
  items.truncate(options.max_detections);
  Ok(items)
}

/// 按类别的贪心非极大值抑制，结果按置信度降序
pub fn non_max_suppression(mut items: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<DetectItem> = Vec::with_capacity(items.len());
  for item in items {
    let suppressed = kept
      .iter()
      .any(|best| best.class_id == item.class_id && iou(&best.bbox, &item.bbox) > iou_threshold);
    if !suppressed {
      kept.push(item);
    }
  }
  kept
}

/// 计算两个边界框的 IoU
fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row(cx: f32, cy: f32, w: f32, h: f32, obj: f32, classes: &[f32]) -> Vec<f32> {
    let mut row = vec![cx, cy, w, h, obj];
    row.extend_from_slice(classes);
    row
  }

  fn item(class_id: usize, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      label: format!("c{class_id}"),
      score,
      bbox,
    }
  }

  #[test]
  fn decodes_pixel_boxes_into_normalised_corners() {
    let labels = Labels::parse("cat\ndog");
    let data = row(320.0, 320.0, 64.0, 128.0, 0.9, &[0.1, 0.8]);
    let letterbox = Letterbox::fit(640, 640, 640);
    let items =
      decode_predictions(&data, &[1, 1, 7], &letterbox, &DecodeOptions::default(), &labels).unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].label, "dog");
    assert!((items[0].score - 0.72).abs() < 1e-6);
    assert!((items[0].bbox[0] - 0.45).abs() < 1e-6);
    assert!((items[0].bbox[1] - 0.4).abs() < 1e-6);
    assert!((items[0].bbox[2] - 0.55).abs() < 1e-6);
    assert!((items[0].bbox[3] - 0.6).abs() < 1e-6);
  }

  #[test]
  fn drops_candidates_below_confidence() {
    let labels = Labels::parse("cat\ndog");
    let mut data = row(100.0, 100.0, 20.0, 20.0, 0.2, &[0.9, 0.0]);
    data.extend(row(200.0, 200.0, 20.0, 20.0, 0.5, &[0.3, 0.0]));
    let letterbox = Letterbox::fit(640, 640, 640);
    let items =
      decode_predictions(&data, &[2, 7], &letterbox, &DecodeOptions::default(), &labels).unwrap();
    assert!(items.is_empty());
  }

  #[test]
  fn rejects_mismatched_output() {
    let labels = Labels::coco();
    let options = DecodeOptions::default();
    let lb = Letterbox::fit(640, 640, 640);
    assert!(decode_predictions(&[0.0; 10], &[1, 2, 7], &lb, &options, &labels).is_err());
    assert!(decode_predictions(&[0.0; 5], &[1, 1, 5], &lb, &options, &labels).is_err());
    assert!(decode_predictions(&[0.0; 8], &[2, 2, 2], &lb, &options, &labels).is_err());
  }

  #[test]
  fn boxes_on_a_letterboxed_wide_frame_use_original_proportions() {
    let labels = Labels::parse("cat\ndog");
    // 1280x320 原图在 640 画布上下各有 240 像素填充
    let letterbox = Letterbox::fit(1280, 320, 640);
    let data = row(480.0, 360.0, 320.0, 80.0, 0.9, &[0.9, 0.1]);
    let items =
      decode_predictions(&data, &[1, 1, 7], &letterbox, &DecodeOptions::default(), &labels).unwrap();

    assert_eq!(items.len(), 1);
    for (got, want) in items[0].bbox.iter().zip([0.5, 0.5, 1.0, 1.0]) {
      assert!((got - want).abs() < 1e-6);
    }
  }

  #[test]
  fn nms_suppresses_overlaps_of_the_same_class_only() {
    let items = vec![
      item(0, 0.6, [0.0, 0.0, 0.5, 0.5]),
      item(0, 0.9, [0.01, 0.01, 0.5, 0.5]),
      item(1, 0.7, [0.0, 0.0, 0.5, 0.5]),
      item(0, 0.8, [0.6, 0.6, 1.0, 1.0]),
    ];
    let kept = non_max_suppression(items, 0.45);
    let scores: Vec<f32> = kept.iter().map(|i| i.score).collect();
    assert_eq!(scores, vec![0.9, 0.8, 0.7]);
  }
}

// 该文件是 Pindai 项目的一部分。
// src/model/labels.rs - 类别标签
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

use tracing::{debug, warn};

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

// 元数据中类别 id 的上限
const MAX_CLASSES: usize = 4096;

/// 类别 id 到名称的映射
#[derive(Debug, Clone)]
pub struct Labels {
  names: Vec<String>,
}

impl Labels {
  pub fn coco() -> Self {
    Self {
      names: COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
    }
  }

  /// 每行一个类别名称，空行忽略
  pub fn parse(text: &str) -> Self {
    Self {
      names: text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect(),
    }
  }

  /// 读取标签文件，文件不存在或没有任何类别时返回 None
  pub fn load(path: &Path) -> Result<Option<Self>, std::io::Error> {
    if !path.exists() {
      debug!("标签文件不存在: {}", path.display());
      return Ok(None);
    }
    let labels = Self::parse(&std::fs::read_to_string(path)?);
    if labels.is_empty() {
      warn!("标签文件为空: {}", path.display());
      return Ok(None);
    }
    debug!("读取 {} 个类别标签: {}", labels.len(), path.display());
    Ok(Some(labels))
  }

  /// 解析导出模型元数据中的类别表
  /// 支持 `{0: 'person', 1: 'bicycle'}` 与 `['person', 'bicycle']` 两种形式
  pub fn parse_names_map(text: &str) -> Option<Self> {
    let text = text.trim();
    let (keyed, body) = if let Some(body) = text.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
      (true, body)
    } else if let Some(body) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
      (false, body)
    } else {
      return None;
    };

    let mut entries: Vec<(usize, String)> = Vec::new();
    let mut chars = body.chars().peekable();
    loop {
      while chars.next_if(|c| c.is_whitespace() || *c == ',').is_some() {}
      if chars.peek().is_none() {
        break;
      }

      let id = if keyed {
        let mut digits = String::new();
        while let Some(c) = chars.next_if(char::is_ascii_digit) {
          digits.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next() != Some(':') {
          return None;
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        digits.parse().ok()?
      } else {
        entries.len()
      };

      let quote = chars.next().filter(|c| *c == '\'' || *c == '"')?;
      let mut name = String::new();
      loop {
        match chars.next()? {
          '\\' => name.push(chars.next()?),
          c if c == quote => break,
          c => name.push(c),
        }
      }
      entries.push((id, name));
    }

    let count = entries.iter().map(|(id, _)| id + 1).max()?;
    if count > MAX_CLASSES {
      return None;
    }
    let mut names: Vec<String> = (0..count).map(|id| format!("class{id}")).collect();
    for (id, name) in entries {
      names[id] = name;
    }
    Some(Self { names })
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn name(&self, class_id: usize) -> String {
    self
      .names
      .get(class_id)
      .cloned()
      .unwrap_or_else(|| format!("class{class_id}"))
  }
}

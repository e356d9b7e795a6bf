// 该文件是 Pindai 项目的一部分。
// src/model/yolov5.rs - YOLOv5 ONNX 模型
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

use std::{
  path::{Path, PathBuf},
  sync::Mutex,
};

use image::RgbImage;
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{
    DetectResult, Model, ModelError,
    decode::{DecodeOptions, decode_predictions},
    labels::Labels,
    letterbox::Letterbox,
  },
};

const YOLOV5_DEFAULT_WEIGHTS: &str = "weights/best.onnx";
const YOLOV5_DEFAULT_LABELS: &str = "labels.txt";
const YOLOV5_DEFAULT_INPUT_NAME: &str = "images";
const YOLOV5_DEFAULT_SIZE: u32 = 640;
const RGB_CHANNELS: usize = 3;

pub struct Yolov5 {
  session: Mutex<Session>,
  input_name: String,
  input_size: u32,
  labels: Labels,
  options: DecodeOptions,
}

pub struct Yolov5Builder {
  model_dir: PathBuf,
  weights: PathBuf,
  labels: PathBuf,
  input_size: u32,
  options: DecodeOptions,
  intra_threads: Option<usize>,
}

impl FromUrlWithScheme for Yolov5Builder {
  const SCHEME: &'static str = "yolov5";
}

impl FromUrl for Yolov5Builder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::SourceError(format!(
        "model source must use the `{}` scheme, found `{}`",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let model_dir = PathBuf::from(url.path());
    if model_dir.as_os_str().is_empty() {
      return Err(ModelError::SourceError(
        "model source has an empty directory".to_string(),
      ));
    }

    let mut builder = Yolov5Builder {
      model_dir,
      weights: PathBuf::from(YOLOV5_DEFAULT_WEIGHTS),
      labels: PathBuf::from(YOLOV5_DEFAULT_LABELS),
      input_size: YOLOV5_DEFAULT_SIZE,
      options: DecodeOptions::default(),
      intra_threads: None,
    };

    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "weights" => builder.weights = PathBuf::from(v.as_ref()),
        "labels" => builder.labels = PathBuf::from(v.as_ref()),
        "conf" => builder.options.confidence = parse_query(&k, &v)?,
        "iou" => builder.options.iou = parse_query(&k, &v)?,
        "max_det" => builder.options.max_detections = parse_query(&k, &v)?,
        "size" => builder.input_size = parse_query(&k, &v)?,
        "threads" => builder.intra_threads = Some(parse_query(&k, &v)?),
        other => debug!("忽略未知的模型参数: {}", other),
      }
    }

    Ok(builder)
  }
}

fn parse_query<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ModelError> {
  value
    .parse()
    .map_err(|_| ModelError::SourceError(format!("invalid value `{value}` for `{key}`")))
}

impl Yolov5Builder {
  /// 相对路径以项目根目录为基准解析
  pub fn root(mut self, root: &Path) -> Self {
    if self.model_dir.is_relative() {
      self.model_dir = root.join(&self.model_dir);
    }
    self
  }

  pub fn model_dir(&self) -> &Path {
    &self.model_dir
  }

  pub fn weights_path(&self) -> PathBuf {
    self.model_dir.join(&self.weights)
  }

  pub fn labels_path(&self) -> PathBuf {
    self.model_dir.join(&self.labels)
  }

  pub fn build(self) -> Result<Yolov5, ModelError> {
    if !self.model_dir.is_dir() {
      error!("模型目录不存在: {}", self.model_dir.display());
      return Err(ModelError::SourceNotFound(self.model_dir));
    }

    let weights = self.weights_path();
    if !weights.is_file() {
      error!("权重文件不存在: {}", weights.display());
      return Err(ModelError::WeightsNotFound(weights));
    }

    info!("加载模型文件: {}", weights.display());
    if let Ok(meta) = std::fs::metadata(&weights) {
      debug!(
        "模型文件大小: {:.2} MB",
        meta.len() as f64 / (1024.0 * 1024.0)
      );
    }

    let mut session_builder = Session::builder()
      .map_err(|e| ModelError::Load(e.to_string()))?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(|e| ModelError::Load(e.to_string()))?;
    if let Some(threads) = self.intra_threads {
      session_builder = session_builder
        .with_intra_threads(threads)
        .map_err(|e| ModelError::Load(e.to_string()))?;
    }
    let session = session_builder
      .commit_from_file(&weights)
      .map_err(|e| ModelError::Load(e.to_string()))?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .unwrap_or_else(|| YOLOV5_DEFAULT_INPUT_NAME.to_string());

    debug!("模型输入: {}", input_name);
    debug!("模型输出数量: {}", session.outputs.len());

    let labels = self.resolve_labels(&session)?;
    info!("模型加载完成, 类别数量: {}", labels.len());

    Ok(Yolov5 {
      session: Mutex::new(session),
      input_name,
      input_size: self.input_size,
      labels,
      options: self.options,
    })
  }

  /// 类别名称来源依次为标签文件、模型元数据、COCO
  fn resolve_labels(&self, session: &Session) -> Result<Labels, ModelError> {
    let path = self.labels_path();
    if let Some(labels) = Labels::load(&path)? {
      info!("使用标签文件中的类别名称: {}", path.display());
      return Ok(labels);
    }

    if let Some(labels) = metadata_labels(session) {
      info!("使用模型元数据中的类别名称");
      return Ok(labels);
    }

    warn!("标签文件与模型元数据中都没有类别名称, 使用 COCO 类别");
    Ok(Labels::coco())
  }
}

fn metadata_labels(session: &Session) -> Option<Labels> {
  let metadata = session
    .metadata()
    .inspect_err(|e| debug!("读取模型元数据失败: {}", e))
    .ok()?;
  let names = metadata.custom("names").ok().flatten()?;
  debug!("模型元数据 names: {}", names);
  let labels = Labels::parse_names_map(&names);
  if labels.is_none() {
    warn!("无法解析模型元数据中的类别名称: {}", names);
  }
  labels
}

impl Yolov5 {
  /// letterbox 到输入尺寸并转为 [0, 1] 的 NCHW 浮点数据
  fn preprocess(&self, image: &RgbImage) -> (Vec<f32>, Letterbox) {
    let letterbox = Letterbox::fit(image.width(), image.height(), self.input_size);
    let canvas = letterbox.apply(image);

    let plane = (self.input_size * self.input_size) as usize;
    let mut data = vec![0f32; plane * RGB_CHANNELS];
    for (idx, pixel) in canvas.pixels().enumerate() {
      for c in 0..RGB_CHANNELS {
        data[c * plane + idx] = pixel[c] as f32 / 255.0;
      }
    }
    (data, letterbox)
  }
}

impl Model for Yolov5 {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("设置模型输入");
    let size = self.input_size as usize;
    let (data, letterbox) = self.preprocess(input);
    debug!(
      "letterbox 缩放: {:.3}, 填充: ({}, {})",
      letterbox.scale, letterbox.pad_x, letterbox.pad_y
    );
    let tensor = Tensor::from_array(([1usize, RGB_CHANNELS, size, size], data))
      .map_err(|e| ModelError::Runtime(e.to_string()))?;

    let (shape, data) = {
      let mut session = self.session.lock().map_err(|_| ModelError::Poisoned)?;

      debug!("执行模型推理");
      let outputs = session
        .run(ort::inputs![self.input_name.as_str() => tensor])
        .map_err(|e| ModelError::Runtime(e.to_string()))?;

      debug!("获取模型输出");
      let (shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| ModelError::Runtime(e.to_string()))?;
      let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
      (shape, data.to_vec())
    };

    debug!("模型输出形状: {:?}", shape);
    let items = decode_predictions(&data, &shape, &letterbox, &self.options, &self.labels)?;
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult::new(items))
  }
}

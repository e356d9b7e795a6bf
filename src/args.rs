// 该文件是 Pindai 项目的一部分。
// src/args.rs - 服务参数配置
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

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use url::Url;

const MIB: usize = 1024 * 1024;

/// Pindai 服务参数配置
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监听地址
  #[arg(long, env = "PINDAI_HOST", default_value = "0.0.0.0")]
  pub host: String,

  /// 监听端口
  #[arg(long, env = "PORT", default_value_t = 5000)]
  pub port: u16,

  /// 项目根目录，static/uploads 与 static/results 位于其下
  #[arg(long, env = "PINDAI_ROOT", default_value = ".", value_name = "DIR")]
  pub root: PathBuf,

  /// 模型来源
  /// 格式: yolov5:<模型目录>?weights=<权重文件>&labels=<标签文件>&conf=<阈值>&iou=<阈值>&size=<输入尺寸>
  /// 相对路径以 --root 为基准
  #[arg(
    long,
    env = "PINDAI_MODEL",
    default_value = "yolov5:yolov5?weights=weights/best.onnx",
    value_name = "MODEL"
  )]
  pub model: Url,

  /// 标注文字所用的 TTF 字体，不指定时使用内置 DejaVu Sans
  #[arg(long, env = "PINDAI_FONT", value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 上传文件大小上限（MiB）
  #[arg(long, default_value_t = 16, value_name = "MIB")]
  pub max_upload_mb: usize,

  /// 单个请求超时（秒）
  #[arg(long, default_value_t = 120, value_name = "SECONDS")]
  pub request_timeout: u64,
}

impl Args {
  pub fn max_upload_bytes(&self) -> usize {
    self.max_upload_mb.saturating_mul(MIB)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout)
  }
}

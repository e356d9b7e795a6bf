// 该文件是 Pindai 项目的一部分。
// src/error.rs - 请求级错误定义
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

use std::path::PathBuf;

use thiserror::Error;

use crate::{model::ModelError, output::OutputError};

/// 上传校验失败，除超出大小限制外都重定向回表单
#[derive(Error, Debug)]
pub enum UploadError {
  #[error("upload exceeds the body limit: {0}")]
  TooLarge(String),
  #[error("request has no `file` field")]
  MissingFile,
  #[error("uploaded file has an empty filename")]
  EmptyFilename,
  #[error("extension of `{0}` is not allowed")]
  DisallowedExtension(String),
  #[error("malformed multipart body: {0}")]
  Multipart(String),
}

/// 上传通过校验之后的处理错误，渲染为页面上的错误信息
#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("failed to store upload at {path}: {source}")]
  Upload {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("cannot decode image: {0}")]
  Decode(#[from] image::ImageError),
  #[error("inference failed: {0}")]
  Inference(#[from] ModelError),
  #[error("failed to write annotated output: {0}")]
  Output(#[from] OutputError),
  #[error("result directory {} does not exist after save", .0.display())]
  OutputDirMissing(PathBuf),
  #[error("no result image in {}", .0.display())]
  ResultImageMissing(PathBuf),
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("processing task aborted: {0}")]
  Aborted(String),
}

impl ProcessError {
  /// 展示给用户的错误信息
  pub fn user_message(&self) -> String {
    match self {
      ProcessError::ResultImageMissing(_) => {
        "No processed image found in result directory.".to_string()
      }
      ProcessError::OutputDirMissing(_) => {
        "Failed to save results. No output directory found.".to_string()
      }
      ProcessError::Decode(e) => format!("Could not decode the uploaded image: {e}"),
      ProcessError::Inference(e) => format!("Model inference failed: {e}"),
      other => format!("Error processing image: {other}"),
    }
  }

  /// 日志中使用的错误类别
  pub fn kind(&self) -> &'static str {
    match self {
      ProcessError::Upload { .. } => "upload",
      ProcessError::Decode(_) => "decode",
      ProcessError::Inference(_) => "inference",
      ProcessError::Output(_) => "output",
      ProcessError::OutputDirMissing(_) => "output_dir_missing",
      ProcessError::ResultImageMissing(_) => "result_image_missing",
      ProcessError::Io(_) => "io",
      ProcessError::Aborted(_) => "aborted",
    }
  }
}

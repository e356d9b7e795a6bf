// 该文件是 Pindai 项目的一部分。
// src/upload.rs - 上传文件校验与保存
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

use std::path::{Path, PathBuf};

use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use crate::error::{ProcessError, UploadError};

/// 允许上传的图片扩展名
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// 取最后一个 '.' 之后的扩展名（小写）
pub fn extension_of(filename: &str) -> Option<String> {
  filename
    .rsplit_once('.')
    .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// 扩展名是否在允许列表内，没有扩展名的文件名直接拒绝
pub fn allowed_file(filename: &str) -> bool {
  extension_of(filename)
    .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
    .unwrap_or(false)
}

/// 把客户端提供的文件名转换为安全的单级文件名
/// 先做 NFKD 分解，带重音的字母保留其基本字母
pub fn secure_filename(filename: &str) -> String {
  let spaced: String = filename
    .nfkd()
    .filter(char::is_ascii)
    .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
    .collect();

  let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

  let kept: String = joined
    .chars()
    .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    .collect();

  let trimmed = kept.trim_matches(|c| c == '.' || c == '_');
  if trimmed.is_empty() {
    let ext = extension_of(filename)
      .filter(|ext| !ext.is_empty())
      .unwrap_or_else(|| "bin".to_string());
    return format!("upload.{ext}");
  }
  trimmed.to_string()
}

/// 单次请求上传的文件
#[derive(Debug, Clone)]
pub struct Upload {
  pub filename: String,
  pub bytes: Vec<u8>,
}

impl Upload {
  /// 校验文件名后构造上传对象
  pub fn validated(filename: Option<&str>, bytes: Vec<u8>) -> Result<Self, UploadError> {
    let filename = match filename {
      None => return Err(UploadError::MissingFile),
      Some("") => return Err(UploadError::EmptyFilename),
      Some(name) => name,
    };

    if !allowed_file(filename) {
      return Err(UploadError::DisallowedExtension(filename.to_string()));
    }

    Ok(Upload {
      filename: filename.to_string(),
      bytes,
    })
  }

  pub fn secured_filename(&self) -> String {
    secure_filename(&self.filename)
  }
}

/// 上传目录，同名文件直接覆盖，不做自动清理
#[derive(Debug, Clone)]
pub struct UploadStore {
  directory: PathBuf,
}

impl UploadStore {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn save(&self, upload: &Upload) -> Result<PathBuf, ProcessError> {
    let path = self.directory.join(upload.secured_filename());
    std::fs::write(&path, &upload.bytes).map_err(|source| ProcessError::Upload {
      path: path.clone(),
      source,
    })?;
    debug!("上传文件已保存: {}", path.display());
    Ok(path)
  }
}

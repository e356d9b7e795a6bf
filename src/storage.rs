// 该文件是 Pindai 项目的一部分。
// src/storage.rs - 上传与结果目录管理
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
  io::ErrorKind,
  path::{Path, PathBuf},
  sync::Mutex,
  time::SystemTime,
};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{error::ProcessError, upload::allowed_file};

/// 结果批次目录名前缀
pub const BATCH_PREFIX: &str = "temp";

#[derive(Debug, Clone)]
pub struct StoragePaths {
  pub uploads: PathBuf,
  pub results: PathBuf,
}

impl StoragePaths {
  pub fn under(root: &Path) -> Self {
    let static_dir = root.join("static");
    Self {
      uploads: static_dir.join("uploads"),
      results: static_dir.join("results"),
    }
  }

  /// 启动时创建上传与结果目录
  pub fn ensure(&self) -> std::io::Result<()> {
    std::fs::create_dir_all(&self.uploads)?;
    std::fs::create_dir_all(&self.results)?;
    Ok(())
  }
}

fn is_batch_dir(path: &Path) -> bool {
  path.is_dir()
    && path
      .file_name()
      .and_then(|name| name.to_str())
      .is_some_and(|name| name.starts_with(BATCH_PREFIX))
}

/// 单次请求的结果目录，未提交就被丢弃时自动删除
#[derive(Debug)]
pub struct ResultBatch {
  path: PathBuf,
  committed: bool,
}

impl ResultBatch {
  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Drop for ResultBatch {
  fn drop(&mut self) {
    if self.committed {
      return;
    }
    match std::fs::remove_dir_all(&self.path) {
      Ok(()) => debug!("丢弃结果目录: {}", self.path.display()),
      Err(e) if e.kind() == ErrorKind::NotFound => {}
      Err(e) => warn!("删除结果目录失败: {}, 错误: {}", self.path.display(), e),
    }
  }
}

/// 结果目录，只保留最近一次提交的批次
#[derive(Debug)]
pub struct ResultStore {
  directory: PathBuf,
  latest: Mutex<Option<PathBuf>>,
}

impl ResultStore {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      latest: Mutex::new(None),
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  /// 为一次请求创建唯一的结果目录
  pub fn create_batch(&self) -> std::io::Result<ResultBatch> {
    let name = format!(
      "{}-{}-{}",
      BATCH_PREFIX,
      Utc::now().format("%Y%m%dT%H%M%S"),
      Uuid::new_v4().simple()
    );
    let path = self.directory.join(name);
    std::fs::create_dir(&path)?;
    debug!("创建结果目录: {}", path.display());
    Ok(ResultBatch {
      path,
      committed: false,
    })
  }

  /// 提交批次并删除上一次提交的批次，进行中的批次不受影响
  pub fn commit(&self, mut batch: ResultBatch) -> PathBuf {
    batch.committed = true;
    let path = batch.path.clone();

    let previous = {
      let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
      latest.replace(path.clone())
    };

    if let Some(previous) = previous.filter(|p| *p != path) {
      match std::fs::remove_dir_all(&previous) {
        Ok(()) => debug!("删除旧结果目录: {}", previous.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("删除旧结果目录失败: {}, 错误: {}", previous.display(), e),
      }
    }

    path
  }

  #[cfg(test)]
  pub fn latest(&self) -> Option<PathBuf> {
    self.latest.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  /// 结果目录下所有批次目录
  pub fn batch_dirs(&self) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(&self.directory)? {
      let path = entry?.path();
      if is_batch_dir(&path) {
        dirs.push(path);
      }
    }
    dirs.sort();
    Ok(dirs)
  }

  /// 删除上一个进程遗留的批次目录，只在启动时调用
  pub fn purge_stale(&self) -> std::io::Result<usize> {
    if let Some(newest) = latest_batch_dir(&self.directory)? {
      debug!("上次运行最后的结果目录: {}", newest.display());
    }
    let dirs = self.batch_dirs()?;
    for dir in &dirs {
      std::fs::remove_dir_all(dir)?;
    }
    if !dirs.is_empty() {
      info!("清理遗留结果目录 {} 个", dirs.len());
    }
    Ok(dirs.len())
  }
}

/// 在批次目录中查找结果图片，按文件名排序后取第一个
pub fn find_result_image(dir: &Path) -> Result<PathBuf, ProcessError> {
  if !dir.is_dir() {
    warn!("保存结果后找不到结果目录: {}", dir.display());
    return Err(ProcessError::OutputDirMissing(dir.to_path_buf()));
  }

  let mut images = Vec::new();
  let mut contents = Vec::new();
  for entry in std::fs::read_dir(dir)? {
    let path = entry?.path();
    let name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    if path.is_file() && allowed_file(&name) {
      images.push(path);
    }
    contents.push(name);
  }

  images.sort();
  match images.into_iter().next() {
    Some(image) => {
      debug!("结果图片: {}", image.display());
      Ok(image)
    }
    None => {
      warn!("结果目录中没有图片: {}", dir.display());
      warn!("结果目录内容: {:?}", contents);
      Err(ProcessError::ResultImageMissing(dir.to_path_buf()))
    }
  }
}

/// 按修改时间查找最新的批次目录
pub fn latest_batch_dir(results_dir: &Path) -> std::io::Result<Option<PathBuf>> {
  let mut latest: Option<(SystemTime, PathBuf)> = None;
  for entry in std::fs::read_dir(results_dir)? {
    let path = entry?.path();
    if !is_batch_dir(&path) {
      continue;
    }
    let modified = std::fs::metadata(&path)?.modified()?;
    if latest.as_ref().is_none_or(|(time, _)| modified >= *time) {
      latest = Some((modified, path));
    }
  }
  Ok(latest.map(|(_, path)| path))
}

// 该文件是 Pindai 项目的一部分。
// src/server.rs - HTTP 服务
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

use std::{sync::Arc, time::Duration};

use axum::{
  Router,
  extract::{
    DefaultBodyLimit, Multipart, State,
    multipart::{MultipartError, MultipartRejection},
  },
  http::StatusCode,
  response::{IntoResponse, Redirect, Response},
  routing::get,
};
use tokio::{net::TcpListener, signal};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
  error::{ProcessError, UploadError},
  page::Page,
  task::DetectTask,
  upload::Upload,
};

const UPLOAD_FIELD: &str = "file";

#[derive(Clone)]
pub struct AppState {
  pub task: Arc<DetectTask>,
  max_upload_bytes: usize,
}

impl AppState {
  pub fn new(task: DetectTask) -> Self {
    Self {
      task: Arc::new(task),
      max_upload_bytes: 0,
    }
  }
}

pub fn router(mut state: AppState, max_upload_bytes: usize, timeout: Duration) -> Router {
  state.max_upload_bytes = max_upload_bytes;
  Router::new()
    .route("/", get(index).post(upload))
    .with_state(state)
    .layer(DefaultBodyLimit::max(max_upload_bytes))
    .layer(TraceLayer::new_for_http())
    .layer(TimeoutLayer::new(timeout))
}

async fn index() -> Page {
  Page::empty()
}

async fn upload(
  State(state): State<AppState>,
  multipart: Result<Multipart, MultipartRejection>,
) -> Response {
  let upload = match read_upload(multipart).await {
    Ok(upload) => upload,
    Err(UploadError::TooLarge(e)) => {
      warn!("上传超出大小限制: {}", e);
      let message = format!(
        "Upload too large. The limit is {}.",
        describe_size(state.max_upload_bytes)
      );
      return (StatusCode::PAYLOAD_TOO_LARGE, Page::failure(message)).into_response();
    }
    Err(e) => {
      warn!("上传校验失败, 重定向到首页: {}", e);
      return Redirect::to("/").into_response();
    }
  };

  let task = state.task.clone();
  let result = tokio::task::spawn_blocking(move || task.run(&upload))
    .await
    .unwrap_or_else(|e| Err(ProcessError::Aborted(e.to_string())));

  match result {
    Ok(processed) => Page::success(processed).into_response(),
    Err(e) => {
      error!(kind = e.kind(), "处理图片失败: {}", e);
      Page::failure(e.user_message()).into_response()
    }
  }
}

/// 页面上展示的大小上限
fn describe_size(bytes: usize) -> String {
  const MIB: usize = 1024 * 1024;
  if bytes >= MIB && bytes % MIB == 0 {
    format!("{} MiB", bytes / MIB)
  } else {
    format!("{bytes} bytes")
  }
}

fn rejected(e: MultipartRejection) -> UploadError {
  if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
    UploadError::TooLarge(e.body_text())
  } else {
    UploadError::Multipart(e.body_text())
  }
}

fn malformed(e: MultipartError) -> UploadError {
  if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
    UploadError::TooLarge(e.body_text())
  } else {
    UploadError::Multipart(e.body_text())
  }
}

/// 读取 `file` 字段，文件名不合法时不读取内容
async fn read_upload(
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<Upload, UploadError> {
  let mut multipart = multipart.map_err(rejected)?;

  while let Some(field) = multipart.next_field().await.map_err(malformed)? {
    if field.name() != Some(UPLOAD_FIELD) {
      continue;
    }

    let filename = field.file_name().map(str::to_string);
    let mut upload = Upload::validated(filename.as_deref(), Vec::new())?;
    upload.bytes = field.bytes().await.map_err(malformed)?.to_vec();
    return Ok(upload);
  }

  Err(UploadError::MissingFile)
}

pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
  if let Ok(addr) = listener.local_addr() {
    info!("服务已启动: http://{}", addr);
  }
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!("服务已停止");
  Ok(())
}

async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = signal::ctrl_c().await {
      error!("无法监听 Ctrl-C: {}", e);
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        error!("无法监听 SIGTERM: {}", e);
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
  }

  info!("收到中断信号，准备退出...");
}

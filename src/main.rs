// 该文件是 Pindai 项目的一部分。
// src/main.rs - 服务入口
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

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pindai::{
  args::Args,
  model::SharedModel,
  output::{AnnotatedImageOutput, draw::Draw},
  server::{self, AppState},
  storage::{ResultStore, StoragePaths},
  task::DetectTask,
  upload::UploadStore,
};

#[cfg(feature = "model_yolov5")]
fn load_model(args: &Args) -> Result<SharedModel> {
  use pindai::{FromUrl, model::Yolov5Builder};

  let builder = Yolov5Builder::from_url(&args.model)?.root(&args.root);
  info!("模型目录: {}", builder.model_dir().display());
  info!("权重文件: {}", builder.weights_path().display());
  let model = builder.build().inspect_err(|e| tracing::error!("模型加载失败: {}", e))?;
  Ok(Arc::new(model))
}

#[cfg(not(feature = "model_yolov5"))]
fn load_model(_args: &Args) -> Result<SharedModel> {
  anyhow::bail!("no model backend enabled, rebuild with the `model_yolov5` feature")
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("监听地址: {}:{}", args.host, args.port);
  info!("项目根目录: {}", args.root.display());
  info!("模型来源: {}", args.model);

  let paths = StoragePaths::under(&args.root);
  paths.ensure()?;
  let results = ResultStore::new(&paths.results);
  results.purge_stale()?;

  let model = load_model(&args)?;

  let draw = match &args.font {
    Some(font) => Draw::with_font_file(font)?,
    None => Draw::new()?,
  };
  let render = Arc::new(AnnotatedImageOutput::new(draw));

  let task = DetectTask::new(model, render, UploadStore::new(&paths.uploads), results);
  let app = server::router(
    AppState::new(task),
    args.max_upload_bytes(),
    args.request_timeout(),
  );

  let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
  server::serve(listener, app).await?;

  Ok(())
}

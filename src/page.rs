// 该文件是 Pindai 项目的一部分。
// src/page.rs - 页面渲染
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

use std::fmt::Write;

use axum::response::{Html, IntoResponse, Response};

use crate::{model::DetectionRecord, task::Processed};

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Object Detection</title>
<style>
body { font-family: sans-serif; max-width: 960px; margin: 2rem auto; padding: 0 1rem; }
.error { color: #b00020; }
.result img { max-width: 100%; height: auto; }
</style>
</head>
<body>
<h1>Object Detection</h1>
<form method="post" enctype="multipart/form-data">
<input type="file" name="file" accept=".png,.jpg,.jpeg">
<button type="submit">Upload</button>
</form>
"#;

const PAGE_TAIL: &str = "</body>\n</html>\n";

/// 首页的三种状态：空表单、成功结果、错误信息
#[derive(Debug, Clone, Default)]
pub struct Page {
  pub image: Option<(String, String)>,
  pub labels: Option<Vec<DetectionRecord>>,
  pub error: Option<String>,
}

impl Page {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn success(processed: Processed) -> Self {
    Self {
      image: Some((processed.mime.to_string(), processed.image_base64)),
      labels: Some(processed.detections),
      error: None,
    }
  }

  pub fn failure(message: impl Into<String>) -> Self {
    Self {
      image: None,
      labels: None,
      error: Some(message.into()),
    }
  }

  pub fn render(&self) -> String {
    let mut html = String::from(PAGE_HEAD);

    if let Some(error) = &self.error {
      let _ = writeln!(html, r#"<p class="error">{}</p>"#, escape_html(error));
    }

    if let Some((mime, data)) = &self.image {
      html.push_str("<section class=\"result\">\n");
      let _ = writeln!(
        html,
        r#"<img src="data:{};base64,{}" alt="Detection result">"#,
        escape_html(mime),
        escape_html(data)
      );

      match self.labels.as_deref() {
        Some(labels) if !labels.is_empty() => {
          html.push_str("<ul class=\"detections\">\n");
          for label in labels {
            let name = escape_html(&label.name);
            let _ = writeln!(
              html,
              r#"<li class="detection" data-name="{}" data-confidence="{:.4}">{} — {:.2}</li>"#,
              name, label.confidence, name, label.confidence
            );
          }
          html.push_str("</ul>\n");
        }
        _ => html.push_str("<p class=\"empty\">No objects detected.</p>\n"),
      }
      html.push_str("</section>\n");
    }

    html.push_str(PAGE_TAIL);
    html
  }
}

impl IntoResponse for Page {
  fn into_response(self) -> Response {
    Html(self.render()).into_response()
  }
}

pub fn escape_html(text: &str) -> String {
  let mut escaped = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '&' => escaped.push_str("&amp;"),
      '<' => escaped.push_str("&lt;"),
      '>' => escaped.push_str("&gt;"),
      '"' => escaped.push_str("&quot;"),
      '\'' => escaped.push_str("&#39;"),
      c => escaped.push(c),
    }
  }
  escaped
}

#[cfg(test)]
mod tests {
  use super::*;

  fn processed(detections: Vec<DetectionRecord>) -> Processed {
    Processed {
      image_base64: "AAAA".to_string(),
      mime: "image/jpeg",
      detections,
    }
  }

  #[test]
  fn empty_page_has_only_the_form() {
    let html = Page::empty().render();
    assert!(html.contains(r#"enctype="multipart/form-data""#));
    assert!(html.contains(r#"name="file""#));
    assert!(!html.contains("<img"));
    assert!(!html.contains(r#"class="error""#));
  }

  #[test]
  fn success_lists_each_detection() {
    let html = Page::success(processed(vec![DetectionRecord {
      name: "bottle".to_string(),
      confidence: 0.87,
    }]))
    .render();

    assert!(html.contains("data:image/jpeg;base64,AAAA"));
    assert_eq!(html.matches(r#"class="detection""#).count(), 1);
    assert!(html.contains(r#"data-name="bottle" data-confidence="0.8700""#));
    assert!(html.contains("bottle — 0.87"));
  }

  #[test]
  fn success_without_detections_says_so() {
    let html = Page::success(processed(Vec::new())).render();
    assert!(html.contains("No objects detected."));
    assert!(!html.contains(r#"class="detection""#));
  }

  #[test]
  fn failure_escapes_the_message_and_shows_no_image() {
    let html = Page::failure("Error processing image: <bad & worse>").render();
    assert!(html.contains("Error processing image: &lt;bad &amp; worse&gt;"));
    assert!(!html.contains("<img"));
  }

  #[test]
  fn label_names_are_escaped() {
    let html = Page::success(processed(vec![DetectionRecord {
      name: "\"><script>".to_string(),
      confidence: 0.5,
    }]))
    .render();
    assert!(!html.contains("<script>"));
    assert!(html.contains("&quot;&gt;&lt;script&gt;"));
  }
}

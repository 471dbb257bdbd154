// 该文件是 Jiuhu （救护） 项目的一部分。
// src/input/frame_directory.rs - 帧目录输入
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::PixelFrame, url_path};

const FRAME_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

#[derive(Error, Debug)]
pub enum FrameDirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 把目录中按文件名排序的图片当作连续的视频帧。
///
/// 解码失败的帧记录日志后跳过。
pub struct FrameDirectoryInput {
  pending: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for FrameDirectoryInput {
  const SCHEME: &'static str = "frames";
}

impl FromUrl for FrameDirectoryInput {
  type Error = FrameDirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(FrameDirectoryInputError::SchemeMismatch);
    }

    Self::open(&url_path(url))
  }
}

fn is_frame_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    .unwrap_or(false)
}

impl FrameDirectoryInput {
  pub fn open(directory: &Path) -> Result<Self, FrameDirectoryInputError> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(directory)? {
      let path = entry?.path();
      if path.is_file() && is_frame_file(&path) {
        frames.push(path);
      }
    }
    frames.sort();
    info!("帧目录 {} 中共有 {} 帧", directory.display(), frames.len());

    Ok(FrameDirectoryInput {
      pending: frames.into(),
    })
  }

  pub fn remaining(&self) -> usize {
    self.pending.len()
  }
}

impl Iterator for FrameDirectoryInput {
  type Item = PixelFrame;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.pending.pop_front() {
      debug!("读取帧: {}", path.display());
      let decoded = ImageReader::open(&path)
        .map_err(image::ImageError::IoError)
        .and_then(|reader| reader.decode());
      match decoded {
        Ok(image) => return Some(PixelFrame::from(image.to_rgb8())),
        Err(e) => error!("帧 {} 解码失败: {}", path.display(), e),
      }
    }
    None
  }
}

// 该文件是 Jiuhu （救护） 项目的一部分。
// src/frame.rs - RGB 像素帧定义
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

use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("帧尺寸过大: {width}x{height}")]
  TooLarge { width: u32, height: u32 },
}

fn frame_len(width: u32, height: u32) -> Result<usize, FrameError> {
  (width as usize)
    .checked_mul(height as usize)
    .and_then(|pixels| pixels.checked_mul(RGB_CHANNELS))
    .ok_or(FrameError::TooLarge { width, height })
}

/// 任意尺寸的 RGB 像素帧，按 NHWC 排列。
///
/// 静态图片和视频帧都以这种形式交给分类器；
/// 缩放与颜色转换由分类器自己负责。
#[derive(Debug, Clone, PartialEq)]
pub struct PixelFrame {
  width: u32,
  height: u32,
  data: Box<[u8]>,
}

impl PixelFrame {
  pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
    let expected = frame_len(width, height)?;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

#[cfg(feature = "image")]
impl From<image::RgbImage> for PixelFrame {
  fn from(image: image::RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

#[cfg(feature = "image")]
impl PixelFrame {
  pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
    image::RgbImage::from_raw(self.width, self.height, self.data.to_vec())
  }
}

use crate::utils::error::AnalysisError;
use crate::Result;
use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::path::Path;

/// 解码后的RGB图像，通道顺序始终为R、G、B
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    pixels: RgbImage,
}

impl RawImage {
    pub fn new(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.pixels
    }
}

pub struct ImageLoader;

impl ImageLoader {
    /// 从base64字符串加载图像
    pub fn from_base64(base64_data: &str) -> Result<RawImage> {
        // 检测并移除可能的数据URL前缀 (data:image/xxx;base64,)
        let base64_clean = match base64_data.strip_prefix("data:") {
            Some(rest) => rest.split_once(',').map(|(_, payload)| payload).unwrap_or(rest),
            None => base64_data,
        };

        let image_bytes = base64::engine::general_purpose::STANDARD.decode(base64_clean.trim())?;

        Self::from_bytes(&image_bytes)
    }

    /// 从字节流加载图像
    pub fn from_bytes(bytes: &[u8]) -> Result<RawImage> {
        if bytes.is_empty() {
            return Err(AnalysisError::Decode("Empty image data".to_string()));
        }

        let format = Self::detect_format(bytes)
            .ok_or_else(|| AnalysisError::Decode("Unrecognized image format".to_string()))?;

        if !Self::is_supported_format(format) {
            return Err(AnalysisError::Decode(format!("Unsupported image format: {:?}", format)));
        }

        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| AnalysisError::Decode(e.to_string()))?;

        Ok(Self::to_raw(image))
    }

    /// 从文件路径加载图像
    pub fn from_path(path: &Path) -> Result<RawImage> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// 检测图像格式
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    /// 验证图像格式是否支持
    pub fn is_supported_format(format: ImageFormat) -> bool {
        matches!(
            format,
            ImageFormat::Png
                | ImageFormat::Jpeg
                | ImageFormat::Bmp
                | ImageFormat::Tiff
                | ImageFormat::WebP
                | ImageFormat::Gif
        )
    }

    /// 任何输入（灰度、RGBA、16位）统一转换为8位RGB
    fn to_raw(image: DynamicImage) -> RawImage {
        RawImage::new(image.to_rgb8())
    }
}

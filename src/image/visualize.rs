use crate::config::VisualizerConfig;
use crate::image::segmentation::LesionMask;
use crate::image::RawImage;
use crate::utils::error::AnalysisError;
use crate::Result;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, GrayImage, Luma, Rgb, RgbImage};

pub const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// 三张可直接嵌入JSON或 `<img>` 的图像
#[derive(Debug, Clone)]
pub struct EncodedImages {
    pub original: String,
    pub mask: String,
    pub highlighted: String,
}

pub struct Visualizer {
    config: VisualizerConfig,
}

impl Visualizer {
    pub fn new(config: VisualizerConfig) -> Self {
        Self { config }
    }

    pub fn visualize(&self, image: &RawImage, mask: &LesionMask) -> Result<EncodedImages> {
        let highlighted = self.highlight(image, mask)?;

        Ok(EncodedImages {
            original: self.encode_rgb(image.as_rgb())?,
            mask: self.encode_gray(&Self::mask_to_gray(mask))?,
            highlighted: self.encode_rgb(&highlighted)?,
        })
    }

    /// 将掩码非零位置覆盖为高亮颜色
    pub fn highlight(&self, image: &RawImage, mask: &LesionMask) -> Result<RgbImage> {
        Self::check_dimensions(image, mask)?;

        let mut highlighted = image.as_rgb().clone();
        let color = Rgb(self.config.highlight_color);
        for (x, y, pixel) in highlighted.enumerate_pixels_mut() {
            if mask.is_lesion(x, y) {
                *pixel = color;
            }
        }

        Ok(highlighted)
    }

    fn mask_to_gray(mask: &LesionMask) -> GrayImage {
        let (height, width) = mask.dim();
        let data = mask.as_array();
        GrayImage::from_fn(width as u32, height as u32, |x, y| Luma([data[[y as usize, x as usize]]]))
    }

    fn check_dimensions(image: &RawImage, mask: &LesionMask) -> Result<()> {
        let expected = (image.height() as usize, image.width() as usize);
        if mask.dim() != expected {
            return Err(AnalysisError::InvalidInput(format!(
                "Mask is {:?} but image is {:?} (height, width)",
                mask.dim(),
                expected
            )));
        }
        Ok(())
    }

    fn encode_rgb(&self, image: &RgbImage) -> Result<String> {
        self.encode(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgb8)
    }

    fn encode_gray(&self, image: &GrayImage) -> Result<String> {
        self.encode(image.as_raw(), image.width(), image.height(), ExtendedColorType::L8)
    }

    fn encode(&self, raw: &[u8], width: u32, height: u32, color: ExtendedColorType) -> Result<String> {
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, self.config.jpeg_quality)
            .encode(raw, width, height, color)
            .map_err(|e| AnalysisError::Encode(e.to_string()))?;

        let payload = base64::engine::general_purpose::STANDARD.encode(&buffer);
        Ok(format!("{}{}", JPEG_DATA_URI_PREFIX, payload))
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new(VisualizerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageLoader;
    use ndarray::Array2;

    fn half_mask(width: usize, height: usize) -> LesionMask {
        LesionMask::from_array(Array2::from_shape_fn((height, width), |(_, x)| {
            if x < width / 2 { 255 } else { 0 }
        }))
    }

    #[test]
    fn highlight_paints_only_masked_pixels_red() {
        let image = RawImage::new(RgbImage::from_pixel(8, 4, Rgb([0, 200, 0])));
        let highlighted = Visualizer::default().highlight(&image, &half_mask(8, 4)).unwrap();

        assert_eq!(highlighted.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(highlighted.get_pixel(3, 3), &Rgb([255, 0, 0]));
        assert_eq!(highlighted.get_pixel(4, 0), &Rgb([0, 200, 0]));
        // 原图保持不变
        assert_eq!(image.as_rgb().get_pixel(0, 0), &Rgb([0, 200, 0]));
    }

    #[test]
    fn encoded_images_are_jpeg_data_uris_with_source_dimensions() {
        let image = RawImage::new(RgbImage::from_pixel(32, 16, Rgb([0, 200, 0])));
        let encoded = Visualizer::default().visualize(&image, &half_mask(32, 16)).unwrap();

        for uri in [&encoded.original, &encoded.mask, &encoded.highlighted] {
            assert!(uri.starts_with(JPEG_DATA_URI_PREFIX));
            let decoded = ImageLoader::from_base64(uri).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (32, 16));
        }
    }

    #[test]
    fn mask_survives_lossy_encoding_visually() {
        let image = RawImage::new(RgbImage::from_pixel(32, 32, Rgb([0, 200, 0])));
        let encoded = Visualizer::default().visualize(&image, &half_mask(32, 32)).unwrap();
        let mask = ImageLoader::from_base64(&encoded.mask).unwrap();

        assert!(mask.as_rgb().get_pixel(2, 16).0[0] > 200);
        assert!(mask.as_rgb().get_pixel(29, 16).0[0] < 50);
    }

    #[test]
    fn mismatched_mask_is_rejected() {
        let image = RawImage::new(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])));
        let result = Visualizer::default().visualize(&image, &half_mask(4, 4));

        assert!(matches!(result, Err(AnalysisError::InvalidInput(_))));
    }
}

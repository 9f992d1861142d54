use crate::config::SegmentationConfig;
use crate::image::color::{ColorSpace, MaskOps};
use crate::image::RawImage;
use ndarray::Array2;

/// 病斑二值掩码（0/255），尺寸与原图相同
#[derive(Debug, Clone, PartialEq)]
pub struct LesionMask {
    data: Array2<u8>,
}

impl LesionMask {
    pub fn from_array(data: Array2<u8>) -> Self {
        Self { data }
    }

    /// (height, width)
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn is_lesion(&self, x: u32, y: u32) -> bool {
        self.data[[y as usize, x as usize]] != 0
    }

    pub fn as_array(&self) -> &Array2<u8> {
        &self.data
    }
}

/// 分割结果与覆盖率统计
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub mask: LesionMask,
    pub infected_pixels: usize,
    pub leaf_pixels: usize,
    pub infected_percent: f64,
    pub healthy_percent: f64,
}

impl Segmentation {
    /// 整幅图像都是背景时没有叶片像素
    pub fn is_degenerate(&self) -> bool {
        self.leaf_pixels == 0
    }
}

pub struct LesionSegmenter {
    config: SegmentationConfig,
}

impl LesionSegmenter {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn segment(&self, image: &RawImage) -> Segmentation {
        let rgb = image.as_rgb();
        let band = &self.config.lesion_band;
        let background = &self.config.background;

        let hsv = ColorSpace::rgb_to_hsv(rgb);
        let mask_yellow = MaskOps::in_range3(&hsv, band.lower(), band.upper());

        let gray = ColorSpace::rgb_to_gray(rgb);
        let background_mask = MaskOps::in_range(&gray, background.low, background.high);
        let non_background = MaskOps::not(&background_mask);

        let final_mask = MaskOps::and(&mask_yellow, &non_background);

        let infected_pixels = MaskOps::count_non_zero(&final_mask);
        let leaf_pixels = MaskOps::count_non_zero(&non_background);

        let infected_percent = if leaf_pixels > 0 {
            infected_pixels as f64 / leaf_pixels as f64 * 100.0
        } else {
            tracing::warn!(
                "No leaf pixels found in {}x{} image, reporting 0% infection",
                image.width(),
                image.height()
            );
            0.0
        };
        let healthy_percent = 100.0 - infected_percent;

        tracing::debug!(
            "Segmentation: infected_pixels={}, leaf_pixels={}, infected={:.2}%",
            infected_pixels,
            leaf_pixels,
            infected_percent
        );

        Segmentation {
            mask: LesionMask::from_array(final_mask),
            infected_pixels,
            leaf_pixels,
            infected_percent,
            healthy_percent,
        }
    }
}

impl Default for LesionSegmenter {
    fn default() -> Self {
        Self::new(SegmentationConfig::default())
    }
}

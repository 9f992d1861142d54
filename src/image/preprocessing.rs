use crate::image::RawImage;
use image::imageops::{self, FilterType};
use ndarray::{Array4, ArrayView4};

/// 分类器输入边长
pub const INPUT_SIZE: u32 = 224;

/// 每个通道的归一化参数 (v - mean) / std
const CHANNEL_MEAN: f32 = 0.5;
const CHANNEL_STD: f32 = 0.5;

/// 归一化后的模型输入，形状固定为 [1, 3, 224, 224]（NCHW，RGB）
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    data: Array4<f32>,
}

impl InputTensor {
    pub const SHAPE: [usize; 4] = [1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize];

    /// 包装任意数组；形状由分类器在推理前检查
    pub fn from_array(data: Array4<f32>) -> Self {
        Self { data }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    pub fn into_array(self) -> Array4<f32> {
        self.data
    }
}

pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// 缩放到224x224，缩放到[0,1]，按通道归一化到[-1,1]，再添加batch维度
    pub fn preprocess(image: &RawImage) -> InputTensor {
        let resized = imageops::resize(image.as_rgb(), INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

        let data = Array4::from_shape_fn(InputTensor::SHAPE, |(_, c, y, x)| {
            let value = resized.get_pixel(x as u32, y as u32).0[c];
            Self::normalize(value)
        });

        InputTensor { data }
    }

    fn normalize(value: u8) -> f32 {
        (value as f32 / 255.0 - CHANNEL_MEAN) / CHANNEL_STD
    }
}

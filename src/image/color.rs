//! 8位颜色空间转换与阈值工具。
//!
//! 色调使用0-179刻度（角度/2），饱和度与明度使用0-255刻度。
//! 所有转换都采用定点整数运算并四舍五入，结果与OpenCV 4.x的8位
//! `COLOR_RGB2HSV`/`COLOR_RGB2GRAY` 逐位一致，这样病斑阈值在不同平台上得到相同的像素计数。

use image::RgbImage;
use ndarray::{Array2, Array3, Zip};

const HSV_SHIFT: u32 = 12;
const GRAY_SHIFT: u32 = 15;

/// BT.601 灰度权重（15位定点，和为 1 << 15）
const R2Y: i32 = 9798;
const G2Y: i32 = 19235;
const B2Y: i32 = 3735;

/// 二值掩码中"开"的取值
pub const MASK_ON: u8 = 255;

/// 定点除法表：sdiv[v] = round(255 << 12 / v)，hdiv[d] = round(180 << 12 / (6d))
struct DivTables {
    sdiv: [i32; 256],
    hdiv: [i32; 256],
}

impl DivTables {
    fn build() -> Self {
        let mut sdiv = [0i32; 256];
        let mut hdiv = [0i32; 256];
        for i in 1..256 {
            sdiv[i] = ((255 << HSV_SHIFT) as f64 / i as f64).round() as i32;
            hdiv[i] = ((180 << HSV_SHIFT) as f64 / (6.0 * i as f64)).round() as i32;
        }
        Self { sdiv, hdiv }
    }
}

static DIV_TABLES: once_cell::sync::Lazy<DivTables> = once_cell::sync::Lazy::new(DivTables::build);

pub struct ColorSpace;

impl ColorSpace {
    /// RGB转HSV，输出 (H, W, 3) 数组
    pub fn rgb_to_hsv(image: &RgbImage) -> Array3<u8> {
        let (width, height) = image.dimensions();
        let mut hsv = Array3::<u8>::zeros((height as usize, width as usize, 3));

        for (x, y, pixel) in image.enumerate_pixels() {
            let [h, s, v] = Self::pixel_to_hsv(pixel.0);
            let (row, col) = (y as usize, x as usize);
            hsv[[row, col, 0]] = h;
            hsv[[row, col, 1]] = s;
            hsv[[row, col, 2]] = v;
        }

        hsv
    }

    pub fn pixel_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
        let tables = &*DIV_TABLES;
        let (r, g, b) = (r as i32, g as i32, b as i32);

        let v = r.max(g).max(b);
        let vmin = r.min(g).min(b);
        let diff = v - vmin;
        let round = 1 << (HSV_SHIFT - 1);

        let s = (diff * tables.sdiv[v as usize] + round) >> HSV_SHIFT;

        let h = if diff == 0 {
            0
        } else if v == r {
            g - b
        } else if v == g {
            b - r + 2 * diff
        } else {
            r - g + 4 * diff
        };
        let mut h = (h * tables.hdiv[diff as usize] + round) >> HSV_SHIFT;
        if h < 0 {
            h += 180;
        }

        [h as u8, s as u8, v as u8]
    }

    /// RGB转单通道灰度
    pub fn rgb_to_gray(image: &RgbImage) -> Array2<u8> {
        let (width, height) = image.dimensions();
        let mut gray = Array2::<u8>::zeros((height as usize, width as usize));

        for (x, y, pixel) in image.enumerate_pixels() {
            gray[[y as usize, x as usize]] = Self::pixel_to_gray(pixel.0);
        }

        gray
    }

    pub fn pixel_to_gray([r, g, b]: [u8; 3]) -> u8 {
        let y = (r as i32 * R2Y + g as i32 * G2Y + b as i32 * B2Y + (1 << (GRAY_SHIFT - 1))) >> GRAY_SHIFT;
        y.clamp(0, 255) as u8
    }
}

/// 二值掩码运算（0/255）
pub struct MaskOps;

impl MaskOps {
    /// 三通道闭区间阈值：所有通道都落在 [lower, upper] 内时输出255
    pub fn in_range3(image: &Array3<u8>, lower: [u8; 3], upper: [u8; 3]) -> Array2<u8> {
        let (height, width, _) = image.dim();
        Array2::from_shape_fn((height, width), |(y, x)| {
            let inside = (0..3).all(|c| {
                let value = image[[y, x, c]];
                lower[c] <= value && value <= upper[c]
            });
            if inside { MASK_ON } else { 0 }
        })
    }

    /// 单通道闭区间阈值
    pub fn in_range(image: &Array2<u8>, lower: u8, upper: u8) -> Array2<u8> {
        image.mapv(|value| if lower <= value && value <= upper { MASK_ON } else { 0 })
    }

    pub fn not(mask: &Array2<u8>) -> Array2<u8> {
        mask.mapv(|value| !value)
    }

    /// 保留 `mask` 非零位置上的 `src`，其余为0
    pub fn and(src: &Array2<u8>, mask: &Array2<u8>) -> Array2<u8> {
        Zip::from(src)
            .and(mask)
            .map_collect(|&value, &keep| if keep != 0 { value } else { 0 })
    }

    pub fn count_non_zero(mask: &Array2<u8>) -> usize {
        mask.iter().filter(|&&value| value != 0).count()
    }
}

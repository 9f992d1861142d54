pub mod color;
pub mod loader;
pub mod preprocessing;
pub mod segmentation;
pub mod visualize;

pub use color::{ColorSpace, MaskOps};
pub use loader::{ImageLoader, RawImage};
pub use preprocessing::{ImagePreprocessor, InputTensor};
pub use segmentation::{LesionMask, LesionSegmenter, Segmentation};
pub use visualize::{EncodedImages, Visualizer};

pub mod classifier;
pub mod manager;

pub use classifier::{argmax, softmax, Classifier, InferenceBackend, LabelTable, OnnxBackend, Prediction};
pub use manager::{ModelCache, ModelLoader, ModelStats, OnnxModelLoader};

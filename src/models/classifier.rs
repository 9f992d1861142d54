use crate::config::{LabelConfig, OnnxConfig};
use crate::image::InputTensor;
use crate::utils::error::AnalysisError;
use crate::Result;
use ndarray::Array4;
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// 冻结分类器的推理接口：输入 [1, 3, 224, 224]，输出每个类别的得分
pub trait InferenceBackend: Send + Sync {
    fn forward(&self, input: Array4<f32>) -> Result<Vec<f32>>;

    /// 模型声明的架构名称
    fn architecture(&self) -> &str {
        "unknown"
    }
}

/// 基于ONNX Runtime的分类器后端。ONNX会话只做推理，不保存梯度也不修改参数
pub struct OnnxBackend {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    architecture: String,
}

impl OnnxBackend {
    pub fn load(model_path: &Path, config: &OnnxConfig, trusted_architectures: &[String]) -> Result<Self> {
        if !model_path.exists() {
            return Err(AnalysisError::ModelLoad(format!(
                "Classification model not found: {}",
                model_path.display()
            )));
        }

        tracing::info!("Loading classification model from: {}", model_path.display());

        let session = Self::build_session(model_path, config)
            .map_err(|e| AnalysisError::ModelLoad(format!("{}: {}", model_path.display(), e)))?;

        let architecture = Self::declared_architecture(&session)
            .map_err(|e| AnalysisError::ModelLoad(format!("Unreadable model metadata: {}", e)))?;

        ensure_trusted(&architecture, trusted_architectures)?;

        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => return Err(AnalysisError::ModelLoad("Classification model has no inputs".to_string())),
        };

        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => return Err(AnalysisError::ModelLoad("Classification model has no outputs".to_string())),
        };

        for (i, output) in session.outputs.iter().enumerate() {
            tracing::debug!("Classification output[{}]: '{}'", i, output.name);
        }

        tracing::info!(
            "Classification model ready: architecture='{}', input='{}', output='{}'",
            architecture,
            input_name,
            output_name
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            architecture,
        })
    }

    fn build_session(model_path: &Path, config: &OnnxConfig) -> std::result::Result<Session, ort::Error> {
        let level = if !config.enable_optimization {
            GraphOptimizationLevel::Disable
        } else {
            match config.optimization_level {
                i32::MIN..=0 => GraphOptimizationLevel::Disable,
                1 => GraphOptimizationLevel::Level1,
                2 => GraphOptimizationLevel::Level2,
                _ => GraphOptimizationLevel::Level3,
            }
        };

        Session::builder()?
            .with_optimization_level(level)?
            .with_intra_threads(config.intra_threads)?
            .commit_from_file(model_path)
    }

    /// 优先读取自定义元数据 `architecture`，否则使用模型名称
    fn declared_architecture(session: &Session) -> std::result::Result<String, ort::Error> {
        let metadata = session.metadata()?;
        match metadata.custom("architecture")? {
            Some(architecture) => Ok(architecture),
            None => metadata.name(),
        }
    }
}

/// 只接受显式信任的架构，列表为空时拒绝所有模型
pub fn ensure_trusted(architecture: &str, trusted_architectures: &[String]) -> Result<()> {
    if trusted_architectures.iter().any(|trusted| trusted == architecture) {
        return Ok(());
    }

    Err(AnalysisError::ModelLoad(format!(
        "Untrusted classifier architecture '{}' (trusted: {:?})",
        architecture, trusted_architectures
    )))
}

impl InferenceBackend for OnnxBackend {
    fn forward(&self, input: Array4<f32>) -> Result<Vec<f32>> {
        let input_tensor = Tensor::from_array(input).map_err(|e| AnalysisError::Inference(e.to_string()))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| AnalysisError::Inference(e.to_string()))?;

        let output = match outputs.get(&self.output_name) {
            Some(output) => output,
            None => {
                let available: Vec<String> = outputs.keys().map(|s| s.to_string()).collect();
                return Err(AnalysisError::Inference(format!(
                    "Classification output '{}' not found. Available outputs: {:?}",
                    self.output_name, available
                )));
            }
        };

        let scores = output
            .try_extract_array::<f32>()
            .map_err(|e| AnalysisError::Inference(e.to_string()))?;

        if scores.ndim() != 2 || scores.shape()[0] != 1 {
            return Err(AnalysisError::Inference(format!(
                "Expected [1, classes] output, got {:?}",
                scores.shape()
            )));
        }

        Ok(scores.iter().copied().collect())
    }

    fn architecture(&self) -> &str {
        &self.architecture
    }
}

/// 模型输出位置到标签的映射，顺序必须与训练时一致
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
    version: String,
    names: Vec<String>,
}

impl LabelTable {
    pub fn new(version: impl Into<String>, names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(AnalysisError::Config("Label table is empty".to_string()));
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = names.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(AnalysisError::Config(format!("Duplicate label '{}'", duplicate)));
        }

        Ok(Self {
            version: version.into(),
            names,
        })
    }

    pub fn from_config(config: &LabelConfig) -> Result<Self> {
        Self::new(config.version.clone(), config.names.clone())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn label(&self, index: usize) -> Result<&str> {
        self.names
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| AnalysisError::Inference(format!("Class index {} outside label table", index)))
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        let config = LabelConfig::default();
        Self {
            version: config.version,
            names: config.names,
        }
    }
}

/// 分类结果
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub index: usize,
    pub label: String,
    /// softmax后所选类别的概率
    pub confidence: f32,
    pub scores: Vec<f32>,
}

pub struct Classifier {
    backend: Arc<dyn InferenceBackend>,
    labels: LabelTable,
}

impl Classifier {
    pub fn new(backend: Arc<dyn InferenceBackend>, labels: LabelTable) -> Self {
        Self { backend, labels }
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn architecture(&self) -> &str {
        self.backend.architecture()
    }

    pub fn classify(&self, tensor: InputTensor) -> Result<Prediction> {
        if tensor.shape() != InputTensor::SHAPE {
            return Err(AnalysisError::Inference(format!(
                "Expected input tensor {:?}, got {:?}",
                InputTensor::SHAPE,
                tensor.shape()
            )));
        }

        let scores = self.backend.forward(tensor.into_array())?;

        if scores.len() != self.labels.len() {
            return Err(AnalysisError::Inference(format!(
                "Classifier produced {} scores but label table '{}' has {} entries",
                scores.len(),
                self.labels.version(),
                self.labels.len()
            )));
        }

        let index = argmax(&scores)?;
        let label = self.labels.label(index)?.to_string();
        let confidence = softmax(&scores)[index];

        tracing::debug!("Classification: index={}, label={}, confidence={:.4}", index, label, confidence);

        Ok(Prediction {
            index,
            label,
            confidence,
            scores,
        })
    }
}

/// 最大值下标，并列时取第一个
pub fn argmax(scores: &[f32]) -> Result<usize> {
    if scores.is_empty() {
        return Err(AnalysisError::Inference("Empty score vector".to_string()));
    }
    if scores.iter().any(|s| s.is_nan()) {
        return Err(AnalysisError::Inference("NaN in classifier scores".to_string()));
    }

    let mut best = 0;
    for (i, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[best] {
            best = i;
        }
    }
    Ok(best)
}

pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max.is_infinite() {
        // 取极限：概率平均分给等于最大值的得分
        let ties = scores.iter().filter(|&&s| s == max).count() as f32;
        return scores.iter().map(|&s| if s == max { 1.0 / ties } else { 0.0 }).collect();
    }

    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

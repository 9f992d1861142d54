use crate::config::{Config, OnnxConfig};
use crate::models::classifier::{Classifier, InferenceBackend, LabelTable, OnnxBackend};
use crate::utils::error::AnalysisError;
use crate::Result;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 从磁盘反序列化分类器
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn InferenceBackend>>;
}

/// 加载ONNX模型并校验信任的架构列表
pub struct OnnxModelLoader {
    onnx_config: OnnxConfig,
    trusted_architectures: Vec<String>,
}

impl OnnxModelLoader {
    pub fn new(onnx_config: OnnxConfig, trusted_architectures: Vec<String>) -> Self {
        Self {
            onnx_config,
            trusted_architectures,
        }
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn InferenceBackend>> {
        let backend = OnnxBackend::load(path, &self.onnx_config, &self.trusted_architectures)?;
        Ok(Arc::new(backend))
    }
}

/// 进程内只加载一次的分类器缓存。
///
/// 并发的首次请求会阻塞在一次性初始化上，加载只执行一次；
/// 加载失败时缓存保持为空，之后的请求可以重试。
pub struct ModelCache {
    candidates: Vec<PathBuf>,
    loader: Box<dyn ModelLoader>,
    labels: LabelTable,
    intra_threads: usize,
    cell: OnceCell<LoadedModel>,
}

struct LoadedModel {
    classifier: Arc<Classifier>,
    path: PathBuf,
}

impl ModelCache {
    pub fn new(candidates: Vec<PathBuf>, loader: Box<dyn ModelLoader>, labels: LabelTable) -> Self {
        Self {
            candidates,
            loader,
            labels,
            intra_threads: 0,
            cell: OnceCell::new(),
        }
    }

    /// 按配置创建使用ONNX Runtime的缓存
    pub fn from_config(config: &Config) -> Result<Self> {
        let labels = LabelTable::from_config(&config.model_config.labels)?;
        let loader = OnnxModelLoader::new(
            config.onnx_config.clone(),
            config.model_config.trusted_architectures.clone(),
        );

        let mut cache = Self::new(config.model_candidates(), Box::new(loader), labels);
        cache.intra_threads = config.onnx_config.intra_threads;
        Ok(cache)
    }

    /// 获取分类器；首次调用时解析路径并加载
    pub fn get_classifier(&self) -> Result<Arc<Classifier>> {
        let loaded = self.cell.get_or_try_init(|| self.load())?;
        Ok(Arc::clone(&loaded.classifier))
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    fn load(&self) -> Result<LoadedModel> {
        let path = self.resolve_model_path()?;
        let backend = self.loader.load(&path)?;
        let classifier = Classifier::new(backend, self.labels.clone());

        tracing::info!(
            "Classifier cached: path={}, architecture={}, labels={}",
            path.display(),
            classifier.architecture(),
            self.labels.version()
        );

        Ok(LoadedModel {
            classifier: Arc::new(classifier),
            path,
        })
    }

    /// 返回第一个存在的候选路径
    pub fn resolve_model_path(&self) -> Result<PathBuf> {
        for candidate in &self.candidates {
            if candidate.exists() {
                return Ok(candidate.clone());
            }
            tracing::debug!("Model candidate not found: {}", candidate.display());
        }

        Err(AnalysisError::ModelLoad(format!(
            "No model artifact found in any of {:?}",
            self.candidates
        )))
    }

    pub fn stats(&self) -> ModelStats {
        let loaded = self.cell.get();
        ModelStats {
            loaded: loaded.is_some(),
            model_path: loaded.map(|m| m.path.display().to_string()),
            architecture: loaded.map(|m| m.classifier.architecture().to_string()),
            label_version: self.labels.version().to_string(),
            num_classes: self.labels.len(),
            intra_threads: self.intra_threads,
        }
    }
}

/// 模型统计信息
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelStats {
    pub loaded: bool,
    pub model_path: Option<String>,
    pub architecture: Option<String>,
    pub label_version: String,
    pub num_classes: usize,
    pub intra_threads: usize,
}

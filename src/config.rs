use crate::utils::error::AnalysisError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 主模型文件（相对于模型目录）
pub const PRIMARY_MODEL_FILE: &str = "backend/resnest50d_full_model.onnx";

/// 备用模型文件（相对于模型目录）
pub const FALLBACK_MODEL_FILE: &str = "resnest50d_full_model.onnx";

#[derive(Debug, Clone)]
pub struct Config {
    /// 模型文件目录
    pub models_dir: PathBuf,

    /// 并发分析的工作线程数量
    pub workers: usize,

    /// 开发模式
    pub dev_mode: bool,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 模型工件与标签表配置
    pub model_config: ModelConfig,

    /// 分割、分级与可视化配置
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别
    pub optimization_level: i32,

    /// 启用图优化
    pub enable_optimization: bool,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// 主模型路径
    pub primary_path: PathBuf,

    /// 主模型不存在时使用的备用路径
    pub fallback_path: PathBuf,

    /// 允许反序列化的分类器架构（为空时拒绝所有模型）
    pub trusted_architectures: Vec<String>,

    /// 与模型输出位置一一对应的标签表
    pub labels: LabelConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            primary_path: PathBuf::from(PRIMARY_MODEL_FILE),
            fallback_path: PathBuf::from(FALLBACK_MODEL_FILE),
            trusted_architectures: vec!["timm.models.resnet.ResNet".to_string()],
            labels: LabelConfig::default(),
        }
    }
}

/// 标签表是模型工件与服务代码之间的版本化契约，顺序必须与训练时一致
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub version: String,
    pub names: Vec<String>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            version: "resnest50d-v1".to_string(),
            names: ["0", "MR", "MRMS", "MS", "R", "S"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub segmentation: SegmentationConfig,
    pub severity: SeverityThresholds,
    pub visualizer: VisualizerConfig,
}

/// 病斑分割阈值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// 黄/褐色病斑的HSV范围
    pub lesion_band: HsvBand,

    /// 近白色背景的灰度范围
    pub background: GrayBand,
}

/// HSV闭区间，色调为0-179，饱和度与明度为0-255
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HsvBand {
    pub hue_low: u8,
    pub hue_high: u8,
    pub sat_low: u8,
    pub sat_high: u8,
    pub val_low: u8,
    pub val_high: u8,
}

impl Default for HsvBand {
    fn default() -> Self {
        Self {
            hue_low: 15,
            hue_high: 45,
            sat_low: 80,
            sat_high: 255,
            val_low: 80,
            val_high: 255,
        }
    }
}

impl HsvBand {
    pub fn lower(&self) -> [u8; 3] {
        [self.hue_low, self.sat_low, self.val_low]
    }

    pub fn upper(&self) -> [u8; 3] {
        [self.hue_high, self.sat_high, self.val_high]
    }
}

/// 灰度闭区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrayBand {
    pub low: u8,
    pub high: u8,
}

impl Default for GrayBand {
    fn default() -> Self {
        Self { low: 250, high: 255 }
    }
}

/// 感染程度分级阈值（百分比）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    pub medium: f64,
    pub high: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            medium: 10.0,
            high: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    /// 病斑像素的高亮颜色（RGB）
    pub highlight_color: [u8; 3],

    /// JPEG编码质量 (1-100)
    pub jpeg_quality: u8,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            highlight_color: [255, 0, 0],
            jpeg_quality: 95,
        }
    }
}

/// 可从JSON文件覆盖的配置部分，缺失的键保留默认值
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    analysis: Option<AnalysisConfig>,
    trusted_architectures: Option<Vec<String>>,
    labels: Option<LabelConfig>,
}

impl Config {
    pub fn new(models_dir: impl Into<PathBuf>, workers: Option<usize>, dev_mode: bool) -> Result<Self> {
        let models_dir = models_dir.into();
        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores);

        if workers == 0 {
            return Err(AnalysisError::Config("workers must be at least 1".to_string()));
        }

        let onnx_config = OnnxConfig {
            intra_threads: (cpu_cores * 3 / 4).max(1), // 使用75%的CPU核心
            optimization_level: 3,
            enable_optimization: true,
        };

        let model_config = ModelConfig {
            primary_path: models_dir.join(PRIMARY_MODEL_FILE),
            fallback_path: models_dir.join(FALLBACK_MODEL_FILE),
            ..ModelConfig::default()
        };

        Ok(Self {
            models_dir,
            workers,
            dev_mode,
            onnx_config,
            model_config,
            analysis: AnalysisConfig::default(),
        })
    }

    /// 从JSON文件合并分析阈值、信任架构列表和标签表
    pub fn merge_file(mut self, path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let file: ConfigFile = serde_json::from_str(&raw)?;

        if let Some(analysis) = file.analysis {
            self.analysis = analysis;
        }
        if let Some(trusted) = file.trusted_architectures {
            self.model_config.trusted_architectures = trusted;
        }
        if let Some(labels) = file.labels {
            self.model_config.labels = labels;
        }

        self.validate()?;
        tracing::info!("Loaded configuration overrides from {}", path.display());
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let band = &self.analysis.segmentation.lesion_band;
        if band.hue_low > band.hue_high || band.sat_low > band.sat_high || band.val_low > band.val_high {
            return Err(AnalysisError::Config(format!("Inverted lesion band: {:?}", band)));
        }
        if band.hue_high > 179 {
            return Err(AnalysisError::Config(format!(
                "Hue upper bound {} exceeds the 0-179 scale",
                band.hue_high
            )));
        }

        let background = &self.analysis.segmentation.background;
        if background.low > background.high {
            return Err(AnalysisError::Config(format!("Inverted background band: {:?}", background)));
        }

        let severity = &self.analysis.severity;
        if !(0.0..=100.0).contains(&severity.medium) || severity.medium > severity.high {
            return Err(AnalysisError::Config(format!("Invalid severity thresholds: {:?}", severity)));
        }

        let quality = self.analysis.visualizer.jpeg_quality;
        if !(1..=100).contains(&quality) {
            return Err(AnalysisError::Config(format!("JPEG quality {} out of range 1-100", quality)));
        }

        Ok(())
    }

    /// 按顺序返回候选模型路径：主路径、备用路径
    pub fn model_candidates(&self) -> Vec<PathBuf> {
        vec![
            self.model_config.primary_path.clone(),
            self.model_config.fallback_path.clone(),
        ]
    }
}

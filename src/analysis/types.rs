use crate::config::SeverityThresholds;
use serde::{Deserialize, Serialize};

/// 一次分析的完整结果，唯一跨越系统边界的记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// 预测的病害类别
    pub predicted_class: String,
    /// 预测类别的softmax概率
    pub confidence: f32,
    /// 健康叶面百分比（两位小数）
    pub healthy_percent: f64,
    /// 感染叶面百分比（两位小数）
    pub infected_percent: f64,
    pub severity: Severity,
    /// 原图（data URI）
    pub original_image: String,
    /// 病斑掩码（data URI）
    pub mask_image: String,
    /// 病斑高亮图（data URI）
    pub highlighted_image: String,
    /// 处理耗时（秒）
    pub processing_time: f32,
}

/// 感染程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn grade(infected_percent: f64, thresholds: &SeverityThresholds) -> Self {
        if infected_percent < thresholds.medium {
            Severity::Low
        } else if infected_percent < thresholds.high {
            Severity::Medium
        } else {
            Severity::High
        }
    }
}

/// 分析阶段
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnalysisStage {
    Decoding,
    Preprocessing,
    Classification,
    Segmentation,
    Rendering,
    Completed,
}

/// 分析进度
#[derive(Debug, Clone)]
pub struct AnalysisStatus {
    pub stage: AnalysisStage,
    /// 进度百分比 (0.0 - 1.0)
    pub progress: f32,
    pub message: String,
}

impl AnalysisStatus {
    pub fn new(stage: AnalysisStage, progress: f32, message: &str) -> Self {
        Self {
            stage,
            progress,
            message: message.to_string(),
        }
    }
}

/// 保留两位小数，恰好居中时取偶数（银行家舍入）
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

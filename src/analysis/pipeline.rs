use crate::{
    analysis::{round2, AnalysisResult, AnalysisStage, AnalysisStatus, Severity},
    config::{AnalysisConfig, SeverityThresholds},
    image::{ImageLoader, ImagePreprocessor, LesionSegmenter, RawImage, Visualizer},
    models::ModelCache,
    utils::error::AnalysisError,
    Result,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

type StatusSender = mpsc::UnboundedSender<AnalysisStatus>;

/// 单次请求的分析流水线：解码 → 分类 → 分割 → 可视化
pub struct AnalysisPipeline {
    models: Arc<ModelCache>,
    segmenter: LesionSegmenter,
    visualizer: Visualizer,
    severity: SeverityThresholds,
}

impl AnalysisPipeline {
    pub fn new(models: Arc<ModelCache>, config: &AnalysisConfig) -> Self {
        Self {
            models,
            segmenter: LesionSegmenter::new(config.segmentation.clone()),
            visualizer: Visualizer::new(config.visualizer),
            severity: config.severity,
        }
    }

    pub fn models(&self) -> &Arc<ModelCache> {
        &self.models
    }

    /// 分析原始图像字节
    pub fn analyze(&self, image_bytes: &[u8]) -> Result<AnalysisResult> {
        self.analyze_with_status(image_bytes, None)
    }

    pub fn analyze_with_status(&self, image_bytes: &[u8], status_tx: Option<&StatusSender>) -> Result<AnalysisResult> {
        let start_time = Instant::now();

        Self::report(status_tx, AnalysisStage::Decoding, 0.1, "Decoding image");
        let image = ImageLoader::from_bytes(image_bytes)?;

        self.analyze_image(&image, status_tx, start_time)
    }

    /// 在阻塞线程池中执行分析，适合在异步运行时中调用
    pub async fn analyze_async(self: Arc<Self>, image_bytes: Vec<u8>, status_tx: Option<StatusSender>) -> Result<AnalysisResult> {
        tokio::task::spawn_blocking(move || self.analyze_with_status(&image_bytes, status_tx.as_ref()))
            .await
            .map_err(|e| AnalysisError::Internal(format!("Analysis task failed: {}", e)))?
    }

    /// 核心流水线；任何阶段失败都会中止整个请求
    fn analyze_image(&self, image: &RawImage, status_tx: Option<&StatusSender>, start_time: Instant) -> Result<AnalysisResult> {
        let classifier = self.models.get_classifier()?;

        Self::report(status_tx, AnalysisStage::Preprocessing, 0.2, "Preprocessing image");
        let tensor = ImagePreprocessor::preprocess(image);

        Self::report(status_tx, AnalysisStage::Classification, 0.4, "Classifying leaf");
        let classification_start = Instant::now();
        let prediction = classifier.classify(tensor)?;
        let classification_time = classification_start.elapsed();

        Self::report(status_tx, AnalysisStage::Segmentation, 0.6, "Segmenting lesions");
        let segmentation_start = Instant::now();
        let segmentation = self.segmenter.segment(image);
        let segmentation_time = segmentation_start.elapsed();

        Self::report(status_tx, AnalysisStage::Rendering, 0.8, "Rendering mask and overlay");
        let encoded = self.visualizer.visualize(image, &segmentation.mask)?;

        let infected_percent = round2(segmentation.infected_percent);
        let healthy_percent = round2(segmentation.healthy_percent);
        let total_time = start_time.elapsed();

        Self::report(
            status_tx,
            AnalysisStage::Completed,
            1.0,
            &format!("Analysis completed: {} with {:.2}% infected", prediction.label, infected_percent),
        );

        tracing::info!(
            "Analysis completed: class={}, confidence={:.3}, infected={:.2}%, leaf_pixels={}, classify={:.3}s, segment={:.3}s, total={:.3}s",
            prediction.label,
            prediction.confidence,
            infected_percent,
            segmentation.leaf_pixels,
            classification_time.as_secs_f32(),
            segmentation_time.as_secs_f32(),
            total_time.as_secs_f32()
        );

        Ok(AnalysisResult {
            predicted_class: prediction.label,
            confidence: prediction.confidence,
            healthy_percent,
            infected_percent,
            severity: Severity::grade(infected_percent, &self.severity),
            original_image: encoded.original,
            mask_image: encoded.mask,
            highlighted_image: encoded.highlighted,
            processing_time: total_time.as_secs_f32(),
        })
    }

    fn report(status_tx: Option<&StatusSender>, stage: AnalysisStage, progress: f32, message: &str) {
        if let Some(tx) = status_tx {
            // 接收端可能已关闭
            let _ = tx.send(AnalysisStatus::new(stage, progress, message));
        }
    }
}

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use leaf_lesion::{
    analysis::{AnalysisPipeline, AnalysisStage, Severity},
    config::AnalysisConfig,
    image::visualize::JPEG_DATA_URI_PREFIX,
    image::ImageLoader,
    models::{InferenceBackend, LabelTable, ModelCache, ModelLoader},
    AnalysisError,
};
use ndarray::Array4;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// 总是让第 `index` 类得分最高
struct FixedIndex {
    index: usize,
}

impl InferenceBackend for FixedIndex {
    fn forward(&self, input: Array4<f32>) -> leaf_lesion::Result<Vec<f32>> {
        assert_eq!(input.shape(), &[1, 3, 224, 224]);
        let mut scores = vec![0.0; 6];
        scores[self.index] = 3.0;
        Ok(scores)
    }

    fn architecture(&self) -> &str {
        "test.FixedIndex"
    }
}

struct CountingLoader {
    loads: Arc<AtomicUsize>,
    index: usize,
}

impl ModelLoader for CountingLoader {
    fn load(&self, _path: &Path) -> leaf_lesion::Result<Arc<dyn InferenceBackend>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FixedIndex { index: self.index }))
    }
}

struct Fixture {
    _dir: TempDir,
    model_path: PathBuf,
    loads: Arc<AtomicUsize>,
    pipeline: Arc<AnalysisPipeline>,
}

fn fixture(index: usize, create_model: bool) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("resnest50d_full_model.onnx");
    if create_model {
        std::fs::write(&model_path, b"weights").unwrap();
    }

    let loads = Arc::new(AtomicUsize::new(0));
    let loader = CountingLoader {
        loads: Arc::clone(&loads),
        index,
    };
    let cache = ModelCache::new(
        vec![dir.path().join("backend/resnest50d_full_model.onnx"), model_path.clone()],
        Box::new(loader),
        LabelTable::default(),
    );
    let pipeline = Arc::new(AnalysisPipeline::new(Arc::new(cache), &AnalysisConfig::default()));

    Fixture {
        _dir: dir,
        model_path,
        loads,
        pipeline,
    }
}

fn png(width: u32, height: u32, f: impl Fn(u32, u32) -> Rgb<u8>) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, f));
    let mut buf = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

#[test]
fn half_yellow_half_green_leaf_is_r_at_fifty_percent() {
    let fx = fixture(4, true);
    let bytes = png(40, 20, |x, _| if x < 20 { YELLOW } else { GREEN });

    let result = fx.pipeline.analyze(&bytes).unwrap();

    assert_eq!(result.predicted_class, "R");
    assert_eq!(result.infected_percent, 50.0);
    assert_eq!(result.healthy_percent, 50.0);
    assert_eq!(result.severity, Severity::High);
    for uri in [&result.original_image, &result.mask_image, &result.highlighted_image] {
        assert!(uri.starts_with(JPEG_DATA_URI_PREFIX));
    }
}

#[test]
fn highlighted_image_marks_lesion_half_red() {
    let fx = fixture(0, true);
    let bytes = png(64, 32, |x, _| if x < 32 { YELLOW } else { GREEN });

    let result = fx.pipeline.analyze(&bytes).unwrap();
    let highlighted = ImageLoader::from_base64(&result.highlighted_image).unwrap();

    let lesion = highlighted.as_rgb().get_pixel(8, 16).0;
    let healthy = highlighted.as_rgb().get_pixel(56, 16).0;
    assert!(lesion[0] > 200 && lesion[1] < 60, "expected red, got {:?}", lesion);
    assert!(healthy[1] > 200 && healthy[0] < 60, "expected green, got {:?}", healthy);
}

#[test]
fn percentages_complement_after_rounding() {
    let fx = fixture(1, true);
    // 3x3 网格中 1 个黄色像素 -> 11.11%
    let bytes = png(3, 3, |x, y| if (x, y) == (1, 1) { YELLOW } else { GREEN });

    let result = fx.pipeline.analyze(&bytes).unwrap();

    assert_eq!(result.predicted_class, "MR");
    assert_eq!(result.infected_percent, 11.11);
    assert_eq!(result.healthy_percent, 88.89);
    assert!((result.infected_percent + result.healthy_percent - 100.0).abs() < 0.011);
}

#[test]
fn exact_half_hundredths_round_to_even() {
    let fx = fixture(1, true);
    // 32 个叶面像素中 1 个病斑 -> 3.125% / 96.875%
    let bytes = png(8, 4, |x, y| if (x, y) == (0, 0) { YELLOW } else { GREEN });

    let result = fx.pipeline.analyze(&bytes).unwrap();

    assert_eq!(result.infected_percent, 3.12);
    assert_eq!(result.healthy_percent, 96.88);
    assert!((result.infected_percent + result.healthy_percent - 100.0).abs() < 1e-9);
}

#[test]
fn yellow_on_white_backdrop_counts_only_leaf_region() {
    let fx = fixture(5, true);
    let bytes = png(30, 30, |x, y| {
        if (10..20).contains(&x) && (10..20).contains(&y) {
            YELLOW
        } else {
            WHITE
        }
    });

    let result = fx.pipeline.analyze(&bytes).unwrap();

    assert_eq!(result.infected_percent, 100.0);
    assert_eq!(result.healthy_percent, 0.0);
}

#[test]
fn all_white_image_reports_zero_infection() {
    let fx = fixture(0, true);
    let result = fx.pipeline.analyze(&png(16, 16, |_, _| WHITE)).unwrap();

    assert_eq!(result.predicted_class, "0");
    assert_eq!(result.infected_percent, 0.0);
    assert_eq!(result.healthy_percent, 100.0);
    assert_eq!(result.severity, Severity::Low);
}

#[test]
fn undecodable_bytes_fail_the_whole_request() {
    let fx = fixture(4, true);

    let err = fx.pipeline.analyze(b"GIF89a-but-not-really").unwrap_err();

    assert!(matches!(err, AnalysisError::Decode(_)));
    assert_eq!(err.to_json()["error"]["code"], "DECODE_ERROR");
    assert_eq!(fx.loads.load(Ordering::SeqCst), 0);
}

#[test]
fn missing_model_fails_request_but_recovers_once_artifact_appears() {
    let fx = fixture(2, false);
    let bytes = png(8, 8, |_, _| GREEN);

    let err = fx.pipeline.analyze(&bytes).unwrap_err();
    assert!(matches!(err, AnalysisError::ModelLoad(_)));
    assert!(!fx.pipeline.models().is_loaded());

    std::fs::write(&fx.model_path, b"weights").unwrap();
    let result = fx.pipeline.analyze(&bytes).unwrap();
    assert_eq!(result.predicted_class, "MRMS");
    assert_eq!(fx.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_share_a_single_model_load() {
    let fx = fixture(3, true);
    let bytes = png(24, 24, |x, y| if (x + y) % 2 == 0 { YELLOW } else { GREEN });

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let pipeline = Arc::clone(&fx.pipeline);
            let bytes = bytes.clone();
            tokio::spawn(async move { pipeline.analyze_async(bytes, None).await })
        })
        .collect();

    for task in tasks {
        let result = task.await.unwrap().unwrap();
        assert_eq!(result.predicted_class, "MS");
        assert_eq!(result.infected_percent, 50.0);
    }

    assert_eq!(fx.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn progress_is_reported_in_stage_order() {
    let fx = fixture(4, true);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    Arc::clone(&fx.pipeline)
        .analyze_async(png(10, 10, |_, _| GREEN), Some(tx))
        .await
        .unwrap();

    let mut stages = Vec::new();
    while let Some(status) = rx.recv().await {
        stages.push(status.stage);
    }

    assert_eq!(
        stages,
        vec![
            AnalysisStage::Decoding,
            AnalysisStage::Preprocessing,
            AnalysisStage::Classification,
            AnalysisStage::Segmentation,
            AnalysisStage::Rendering,
            AnalysisStage::Completed,
        ]
    );
}

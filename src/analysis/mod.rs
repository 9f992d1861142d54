pub mod pipeline;
pub mod types;

pub use pipeline::AnalysisPipeline;
pub use types::{round2, AnalysisResult, AnalysisStage, AnalysisStatus, Severity};

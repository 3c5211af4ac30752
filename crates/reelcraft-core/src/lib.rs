//! Reelcraft Core Library
//!
//! Turns a short text description into a video: a language model derives keywords and
//! scenes, stock footage is searched per keyword, and the clips are cut into one timeline
//! with text overlays and encoded by ffmpeg.

pub mod analysis;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod footage;
pub mod format;
pub mod paths;
pub mod pipeline;
pub mod provider;
pub mod render;
pub mod timeline;
pub mod types;

// Re-export commonly used items at crate root
pub use analysis::{AnalysisAdapter, AnalysisPrompt, Analyzer, LlmAnalyzer, heuristic_analysis};
pub use config::{Config, GenerateOptions, OverlayPosition, QualityPreset, TextStyle};
pub use error::{
    AnalysisError, ConfigError, PipelineError, ReelcraftError, RenderError, Result, SearchError,
};
pub use ffmpeg::FfmpegEncoder;
pub use footage::{
    FootageResolver, FootageSearcher, PexelsSearcher, RankingPolicy, RankingStrategy, SearchQuery,
};
pub use format::{
    format_analysis_readable, format_plan_readable, format_report_summary, format_timestamp,
};
pub use paths::output_path_for;
pub use pipeline::{
    BatchJob, Capabilities, GenerationReport, Stage, VideoGenerator, VideoPlan, load_jobs,
    save_plan,
};
pub use provider::{Provider, ProviderConfig};
pub use render::{ClipFetcher, EncodeJob, Encoder, HttpClipFetcher, RenderExecutor};
pub use timeline::TimelineAssembler;
pub use types::{ClipRef, ClipsByKeyword, GeneratedVideo, RenderPlan, StructuredAnalysis};

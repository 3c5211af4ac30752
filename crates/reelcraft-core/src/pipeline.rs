//! The generation pipeline: text → analysis → footage → timeline → video.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::{
    analysis::{AnalysisAdapter, Analyzer, LlmAnalyzer},
    config::{Config, GenerateOptions},
    error::{ConfigError, PipelineError, Result},
    ffmpeg::FfmpegEncoder,
    footage::{FootageResolver, FootageSearcher, PexelsSearcher},
    paths::output_path_for,
    render::{ClipFetcher, Encoder, HttpClipFetcher, RenderExecutor},
    timeline::TimelineAssembler,
    types::{GeneratedVideo, RenderPlan, StructuredAnalysis},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Analyzing,
    Resolving,
    Assembling,
    Rendering,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Analyzing => "analyzing",
            Stage::Resolving => "resolving",
            Stage::Assembling => "assembling",
            Stage::Rendering => "rendering",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one [`VideoGenerator::generate_video`] call
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub success: bool,
    pub output_path: PathBuf,
    /// `Done` or `Failed`
    pub stage: Stage,
    /// Stage that was running when the run failed
    pub failed_at: Option<Stage>,
    pub reason: Option<String>,
    pub analysis: Option<StructuredAnalysis>,
    pub plan: Option<RenderPlan>,
}

/// Analysis plus the plan it led to, without rendering
#[derive(Debug, Clone, Serialize)]
pub struct VideoPlan {
    pub analysis: StructuredAnalysis,
    pub plan: RenderPlan,
}

/// One entry of a batch file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub text: String,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub max_clips: Option<usize>,
    #[serde(default)]
    pub clip_duration: Option<f64>,
}

/// External collaborators of the pipeline
#[derive(Clone)]
pub struct Capabilities {
    pub analyzer: Arc<dyn Analyzer>,
    pub searcher: Arc<dyn FootageSearcher>,
    pub fetcher: Arc<dyn ClipFetcher>,
    pub encoder: Arc<dyn Encoder>,
}

impl Capabilities {
    /// Chat-completion analysis, Pexels search, HTTP downloads and system ffmpeg
    pub fn from_config(config: &Config) -> Self {
        Self {
            analyzer: Arc::new(LlmAnalyzer::from_config(config)),
            searcher: Arc::new(PexelsSearcher::from_config(config)),
            fetcher: Arc::new(HttpClipFetcher::default()),
            encoder: Arc::new(FfmpegEncoder::new()),
        }
    }
}

/// Mutable bookkeeping for one run
struct RunState {
    stage: Stage,
    analysis: Option<StructuredAnalysis>,
    plan: Option<RenderPlan>,
}

impl RunState {
    fn new() -> Self {
        Self {
            stage: Stage::Analyzing,
            analysis: None,
            plan: None,
        }
    }

    fn enter(&mut self, stage: Stage) {
        info!(stage = %stage, "entering stage");
        self.stage = stage;
    }
}

pub struct VideoGenerator {
    config: Config,
    analysis: AnalysisAdapter,
    resolver: FootageResolver,
    assembler: TimelineAssembler,
    renderer: RenderExecutor,
}

impl VideoGenerator {
    /// Generator backed by the production adapters
    pub fn new(config: Config) -> std::result::Result<Self, ConfigError> {
        let capabilities = Capabilities::from_config(&config);
        Self::with_capabilities(config, capabilities)
    }

    pub fn with_capabilities(
        config: Config,
        capabilities: Capabilities,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            analysis: AnalysisAdapter::new(capabilities.analyzer, &config),
            resolver: FootageResolver::new(capabilities.searcher, &config),
            assembler: TimelineAssembler::new(&config),
            renderer: RenderExecutor::new(capabilities.fetcher, capabilities.encoder, &config),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Structured analysis sized to the configured default clip count
    pub async fn analyze_text(&self, text: &str) -> StructuredAnalysis {
        self.analysis
            .analyze(text, self.config.default_max_clips)
            .await
    }

    /// Everything up to, but not including, rendering
    pub async fn plan_video(
        &self,
        text: &str,
        options: &GenerateOptions,
    ) -> std::result::Result<VideoPlan, PipelineError> {
        let mut state = RunState::new();
        self.prepare(text, options, &mut state)
            .instrument(info_span!("plan", run = %Uuid::new_v4()))
            .await
    }

    /// Run the whole pipeline. Failures are reported in the returned report, never raised.
    pub async fn generate_video(
        &self,
        text: &str,
        output_path: &Path,
        options: &GenerateOptions,
    ) -> GenerationReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("generate", run = %run_id);
        let mut state = RunState::new();

        let result = self
            .run(text, output_path, options, &mut state)
            .instrument(span.clone())
            .await;

        let _entered = span.enter();
        match result {
            Ok(video) => {
                info!("video written to {}", video.path.display());
                GenerationReport {
                    success: true,
                    output_path: video.path,
                    stage: Stage::Done,
                    failed_at: None,
                    reason: None,
                    analysis: state.analysis,
                    plan: state.plan,
                }
            }
            Err(e) => {
                error!(stage = %state.stage, "generation failed: {}", e);
                GenerationReport {
                    success: false,
                    output_path: output_path.to_path_buf(),
                    stage: Stage::Failed,
                    failed_at: Some(state.stage),
                    reason: Some(e.to_string()),
                    analysis: state.analysis,
                    plan: state.plan,
                }
            }
        }
    }

    /// Run jobs one after another.
    ///
    /// Every job's options are checked before the first run starts. Jobs without an explicit
    /// output are written to the configured output directory, named after their text.
    pub async fn generate_batch(
        &self,
        jobs: &[BatchJob],
    ) -> std::result::Result<Vec<GenerationReport>, ConfigError> {
        let defaults = self.config.generate_options();
        let prepared = jobs
            .iter()
            .enumerate()
            .map(|(i, job)| {
                let options = GenerateOptions::new(
                    job.max_clips.unwrap_or(defaults.max_clips()),
                    job.clip_duration.unwrap_or(defaults.clip_duration()),
                )?;
                let output = job.output.clone().unwrap_or_else(|| {
                    let named = output_path_for(&self.config.output_dir, &job.text);
                    let file_name = named
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    self.config
                        .output_dir
                        .join(format!("{:02}_{}", i + 1, file_name))
                });
                Ok((job, options, output))
            })
            .collect::<std::result::Result<Vec<_>, ConfigError>>()?;

        let mut reports = Vec::with_capacity(prepared.len());
        for (i, (job, options, output)) in prepared.iter().enumerate() {
            info!("batch job {}/{}", i + 1, prepared.len());
            reports.push(self.generate_video(&job.text, output, options).await);
        }

        let succeeded = reports.iter().filter(|r| r.success).count();
        info!(succeeded, total = reports.len(), "batch finished");
        Ok(reports)
    }

    async fn run(
        &self,
        text: &str,
        output_path: &Path,
        options: &GenerateOptions,
        state: &mut RunState,
    ) -> std::result::Result<GeneratedVideo, PipelineError> {
        let prepared = self.prepare(text, options, state).await?;

        state.enter(Stage::Rendering);
        let video = self.renderer.render(&prepared.plan, output_path).await?;
        Ok(video)
    }

    async fn prepare(
        &self,
        text: &str,
        options: &GenerateOptions,
        state: &mut RunState,
    ) -> std::result::Result<VideoPlan, PipelineError> {
        state.enter(Stage::Analyzing);
        let analysis = self.analysis.analyze(text, options.max_clips()).await;
        state.analysis = Some(analysis.clone());

        state.enter(Stage::Resolving);
        let outcome = self
            .resolver
            .resolve(&analysis.keywords, self.config.clips_per_keyword)
            .await;
        if outcome.clips.is_empty() {
            return Err(PipelineError::ResolutionFailure {
                keywords: analysis.keywords.len(),
                failed: outcome.failures.len(),
            });
        }

        state.enter(Stage::Assembling);
        let plan = self.assembler.assemble(&analysis, &outcome.clips, options)?;
        state.plan = Some(plan.clone());
        Ok(VideoPlan { analysis, plan })
    }
}

/// Read a JSON list of batch jobs
pub async fn load_jobs(path: &Path) -> Result<Vec<BatchJob>> {
    let json_content = fs::read_to_string(path).await?;
    let jobs: Vec<BatchJob> = serde_json::from_str(&json_content)?;
    Ok(jobs)
}

/// Save a render plan as pretty JSON
pub async fn save_plan(plan: &VideoPlan, path: &Path) -> Result<()> {
    let pretty_json = serde_json::to_string_pretty(plan)?;
    fs::write(path, &pretty_json).await?;
    Ok(())
}

//! Turning a [`RenderPlan`] into a file on disk.
//!
//! Every run gets its own scratch directory under the configured temp dir. Clips and overlay
//! text files live there until the encoder is done, and the directory is removed whether the
//! run succeeds or not. The encoder writes into a staging file next to the requested output,
//! which is renamed onto the output path only after a successful encode.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::{
    analysis::http_client,
    config::Config,
    error::RenderError,
    types::{ClipRef, GeneratedVideo, OutputSpec, OverlayStyle, RenderPlan},
};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Downloads one source clip to a local file
#[async_trait]
pub trait ClipFetcher: Send + Sync {
    async fn fetch(&self, clip: &ClipRef, destination: &Path) -> Result<(), RenderError>;
}

/// Produces the final video from local inputs
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, job: &EncodeJob) -> Result<(), RenderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOverlay {
    pub text_file: PathBuf,
    pub start: f64,
    pub end: f64,
    pub fade: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodeInput {
    pub path: PathBuf,
    pub start: f64,
    pub duration: f64,
    pub overlay: Option<EncodeOverlay>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodeJob {
    pub inputs: Vec<EncodeInput>,
    pub output: OutputSpec,
    pub style: OverlayStyle,
    /// File the encoder must write
    pub destination: PathBuf,
}

pub struct HttpClipFetcher {
    client: reqwest::Client,
}

impl Default for HttpClipFetcher {
    fn default() -> Self {
        Self::new(DOWNLOAD_TIMEOUT)
    }
}

impl HttpClipFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
        }
    }
}

#[async_trait]
impl ClipFetcher for HttpClipFetcher {
    async fn fetch(&self, clip: &ClipRef, destination: &Path) -> Result<(), RenderError> {
        let acquire = |reason: String| RenderError::Acquire {
            source_id: clip.source_id.clone(),
            url: clip.url.clone(),
            reason,
        };

        let mut response = self
            .client
            .get(&clip.url)
            .send()
            .await
            .map_err(|e| acquire(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(acquire(format!("HTTP {}", status)));
        }

        let mut file = tokio::fs::File::create(destination).await?;
        let mut written = 0usize;
        while let Some(chunk) = response.chunk().await.map_err(|e| acquire(e.to_string()))? {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        if written == 0 {
            return Err(acquire("empty response body".to_string()));
        }

        debug!(
            source_id = %clip.source_id,
            bytes = written,
            "clip downloaded to {}",
            destination.display()
        );
        Ok(())
    }
}

pub struct RenderExecutor {
    fetcher: Arc<dyn ClipFetcher>,
    encoder: Arc<dyn Encoder>,
    temp_dir: PathBuf,
}

impl RenderExecutor {
    pub fn new(fetcher: Arc<dyn ClipFetcher>, encoder: Arc<dyn Encoder>, config: &Config) -> Self {
        Self {
            fetcher,
            encoder,
            temp_dir: config.temp_dir.clone(),
        }
    }

    /// Download, encode and move the result onto `output_path`.
    ///
    /// On error nothing is left at `output_path` and the scratch directory is gone.
    pub async fn render(
        &self,
        plan: &RenderPlan,
        output_path: &Path,
    ) -> Result<GeneratedVideo, RenderError> {
        if plan.segments().is_empty() {
            return Err(RenderError::EmptyPlan);
        }

        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("reelcraft-run-")
            .tempdir_in(&self.temp_dir)?;
        debug!("scratch directory {}", scratch.path().display());

        let inputs = self.prepare_inputs(plan, scratch.path()).await?;

        let parent = output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        tokio::fs::create_dir_all(parent).await?;

        let extension = output_path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_else(|| ".mp4".to_string());
        let staging = tempfile::Builder::new()
            .prefix(".reelcraft-")
            .suffix(&extension)
            .tempfile_in(parent)?;

        let job = EncodeJob {
            inputs,
            output: plan.output().clone(),
            style: plan.overlay_style().clone(),
            destination: staging.path().to_path_buf(),
        };

        info!(
            segments = job.inputs.len(),
            resolution = %format!("{}x{}", job.output.resolution.width, job.output.resolution.height),
            "encoding video"
        );
        self.encoder.encode(&job).await?;

        let size = tokio::fs::metadata(staging.path()).await?.len();
        if size == 0 {
            return Err(RenderError::MissingOutput(output_path.to_path_buf()));
        }

        staging
            .persist(output_path)
            .map_err(|e| RenderError::Io(e.error))?;
        debug!("moved encoded video to {}", output_path.display());

        scratch.close()?;

        Ok(GeneratedVideo {
            path: output_path.to_path_buf(),
            success: true,
        })
    }

    /// Download each distinct clip once and write overlay text files.
    async fn prepare_inputs(
        &self,
        plan: &RenderPlan,
        scratch: &Path,
    ) -> Result<Vec<EncodeInput>, RenderError> {
        let mut local: HashMap<&str, PathBuf> = HashMap::new();
        let mut inputs = Vec::with_capacity(plan.segments().len());

        for (i, segment) in plan.segments().iter().enumerate() {
            let clip = &segment.clip;
            let path = match local.get(clip.source_id.as_str()) {
                Some(path) => path.clone(),
                None => {
                    let path = scratch.join(format!("clip_{:02}.mp4", local.len()));
                    self.fetcher.fetch(clip, &path).await?;
                    local.insert(clip.source_id.as_str(), path.clone());
                    path
                }
            };

            let overlay = match &segment.overlay {
                Some(overlay) => {
                    let text_file = scratch.join(format!("overlay_{i:02}.txt"));
                    tokio::fs::write(&text_file, &overlay.text).await?;
                    Some(EncodeOverlay {
                        text_file,
                        start: overlay.start,
                        end: overlay.end,
                        fade: overlay.fade,
                    })
                }
                None => None,
            };

            inputs.push(EncodeInput {
                path,
                start: segment.start_offset,
                duration: segment.duration,
                overlay,
            });
        }

        info!(clips = local.len(), "footage downloaded");
        Ok(inputs)
    }
}

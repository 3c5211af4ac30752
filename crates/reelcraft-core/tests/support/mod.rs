//! Deterministic stand-ins for the external services.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use reelcraft_core::{
    AnalysisPrompt, Analyzer, Capabilities, ClipFetcher, ClipRef, Config, EncodeJob, Encoder,
    FootageSearcher, SearchQuery, VideoGenerator,
    error::{AnalysisError, RenderError, SearchError},
};

pub struct ScriptedAnalyzer {
    reply: Option<String>,
    pub calls: AtomicUsize,
}

impl ScriptedAnalyzer {
    pub fn replying(json: serde_json::Value) -> Self {
        Self {
            reply: Some(json.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze(&self, _prompt: &AnalysisPrompt) -> Result<String, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone().ok_or_else(|| AnalysisError::RateLimited {
            provider: "scripted".to_string(),
        })
    }
}

#[derive(Default)]
pub struct MapSearcher {
    results: HashMap<String, Vec<ClipRef>>,
    failing: HashSet<String>,
}

impl MapSearcher {
    /// `count` clips with ids `<keyword>-<n>`
    pub fn with_clips(mut self, keyword: &str, count: usize) -> Self {
        let clips = (1..=count)
            .map(|n| clip(&format!("{keyword}-{n}"), keyword))
            .collect();
        self.results.insert(keyword.to_string(), clips);
        self
    }

    pub fn failing_on(mut self, keyword: &str) -> Self {
        self.failing.insert(keyword.to_string());
        self
    }
}

#[async_trait]
impl FootageSearcher for MapSearcher {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ClipRef>, SearchError> {
        if self.failing.contains(&query.keyword) {
            return Err(SearchError::RateLimited);
        }
        let mut clips = self
            .results
            .get(&query.keyword)
            .cloned()
            .unwrap_or_default();
        clips.truncate(query.limit);
        Ok(clips)
    }
}

pub fn clip(id: &str, keyword: &str) -> ClipRef {
    ClipRef {
        source_id: id.to_string(),
        url: format!("https://footage.test/{id}.mp4"),
        duration_hint: Some(30.0),
        resolution_hint: None,
        keyword: keyword.to_string(),
    }
}

#[derive(Default)]
pub struct StubFetcher {
    pub fetched: Mutex<Vec<String>>,
}

#[async_trait]
impl ClipFetcher for StubFetcher {
    async fn fetch(&self, clip: &ClipRef, destination: &Path) -> Result<(), RenderError> {
        self.fetched.lock().unwrap().push(clip.source_id.clone());
        tokio::fs::write(destination, clip.source_id.as_bytes()).await?;
        Ok(())
    }
}

/// Writes a fake video listing its inputs, or fails after a partial write
#[derive(Default)]
pub struct StubEncoder {
    pub fail: bool,
    pub jobs: Mutex<Vec<EncodeJob>>,
}

#[async_trait]
impl Encoder for StubEncoder {
    async fn encode(&self, job: &EncodeJob) -> Result<(), RenderError> {
        self.jobs.lock().unwrap().push(job.clone());
        let listing: Vec<String> = job
            .inputs
            .iter()
            .map(|input| input.path.display().to_string())
            .collect();
        tokio::fs::write(&job.destination, listing.join("\n")).await?;

        if self.fail {
            return Err(RenderError::Encode {
                message: "ffmpeg exited with exit status: 1".to_string(),
                stderr: Some("Invalid data found when processing input".to_string()),
            });
        }
        Ok(())
    }
}

pub struct Harness {
    pub root: tempfile::TempDir,
    pub generator: VideoGenerator,
    pub analyzer: Arc<ScriptedAnalyzer>,
    pub fetcher: Arc<StubFetcher>,
    pub encoder: Arc<StubEncoder>,
}

impl Harness {
    pub fn new(analyzer: ScriptedAnalyzer, searcher: MapSearcher) -> Self {
        Self::with_encoder(analyzer, searcher, StubEncoder::default())
    }

    pub fn with_encoder(
        analyzer: ScriptedAnalyzer,
        searcher: MapSearcher,
        encoder: StubEncoder,
    ) -> Self {
        let root = tempfile::tempdir().unwrap();
        let config = Config {
            output_dir: root.path().join("output"),
            temp_dir: root.path().join("tmp"),
            ..Config::default()
        };

        let analyzer = Arc::new(analyzer);
        let fetcher = Arc::new(StubFetcher::default());
        let encoder = Arc::new(encoder);
        let generator = VideoGenerator::with_capabilities(
            config,
            Capabilities {
                analyzer: analyzer.clone(),
                searcher: Arc::new(searcher),
                fetcher: fetcher.clone(),
                encoder: encoder.clone(),
            },
        )
        .unwrap();

        Self {
            root,
            generator,
            analyzer,
            fetcher,
            encoder,
        }
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.root.path().join("output").join(name)
    }

    /// No scratch directories or clips left behind
    pub fn temp_is_clean(&self) -> bool {
        let temp = &self.generator.config().temp_dir;
        !temp.exists() || std::fs::read_dir(temp).unwrap().next().is_none()
    }

    /// Only the given file names exist in the output directory
    pub fn output_files(&self) -> Vec<String> {
        let dir = self.root.path().join("output");
        if !dir.exists() {
            return Vec::new();
        }
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}

pub fn mountain_analysis() -> serde_json::Value {
    serde_json::json!({
        "main_theme": "Peaceful mountains",
        "keywords": ["mountain", "landscape"],
        "mood": "calm",
        "scenes": ["Snowy peaks at sunrise", "A quiet valley below"]
    })
}

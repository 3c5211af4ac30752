//! Explicit configuration for a [`VideoGenerator`](crate::pipeline::VideoGenerator).
//!
//! Everything the pipeline reads lives in [`Config`], which is handed to the orchestrator at
//! construction time. Named presets ([`QualityPreset`], [`TextStyle`]) are resolved into
//! concrete values when a plan is built.

use std::{path::PathBuf, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    footage::RankingStrategy,
    paths::{default_output_dir, default_temp_dir},
    provider::Provider,
};

/// Upper bound for clips per video; keeps search and render cost bounded.
pub const MAX_CLIPS_UPPER_BOUND: usize = 10;
pub const DEFAULT_MAX_CLIPS: usize = 3;
pub const DEFAULT_CLIP_DURATION: f64 = 5.0;
pub const DEFAULT_CLIPS_PER_KEYWORD: usize = 2;
pub const DEFAULT_LLM_MAX_TOKENS: u32 = 500;
pub const PEXELS_ENV_VAR: &str = "PEXELS_API_KEY";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate: String,
}

impl QualityPreset {
    pub fn settings(&self) -> VideoSettings {
        let (width, height, fps, bitrate) = match self {
            QualityPreset::Low => (640, 360, 24, "500k"),
            QualityPreset::Medium => (1280, 720, 24, "2500k"),
            QualityPreset::High => (1920, 1080, 30, "5000k"),
        };
        VideoSettings {
            width,
            height,
            fps,
            bitrate: bitrate.to_string(),
        }
    }
}

impl FromStr for QualityPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(QualityPreset::Low),
            "medium" => Ok(QualityPreset::Medium),
            "high" => Ok(QualityPreset::High),
            other => Err(ConfigError::UnknownPreset {
                kind: "quality",
                name: other.to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextStyle {
    #[default]
    Standard,
    Minimal,
    Bold,
    Elegant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStyleSpec {
    pub font_size: u32,
    pub color: String,
    pub stroke_color: String,
    pub stroke_width: u32,
}

impl TextStyle {
    pub fn spec(&self) -> TextStyleSpec {
        let (font_size, color, stroke_color, stroke_width) = match self {
            TextStyle::Standard => (50, "white", "black", 2),
            TextStyle::Minimal => (40, "white", "black", 1),
            TextStyle::Bold => (60, "white", "black", 3),
            TextStyle::Elegant => (45, "#f0f0f0", "#333333", 2),
        };
        TextStyleSpec {
            font_size,
            color: color.to_string(),
            stroke_color: stroke_color.to_string(),
            stroke_width,
        }
    }
}

impl FromStr for TextStyle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(TextStyle::Standard),
            "minimal" => Ok(TextStyle::Minimal),
            "bold" => Ok(TextStyle::Bold),
            "elegant" => Ok(TextStyle::Elegant),
            other => Err(ConfigError::UnknownPreset {
                kind: "text style",
                name: other.to_string(),
            }),
        }
    }
}

/// Vertical placement of overlay text. Horizontally it is always centered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayPosition {
    #[default]
    Center,
    Bottom,
    Top,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub provider: Provider,
    pub llm_api_key: Option<String>,
    /// Overrides the provider's default model
    pub llm_model: Option<String>,
    pub llm_max_tokens: u32,
    pub pexels_api_key: Option<String>,

    pub quality: QualityPreset,
    pub text_style: TextStyle,
    pub overlay_position: OverlayPosition,
    /// Share of the frame width overlay text may occupy
    pub text_width_ratio: f64,
    pub font_file: Option<PathBuf>,
    pub video_codec: String,
    /// Codec for the clips' audio; `None` writes a silent video
    pub audio_codec: Option<String>,

    pub default_max_clips: usize,
    pub default_clip_duration: f64,
    pub clips_per_keyword: usize,
    pub search_concurrency: usize,
    pub ranking: RankingStrategy,
    /// Reuse earlier clips cyclically when fewer distinct clips than requested were found
    pub reuse_clips: bool,

    /// Generic terms used both as search fallbacks and as keywords for empty input
    pub fallback_keywords: Vec<String>,
    pub default_mood: String,

    pub request_timeout: Duration,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            llm_api_key: None,
            llm_model: None,
            llm_max_tokens: DEFAULT_LLM_MAX_TOKENS,
            pexels_api_key: None,
            quality: QualityPreset::default(),
            text_style: TextStyle::default(),
            overlay_position: OverlayPosition::default(),
            text_width_ratio: 0.8,
            font_file: None,
            video_codec: "libx264".to_string(),
            audio_codec: Some("aac".to_string()),
            default_max_clips: DEFAULT_MAX_CLIPS,
            default_clip_duration: DEFAULT_CLIP_DURATION,
            clips_per_keyword: DEFAULT_CLIPS_PER_KEYWORD,
            search_concurrency: 4,
            ranking: RankingStrategy::default(),
            reuse_clips: true,
            fallback_keywords: vec!["nature".to_string(), "abstract".to_string()],
            default_mood: "neutral".to_string(),
            request_timeout: Duration::from_secs(30),
            output_dir: default_output_dir(),
            temp_dir: default_temp_dir(),
        }
    }
}

impl Config {
    /// Defaults plus credentials and overrides from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(provider) = env_value("REELCRAFT_PROVIDER") {
            config.provider = provider.parse()?;
        }
        config.llm_api_key = config.provider.api_key_from_env();
        config.llm_model = env_value("REELCRAFT_MODEL");
        config.pexels_api_key = env_value(PEXELS_ENV_VAR);

        if let Some(quality) = env_value("REELCRAFT_QUALITY") {
            config.quality = quality.parse()?;
        }
        if let Some(style) = env_value("REELCRAFT_TEXT_STYLE") {
            config.text_style = style.parse()?;
        }
        if let Some(codec) = env_value("REELCRAFT_AUDIO_CODEC") {
            config.audio_codec = (!codec.eq_ignore_ascii_case("none")).then_some(codec);
        }
        if let Some(dir) = env_value("REELCRAFT_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_value("REELCRAFT_TEMP_DIR") {
            config.temp_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Switch provider, re-reading its key from the environment
    pub fn with_provider(mut self, provider: Provider) -> Self {
        if self.provider != provider {
            self.provider = provider;
            self.llm_api_key = provider.api_key_from_env();
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CLIPS_UPPER_BOUND).contains(&self.default_max_clips) {
            return Err(ConfigError::invalid(
                "default_max_clips",
                format!("must be within 1..={MAX_CLIPS_UPPER_BOUND}"),
            ));
        }
        validate_clip_duration("default_clip_duration", self.default_clip_duration)?;
        if self.clips_per_keyword == 0 {
            return Err(ConfigError::invalid("clips_per_keyword", "must be > 0"));
        }
        if self.search_concurrency == 0 {
            return Err(ConfigError::invalid("search_concurrency", "must be > 0"));
        }
        if !(self.text_width_ratio > 0.0 && self.text_width_ratio <= 1.0) {
            return Err(ConfigError::invalid(
                "text_width_ratio",
                "must be within (0, 1]",
            ));
        }
        if self.fallback_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ConfigError::invalid(
                "fallback_keywords",
                "at least one non-empty term is required",
            ));
        }
        if self.video_codec.trim().is_empty() {
            return Err(ConfigError::invalid("video_codec", "must not be empty"));
        }
        if self
            .audio_codec
            .as_deref()
            .is_some_and(|codec| codec.trim().is_empty())
        {
            return Err(ConfigError::invalid("audio_codec", "must not be empty"));
        }
        Ok(())
    }

    /// Report every missing credential at once
    pub fn validate_api_keys(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if is_blank(&self.llm_api_key) {
            missing.push(self.provider.config().env_var.to_string());
        }
        if is_blank(&self.pexels_api_key) {
            missing.push(PEXELS_ENV_VAR.to_string());
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingApiKeys(missing))
        }
    }

    /// Only the footage search key; analysis can run on the heuristic without a model key
    pub fn validate_search_key(&self) -> Result<(), ConfigError> {
        if is_blank(&self.pexels_api_key) {
            return Err(ConfigError::MissingApiKeys(vec![PEXELS_ENV_VAR.to_string()]));
        }
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        for dir in [&self.output_dir, &self.temp_dir] {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Directory {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn video_settings(&self) -> VideoSettings {
        self.quality.settings()
    }

    pub fn text_style_spec(&self) -> TextStyleSpec {
        self.text_style.spec()
    }

    pub fn fallback_terms(&self) -> impl Iterator<Item = &str> {
        self.fallback_keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
    }

    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            max_clips: self.default_max_clips,
            clip_duration: self.default_clip_duration,
        }
    }
}

/// Per-call knobs for a generation run
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    max_clips: usize,
    clip_duration: f64,
}

impl GenerateOptions {
    /// `max_clips` above the upper bound is clamped; zero clips or a non-positive duration
    /// are rejected.
    pub fn new(max_clips: usize, clip_duration: f64) -> Result<Self, ConfigError> {
        if max_clips == 0 {
            return Err(ConfigError::invalid("max_clips", "must be at least 1"));
        }
        validate_clip_duration("clip_duration", clip_duration)?;

        Ok(Self {
            max_clips: max_clips.min(MAX_CLIPS_UPPER_BOUND),
            clip_duration,
        })
    }

    pub fn max_clips(&self) -> usize {
        self.max_clips
    }

    pub fn clip_duration(&self) -> f64 {
        self.clip_duration
    }
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_clips: DEFAULT_MAX_CLIPS,
            clip_duration: DEFAULT_CLIP_DURATION,
        }
    }
}

fn validate_clip_duration(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must be a positive number of seconds"))
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{OverlayPosition, TextStyleSpec};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredAnalysis {
    pub main_theme: String,
    pub keywords: Vec<String>,
    pub mood: String,
    pub scenes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Pointer to stock footage, not the footage itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRef {
    pub source_id: String,
    pub url: String,
    pub duration_hint: Option<f64>,
    pub resolution_hint: Option<Resolution>,
    /// Keyword this clip was resolved for
    pub keyword: String,
}

/// Candidates per keyword, kept in the analysis' keyword order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipsByKeyword {
    entries: Vec<(String, Vec<ClipRef>)>,
}

impl ClipsByKeyword {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a keyword; a keyword already present gets the new clips appended
    pub fn insert(&mut self, keyword: impl Into<String>, clips: Vec<ClipRef>) {
        let keyword = keyword.into();
        match self.entries.iter_mut().find(|(k, _)| *k == keyword) {
            Some((_, existing)) => existing.extend(clips),
            None => self.entries.push((keyword, clips)),
        }
    }

    pub fn get(&self, keyword: &str) -> Option<&[ClipRef]> {
        self.entries
            .iter()
            .find(|(k, _)| k == keyword)
            .map(|(_, clips)| clips.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ClipRef])> {
        self.entries
            .iter()
            .map(|(k, clips)| (k.as_str(), clips.as_slice()))
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn total_clips(&self) -> usize {
        self.entries.iter().map(|(_, clips)| clips.len()).sum()
    }

    /// True when no keyword has a single candidate
    pub fn is_empty(&self) -> bool {
        self.total_clips() == 0
    }
}

/// Text shown over one segment; timing is relative to the segment start
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub text: String,
    pub start: f64,
    pub end: f64,
    /// Fade-in and fade-out length at each end
    pub fade: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineSegment {
    pub clip: ClipRef,
    /// Trim-in point inside the source clip
    pub start_offset: f64,
    pub duration: f64,
    pub overlay: Option<Overlay>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSpec {
    pub resolution: Resolution,
    pub fps: u32,
    pub bitrate: String,
    pub video_codec: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayStyle {
    pub text: TextStyleSpec,
    pub position: OverlayPosition,
    /// Characters per line before wrapping
    pub max_line_chars: usize,
    pub font_file: Option<PathBuf>,
}

/// Fully resolved, ordered description of the video to encode.
///
/// Built only by the timeline assembler; everything downstream reads it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPlan {
    segments: Vec<TimelineSegment>,
    total_duration: f64,
    output: OutputSpec,
    overlay_style: OverlayStyle,
}

impl RenderPlan {
    pub(crate) fn new(
        segments: Vec<TimelineSegment>,
        output: OutputSpec,
        overlay_style: OverlayStyle,
    ) -> Self {
        let total: f64 = segments.iter().map(|s| s.duration).sum();
        Self {
            segments,
            total_duration: round_millis(total),
            output,
            overlay_style,
        }
    }

    pub fn segments(&self) -> &[TimelineSegment] {
        &self.segments
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn output(&self) -> &OutputSpec {
        &self.output
    }

    pub fn overlay_style(&self) -> &OverlayStyle {
        &self.overlay_style
    }

    /// Source clips in first-use order, each listed once
    pub fn distinct_clips(&self) -> Vec<&ClipRef> {
        let mut seen: Vec<&ClipRef> = Vec::new();
        for segment in &self.segments {
            if !seen.iter().any(|c| c.source_id == segment.clip.source_id) {
                seen.push(&segment.clip);
            }
        }
        seen
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedVideo {
    pub path: PathBuf,
    pub success: bool,
}

pub(crate) fn round_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

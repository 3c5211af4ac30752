use std::collections::HashSet;

use tracing::{debug, info};

use crate::{
    config::{Config, GenerateOptions},
    error::PipelineError,
    types::{
        ClipRef, ClipsByKeyword, Overlay, OutputSpec, OverlayStyle, RenderPlan, Resolution,
        StructuredAnalysis, TimelineSegment, round_millis,
    },
};

/// Longest fade applied at either end of an overlay
const MAX_FADE_SECONDS: f64 = 0.5;

/// Approximate glyph width relative to the font size
const GLYPH_WIDTH_RATIO: f64 = 0.5;

/// Turns an analysis plus resolved footage into a [`RenderPlan`].
#[derive(Debug, Clone)]
pub struct TimelineAssembler {
    output: OutputSpec,
    overlay_style: OverlayStyle,
    reuse_clips: bool,
}

impl TimelineAssembler {
    pub fn new(config: &Config) -> Self {
        let settings = config.video_settings();
        let text = config.text_style_spec();
        let usable_width = f64::from(settings.width) * config.text_width_ratio;
        let glyph_width = f64::from(text.font_size) * GLYPH_WIDTH_RATIO;
        let max_line_chars = ((usable_width / glyph_width).floor() as usize).max(1);

        Self {
            output: OutputSpec {
                resolution: Resolution {
                    width: settings.width,
                    height: settings.height,
                },
                fps: settings.fps,
                bitrate: settings.bitrate,
                video_codec: config.video_codec.clone(),
                audio_codec: config.audio_codec.clone(),
            },
            overlay_style: OverlayStyle {
                text,
                position: config.overlay_position,
                max_line_chars,
                font_file: config.font_file.clone(),
            },
            reuse_clips: config.reuse_clips,
        }
    }

    pub fn assemble(
        &self,
        analysis: &StructuredAnalysis,
        clips: &ClipsByKeyword,
        options: &GenerateOptions,
    ) -> Result<RenderPlan, PipelineError> {
        let max_clips = options.max_clips();
        let mut selected = select_round_robin(clips, max_clips);
        if selected.is_empty() {
            return Err(PipelineError::InsufficientFootage);
        }

        let distinct = selected.len();
        if self.reuse_clips {
            for i in distinct..max_clips {
                let reused = selected[i % distinct].clone();
                selected.push(reused);
            }
        }
        debug!(
            distinct,
            segments = selected.len(),
            "clips selected for timeline"
        );

        let segments: Vec<TimelineSegment> = selected
            .into_iter()
            .enumerate()
            .map(|(i, clip)| self.segment(i, clip, analysis, options.clip_duration()))
            .collect();

        let plan = RenderPlan::new(segments, self.output.clone(), self.overlay_style.clone());
        info!(
            segments = plan.segments().len(),
            total_duration = plan.total_duration(),
            "timeline assembled"
        );
        Ok(plan)
    }

    fn segment(
        &self,
        index: usize,
        clip: ClipRef,
        analysis: &StructuredAnalysis,
        clip_duration: f64,
    ) -> TimelineSegment {
        let duration = round_millis(
            clip.duration_hint
                .map_or(clip_duration, |hint| hint.min(clip_duration)),
        );

        let text = [
            analysis.scenes.get(index).map(String::as_str),
            Some(analysis.main_theme.as_str()),
            Some(clip.keyword.as_str()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|t| !t.is_empty());

        let overlay = text.map(|text| Overlay {
            text: wrap_text(text, self.overlay_style.max_line_chars),
            start: 0.0,
            end: duration,
            fade: round_millis(MAX_FADE_SECONDS.min(duration / 4.0)),
        });

        TimelineSegment {
            clip,
            start_offset: 0.0,
            duration,
            overlay,
        }
    }
}

/// Each keyword, in order, contributes its next unused clip per round.
fn select_round_robin(clips: &ClipsByKeyword, max_clips: usize) -> Vec<ClipRef> {
    let lists: Vec<&[ClipRef]> = clips.iter().map(|(_, list)| list).collect();
    let mut cursors = vec![0usize; lists.len()];
    let mut used: HashSet<&str> = HashSet::new();
    let mut selected = Vec::new();

    'rounds: loop {
        let mut progressed = false;
        for (list, cursor) in lists.iter().zip(cursors.iter_mut()) {
            if selected.len() >= max_clips {
                break 'rounds;
            }
            while let Some(clip) = list.get(*cursor) {
                *cursor += 1;
                if is_usable(clip) && used.insert(clip.source_id.as_str()) {
                    selected.push(clip.clone());
                    progressed = true;
                    break;
                }
            }
        }
        if !progressed {
            break;
        }
    }

    selected
}

fn is_usable(clip: &ClipRef) -> bool {
    !clip.url.trim().is_empty() && clip.duration_hint.is_none_or(|d| d > 0.0)
}

/// Greedy word wrap on character counts; words longer than a line keep a line of their own.
pub fn wrap_text(text: &str, max_chars: usize) -> String {
    let max_chars = max_chars.max(1);
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if current.chars().count() + 1 + word.chars().count() <= max_chars {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(id: &str, keyword: &str, duration: Option<f64>) -> ClipRef {
        ClipRef {
            source_id: id.to_string(),
            url: format!("https://cdn.example/{id}.mp4"),
            duration_hint: duration,
            resolution_hint: None,
            keyword: keyword.to_string(),
        }
    }

    fn analysis(scenes: &[&str]) -> StructuredAnalysis {
        StructuredAnalysis {
            main_theme: "Mountains".to_string(),
            keywords: vec!["mountain".to_string(), "lake".to_string()],
            mood: "calm".to_string(),
            scenes: scenes.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn ids(plan: &RenderPlan) -> Vec<&str> {
        plan.segments()
            .iter()
            .map(|s| s.clip.source_id.as_str())
            .collect()
    }

    #[test]
    fn selects_round_robin_across_keywords() {
        let mut clips = ClipsByKeyword::new();
        clips.insert(
            "mountain",
            vec![clip("m1", "mountain", None), clip("m2", "mountain", None)],
        );
        clips.insert("lake", vec![clip("l1", "lake", None), clip("l2", "lake", None)]);

        let assembler = TimelineAssembler::new(&Config::default());
        let options = GenerateOptions::new(3, 5.0).unwrap();
        let plan = assembler
            .assemble(&analysis(&["a", "b", "c"]), &clips, &options)
            .unwrap();

        assert_eq!(ids(&plan), ["m1", "l1", "m2"]);
        assert_eq!(plan.total_duration(), 15.0);
    }

    #[test]
    fn reuses_clips_cyclically_to_reach_max_clips() {
        let mut clips = ClipsByKeyword::new();
        clips.insert("mountain", vec![]);
        clips.insert("lake", vec![clip("l1", "lake", None), clip("l2", "lake", None)]);

        let assembler = TimelineAssembler::new(&Config::default());
        let options = GenerateOptions::new(5, 2.0).unwrap();
        let plan = assembler
            .assemble(&analysis(&["a", "b", "c", "d", "e"]), &clips, &options)
            .unwrap();

        assert_eq!(ids(&plan), ["l1", "l2", "l1", "l2", "l1"]);
        assert_eq!(plan.distinct_clips().len(), 2);
        assert_eq!(plan.total_duration(), 10.0);
    }

    #[test]
    fn shortens_video_without_reuse() {
        let mut clips = ClipsByKeyword::new();
        clips.insert("lake", vec![clip("l1", "lake", None)]);

        let config = Config {
            reuse_clips: false,
            ..Config::default()
        };
        let plan = TimelineAssembler::new(&config)
            .assemble(
                &analysis(&["a", "b", "c"]),
                &clips,
                &GenerateOptions::default(),
            )
            .unwrap();
        assert_eq!(ids(&plan), ["l1"]);
    }

    #[test]
    fn no_usable_clip_is_insufficient_footage() {
        let mut clips = ClipsByKeyword::new();
        clips.insert("lake", vec![clip("bad", "lake", Some(0.0))]);

        let err = TimelineAssembler::new(&Config::default())
            .assemble(&analysis(&["a"]), &clips, &GenerateOptions::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientFootage));
    }

    #[test]
    fn short_clips_cap_duration_and_fade() {
        let mut clips = ClipsByKeyword::new();
        clips.insert("lake", vec![clip("l1", "lake", Some(1.2))]);

        let plan = TimelineAssembler::new(&Config::default())
            .assemble(
                &analysis(&["Still water"]),
                &clips,
                &GenerateOptions::new(1, 4.0).unwrap(),
            )
            .unwrap();

        let segment = &plan.segments()[0];
        assert_eq!(segment.duration, 1.2);
        assert_eq!(segment.start_offset, 0.0);
        let overlay = segment.overlay.as_ref().unwrap();
        assert_eq!((overlay.start, overlay.end), (0.0, 1.2));
        assert_eq!(overlay.fade, 0.3);
    }

    #[test]
    fn overlay_text_falls_back_to_theme_then_keyword() {
        let mut clips = ClipsByKeyword::new();
        clips.insert(
            "lake",
            vec![clip("l1", "lake", None), clip("l2", "lake", None)],
        );
        let options = GenerateOptions::new(2, 4.0).unwrap();
        let assembler = TimelineAssembler::new(&Config::default());

        let plan = assembler
            .assemble(&analysis(&["  "]), &clips, &options)
            .unwrap();
        let texts: Vec<_> = plan
            .segments()
            .iter()
            .map(|s| s.overlay.as_ref().unwrap().text.as_str())
            .collect();
        assert_eq!(texts, ["Mountains", "Mountains"]);

        let mut untitled = analysis(&[""]);
        untitled.main_theme = String::new();
        let plan = assembler.assemble(&untitled, &clips, &options).unwrap();
        assert_eq!(plan.segments()[0].overlay.as_ref().unwrap().text, "lake");
    }

    #[test]
    fn overlay_lines_fit_the_frame() {
        // medium preset, standard style: 1280 * 0.8 / 25 = 40 chars per line
        let assembler = TimelineAssembler::new(&Config::default());
        assert_eq!(assembler.overlay_style.max_line_chars, 40);

        let mut clips = ClipsByKeyword::new();
        clips.insert("lake", vec![clip("l1", "lake", None)]);
        let scene = "A quiet alpine lake mirrors the surrounding peaks at first light";
        let plan = assembler
            .assemble(
                &analysis(&[scene]),
                &clips,
                &GenerateOptions::new(1, 5.0).unwrap(),
            )
            .unwrap();

        let text = &plan.segments()[0].overlay.as_ref().unwrap().text;
        assert!(text.lines().count() > 1);
        assert!(text.lines().all(|line| line.chars().count() <= 40));
        assert_eq!(text.replace('\n', " "), scene);
    }

    #[test]
    fn wrap_text_keeps_long_words_whole() {
        assert_eq!(wrap_text("one two three", 7), "one two\nthree");
        assert_eq!(wrap_text("extraordinarily long", 5), "extraordinarily\nlong");
        assert_eq!(wrap_text("   ", 10), "");
    }
}

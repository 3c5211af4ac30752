use crate::{
    pipeline::GenerationReport,
    types::{RenderPlan, StructuredAnalysis},
};

/// Format seconds as MM:SS.mmm timestamp
pub fn format_timestamp(seconds: f64) -> String {
    let millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let mins = millis / 60_000;
    let secs = (millis % 60_000) / 1000;
    format!("{:02}:{:02}.{:03}", mins, secs, millis % 1000)
}

/// Format an analysis as human-readable markdown
pub fn format_analysis_readable(analysis: &StructuredAnalysis) -> String {
    let mut output = String::new();

    let theme = if analysis.main_theme.trim().is_empty() {
        "(untitled)"
    } else {
        analysis.main_theme.as_str()
    };
    output.push_str(&format!("# {}\n\n", theme));
    output.push_str(&format!("**Mood:** {}\n\n", analysis.mood));

    output.push_str("## Keywords\n\n");
    for keyword in &analysis.keywords {
        output.push_str(&format!("• {}\n", keyword));
    }
    output.push('\n');

    output.push_str("## Scenes\n\n");
    for (i, scene) in analysis.scenes.iter().enumerate() {
        let scene = if scene.trim().is_empty() {
            "(no description)"
        } else {
            scene.trim()
        };
        output.push_str(&format!("{}. {}\n", i + 1, scene));
    }

    output
}

/// Format a render plan as a markdown timeline
pub fn format_plan_readable(plan: &RenderPlan) -> String {
    let mut output = String::new();
    let spec = plan.output();

    output.push_str("## Timeline\n\n");
    output.push_str(&format!(
        "**Duration:** {:.1}s | **Resolution:** {}x{} @ {} fps | **Bitrate:** {} | **Codec:** {}\n\n",
        plan.total_duration(),
        spec.resolution.width,
        spec.resolution.height,
        spec.fps,
        spec.bitrate,
        match &spec.audio_codec {
            Some(audio) => format!("{} + {audio}", spec.video_codec),
            None => spec.video_codec.clone(),
        }
    ));

    let mut at = 0.0;
    for (i, segment) in plan.segments().iter().enumerate() {
        let start = format_timestamp(at);
        let end = format_timestamp(at + segment.duration);
        output.push_str(&format!(
            "### {}. [{}–{}] {} ({})\n\n",
            i + 1,
            start,
            end,
            segment.clip.keyword,
            segment.clip.source_id
        ));
        if let Some(overlay) = &segment.overlay {
            output.push_str(&format!("> {}\n\n", overlay.text.replace('\n', " ")));
        }
        at += segment.duration;
    }

    output.push_str(&format!(
        "{} distinct clip(s)\n",
        plan.distinct_clips().len()
    ));
    output
}

/// One-line summary of a generation run
pub fn format_report_summary(report: &GenerationReport) -> String {
    match (&report.reason, report.success) {
        (_, true) => format!("{} ({})", report.output_path.display(), report.stage),
        (Some(reason), false) => match report.failed_at {
            Some(stage) => format!("failed while {}: {}", stage, reason),
            None => format!("failed: {}", reason),
        },
        (None, false) => "failed".to_string(),
    }
}

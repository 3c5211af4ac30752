//! System `ffmpeg` encoder.

use std::{path::Path, process::Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::{
    config::OverlayPosition,
    error::RenderError,
    render::{EncodeInput, EncodeJob, EncodeOverlay, Encoder},
    types::OverlayStyle,
};

const STDERR_TAIL_CHARS: usize = 2000;
const AUDIO_FORMAT: &str = "sample_rates=44100:channel_layouts=stereo";

pub async fn is_ffmpeg_on_path(binary: &str) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Whether the file carries at least one audio stream; files ffprobe cannot read count as silent
pub async fn has_audio_stream(probe_binary: &str, path: &Path) -> bool {
    let output = Command::new(probe_binary)
        .args([
            "-v",
            "error",
            "-select_streams",
            "a",
            "-show_entries",
            "stream=index",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            !output.stdout.iter().all(u8::is_ascii_whitespace)
        }
        Ok(output) => {
            debug!(path = %path.display(), status = %output.status, "ffprobe failed, treating as silent");
            false
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "ffprobe unavailable, treating as silent");
            false
        }
    }
}

pub struct FfmpegEncoder {
    binary: String,
    probe_binary: String,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            probe_binary: "ffprobe".to_string(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_probe_binary(mut self, binary: impl Into<String>) -> Self {
        self.probe_binary = binary.into();
        self
    }

    async fn probe_audio(&self, job: &EncodeJob) -> Vec<bool> {
        if job.output.audio_codec.is_none() {
            return Vec::new();
        }
        let mut streams = Vec::with_capacity(job.inputs.len());
        for input in &job.inputs {
            streams.push(has_audio_stream(&self.probe_binary, &input.path).await);
        }
        streams
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(&self, job: &EncodeJob) -> Result<(), RenderError> {
        if job.inputs.is_empty() {
            return Err(RenderError::EmptyPlan);
        }
        if !is_ffmpeg_on_path(&self.binary).await {
            return Err(RenderError::FfmpegNotFound);
        }

        let audio_streams = self.probe_audio(job).await;
        let args = build_ffmpeg_args(job, &audio_streams);
        debug!("running {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::Encode {
                message: format!("ffmpeg exited with {}", output.status),
                stderr: Some(tail(stderr.trim(), STDERR_TAIL_CHARS)),
            });
        }

        Ok(())
    }
}

/// Full argument list for one encode, output path last.
///
/// `audio_streams[i]` tells whether input `i` has audio. It is only read when the
/// output has an audio codec; inputs without audio contribute silence.
pub fn build_ffmpeg_args(job: &EncodeJob, audio_streams: &[bool]) -> Vec<String> {
    let mut args: Vec<String> = ["-y", "-v", "error"].map(String::from).to_vec();

    for input in &job.inputs {
        args.extend([
            "-ss".to_string(),
            format!("{:.3}", input.start),
            "-t".to_string(),
            format!("{:.3}", input.duration),
            "-i".to_string(),
            input.path.to_string_lossy().to_string(),
        ]);
    }

    args.extend([
        "-filter_complex".to_string(),
        filter_graph(job, audio_streams),
        "-map".to_string(),
        "[outv]".to_string(),
        "-c:v".to_string(),
        job.output.video_codec.clone(),
        "-b:v".to_string(),
        job.output.bitrate.clone(),
        "-r".to_string(),
        job.output.fps.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
    ]);

    match &job.output.audio_codec {
        Some(codec) => args.extend([
            "-map".to_string(),
            "[outa]".to_string(),
            "-c:a".to_string(),
            codec.clone(),
        ]),
        None => args.push("-an".to_string()),
    }
    args.push(job.destination.to_string_lossy().to_string());

    args
}

/// Scale and pad every input to the frame, draw its overlay, then concatenate.
fn filter_graph(job: &EncodeJob, audio_streams: &[bool]) -> String {
    let width = job.output.resolution.width;
    let height = job.output.resolution.height;
    let fps = job.output.fps;
    let with_audio = job.output.audio_codec.is_some();

    let mut chains: Vec<String> = job
        .inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let mut chain = format!(
                "[{i}:v]setpts=PTS-STARTPTS,\
                 scale={width}:{height}:force_original_aspect_ratio=decrease,\
                 pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:color=black,\
                 setsar=1,fps={fps}"
            );
            if let Some(overlay) = &input.overlay {
                chain.push(',');
                chain.push_str(&drawtext(input, overlay, &job.style));
            }
            chain.push_str(&format!("[v{i}]"));
            chain
        })
        .collect();

    if !with_audio {
        let labels: String = (0..job.inputs.len()).map(|i| format!("[v{i}]")).collect();
        chains.push(format!(
            "{labels}concat=n={}:v=1:a=0[outv]",
            job.inputs.len()
        ));
        return chains.join(";");
    }

    for (i, input) in job.inputs.iter().enumerate() {
        let duration = input.duration;
        chains.push(if audio_streams.get(i).copied().unwrap_or(false) {
            format!(
                "[{i}:a]asetpts=PTS-STARTPTS,aformat={AUDIO_FORMAT},\
                 apad,atrim=duration={duration:.3}[a{i}]"
            )
        } else {
            format!("anullsrc=r=44100:cl=stereo,atrim=duration={duration:.3}[a{i}]")
        });
    }
    let labels: String = (0..job.inputs.len())
        .map(|i| format!("[v{i}][a{i}]"))
        .collect();
    chains.push(format!(
        "{labels}concat=n={}:v=1:a=1[outv][outa]",
        job.inputs.len()
    ));
    chains.join(";")
}

fn drawtext(input: &EncodeInput, overlay: &EncodeOverlay, style: &OverlayStyle) -> String {
    let mut options = vec![format!(
        "textfile='{}'",
        escape_filter_path(&overlay.text_file)
    )];
    if let Some(font) = &style.font_file {
        options.push(format!("fontfile='{}'", escape_filter_path(font)));
    }
    options.extend([
        "expansion=none".to_string(),
        format!("fontsize={}", style.text.font_size),
        format!("fontcolor={}", style.text.color),
        format!("bordercolor={}", style.text.stroke_color),
        format!("borderw={}", style.text.stroke_width),
        "x=(w-text_w)/2".to_string(),
        format!("y={}", y_expression(style.position)),
    ]);

    let end = overlay.end.min(input.duration);
    if overlay.start > 0.0 || end < input.duration {
        options.push(format!(
            "enable='between(t,{:.3},{:.3})'",
            overlay.start, end
        ));
    }
    if overlay.fade > 0.0 {
        options.push(format!(
            "alpha='if(lt(t,{start:.3}+{fade:.3}),(t-{start:.3})/{fade:.3},if(gt(t,{end:.3}-{fade:.3}),({end:.3}-t)/{fade:.3},1))'",
            start = overlay.start,
            end = end,
            fade = overlay.fade,
        ));
    }

    format!("drawtext={}", options.join(":"))
}

fn y_expression(position: OverlayPosition) -> &'static str {
    match position {
        OverlayPosition::Center => "(h-text_h)/2",
        OverlayPosition::Bottom => "h-text_h-h*0.1",
        OverlayPosition::Top => "h*0.1",
    }
}

/// Escape a path for use inside a quoted filter option
fn escape_filter_path(path: &Path) -> String {
    let mut escaped = String::new();
    for c in path.to_string_lossy().chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("'\\''"),
            ':' => escaped.push_str("\\:"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        text.to_string()
    } else {
        text.chars().skip(count - max_chars).collect()
    }
}

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use reelcraft_core::{
    Config, GenerateOptions, GenerationReport, OverlayPosition, Provider, QualityPreset,
    TextStyle, VideoGenerator, VideoPlan, format_analysis_readable, format_plan_readable,
    format_report_summary, load_jobs, output_path_for, save_plan,
};
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, Default, ValueEnum)]
enum CliProvider {
    #[default]
    Openai,
    Grok,
    Gemini,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Openai => Provider::Openai,
            CliProvider::Grok => Provider::Grok,
            CliProvider::Gemini => Provider::Gemini,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum CliQuality {
    Low,
    Medium,
    High,
}

impl From<CliQuality> for QualityPreset {
    fn from(cli: CliQuality) -> Self {
        match cli {
            CliQuality::Low => QualityPreset::Low,
            CliQuality::Medium => QualityPreset::Medium,
            CliQuality::High => QualityPreset::High,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum CliStyle {
    Standard,
    Minimal,
    Bold,
    Elegant,
}

impl From<CliStyle> for TextStyle {
    fn from(cli: CliStyle) -> Self {
        match cli {
            CliStyle::Standard => TextStyle::Standard,
            CliStyle::Minimal => TextStyle::Minimal,
            CliStyle::Bold => TextStyle::Bold,
            CliStyle::Elegant => TextStyle::Elegant,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum CliPosition {
    Center,
    Bottom,
    Top,
}

impl From<CliPosition> for OverlayPosition {
    fn from(cli: CliPosition) -> Self {
        match cli {
            CliPosition::Center => OverlayPosition::Center,
            CliPosition::Bottom => OverlayPosition::Bottom,
            CliPosition::Top => OverlayPosition::Top,
        }
    }
}

#[derive(Parser)]
#[command(name = "reelcraft")]
#[command(about = "Turn a short text description into a stock-footage video")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// AI provider for text analysis
    #[arg(short, long, global = true)]
    provider: Option<CliProvider>,

    /// Output quality preset
    #[arg(short, long, global = true)]
    quality: Option<CliQuality>,

    /// Overlay text style
    #[arg(short, long, global = true)]
    style: Option<CliStyle>,

    /// Vertical position of overlay text
    #[arg(long, global = true)]
    position: Option<CliPosition>,

    /// Log filter, e.g. "info" or "reelcraft_core=debug" (defaults to RUST_LOG, then "warn")
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a video from a text description
    Generate {
        /// Text describing the video
        text: String,

        /// Output file (defaults to a name derived from the text in the output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of clips, 1-10
        #[arg(short = 'n', long)]
        max_clips: Option<usize>,

        /// Seconds per clip
        #[arg(short = 'd', long)]
        clip_duration: Option<f64>,

        /// Print the render plan as JSON instead of rendering
        #[arg(long)]
        dry_run: bool,

        /// Also write the render plan as JSON to this file
        #[arg(long)]
        save_plan: Option<PathBuf>,
    },

    /// Show the structured analysis of a text
    Analyze {
        /// Text to analyze
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// Generate every job of a JSON batch file
    Batch {
        /// JSON list of {"text", "output"?, "max_clips"?, "clip_duration"?}
        file: PathBuf,
    },
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn init_tracing(log_level: Option<&str>) {
    let env_filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(env_filter)
        .init();
}

fn warn_if_no_model_key(config: &Config) {
    if config.llm_api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
        warn!(
            "{} is not set; using heuristic analysis",
            config.provider.config().env_var
        );
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", style("Error:").red().bold(), message);
    std::process::exit(1);
}

fn print_report(report: &GenerationReport, elapsed: Duration) {
    if report.success {
        println!(
            "{} Video saved: {} {}",
            style("✓").green().bold(),
            style(report.output_path.display()).bold(),
            style(format!("[{}]", format_duration(elapsed))).dim()
        );
    } else {
        println!(
            "{} {}",
            style("✗").red().bold(),
            format_report_summary(report)
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let mut config = Config::from_env().unwrap_or_else(|e| fail(e));
    if let Some(provider) = cli.provider {
        config = config.with_provider(provider.into());
    }
    if let Some(quality) = cli.quality {
        config.quality = quality.into();
    }
    if let Some(text_style) = cli.style {
        config.text_style = text_style.into();
    }
    if let Some(position) = cli.position {
        config.overlay_position = position.into();
    }

    // Validate API keys early; analysis and planning can fall back to the heuristic
    let keys = match &cli.command {
        Command::Analyze { .. } => {
            warn_if_no_model_key(&config);
            Ok(())
        }
        Command::Generate { dry_run: true, .. } => {
            warn_if_no_model_key(&config);
            config.validate_search_key()
        }
        _ => config.validate_api_keys(),
    };
    keys.unwrap_or_else(|e| fail(e));
    config.ensure_directories().unwrap_or_else(|e| fail(e));

    println!(
        "\n{}  {}\n",
        style("reelcraft").cyan().bold(),
        style("Text to Video").dim()
    );

    let output_dir = config.output_dir.clone();
    let defaults = config.generate_options();
    let generator = VideoGenerator::new(config).unwrap_or_else(|e| fail(e));

    match cli.command {
        Command::Analyze { text } => {
            let text = text.join(" ");
            let spinner = create_spinner("Analyzing text...");
            let analysis = generator.analyze_text(&text).await;
            spinner.finish_with_message(format!("{} Analysis complete", style("✓").green().bold()));

            println!("{}", style("─".repeat(60)).dim());
            println!("\n{}", format_analysis_readable(&analysis));
        }

        Command::Generate {
            text,
            output,
            max_clips,
            clip_duration,
            dry_run,
            save_plan: plan_path,
        } => {
            let options = GenerateOptions::new(
                max_clips.unwrap_or(defaults.max_clips()),
                clip_duration.unwrap_or(defaults.clip_duration()),
            )
            .unwrap_or_else(|e| fail(e));

            let start = Instant::now();

            if dry_run {
                let spinner = create_spinner("Planning video...");
                let planned = generator.plan_video(&text, &options).await;
                spinner.finish_and_clear();

                let planned = planned.unwrap_or_else(|e| fail(e));
                if let Some(path) = &plan_path {
                    save_plan(&planned, path).await?;
                }
                println!("{}", serde_json::to_string_pretty(&planned)?);
                return Ok(());
            }

            let output = output.unwrap_or_else(|| output_path_for(&output_dir, &text));
            let spinner = create_spinner("Generating video...");
            let report = generator.generate_video(&text, &output, &options).await;
            spinner.finish_and_clear();

            if let (Some(path), Some(analysis), Some(plan)) =
                (&plan_path, &report.analysis, &report.plan)
            {
                let planned = VideoPlan {
                    analysis: analysis.clone(),
                    plan: plan.clone(),
                };
                save_plan(&planned, path).await?;
            }

            print_report(&report, start.elapsed());
            if let Some(plan) = &report.plan {
                println!("{}", style("─".repeat(60)).dim());
                println!("\n{}", format_plan_readable(plan));
            }
            if !report.success {
                std::process::exit(1);
            }
        }

        Command::Batch { file } => {
            let jobs = load_jobs(&file).await?;
            let start = Instant::now();

            let spinner = create_spinner(&format!("Generating {} video(s)...", jobs.len()));
            let reports = generator.generate_batch(&jobs).await;
            spinner.finish_and_clear();

            let reports = reports.unwrap_or_else(|e| fail(e));
            println!("{}", style("─".repeat(60)).dim());
            for report in &reports {
                print_report(report, start.elapsed());
            }

            let succeeded = reports.iter().filter(|r| r.success).count();
            println!(
                "\n{} {}/{} succeeded {}",
                style("Done:").bold(),
                succeeded,
                reports.len(),
                style(format!("[{}]", format_duration(start.elapsed()))).dim()
            );
            if succeeded < reports.len() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_NAME: &str = "output_video.mp4";

/// Root directory for reelcraft's scratch data
pub fn get_root_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("reelcraft")
}

/// Parent of every per-run scratch directory
pub fn default_temp_dir() -> PathBuf {
    get_root_cache_dir().join("tmp")
}

pub fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// Output file named after the first words of the text, e.g. `a-peaceful-mountain.mp4`
pub fn output_path_for(output_dir: &Path, text: &str) -> PathBuf {
    let slug = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(5)
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        output_dir.join(DEFAULT_OUTPUT_NAME)
    } else {
        output_dir.join(format!("{slug}.mp4"))
    }
}

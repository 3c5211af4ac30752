//! Text analysis: free text in, [`StructuredAnalysis`] out.
//!
//! The language model sits behind the [`Analyzer`] trait and only ever returns raw text.
//! [`AnalysisAdapter`] owns the prompt, the repair rules for sloppy responses and the
//! deterministic [`heuristic_analysis`] used whenever the model is unavailable or unusable.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    config::{Config, MAX_CLIPS_UPPER_BOUND},
    error::AnalysisError,
    provider::Provider,
    types::StructuredAnalysis,
};

const THEME_MAX_CHARS: usize = 50;
const MIN_KEYWORD_CHARS: usize = 3;

static STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "itself", "just", "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of",
    "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own",
    "same", "she", "should", "so", "some", "such", "than", "that", "the", "their", "theirs",
    "them", "themselves", "then", "there", "these", "they", "this", "those", "through", "to",
    "too", "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

static ANALYSIS_SYSTEM_PROMPT: &str = r#"You are a video director who turns short descriptions into stock-footage shot lists.

You MUST output ONLY valid JSON matching this exact structure (no markdown, no explanation):
{
  "main_theme": "Short phrase naming the overall theme",
  "keywords": ["keyword1", "keyword2"],
  "mood": "one or two words describing the mood",
  "scenes": ["Scene description 1", "Scene description 2"]
}

Rules:
- keywords are concrete visual search terms for stock footage (1-3 words each)
- scenes are short captions, one per clip, in narrative order
- Output ONLY the JSON, nothing else"#;

/// Prompt handed to the language model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisPrompt {
    pub system: String,
    pub user: String,
    pub scene_count: usize,
}

impl AnalysisPrompt {
    pub fn new(text: &str, scene_count: usize) -> Self {
        Self {
            system: ANALYSIS_SYSTEM_PROMPT.to_string(),
            user: format!(
                "Create exactly {count} keywords and exactly {count} scenes for a short video \
                 about the following description:\n\n{text}",
                count = scene_count,
                text = text.trim()
            ),
            scene_count,
        }
    }
}

/// Language-model capability: prompt in, raw model text out
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, prompt: &AnalysisPrompt) -> Result<String, AnalysisError>;
}

/// Chat-completions client for any [`Provider`]
pub struct LlmAnalyzer {
    client: reqwest::Client,
    provider: Provider,
    api_key: Option<String>,
    endpoint: String,
    model: String,
    max_tokens: u32,
}

impl LlmAnalyzer {
    pub fn new(provider: Provider, api_key: Option<String>, timeout: Duration) -> Self {
        let config = provider.config();
        Self {
            client: http_client(timeout),
            provider,
            api_key,
            endpoint: config.api_url.to_string(),
            model: config.model.to_string(),
            max_tokens: crate::config::DEFAULT_LLM_MAX_TOKENS,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut analyzer = Self::new(
            config.provider,
            config.llm_api_key.clone(),
            config.request_timeout,
        );
        if let Some(model) = &config.llm_model {
            analyzer.model = model.clone();
        }
        analyzer.max_tokens = config.llm_max_tokens;
        analyzer
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn analyze(&self, prompt: &AnalysisPrompt) -> Result<String, AnalysisError> {
        let api_key = self.provider.require_api_key(self.api_key.as_deref())?;
        let provider = self.provider.name().to_string();

        debug!(provider = %provider, model = %self.model, "requesting text analysis");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [
                    {
                        "role": "system",
                        "content": &prompt.system,
                    },
                    {
                        "role": "user",
                        "content": &prompt.user,
                    },
                ],
                "max_tokens": self.max_tokens,
                "temperature": 0.7,
            }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AnalysisError::Unauthorized { provider, status });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AnalysisError::RateLimited { provider });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Status {
                provider,
                status,
                body,
            });
        }

        let response = response.json::<Value>().await?;

        // Extract content from response
        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AnalysisError::Malformed {
                reason: format!("Invalid API response: {:?}", response),
            })?;

        Ok(content.to_string())
    }
}

/// Turns text into a [`StructuredAnalysis`] and never fails
pub struct AnalysisAdapter {
    analyzer: Arc<dyn Analyzer>,
    fallback_keywords: Vec<String>,
    default_mood: String,
}

impl AnalysisAdapter {
    pub fn new(analyzer: Arc<dyn Analyzer>, config: &Config) -> Self {
        Self {
            analyzer,
            fallback_keywords: config.fallback_terms().map(str::to_string).collect(),
            default_mood: config.default_mood.clone(),
        }
    }

    pub async fn analyze(&self, text: &str, max_clips: usize) -> StructuredAnalysis {
        let count = max_clips.clamp(1, MAX_CLIPS_UPPER_BOUND);
        let heuristic =
            heuristic_analysis(text, count, &self.fallback_keywords, &self.default_mood);

        if text.trim().is_empty() {
            info!("empty input, using heuristic analysis");
            return heuristic;
        }

        let prompt = AnalysisPrompt::new(text, count);
        let result = match self.analyzer.analyze(&prompt).await {
            Ok(content) => parse_analysis_response(&content, count, &heuristic),
            Err(e) => Err(e),
        };

        match result {
            Ok(analysis) => {
                info!(
                    theme = %analysis.main_theme,
                    keywords = ?analysis.keywords,
                    "text analysis complete"
                );
                analysis
            }
            Err(e) => {
                warn!("text analysis failed, using heuristic analysis: {}", e);
                heuristic
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawAnalysis {
    #[serde(default, alias = "mainTheme", alias = "theme")]
    main_theme: Option<String>,
    #[serde(default)]
    keywords: Option<Value>,
    #[serde(default)]
    mood: Option<String>,
    #[serde(default)]
    scenes: Option<Value>,
}

/// Parse a model response, repairing what can be repaired.
///
/// Missing theme/mood are taken from `heuristic`; keywords and scenes are normalized to
/// `count` entries. Fails when the payload is not a JSON object or has neither keywords
/// nor scenes.
pub fn parse_analysis_response(
    content: &str,
    count: usize,
    heuristic: &StructuredAnalysis,
) -> Result<StructuredAnalysis, AnalysisError> {
    let json = extract_json_object(content).ok_or_else(|| AnalysisError::Malformed {
        reason: "no JSON object in response".to_string(),
    })?;
    let raw: RawAnalysis = serde_json::from_str(json).map_err(|e| AnalysisError::Malformed {
        reason: e.to_string(),
    })?;

    let keywords = raw
        .keywords
        .as_ref()
        .map(|v| normalize_keywords(string_items(v), count))
        .unwrap_or_default();
    let scenes: Vec<String> = raw
        .scenes
        .as_ref()
        .map(|v| {
            string_items(v)
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if keywords.is_empty() && scenes.is_empty() {
        return Err(AnalysisError::Malformed {
            reason: "response has neither keywords nor scenes".to_string(),
        });
    }

    let keywords = if keywords.is_empty() {
        debug!("model returned no keywords, substituting heuristic keywords");
        heuristic.keywords.clone()
    } else {
        keywords
    };
    let scenes = if scenes.is_empty() {
        heuristic.scenes.clone()
    } else {
        fit_to_count(scenes, count)
    };

    Ok(StructuredAnalysis {
        main_theme: non_blank(raw.main_theme).unwrap_or_else(|| heuristic.main_theme.clone()),
        keywords,
        mood: non_blank(raw.mood).unwrap_or_else(|| heuristic.mood.clone()),
        scenes,
    })
}

/// Deterministic analysis derived purely from the input text
pub fn heuristic_analysis(
    text: &str,
    count: usize,
    fallback_keywords: &[String],
    mood: &str,
) -> StructuredAnalysis {
    let count = count.max(1);

    let mut keywords = extract_keywords(text, count);
    if keywords.is_empty() {
        // The configured terms are used whole, whatever the clip count
        keywords = normalize_keywords(fallback_keywords.to_vec(), fallback_keywords.len());
    }
    if keywords.is_empty() {
        keywords.push("nature".to_string());
    }

    StructuredAnalysis {
        main_theme: truncate_theme(text),
        keywords,
        mood: mood.to_string(),
        scenes: split_scenes(text, count),
    }
}

fn extract_keywords(text: &str, count: usize) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut freq: HashMap<String, usize> = HashMap::new();

    for word in text
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| w.chars().count() >= MIN_KEYWORD_CHARS)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
    {
        let entry = freq.entry(word.clone()).or_insert(0);
        if *entry == 0 {
            order.push(word);
        }
        *entry += 1;
    }

    // stable sort keeps first-occurrence order among equal counts
    order.sort_by(|a, b| freq[b].cmp(&freq[a]));
    order.truncate(count);
    order
}

fn truncate_theme(text: &str) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().count() <= THEME_MAX_CHARS {
        return text;
    }

    let mut theme = String::new();
    for word in text.split(' ') {
        let next_len = theme.chars().count() + word.chars().count() + usize::from(!theme.is_empty());
        if next_len > THEME_MAX_CHARS {
            break;
        }
        if !theme.is_empty() {
            theme.push(' ');
        }
        theme.push_str(word);
    }
    if theme.is_empty() {
        theme = text.chars().take(THEME_MAX_CHARS).collect();
    }
    theme.push('…');
    theme
}

fn split_scenes(text: &str, count: usize) -> Vec<String> {
    let sentences: Vec<String> = text
        .split(['.', '!', '?', '\n'])
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
        .collect();

    if sentences.is_empty() {
        return vec![String::new(); count];
    }

    if sentences.len() <= count {
        return fit_to_count(sentences, count);
    }

    // more sentences than clips: group neighbours so every sentence lands somewhere
    (0..count)
        .map(|i| {
            let start = i * sentences.len() / count;
            let end = (i + 1) * sentences.len() / count;
            sentences[start..end].join(". ")
        })
        .collect()
}

/// Truncate, or cycle existing items until `count` is reached
fn fit_to_count(items: Vec<String>, count: usize) -> Vec<String> {
    if items.is_empty() {
        return vec![String::new(); count];
    }
    items.iter().cycle().take(count).cloned().collect()
}

fn normalize_keywords(raw: Vec<String>, count: usize) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for keyword in raw {
        let keyword = keyword
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .trim_matches(|c: char| c.is_ascii_punctuation())
            .to_lowercase();
        if !keyword.is_empty() && !keywords.contains(&keyword) {
            keywords.push(keyword);
        }
    }
    keywords.truncate(count);
    keywords
}

/// Accepts `["a", "b"]`, `"a, b"` or `[{"description": "a"}]`
fn string_items(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .split([',', ';', '\n'])
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => ["description", "text", "scene", "caption"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str))
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (start < end).then(|| &content[start..=end])
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!("falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
}

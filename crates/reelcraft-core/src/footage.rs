//! Keyword → stock clip resolution.

use std::{collections::HashSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    analysis::http_client,
    config::{Config, PEXELS_ENV_VAR},
    error::SearchError,
    types::{ClipRef, ClipsByKeyword, Resolution},
};

pub const PEXELS_SEARCH_URL: &str = "https://api.pexels.com/videos/search";
const PEXELS_MAX_PAGE_SIZE: usize = 80;
const PEXELS_MAX_PAGES: u32 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
    Square,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Landscape => "landscape",
            Orientation::Portrait => "portrait",
            Orientation::Square => "square",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub keyword: String,
    pub orientation: Orientation,
    /// Maximum number of results wanted
    pub limit: usize,
}

/// Stock-footage search capability
#[async_trait]
pub trait FootageSearcher: Send + Sync {
    /// Results in the service's relevance order
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ClipRef>, SearchError>;
}

/// Orders the candidates of one keyword
pub trait RankingPolicy: Send + Sync {
    fn rank(&self, keyword: &str, candidates: Vec<ClipRef>) -> Vec<ClipRef>;
}

/// Keeps the search service's order
pub struct ServiceOrder;

impl RankingPolicy for ServiceOrder {
    fn rank(&self, _keyword: &str, candidates: Vec<ClipRef>) -> Vec<ClipRef> {
        candidates
    }
}

/// Prefers clips whose resolution is closest to the output frame; unknown sizes go last
pub struct ClosestResolution {
    pub target: Resolution,
}

impl RankingPolicy for ClosestResolution {
    fn rank(&self, _keyword: &str, mut candidates: Vec<ClipRef>) -> Vec<ClipRef> {
        let distance = |clip: &ClipRef| {
            clip.resolution_hint.map_or(u64::MAX, |r| {
                u64::from(r.width.abs_diff(self.target.width))
                    + u64::from(r.height.abs_diff(self.target.height))
            })
        };
        candidates.sort_by_key(distance);
        candidates
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RankingStrategy {
    #[default]
    ServiceOrder,
    ClosestResolution,
}

impl RankingStrategy {
    pub fn policy(&self, target: Resolution) -> Arc<dyn RankingPolicy> {
        match self {
            RankingStrategy::ServiceOrder => Arc::new(ServiceOrder),
            RankingStrategy::ClosestResolution => Arc::new(ClosestResolution { target }),
        }
    }
}

/// Pexels video search
pub struct PexelsSearcher {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    target_width: u32,
}

#[derive(Debug, Deserialize)]
struct PexelsResponse {
    #[serde(default)]
    videos: Vec<PexelsVideo>,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideo {
    id: u64,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    video_files: Vec<PexelsVideoFile>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideoFile {
    #[serde(default)]
    file_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    link: String,
}

impl PexelsVideoFile {
    fn is_mp4(&self) -> bool {
        match &self.file_type {
            Some(file_type) => file_type.eq_ignore_ascii_case("video/mp4"),
            None => self.link.to_ascii_lowercase().ends_with(".mp4"),
        }
    }
}

impl PexelsSearcher {
    pub fn new(api_key: Option<String>, target_width: u32, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            api_key,
            endpoint: PEXELS_SEARCH_URL.to_string(),
            target_width,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.pexels_api_key.clone(),
            config.video_settings().width,
            config.request_timeout,
        )
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn fetch_page(
        &self,
        api_key: &str,
        query: &SearchQuery,
        page: u32,
        per_page: usize,
    ) -> Result<PexelsResponse, SearchError> {
        let per_page = per_page.to_string();
        let page = page.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .header("Authorization", api_key)
            .query(&[
                ("query", query.keyword.as_str()),
                ("orientation", query.orientation.as_str()),
                ("per_page", per_page.as_str()),
                ("page", page.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SearchError::Unauthorized { status });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status { status, body });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Widest MP4 rendition not wider than the target; otherwise the narrowest one
    fn pick_file<'a>(&self, files: &'a [PexelsVideoFile]) -> Option<&'a PexelsVideoFile> {
        let mp4s = files.iter().filter(|f| f.is_mp4());
        let fitting = mp4s
            .clone()
            .filter(|f| f.width.is_some_and(|w| w <= self.target_width))
            .max_by_key(|f| f.width);
        fitting.or_else(|| mp4s.min_by_key(|f| f.width.unwrap_or(u32::MAX)))
    }

    fn to_clip_ref(&self, video: &PexelsVideo, keyword: &str) -> Option<ClipRef> {
        let file = self.pick_file(&video.video_files)?;
        Some(ClipRef {
            source_id: format!("pexels:{}", video.id),
            url: file.link.clone(),
            duration_hint: video.duration.filter(|d| *d > 0.0),
            resolution_hint: file
                .width
                .zip(file.height)
                .map(|(width, height)| Resolution { width, height }),
            keyword: keyword.to_string(),
        })
    }
}

#[async_trait]
impl FootageSearcher for PexelsSearcher {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ClipRef>, SearchError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SearchError::MissingApiKey {
                env_var: PEXELS_ENV_VAR.to_string(),
            })?;

        // Pages are offsets of `per_page`, so it must stay fixed across requests
        let per_page = query.limit.clamp(1, PEXELS_MAX_PAGE_SIZE);
        let mut seen = HashSet::new();
        let mut clips = Vec::new();
        let mut page = 1;
        while clips.len() < query.limit && page <= PEXELS_MAX_PAGES {
            let response = self.fetch_page(api_key, query, page, per_page).await?;
            debug!(
                keyword = %query.keyword,
                page,
                hits = response.videos.len(),
                "pexels page fetched"
            );

            clips.extend(
                response
                    .videos
                    .iter()
                    .filter(|video| seen.insert(video.id))
                    .filter_map(|video| self.to_clip_ref(video, &query.keyword)),
            );

            if response.next_page.is_none() || response.videos.is_empty() {
                break;
            }
            page += 1;
        }

        clips.truncate(query.limit);
        Ok(clips)
    }
}

#[derive(Debug)]
pub struct KeywordFailure {
    pub keyword: String,
    pub error: SearchError,
}

#[derive(Debug, Default)]
pub struct ResolutionOutcome {
    pub clips: ClipsByKeyword,
    pub failures: Vec<KeywordFailure>,
}

pub struct FootageResolver {
    searcher: Arc<dyn FootageSearcher>,
    ranking: Arc<dyn RankingPolicy>,
    fallback_terms: Vec<String>,
    concurrency: usize,
    orientation: Orientation,
}

impl FootageResolver {
    pub fn new(searcher: Arc<dyn FootageSearcher>, config: &Config) -> Self {
        let settings = config.video_settings();
        Self {
            searcher,
            ranking: config.ranking.policy(Resolution {
                width: settings.width,
                height: settings.height,
            }),
            fallback_terms: config.fallback_terms().map(str::to_string).collect(),
            concurrency: config.search_concurrency.max(1),
            orientation: Orientation::Landscape,
        }
    }

    pub fn with_ranking(mut self, ranking: Arc<dyn RankingPolicy>) -> Self {
        self.ranking = ranking;
        self
    }

    /// Resolve every keyword; failures are isolated per keyword.
    ///
    /// The result lists keywords in input order regardless of completion order, and a
    /// source clip appears under the first keyword that found it only.
    pub async fn resolve(&self, keywords: &[String], per_keyword: usize) -> ResolutionOutcome {
        let this = self;
        let results: Vec<(String, Result<Vec<ClipRef>, SearchError>)> =
            stream::iter(keywords.iter().cloned())
                .map(move |keyword| async move {
                    let result = this.resolve_keyword(&keyword, per_keyword).await;
                    (keyword, result)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut outcome = ResolutionOutcome::default();
        let mut seen: HashSet<String> = HashSet::new();

        for (keyword, result) in results {
            match result {
                Ok(clips) => {
                    let found = clips.len();
                    let unique: Vec<ClipRef> = clips
                        .into_iter()
                        .filter(|clip| seen.insert(clip.source_id.clone()))
                        .collect();
                    if unique.len() < found {
                        debug!(
                            keyword = %keyword,
                            duplicates = found - unique.len(),
                            "dropped clips already used by an earlier keyword"
                        );
                    }
                    outcome.clips.insert(keyword, unique);
                }
                Err(error) => {
                    warn!("footage search failed for '{}': {}", keyword, error);
                    outcome.clips.insert(keyword.clone(), Vec::new());
                    outcome.failures.push(KeywordFailure { keyword, error });
                }
            }
        }

        info!(
            keywords = keywords.len(),
            clips = outcome.clips.total_clips(),
            failed = outcome.failures.len(),
            "footage resolved"
        );
        outcome
    }

    async fn resolve_keyword(
        &self,
        keyword: &str,
        per_keyword: usize,
    ) -> Result<Vec<ClipRef>, SearchError> {
        let clips = self.search_ranked(keyword, keyword, per_keyword).await?;
        if !clips.is_empty() {
            return Ok(clips);
        }

        let Some(fallback) = self
            .fallback_terms
            .iter()
            .find(|term| !term.eq_ignore_ascii_case(keyword))
        else {
            return Ok(clips);
        };

        info!("no footage for '{}', retrying with '{}'", keyword, fallback);
        self.search_ranked(keyword, fallback, per_keyword).await
    }

    async fn search_ranked(
        &self,
        keyword: &str,
        term: &str,
        per_keyword: usize,
    ) -> Result<Vec<ClipRef>, SearchError> {
        let query = SearchQuery {
            keyword: term.to_string(),
            orientation: self.orientation,
            limit: per_keyword,
        };

        let mut clips = self.searcher.search(&query).await?;
        clips.truncate(per_keyword);
        for clip in &mut clips {
            clip.keyword = keyword.to_string();
        }
        Ok(self.ranking.rank(keyword, clips))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::Mutex,
    };

    use wiremock::{
        Mock, MockServer, Request, Respond, ResponseTemplate,
        matchers::{header, method, query_param},
    };

    use super::*;

    fn clip(id: &str, width: u32) -> ClipRef {
        ClipRef {
            source_id: id.to_string(),
            url: format!("https://cdn.example/{id}.mp4"),
            duration_hint: Some(10.0),
            resolution_hint: Some(Resolution {
                width,
                height: width * 9 / 16,
            }),
            keyword: String::new(),
        }
    }

    /// Canned results per term, with optional per-term delay to shuffle completion order
    #[derive(Default)]
    struct FakeSearcher {
        results: HashMap<String, Vec<ClipRef>>,
        failing: HashSet<String>,
        delays_ms: HashMap<String, u64>,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FootageSearcher for FakeSearcher {
        async fn search(&self, query: &SearchQuery) -> Result<Vec<ClipRef>, SearchError> {
            self.queries.lock().unwrap().push(query.keyword.clone());
            if let Some(ms) = self.delays_ms.get(&query.keyword) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            if self.failing.contains(&query.keyword) {
                return Err(SearchError::RateLimited);
            }
            Ok(self.results.get(&query.keyword).cloned().unwrap_or_default())
        }
    }

    fn resolver(searcher: FakeSearcher) -> (FootageResolver, Arc<FakeSearcher>) {
        let searcher = Arc::new(searcher);
        (
            FootageResolver::new(searcher.clone(), &Config::default()),
            searcher,
        )
    }

    fn keywords(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn keeps_keyword_order_despite_completion_order() {
        let mut searcher = FakeSearcher::default();
        searcher.results.insert("slow".into(), vec![clip("a", 1280)]);
        searcher.results.insert("fast".into(), vec![clip("b", 1280)]);
        searcher.delays_ms.insert("slow".into(), 50);
        let (resolver, _) = resolver(searcher);

        let outcome = resolver.resolve(&keywords(&["slow", "fast"]), 2).await;
        assert_eq!(outcome.clips.keywords().collect::<Vec<_>>(), ["slow", "fast"]);
        assert_eq!(outcome.clips.get("slow").unwrap()[0].source_id, "a");
        assert_eq!(outcome.clips.get("slow").unwrap()[0].keyword, "slow");
    }

    #[tokio::test]
    async fn deduplicates_across_keywords() {
        let mut searcher = FakeSearcher::default();
        searcher
            .results
            .insert("ocean".into(), vec![clip("1", 1280), clip("2", 1280)]);
        searcher
            .results
            .insert("waves".into(), vec![clip("2", 1280), clip("3", 1280)]);
        let (resolver, _) = resolver(searcher);

        let outcome = resolver.resolve(&keywords(&["ocean", "waves"]), 2).await;
        let ids = |k: &str| {
            outcome
                .clips
                .get(k)
                .unwrap()
                .iter()
                .map(|c| c.source_id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids("ocean"), ["1", "2"]);
        assert_eq!(ids("waves"), ["3"]);
    }

    #[tokio::test]
    async fn retries_once_with_fallback_term() {
        let mut searcher = FakeSearcher::default();
        searcher.results.insert("nature".into(), vec![clip("n1", 1280)]);
        let (resolver, searcher) = resolver(searcher);

        let outcome = resolver.resolve(&keywords(&["zyxwv"]), 2).await;
        let clips = outcome.clips.get("zyxwv").unwrap();
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].keyword, "zyxwv");
        assert_eq!(*searcher.queries.lock().unwrap(), ["zyxwv", "nature"]);
    }

    #[tokio::test]
    async fn fallback_skips_term_equal_to_keyword() {
        let (resolver, searcher) = resolver(FakeSearcher::default());

        let outcome = resolver.resolve(&keywords(&["nature"]), 2).await;
        assert!(outcome.clips.is_empty());
        assert!(outcome.failures.is_empty());
        assert_eq!(*searcher.queries.lock().unwrap(), ["nature", "abstract"]);
    }

    #[tokio::test]
    async fn isolates_failing_keywords() {
        let mut searcher = FakeSearcher::default();
        searcher.failing.insert("broken".into());
        searcher.results.insert("forest".into(), vec![clip("f", 1280)]);
        let (resolver, _) = resolver(searcher);

        let outcome = resolver.resolve(&keywords(&["broken", "forest"]), 2).await;
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].keyword, "broken");
        assert_eq!(outcome.clips.get("broken").unwrap().len(), 0);
        assert_eq!(outcome.clips.get("forest").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn truncates_to_per_keyword_and_applies_ranking() {
        let mut searcher = FakeSearcher::default();
        searcher.results.insert(
            "city".into(),
            vec![clip("small", 640), clip("huge", 3840), clip("hd", 1920)],
        );
        let (resolver, _) = resolver(searcher);
        let resolver = resolver.with_ranking(Arc::new(ClosestResolution {
            target: Resolution {
                width: 3840,
                height: 2160,
            },
        }));

        let outcome = resolver.resolve(&keywords(&["city"]), 2).await;
        let ids: Vec<_> = outcome
            .clips
            .get("city")
            .unwrap()
            .iter()
            .map(|c| c.source_id.as_str())
            .collect();
        assert_eq!(ids, ["huge", "small"]);
    }

    fn pexels_video(id: u64, files: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "width": 3840,
            "height": 2160,
            "duration": 12,
            "video_files": files,
        })
    }

    #[tokio::test]
    async fn pexels_picks_best_fitting_mp4() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("query", "mountain"))
            .and(query_param("orientation", "landscape"))
            .and(header("Authorization", "px-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "page": 1,
                "per_page": 2,
                "videos": [
                    pexels_video(7, serde_json::json!([
                        {"file_type": "video/mp4", "width": 3840, "height": 2160, "link": "https://v/7-uhd.mp4"},
                        {"file_type": "video/mp4", "width": 1280, "height": 720, "link": "https://v/7-hd.mp4"},
                        {"file_type": "video/mp4", "width": 640, "height": 360, "link": "https://v/7-sd.mp4"}
                    ])),
                    pexels_video(8, serde_json::json!([
                        {"file_type": "video/webm", "width": 1280, "height": 720, "link": "https://v/8.webm"}
                    ])),
                ],
            })))
            .mount(&server)
            .await;

        let searcher = PexelsSearcher::new(Some("px-key".into()), 1280, Duration::from_secs(5))
            .with_endpoint(format!("{}/videos/search", server.uri()));
        let clips = searcher
            .search(&SearchQuery {
                keyword: "mountain".into(),
                orientation: Orientation::Landscape,
                limit: 2,
            })
            .await
            .unwrap();

        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].source_id, "pexels:7");
        assert_eq!(clips[0].url, "https://v/7-hd.mp4");
        assert_eq!(clips[0].duration_hint, Some(12.0));
        assert_eq!(
            clips[0].resolution_hint,
            Some(Resolution {
                width: 1280,
                height: 720
            })
        );
    }

    #[tokio::test]
    async fn pexels_follows_next_page() {
        let server = MockServer::start().await;
        let file = serde_json::json!([
            {"file_type": "video/mp4", "width": 1280, "height": 720, "link": "https://v/x.mp4"}
        ]);
        Mock::given(method("GET"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "videos": [pexels_video(1, file.clone())],
                "next_page": "https://api.pexels.com/videos/search?page=2",
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "videos": [pexels_video(2, file.clone()), pexels_video(3, file)],
            })))
            .mount(&server)
            .await;

        let searcher = PexelsSearcher::new(Some("px-key".into()), 1280, Duration::from_secs(5))
            .with_endpoint(format!("{}/videos/search", server.uri()));
        let clips = searcher
            .search(&SearchQuery {
                keyword: "sky".into(),
                orientation: Orientation::Landscape,
                limit: 2,
            })
            .await
            .unwrap();

        let ids: Vec<_> = clips.iter().map(|c| c.source_id.as_str()).collect();
        assert_eq!(ids, ["pexels:1", "pexels:2"]);
    }

    /// Serves `total` videos the way Pexels does: page `p` is the slice
    /// `(p-1)*per_page .. p*per_page`. Video 0 has no MP4 rendition.
    struct OffsetPages {
        total: u64,
    }

    impl Respond for OffsetPages {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let param = |name: &str| {
                request
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == name)
                    .and_then(|(_, v)| v.parse::<u64>().ok())
                    .unwrap_or(1)
            };
            let (page, per_page) = (param("page"), param("per_page"));
            let start = (page - 1) * per_page;
            let end = (start + per_page).min(self.total);

            let videos: Vec<_> = (start..end)
                .map(|id| {
                    let file_type = if id == 0 { "video/webm" } else { "video/mp4" };
                    pexels_video(
                        id,
                        serde_json::json!([
                            {"file_type": file_type, "width": 1280, "height": 720, "link": format!("https://v/{id}")}
                        ]),
                    )
                })
                .collect();
            let mut body = serde_json::json!({ "page": page, "per_page": per_page, "videos": videos });
            if end < self.total {
                body["next_page"] = serde_json::json!(format!("https://api.pexels.com/videos/search?page={}", page + 1));
            }
            ResponseTemplate::new(200).set_body_json(body)
        }
    }

    #[tokio::test]
    async fn pexels_paging_keeps_page_size_and_skips_seen_videos() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(OffsetPages { total: 10 })
            .mount(&server)
            .await;

        let searcher = PexelsSearcher::new(Some("px-key".into()), 1280, Duration::from_secs(5))
            .with_endpoint(server.uri());
        let clips = searcher
            .search(&SearchQuery {
                keyword: "forest".into(),
                orientation: Orientation::Landscape,
                limit: 3,
            })
            .await
            .unwrap();

        let ids: Vec<_> = clips.iter().map(|c| c.source_id.as_str()).collect();
        assert_eq!(ids, ["pexels:1", "pexels:2", "pexels:3"]);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(
            requests
                .iter()
                .all(|r| r.url.query_pairs().any(|(k, v)| k == "per_page" && v == "3"))
        );
    }

    #[tokio::test]
    async fn pexels_maps_auth_failures_and_missing_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let query = SearchQuery {
            keyword: "sky".into(),
            orientation: Orientation::Landscape,
            limit: 1,
        };

        let searcher = PexelsSearcher::new(Some("bad".into()), 1280, Duration::from_secs(5))
            .with_endpoint(server.uri());
        assert!(matches!(
            searcher.search(&query).await,
            Err(SearchError::Unauthorized { .. })
        ));

        let searcher = PexelsSearcher::new(None, 1280, Duration::from_secs(5))
            .with_endpoint(server.uri());
        assert!(matches!(
            searcher.search(&query).await,
            Err(SearchError::MissingApiKey { .. })
        ));
    }
}

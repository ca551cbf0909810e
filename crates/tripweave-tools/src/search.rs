use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;

use tripweave_core::config::SearchConfig;
use tripweave_core::error::{Result, TripweaveError};

const TAVILY_URL: &str = "https://api.tavily.com/search";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Format hits the way agents paste them into prompts.
pub fn hits_to_prompt(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results found.".into();
    }
    hits.iter()
        .map(|h| format!("**{}**\n{}\nURL: {}", h.title, h.snippet, h.url))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Web search backend.
pub trait SearchProvider: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn search(&self, query: &str) -> BoxFuture<'_, Result<Vec<SearchHit>>>;
}

pub struct TavilySearch {
    api_key: String,
    max_results: u32,
    http: reqwest::Client,
}

impl TavilySearch {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            max_results: config.max_results,
            http: crate::http_client(),
        }
    }
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

fn parse_hits(body: TavilyResponse) -> Vec<SearchHit> {
    body.results
        .into_iter()
        .map(|r| SearchHit {
            title: r.title,
            url: r.url,
            snippet: r.content,
        })
        .collect()
}

impl SearchProvider for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    fn search(&self, query: &str) -> BoxFuture<'_, Result<Vec<SearchHit>>> {
        let query = query.to_string();

        Box::pin(async move {
            let err = |e: reqwest::Error| TripweaveError::ToolFailure {
                tool: "search".into(),
                message: e.to_string(),
            };

            let body: TavilyResponse = self
                .http
                .post(TAVILY_URL)
                .json(&json!({
                    "api_key": self.api_key,
                    "query": query,
                    "max_results": self.max_results,
                }))
                .send()
                .await
                .map_err(err)?
                .error_for_status()
                .map_err(err)?
                .json()
                .await
                .map_err(err)?;

            Ok(parse_hits(body))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tavily_body() {
        let body: TavilyResponse = serde_json::from_str(
            r#"{"results":[{"title":"Lisbon guide","url":"https://example.org","content":"Trams and tiles"}]}"#,
        )
        .unwrap();
        let hits = parse_hits(body);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].snippet, "Trams and tiles");
    }

    #[test]
    fn test_hits_to_prompt() {
        assert_eq!(hits_to_prompt(&[]), "No results found.");
        let text = hits_to_prompt(&[
            SearchHit {
                title: "A".into(),
                url: "u1".into(),
                snippet: "s1".into(),
            },
            SearchHit {
                title: "B".into(),
                url: "u2".into(),
                snippet: "s2".into(),
            },
        ]);
        assert!(text.starts_with("**A**\ns1\nURL: u1"));
        assert!(text.contains("\n\n---\n\n**B**"));
    }
}

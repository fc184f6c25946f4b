//! Song search through an external command (default: `yt-dlp ytsearch`).

use async_trait::async_trait;
use serde::Deserialize;

use crate::song::SearchResult;

use super::{CommandSpec, Resolver, ToolError};

const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// One line of `--dump-json` output.  Only the fields we use are decoded.
#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
}

impl Entry {
    fn into_result(self) -> Option<SearchResult> {
        let title = self.title.filter(|t| !t.trim().is_empty())?;
        let source = self
            .url
            .filter(|u| u.starts_with("http"))
            .or(self.webpage_url)
            .or_else(|| self.id.map(|id| format!("{WATCH_URL_PREFIX}{id}")))?;
        let artist = self
            .artist
            .filter(|a| !a.trim().is_empty())
            .or(self.uploader)
            .unwrap_or_default();

        Some(SearchResult {
            title,
            artist,
            duration_secs: self.duration,
            source,
        })
    }
}

/// [`Resolver`] that runs a configurable command.
///
/// Placeholders: `{query}`, `{limit}`.  The command must print one JSON object
/// per result on stdout.
#[derive(Debug, Clone)]
pub struct CommandResolver {
    command: CommandSpec,
}

impl CommandResolver {
    pub fn new(command: CommandSpec) -> Self {
        Self { command }
    }

    pub fn default_command() -> CommandSpec {
        CommandSpec::new(
            "yt-dlp",
            &["--dump-json", "--flat-playlist", "ytsearch{limit}:{query}"],
        )
    }
}

impl Default for CommandResolver {
    fn default() -> Self {
        Self::new(Self::default_command())
    }
}

#[async_trait]
impl Resolver for CommandResolver {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ToolError> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let limit_str = limit.to_string();
        let stdout = self
            .command
            .run(&[("query", query), ("limit", &limit_str)])
            .await?;

        let mut results = parse_search_output(&stdout);
        results.truncate(limit);
        log::debug!("search: '{query}' -> {} result(s)", results.len());
        Ok(results)
    }
}

/// Decode newline-delimited JSON search output; undecodable lines are skipped.
pub fn parse_search_output(stdout: &str) -> Vec<SearchResult> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|line| match serde_json::from_str::<Entry>(line) {
            Ok(entry) => entry.into_result(),
            Err(e) => {
                log::debug!("search: skipping undecodable line: {e}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artist_falls_back_to_uploader() {
        let out = r#"{"id":"abc","title":"Song","uploader":"Channel","duration":181.5}"#;
        let results = parse_search_output(out);
        assert_eq!(
            results,
            vec![SearchResult {
                title: "Song".into(),
                artist: "Channel".into(),
                duration_secs: Some(181.5),
                source: format!("{WATCH_URL_PREFIX}abc"),
            }]
        );
    }

    #[test]
    fn http_url_wins_over_id() {
        let out = r#"{"id":"abc","title":"T","artist":"A","url":"https://example.com/t"}"#;
        assert_eq!(parse_search_output(out)[0].source, "https://example.com/t");
    }

    #[test]
    fn bare_id_url_falls_back_to_webpage_url() {
        let out = r#"{"id":"abc","title":"T","url":"abc","webpage_url":"https://example.com/w"}"#;
        let r = &parse_search_output(out)[0];
        assert_eq!(r.source, "https://example.com/w");
        assert_eq!(r.artist, "");
    }

    #[test]
    fn bad_lines_and_untitled_entries_are_skipped() {
        let out = "not json\n\n{\"id\":\"x\"}\n{\"id\":\"y\",\"title\":\"Kept\"}\n";
        let results = parse_search_output(out);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Kept");
    }

    #[tokio::test]
    async fn blank_query_returns_nothing_without_running() {
        let r = CommandResolver::new(CommandSpec::new("no-such-search-tool-0042", &[]));
        assert!(r.search("   ", 5).await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn limit_is_applied() {
        let script = r#"for i in 1 2 3; do echo "{\"id\":\"$i\",\"title\":\"t$i\"}"; done"#;
        let r = CommandResolver::new(CommandSpec::new("sh", &["-c", script]));
        let results = r.search("anything", 2).await.unwrap();
        assert_eq!(results.len(), 2);
    }
}

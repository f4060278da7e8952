//! services/api/src/adapters/wikipedia.rs
//!
//! This module contains the adapter that fetches a Wikipedia article and
//! reduces it to the plain, lightly structured text the quiz model reads.
//! It implements the `DocumentExtractor` port from the `core` crate.

use async_trait::async_trait;
use regex::Regex;
use scraper::{node::Element, ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};
use wiki_quiz_core::domain::ExtractedDocument;
use wiki_quiz_core::ports::{DocumentExtractor, PortError, PortResult};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.36";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_MAX_ARTICLE_CHARS: usize = 15_000;
const TRUNCATION_MARKER: &str = "\n\n... [Article truncated for brevity]";
const UNKNOWN_TITLE: &str = "Unknown Title";

const SKIPPED_TAGS: &[&str] = &["sup", "table", "style", "script"];
const SKIPPED_CLASSES: &[&str] = &["mw-editsection", "reference", "reflist"];

//=========================================================================================
// Article Parsing
//=========================================================================================

/// Pre-compiled selectors and patterns for reading a rendered Wikipedia page.
pub struct ArticleParser {
    title: Selector,
    content: Selector,
    blocks: Selector,
    citation: Regex,
}

impl ArticleParser {
    pub fn new() -> PortResult<Self> {
        let selector = |css: &str| {
            Selector::parse(css)
                .map_err(|e| PortError::Unexpected(format!("Bad selector '{}': {}", css, e)))
        };
        Ok(Self {
            title: selector("#firstHeading")?,
            content: selector("#mw-content-text")?,
            blocks: selector("p, h2, h3, li")?,
            citation: Regex::new(r"\[\d+\]").map_err(|e| PortError::Unexpected(e.to_string()))?,
        })
    }

    /// Extracts the title and cleaned article text from a page's HTML.
    pub fn extract_article(&self, html: &str, max_chars: usize) -> PortResult<ExtractedDocument> {
        let page = Html::parse_document(html);

        let title = page
            .select(&self.title)
            .next()
            .map(|heading| self.visible_text(heading))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

        let content = page.select(&self.content).next().ok_or_else(|| {
            PortError::Unexpected("Could not find main content div '#mw-content-text'".to_string())
        })?;

        let mut text = format!("Article Title: {}\n\n", title);
        for block in content.select(&self.blocks) {
            if is_hidden(block, content) {
                continue;
            }
            let block_text = self.visible_text(block);
            if block_text.is_empty() {
                continue;
            }
            match block.value().name() {
                "h2" => text.push_str(&format!("\n## {} ##\n", block_text)),
                "h3" => text.push_str(&format!("\n### {} ###\n", block_text)),
                "li" => text.push_str(&format!("* {}\n", block_text)),
                _ => {
                    text.push_str(&block_text);
                    text.push_str("\n\n");
                }
            }
        }

        Ok(ExtractedDocument {
            title,
            text: truncate(text, max_chars),
        })
    }

    /// Text under `element` that is not inside a skipped tag or class, with
    /// whitespace collapsed and citation markers removed.
    fn visible_text(&self, element: ElementRef<'_>) -> String {
        let root = (*element).id();
        let mut raw = String::new();
        for node in element.descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            let hidden = node
                .ancestors()
                .take_while(|a| a.id() != root)
                .filter_map(|a| a.value().as_element())
                .any(is_skipped);
            if !hidden {
                raw.push_str(text);
            }
        }
        let stripped = self.citation.replace_all(&raw, "");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn is_skipped(element: &Element) -> bool {
    SKIPPED_TAGS.contains(&element.name())
        || element.classes().any(|class| SKIPPED_CLASSES.contains(&class))
}

/// Whether `block` itself, or any container between it and `root`, is skipped.
fn is_hidden(block: ElementRef<'_>, root: ElementRef<'_>) -> bool {
    if is_skipped(block.value()) {
        return true;
    }
    let root = (*root).id();
    block
        .ancestors()
        .take_while(|a| a.id() != root)
        .filter_map(|a| a.value().as_element())
        .any(is_skipped)
}

/// Cuts `text` to at most `max_chars` characters and marks the cut.
fn truncate(mut text: String, max_chars: usize) -> String {
    if let Some((byte_index, _)) = text.char_indices().nth(max_chars) {
        text.truncate(byte_index);
        text.push_str(TRUNCATION_MARKER);
    }
    text
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `DocumentExtractor` by fetching Wikipedia pages over HTTP.
pub struct WikipediaExtractor {
    client: reqwest::Client,
    parser: ArticleParser,
    max_chars: usize,
}

impl WikipediaExtractor {
    /// Creates a new `WikipediaExtractor` that keeps at most `max_chars` of article text.
    pub fn new(max_chars: usize) -> PortResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| PortError::Unexpected(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            parser: ArticleParser::new()?,
            max_chars,
        })
    }
}

//=========================================================================================
// `DocumentExtractor` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentExtractor for WikipediaExtractor {
    async fn extract(&self, url: &str) -> PortResult<ExtractedDocument> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, %status, "Article fetch returned a non-success status.");
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(PortError::NotFound(format!("No article at {}", url)));
            }
            return Err(PortError::Unexpected(format!(
                "Fetching {} returned {}",
                url, status
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to read {}: {}", url, e)))?;

        let document = self.parser.extract_article(&html, self.max_chars)?;
        debug!(url, title = %document.title, chars = document.text.chars().count(), "Extracted article.");
        Ok(document)
    }
}

//! Viewer page probe.
//!
//! The lesson viewer is a black box. A [`PageProbe`] loads one lesson page
//! and reports the observable signals the harness scores: the primary
//! heading, the styled content container, raw-markup leakage, navigation
//! controls, and element counts.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use lessonforge_shared::{LessonForgeError, Result, ValidateConfig};

/// User-Agent string for probe requests.
const USER_AGENT: &str = concat!("lessonforge/", env!("CARGO_PKG_VERSION"));

/// Class on the styled content container.
const CONTAINER_CLASS: &str = "prose";
/// Container classes that mark the enhanced typography.
const ENHANCED_CLASSES: &[&str] = &["prose-lg", "prose-gray"];
/// Tags whose text is not checked for raw markup.
const LITERAL_TAGS: &[&str] = &["pre", "code", "script", "style", "noscript", "template", "head"];

static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("h1 selector"));
static H2: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2").expect("h2 selector"));
static H3: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h3").expect("h3 selector"));
static P: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").expect("p selector"));
static PRE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("pre").expect("pre selector"));
static CONTAINER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".prose").expect("container selector"));
static CONTROLS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("button, a").expect("controls selector"));
static LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("links selector"));
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").expect("body selector"));

/// A Markdown heading token at the start of a line.
static HEADING_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]+\S").expect("heading token regex"));

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Element counts on a rendered page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementCounts {
    pub h1: usize,
    pub h2: usize,
    pub h3: usize,
    pub paragraphs: usize,
    pub code_blocks: usize,
}

/// What a rendered lesson page looked like.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Text of the first `<h1>`, if present and non-empty.
    pub heading: Option<String>,
    pub has_container: bool,
    /// Class list of the container, empty without one.
    pub container_classes: Vec<String>,
    pub has_raw_markup: bool,
    pub has_back_control: bool,
    pub has_module_link: bool,
    pub counts: ElementCounts,
}

impl PageSnapshot {
    /// Parse rendered HTML into the signals the harness checks.
    pub fn from_html(html: &str, module_link_prefix: &str) -> Self {
        let doc = Html::parse_document(html);

        let heading = doc
            .select(&H1)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty());

        let container = doc.select(&CONTAINER).next();
        let container_classes = container
            .map(|el| el.value().classes().map(str::to_string).collect())
            .unwrap_or_default();

        let has_back_control = doc
            .select(&CONTROLS)
            .any(|el| el.text().collect::<String>().contains("Back"));
        let has_module_link = !module_link_prefix.is_empty()
            && doc
                .select(&LINKS)
                .filter_map(|el| el.value().attr("href"))
                .any(|href| href.contains(module_link_prefix));

        let visible = doc
            .select(&BODY)
            .next()
            .map(visible_text)
            .unwrap_or_default();

        Self {
            heading,
            has_container: container.is_some(),
            container_classes,
            has_raw_markup: has_raw_markup(&visible),
            has_back_control,
            has_module_link,
            counts: ElementCounts {
                h1: doc.select(&H1).count(),
                h2: doc.select(&H2).count(),
                h3: doc.select(&H3).count(),
                paragraphs: doc.select(&P).count(),
                code_blocks: doc.select(&PRE).count(),
            },
        }
    }

    /// Container carries one of the enhanced typography classes.
    pub fn has_enhanced_styling(&self) -> bool {
        self.container_classes
            .iter()
            .any(|c| ENHANCED_CLASSES.contains(&c.as_str()))
    }

    pub fn has_navigation(&self) -> bool {
        self.has_back_control && self.has_module_link
    }
}

/// Text a reader would see, one line per text node, skipping literal blocks.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let literal = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| LITERAL_TAGS.contains(&e.name()))
        });
        if !literal {
            out.push_str(text);
            out.push('\n');
        }
    }
    out
}

/// Unrendered Markdown showing through: a code fence or a heading token.
pub fn has_raw_markup(visible_text: &str) -> bool {
    visible_text.contains("```") || HEADING_TOKEN_RE.is_match(visible_text)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Probe trait
// ---------------------------------------------------------------------------

/// Loads a lesson page from the viewer.
///
/// Implementations report load problems (network failure, timeouts, the
/// heading never appearing) as errors; the harness records them as failed
/// checks.
#[async_trait]
pub trait PageProbe: Send + Sync {
    async fn snapshot(&self, url: &str) -> Result<PageSnapshot>;
}

// ---------------------------------------------------------------------------
// HTTP probe
// ---------------------------------------------------------------------------

/// Fetches server-rendered lesson pages over HTTP.
///
/// Client-rendered viewers fill the page in after the first response, so
/// the probe re-fetches until an `<h1>` shows up or the element wait runs out.
pub struct HttpProbe {
    client: Client,
    element_wait_timeout: Duration,
    poll_interval: Duration,
    module_link_prefix: String,
}

impl HttpProbe {
    pub fn new(config: &ValidateConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.render_timeout)
            .build()
            .map_err(|e| LessonForgeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            element_wait_timeout: config.element_wait_timeout,
            poll_interval: config.poll_interval.max(Duration::from_millis(10)),
            module_link_prefix: config.module_link_prefix.clone(),
        })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                LessonForgeError::Timeout(format!("page load {url}"))
            } else {
                LessonForgeError::Network(format!("{url}: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LessonForgeError::Network(format!("{url}: HTTP {status}")));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                LessonForgeError::Timeout(format!("page body {url}"))
            } else {
                LessonForgeError::Network(format!("{url}: {e}"))
            }
        })
    }
}

#[async_trait]
impl PageProbe for HttpProbe {
    #[instrument(skip(self))]
    async fn snapshot(&self, url: &str) -> Result<PageSnapshot> {
        let deadline = Instant::now() + self.element_wait_timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let html = self.fetch(url).await?;
            let snapshot = PageSnapshot::from_html(&html, &self.module_link_prefix);
            if snapshot.heading.is_some() {
                debug!(attempts, "page rendered");
                return Ok(snapshot);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LessonForgeError::Timeout(format!(
                    "no <h1> on {url} within {} ms",
                    self.element_wait_timeout.as_millis()
                )));
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

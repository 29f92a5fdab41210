//! Concurrency-limited validation of published lessons.
//!
//! All checks run as futures on the calling task; a semaphore caps how many
//! are in flight. A check that fails, errors or times out becomes a failed
//! [`TestResult`] and never disturbs its siblings.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use lessonforge_shared::{LessonForgeError, NavigationIndex, Result, ValidateConfig};

use crate::probe::{ElementCounts, PageProbe, PageSnapshot};
use crate::report::QualityReport;

/// Error recorded for checks skipped after cancellation.
pub const CANCELLED: &str = "cancelled";

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// A lesson picked for checking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledLesson {
    pub module_id: String,
    pub module_name: String,
    pub slug: String,
    pub title: String,
    /// Path on the viewer, e.g. `/lessons/star-schema`.
    pub url: String,
}

/// Positions checked in a module of `len` lessons: first, middle
/// (`len / 2`) and last, or every lesson when there are fewer than three.
/// At most `per_module` are kept.
pub fn sample_positions(len: usize, per_module: usize) -> Vec<usize> {
    let mut positions: Vec<usize> = if len < 3 {
        (0..len).collect()
    } else {
        vec![0, len / 2, len - 1]
    };
    positions.truncate(per_module);
    positions
}

/// Representative lessons from every module, in index order.
pub fn select_samples(index: &NavigationIndex, per_module: usize) -> Vec<SampledLesson> {
    index
        .modules
        .values()
        .flat_map(|module| {
            sample_positions(module.lessons.len(), per_module)
                .into_iter()
                .map(move |i| {
                    let lesson = &module.lessons[i];
                    SampledLesson {
                        module_id: module.module_id.clone(),
                        module_name: module.module_name.clone(),
                        slug: lesson.slug.clone(),
                        title: lesson.title.clone(),
                        url: lesson.url.clone(),
                    }
                })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Test results
// ---------------------------------------------------------------------------

/// Markdown rendering checks that feed the quality score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarkdownQuality {
    pub headers_styled: bool,
    pub paragraphs_present: bool,
    pub code_blocks_styled: bool,
    pub proper_spacing: bool,
}

impl MarkdownQuality {
    fn from_snapshot(snapshot: &PageSnapshot) -> Self {
        let c = &snapshot.counts;
        Self {
            headers_styled: c.h1 + c.h2 + c.h3 > 0,
            paragraphs_present: c.paragraphs > 0,
            code_blocks_styled: c.code_blocks > 0,
            proper_spacing: snapshot.has_enhanced_styling(),
        }
    }

    /// Share of passing checks, 0–100.
    pub fn score(&self) -> f64 {
        let passed = [
            self.headers_styled,
            self.paragraphs_present,
            self.code_blocks_styled,
            self.proper_spacing,
        ]
        .iter()
        .filter(|b| **b)
        .count();
        passed as f64 / 4.0 * 100.0
    }
}

/// Outcome of checking one lesson page.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub module_id: String,
    pub module_name: String,
    pub lesson_slug: String,
    pub lesson_title: String,
    pub url: String,
    /// The page loaded and has a primary heading.
    pub success: bool,
    pub actual_title: Option<String>,
    pub title_matches: bool,
    pub has_rendered_container: bool,
    pub has_enhanced_styling: bool,
    pub has_raw_markup_leak: bool,
    pub has_navigation_controls: bool,
    pub element_counts: ElementCounts,
    pub markdown_quality: MarkdownQuality,
    pub quality_score: f64,
    pub check_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestResult {
    fn failed(
        lesson: &SampledLesson,
        url: String,
        error: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            module_id: lesson.module_id.clone(),
            module_name: lesson.module_name.clone(),
            lesson_slug: lesson.slug.clone(),
            lesson_title: lesson.title.clone(),
            url,
            success: false,
            actual_title: None,
            title_matches: false,
            has_rendered_container: false,
            has_enhanced_styling: false,
            has_raw_markup_leak: false,
            has_navigation_controls: false,
            element_counts: ElementCounts::default(),
            markdown_quality: MarkdownQuality::default(),
            quality_score: 0.0,
            check_seconds: elapsed.as_secs_f64(),
            error: Some(error.into()),
        }
    }

    fn from_snapshot(
        lesson: &SampledLesson,
        url: String,
        snapshot: PageSnapshot,
        elapsed: Duration,
    ) -> Self {
        let quality = MarkdownQuality::from_snapshot(&snapshot);
        let title_matches = snapshot
            .heading
            .as_deref()
            .is_some_and(|h| h.to_lowercase().contains(&lesson.title.to_lowercase()));
        let success = snapshot.heading.is_some();

        Self {
            module_id: lesson.module_id.clone(),
            module_name: lesson.module_name.clone(),
            lesson_slug: lesson.slug.clone(),
            lesson_title: lesson.title.clone(),
            url,
            success,
            title_matches,
            has_rendered_container: snapshot.has_container,
            has_enhanced_styling: snapshot.has_enhanced_styling(),
            has_raw_markup_leak: snapshot.has_raw_markup,
            has_navigation_controls: snapshot.has_navigation(),
            element_counts: snapshot.counts,
            quality_score: quality.score(),
            markdown_quality: quality,
            check_seconds: elapsed.as_secs_f64(),
            error: (!success).then(|| "primary heading missing".to_string()),
            actual_title: snapshot.heading,
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Samples an index and checks each sample against the viewer.
pub struct ValidationHarness {
    probe: Arc<dyn PageProbe>,
    base_url: String,
    concurrency: usize,
    lessons_per_module: usize,
    check_timeout: Duration,
    cancel: Arc<AtomicBool>,
}

impl ValidationHarness {
    pub fn new(config: &ValidateConfig, probe: Arc<dyn PageProbe>) -> Result<Self> {
        let base = url::Url::parse(&config.base_url).map_err(|e| {
            LessonForgeError::config(format!("invalid base_url {:?}: {e}", config.base_url))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(LessonForgeError::config(format!(
                "base_url must be http or https: {}",
                config.base_url
            )));
        }

        Ok(Self {
            probe,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            concurrency: config.concurrency.max(1),
            lessons_per_module: config.lessons_per_module,
            check_timeout: config.render_timeout + config.element_wait_timeout,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that stops checks which have not started yet.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Check every sampled lesson and roll the results into a report.
    #[instrument(skip_all, fields(modules = index.modules.len(), concurrency = self.concurrency))]
    pub async fn run(&self, index: &NavigationIndex) -> QualityReport {
        let samples = select_samples(index, self.lessons_per_module);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let start = Instant::now();

        info!(
            samples = samples.len(),
            modules = index.modules.len(),
            "starting validation"
        );

        let checks = samples.iter().map(|lesson| {
            let semaphore = semaphore.clone();
            async move {
                let url = format!("{}{}", self.base_url, lesson.url);
                let Ok(_permit) = semaphore.acquire().await else {
                    let closed = "validation pool closed";
                    return TestResult::failed(lesson, url, closed, Duration::ZERO);
                };
                if self.cancel.load(Ordering::SeqCst) {
                    return TestResult::failed(lesson, url, CANCELLED, Duration::ZERO);
                }
                self.check(lesson, url).await
            }
        });
        let results = join_all(checks).await;

        let report = QualityReport::build(results, start.elapsed(), self.concurrency);
        info!(
            tested = report.test_summary.total_tested,
            successful = report.test_summary.successful,
            duration_ms = start.elapsed().as_millis(),
            "validation complete"
        );
        report
    }

    async fn check(&self, lesson: &SampledLesson, url: String) -> TestResult {
        let started = Instant::now();
        match tokio::time::timeout(self.check_timeout, self.probe.snapshot(&url)).await {
            Ok(Ok(snapshot)) => {
                let result = TestResult::from_snapshot(lesson, url, snapshot, started.elapsed());
                if result.success {
                    debug!(url = %result.url, score = result.quality_score, "check passed");
                } else {
                    warn!(url = %result.url, "page loaded without a primary heading");
                }
                result
            }
            Ok(Err(e)) => {
                warn!(%url, error = %e, "check failed");
                TestResult::failed(lesson, url, e.to_string(), started.elapsed())
            }
            Err(_) => {
                let message = format!("timed out after {} ms", self.check_timeout.as_millis());
                warn!(%url, "check {message}");
                TestResult::failed(lesson, url, message, started.elapsed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use lessonforge_shared::{AppConfig, NavigationEntry};

    fn index_with(modules: &[(&str, usize)]) -> NavigationIndex {
        let mut index = NavigationIndex::default();
        for (module_id, count) in modules {
            for i in 0..*count {
                index.push(NavigationEntry {
                    slug: format!("{module_id}-lesson-{i}"),
                    title: format!("Lesson {i}"),
                    module_id: (*module_id).into(),
                    module_name: format!("Name {module_id}"),
                    url: format!("/lessons/{module_id}-lesson-{i}"),
                });
            }
        }
        index
    }

    fn config(concurrency: usize) -> ValidateConfig {
        let mut config = ValidateConfig::from(&AppConfig::default());
        config.base_url = "http://viewer.test".into();
        config.concurrency = concurrency;
        config.render_timeout = Duration::from_millis(200);
        config.element_wait_timeout = Duration::from_millis(100);
        config
    }

    const RENDERED: &str = r#"<html><body>
        <a href="/learning-path/m">Module</a><button>Back</button>
        <div class="prose prose-lg"><h1>Lesson 0</h1><h2>Intro</h2><p>Text</p><pre><code>x</code></pre></div>
    </body></html>"#;

    /// Serves a fixed page, fails or hangs on chosen slugs, and tracks peak
    /// concurrency.
    struct FakeProbe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
        fail_on: Option<&'static str>,
        hang_on: Option<&'static str>,
    }

    impl FakeProbe {
        fn new(delay: Duration) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                delay,
                fail_on: None,
                hang_on: None,
            }
        }
    }

    #[async_trait]
    impl PageProbe for FakeProbe {
        async fn snapshot(&self, url: &str) -> Result<PageSnapshot> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if self.hang_on.is_some_and(|s| url.ends_with(s)) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on.is_some_and(|s| url.ends_with(s)) {
                return Err(LessonForgeError::Network(format!("{url}: connection refused")));
            }
            Ok(PageSnapshot::from_html(RENDERED, "/learning-path/"))
        }
    }

    #[test]
    fn five_lessons_sample_first_middle_last() {
        assert_eq!(sample_positions(5, 3), vec![0, 2, 4]);
        assert_eq!(sample_positions(4, 3), vec![0, 2, 3]);
        assert_eq!(sample_positions(2, 3), vec![0, 1]);
        assert_eq!(sample_positions(1, 3), vec![0]);
        assert_eq!(sample_positions(0, 3), Vec::<usize>::new());
        assert_eq!(sample_positions(5, 1), vec![0]);
    }

    #[test]
    fn samples_span_every_module() {
        let index = index_with(&[("module-1", 5), ("module-2", 2)]);
        let samples = select_samples(&index, 3);
        let slugs: Vec<&str> = samples.iter().map(|s| s.slug.as_str()).collect();
        assert_eq!(
            slugs,
            vec![
                "module-1-lesson-0",
                "module-1-lesson-2",
                "module-1-lesson-4",
                "module-2-lesson-0",
                "module-2-lesson-1",
            ]
        );
    }

    #[tokio::test]
    async fn in_flight_checks_never_exceed_limit() {
        let probe = Arc::new(FakeProbe::new(Duration::from_millis(20)));
        let harness = ValidationHarness::new(&config(2), probe.clone()).unwrap();

        let report = harness.run(&index_with(&[("m1", 6), ("m2", 6), ("m3", 6)])).await;

        assert_eq!(report.test_summary.total_tested, 9);
        assert_eq!(report.test_summary.successful, 9);
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn failing_check_does_not_cancel_siblings() {
        let mut probe = FakeProbe::new(Duration::from_millis(1));
        probe.fail_on = Some("m1-lesson-2");
        probe.hang_on = Some("m1-lesson-4");
        let harness = ValidationHarness::new(&config(4), Arc::new(probe)).unwrap();

        let report = harness.run(&index_with(&[("m1", 5)])).await;
        let results = &report.detailed_results;

        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(results[1].error.as_deref().is_some_and(|e| e.contains("connection refused")));
        assert!(!results[2].success);
        assert!(results[2].error.as_deref().is_some_and(|e| e.starts_with("timed out")));
        assert_eq!(report.test_summary.failed, 2);
    }

    #[tokio::test]
    async fn cancelled_before_start_records_failures() {
        let probe = Arc::new(FakeProbe::new(Duration::from_millis(1)));
        let harness = ValidationHarness::new(&config(2), probe.clone()).unwrap();
        harness.cancel_handle().store(true, Ordering::SeqCst);

        let report = harness.run(&index_with(&[("m1", 3)])).await;

        assert!(report.detailed_results.iter().all(|r| r.error.as_deref() == Some(CANCELLED)));
        assert_eq!(probe.peak.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn scores_and_title_match() {
        let lesson = SampledLesson {
            module_id: "m".into(),
            module_name: "M".into(),
            slug: "s".into(),
            title: "Lesson 0".into(),
            url: "/lessons/s".into(),
        };
        let snapshot = PageSnapshot::from_html(RENDERED, "/learning-path/");
        let result = TestResult::from_snapshot(&lesson, "u".into(), snapshot, Duration::ZERO);
        assert!(result.success);
        assert!(result.title_matches);
        assert!(result.has_navigation_controls);
        assert_eq!(result.quality_score, 100.0);

        let bare = PageSnapshot::from_html("<html><body><p>x</p></body></html>", "/learning-path/");
        let result = TestResult::from_snapshot(&lesson, "u".into(), bare, Duration::ZERO);
        assert!(!result.success);
        assert_eq!(result.quality_score, 25.0);
    }

    #[test]
    fn rejects_bad_base_url() {
        let mut cfg = config(1);
        cfg.base_url = "not a url".into();
        let probe: Arc<dyn PageProbe> = Arc::new(FakeProbe::new(Duration::ZERO));
        assert!(ValidationHarness::new(&cfg, probe.clone()).is_err());

        cfg.base_url = "ftp://viewer.test".into();
        assert!(ValidationHarness::new(&cfg, probe).is_err());
    }
}

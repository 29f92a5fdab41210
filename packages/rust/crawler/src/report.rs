//! Quality report rolled up from individual check results.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use lessonforge_shared::{LessonForgeError, Result, write_atomic};

use crate::harness::TestResult;

const REPORT_PREFIX: &str = "final_lesson_enhancement_report_";

#[derive(Debug, Clone, Serialize)]
pub struct TestSummary {
    pub total_tested: usize,
    pub successful: usize,
    pub failed: usize,
    pub duration_seconds: f64,
    pub lessons_per_second: f64,
    /// Percent of checks that loaded.
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypographyQuality {
    pub with_prose_container: usize,
    pub with_enhanced_prose: usize,
    pub typography_success_rate: f64,
    pub enhancement_success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderingQuality {
    pub clean_rendering: usize,
    pub proper_navigation: usize,
    pub rendering_success_rate: f64,
    pub navigation_success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnhancementQuality {
    pub typography: TypographyQuality,
    pub rendering: RenderingQuality,
    /// Mean quality score of successful checks.
    pub overall_quality_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub concurrency: usize,
    pub avg_check_seconds: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModuleBreakdown {
    pub module_name: String,
    pub tests: usize,
    pub successful: usize,
    pub typography_success: usize,
    pub navigation_success: usize,
    pub rendering_success: usize,
}

/// Everything a validation run found.
#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub run_id: Uuid,
    pub test_summary: TestSummary,
    pub enhancement_quality: EnhancementQuality,
    pub performance: PerformanceMetrics,
    pub module_breakdown: BTreeMap<String, ModuleBreakdown>,
    pub detailed_results: Vec<TestResult>,
    pub timestamp: String,
}

/// `part / whole` as a percentage with one decimal; zero when `whole` is zero.
fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round_to(part as f64 / whole as f64 * 100.0, 1)
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl QualityReport {
    /// Roll up check results. Category rates are over successful checks.
    pub fn build(results: Vec<TestResult>, duration: Duration, concurrency: usize) -> Self {
        let total = results.len();
        let ok: Vec<&TestResult> = results.iter().filter(|r| r.success).collect();
        let successful = ok.len();
        let secs = duration.as_secs_f64();

        let with_prose_container = ok.iter().filter(|r| r.has_rendered_container).count();
        let with_enhanced_prose = ok.iter().filter(|r| r.has_enhanced_styling).count();
        let clean_rendering = ok.iter().filter(|r| !r.has_raw_markup_leak).count();
        let proper_navigation = ok.iter().filter(|r| r.has_navigation_controls).count();
        let overall_quality_score = if ok.is_empty() {
            0.0
        } else {
            round_to(ok.iter().map(|r| r.quality_score).sum::<f64>() / successful as f64, 1)
        };

        let mut module_breakdown: BTreeMap<String, ModuleBreakdown> = BTreeMap::new();
        for r in &results {
            let stats = module_breakdown
                .entry(r.module_id.clone())
                .or_insert_with(|| ModuleBreakdown {
                    module_name: r.module_name.clone(),
                    ..ModuleBreakdown::default()
                });
            stats.tests += 1;
            if r.success {
                stats.successful += 1;
                stats.typography_success += usize::from(r.has_rendered_container);
                stats.navigation_success += usize::from(r.has_navigation_controls);
                stats.rendering_success += usize::from(!r.has_raw_markup_leak);
            }
        }

        let avg_check_seconds = if total == 0 {
            0.0
        } else {
            round_to(results.iter().map(|r| r.check_seconds).sum::<f64>() / total as f64, 2)
        };

        Self {
            run_id: Uuid::now_v7(),
            test_summary: TestSummary {
                total_tested: total,
                successful,
                failed: total - successful,
                duration_seconds: round_to(secs, 2),
                lessons_per_second: if secs > 0.0 { round_to(total as f64 / secs, 2) } else { 0.0 },
                success_rate: percent(successful, total),
            },
            enhancement_quality: EnhancementQuality {
                typography: TypographyQuality {
                    with_prose_container,
                    with_enhanced_prose,
                    typography_success_rate: percent(with_prose_container, successful),
                    enhancement_success_rate: percent(with_enhanced_prose, successful),
                },
                rendering: RenderingQuality {
                    clean_rendering,
                    proper_navigation,
                    rendering_success_rate: percent(clean_rendering, successful),
                    navigation_success_rate: percent(proper_navigation, successful),
                },
                overall_quality_score,
            },
            performance: PerformanceMetrics {
                concurrency,
                avg_check_seconds,
            },
            module_breakdown,
            detailed_results: results,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// File name for this report, stamped with the current UTC time.
    pub fn file_name() -> String {
        format!("{REPORT_PREFIX}{}.json", chrono::Utc::now().format("%Y%m%d_%H%M%S"))
    }

    /// Write the report as pretty JSON into `dir`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).map_err(|e| LessonForgeError::io(dir, e))?;
        let path = dir.join(Self::file_name());
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| LessonForgeError::parse(format!("JSON serialization failed: {e}")))?;
        write_atomic(&path, json)?;
        info!(path = %path.display(), run_id = %self.run_id, "quality report written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{MarkdownQuality, TestResult};
    use crate::probe::ElementCounts;

    fn result(
        module: &str,
        success: bool,
        container: bool,
        leak: bool,
        nav: bool,
        score: f64,
    ) -> TestResult {
        TestResult {
            module_id: module.into(),
            module_name: format!("Name {module}"),
            lesson_slug: "s".into(),
            lesson_title: "T".into(),
            url: "http://viewer.test/lessons/s".into(),
            success,
            actual_title: success.then(|| "T".to_string()),
            title_matches: success,
            has_rendered_container: container,
            has_enhanced_styling: container,
            has_raw_markup_leak: leak,
            has_navigation_controls: nav,
            element_counts: ElementCounts::default(),
            markdown_quality: MarkdownQuality::default(),
            quality_score: score,
            check_seconds: 0.5,
            error: (!success).then(|| "timed out".to_string()),
        }
    }

    #[test]
    fn rolls_up_rates_and_modules() {
        let results = vec![
            result("module-1", true, true, false, true, 100.0),
            result("module-1", true, false, true, false, 50.0),
            result("module-2", false, false, false, false, 0.0),
            result("module-2", true, true, false, true, 75.0),
        ];
        let report = QualityReport::build(results, Duration::from_secs(2), 15);

        assert_eq!(report.test_summary.total_tested, 4);
        assert_eq!(report.test_summary.successful, 3);
        assert_eq!(report.test_summary.failed, 1);
        assert_eq!(report.test_summary.success_rate, 75.0);
        assert_eq!(report.test_summary.lessons_per_second, 2.0);

        let typo = &report.enhancement_quality.typography;
        assert_eq!(typo.with_prose_container, 2);
        assert_eq!(typo.typography_success_rate, 66.7);

        let rendering = &report.enhancement_quality.rendering;
        assert_eq!(rendering.clean_rendering, 2);
        assert_eq!(rendering.proper_navigation, 2);
        assert_eq!(report.enhancement_quality.overall_quality_score, 75.0);

        let m2 = &report.module_breakdown["module-2"];
        assert_eq!(m2.tests, 2);
        assert_eq!(m2.successful, 1);
        assert_eq!(m2.rendering_success, 1);
        assert_eq!(report.performance.avg_check_seconds, 0.5);
    }

    #[test]
    fn empty_run_has_zero_rates() {
        let report = QualityReport::build(Vec::new(), Duration::ZERO, 15);
        assert_eq!(report.test_summary.success_rate, 0.0);
        assert_eq!(report.enhancement_quality.overall_quality_score, 0.0);
        assert!(report.module_breakdown.is_empty());
    }

    #[test]
    fn writes_timestamped_file() {
        let dir = std::env::temp_dir().join(format!("lf-report-{}", Uuid::now_v7()));
        let results = vec![result("module-1", true, true, false, true, 100.0)];
        let report = QualityReport::build(results, Duration::from_secs(1), 2);

        let path = report.write(&dir).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("final_lesson_enhancement_report_"));
        assert!(name.ends_with(".json"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["test_summary"]["successful"], 1);
        assert_eq!(json["run_id"], report.run_id.to_string());

        let _ = std::fs::remove_dir_all(&dir);
    }
}

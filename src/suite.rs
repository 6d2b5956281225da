//! Scenario registry and sequential conformance runner

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::checks;
use crate::driver::DriverConfig;
use crate::error::{FailureKind, HarnessError, HarnessResult};
use crate::session::{BundleConfig, LaunchOptions};
use crate::wait::DEFAULT_POLL_INTERVAL;

/// A named conformance scenario.
#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub tags: &'static [&'static str],
}

/// Every scenario the harness knows how to run.
pub const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "check-page-marker",
        description: "The check page reports an anonymized connection",
        tags: &["network"],
    },
    Scenario {
        name: "profile-immutable",
        description: "A full visit session leaves the bundle's default profile untouched",
        tags: &["profile"],
    },
    Scenario {
        name: "https-upgrade",
        description: "An HTTP probe URL is rewritten to its HTTPS counterpart",
        tags: &["network"],
    },
    Scenario {
        name: "https-upgrade-disabled",
        description: "With the rewrite preference off, the probe URL stays plain HTTP",
        tags: &["network", "prefs"],
    },
    Scenario {
        name: "script-blocking",
        description: "Blocked script content is replaced by a placeholder element",
        tags: &["content"],
    },
    Scenario {
        name: "screenshot-capture",
        description: "A screenshot of the check page is a real, non-blank image",
        tags: &["screenshot"],
    },
];

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub failure_kind: Option<FailureKind>,
    pub error: Option<String>,
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

/// Aggregate configuration for the harness.
///
/// The empirically tuned constants (screenshot threshold, timeouts, settle
/// delay) are fields, not invariants; the conformance CLI can override any
/// of them.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Location of the installed browser bundle
    pub bundle: BundleConfig,

    /// WebDriver server configuration
    pub driver: DriverConfig,

    /// Run the browser headless
    pub headless: bool,

    /// Page that reports whether the connection is anonymized
    pub check_url: String,

    /// HTTP URL expected to be rewritten to HTTPS
    pub http_probe_url: String,

    /// The rewritten form of `http_probe_url`
    pub https_probe_url: String,

    /// Page whose scripted content the bundle is expected to block
    pub webgl_url: String,

    /// Preference gating the HTTP->HTTPS rewrite
    pub https_rewrite_pref: String,

    /// Budget for each observe phase
    pub page_timeout: Duration,

    /// Fixed delay where the original relied on a page settling
    pub settle: Duration,

    /// Pause between wait-condition probes
    pub poll_interval: Duration,

    /// Minimum size for a screenshot to count as non-blank
    pub screenshot_min_bytes: u64,

    /// Directory for screenshot artifacts
    pub screenshot_dir: PathBuf,

    /// Directory for the results JSON
    pub output_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            bundle: BundleConfig::new("bundle"),
            driver: DriverConfig::default(),
            headless: false,
            check_url: "https://check.torproject.org/".to_string(),
            http_probe_url: "http://example.org/".to_string(),
            https_probe_url: "https://example.org/".to_string(),
            webgl_url: "https://developer.mozilla.org/samples/webgl/sample1/index.html"
                .to_string(),
            https_rewrite_pref: "extensions.https_everywhere.globalEnabled".to_string(),
            page_timeout: Duration::from_secs(60),
            settle: Duration::from_secs(3),
            poll_interval: DEFAULT_POLL_INTERVAL,
            screenshot_min_bytes: 20_000,
            screenshot_dir: PathBuf::from("conformance-results/screenshots"),
            output_dir: PathBuf::from("conformance-results"),
        }
    }
}

impl HarnessConfig {
    /// Baseline launch options for a scenario; scenarios add preferences
    /// and scoped exceptions on top.
    pub fn launch_options(&self) -> LaunchOptions {
        let mut opts = LaunchOptions::new(self.bundle.clone());
        opts.driver = self.driver.clone();
        opts.headless = self.headless;
        opts
    }
}

/// Sequential conformance runner.
///
/// Scenarios run one at a time: each owns a disjoint profile clone and
/// process tree, but they share the underlying bundle installation.
pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run every registered scenario
    pub async fn run_all(&self) -> SuiteResult {
        self.run_scenarios(SCENARIOS.iter().collect()).await
    }

    /// Run scenarios carrying a tag
    pub async fn run_tagged(&self, tag: &str) -> SuiteResult {
        let selected = SCENARIOS
            .iter()
            .filter(|s| s.tags.iter().any(|t| *t == tag))
            .collect();
        self.run_scenarios(selected).await
    }

    /// Run a single scenario by name
    pub async fn run_named(&self, name: &str) -> HarnessResult<ScenarioResult> {
        let scenario = SCENARIOS
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| HarnessError::UnknownScenario(name.to_string()))?;
        Ok(self.run_one(scenario).await)
    }

    async fn run_scenarios(&self, scenarios: Vec<&Scenario>) -> SuiteResult {
        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;

        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            let result = self.run_one(scenario).await;
            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Conformance results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        SuiteResult {
            total: results.len(),
            passed,
            failed,
            duration_ms,
            results,
        }
    }

    async fn run_one(&self, scenario: &Scenario) -> ScenarioResult {
        info!("Running scenario: {}", scenario.name);
        let start = Instant::now();

        let outcome = self.dispatch(scenario.name).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => ScenarioResult {
                name: scenario.name.to_string(),
                success: true,
                duration_ms,
                failure_kind: None,
                error: None,
            },
            Err(e) => ScenarioResult {
                name: scenario.name.to_string(),
                success: false,
                duration_ms,
                failure_kind: Some(e.kind()),
                error: Some(e.to_string()),
            },
        }
    }

    async fn dispatch(&self, name: &str) -> HarnessResult<()> {
        match name {
            "check-page-marker" => checks::check_page_marker(&self.config).await,
            "profile-immutable" => checks::profile_immutable(&self.config).await,
            "https-upgrade" => checks::https_upgrade(&self.config).await,
            "https-upgrade-disabled" => checks::https_upgrade_disabled(&self.config).await,
            "script-blocking" => checks::script_blocking(&self.config).await,
            "screenshot-capture" => checks::screenshot_capture(&self.config).await,
            other => Err(HarnessError::UnknownScenario(other.to_string())),
        }
    }

    /// Write suite results to a JSON file in the output directory
    pub fn write_results(&self, results: &SuiteResult) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("conformance-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

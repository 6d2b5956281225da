//! Live tests that drive a real browser bundle
//!
//! Ignored by default: they need an installed bundle (VEILCHECK_BUNDLE) and
//! a WebDriver server binary on PATH. Run with:
//! VEILCHECK_BUNDLE=/path/to/bundle cargo test --test live -- --ignored

use veilcheck::{BundleConfig, Harness, HarnessConfig, HarnessError, LaunchOptions, Session};

fn bundle_from_env() -> Option<BundleConfig> {
    match std::env::var("VEILCHECK_BUNDLE") {
        Ok(path) => Some(BundleConfig::new(path)),
        Err(_) => {
            eprintln!("Skipping: VEILCHECK_BUNDLE not set");
            None
        }
    }
}

#[tokio::test]
#[ignore] // Requires an installed browser bundle
async fn live_teardown_runs_exactly_once() {
    let Some(bundle) = bundle_from_env() else {
        return;
    };

    let mut session = Session::launch(LaunchOptions::new(bundle))
        .await
        .expect("launch session");
    assert!(!session.is_closed());

    session.teardown().await.expect("first teardown");
    assert!(session.is_closed());

    // Idempotent: a second teardown is a no-op, not an error.
    session.teardown().await.expect("second teardown");

    // Commands after teardown fail with the closed-session error.
    let err = session.current_url().await.unwrap_err();
    assert!(matches!(err, HarnessError::SessionClosed));
}

#[tokio::test]
#[ignore] // Requires an installed browser bundle and network access
async fn live_full_suite_reports_every_scenario() {
    let Some(bundle) = bundle_from_env() else {
        return;
    };

    let config = HarnessConfig {
        bundle,
        output_dir: std::env::temp_dir().join("veilcheck-live"),
        screenshot_dir: std::env::temp_dir().join("veilcheck-live/screenshots"),
        ..Default::default()
    };
    let harness = Harness::new(config);

    let results = harness.run_all().await;
    assert_eq!(results.total, veilcheck::SCENARIOS.len());
    assert_eq!(results.passed + results.failed, results.total);

    let path = harness.write_results(&results).expect("write results");
    assert!(path.exists());
}

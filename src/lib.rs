//! VeilCheck Conformance Harness
//!
//! This crate drives a pre-built privacy-hardened browser bundle over the
//! W3C WebDriver protocol and verifies its privacy-relevant behaviors:
//! - Anonymized egress (the check page's connection marker)
//! - Forced HTTP->HTTPS upgrading, gated on its preference
//! - Script blocking (placeholder substitution behind an alert)
//! - Profile immutability across a full visit session
//! - Screenshot capture of a rendered page
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Conformance Harness (Rust)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Harness                                                    │
//! │    ├── run_all() / run_tagged() / run_named()               │
//! │    └── write_results() -> conformance-results.json          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (Setup → Drive → Observe → Assert → Teardown)     │
//! │    ├── Session::launch(profile clone, prefs, exceptions)    │
//! │    │     └── DriverHandle::spawn() + WebDriver client       │
//! │    ├── wait_until(probe, timeout) — last state on timeout   │
//! │    ├── hash_tree(profile) — before/after equality           │
//! │    └── Session::finish() — teardown on every exit path      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All remote-control mechanics (navigation, element queries, alerts,
//! screenshots) are delegated to the external WebDriver client; the harness
//! owns only driver configuration, scenario orchestration, and assertions.

pub mod checks;
pub mod driver;
pub mod error;
pub mod integrity;
pub mod session;
pub mod suite;
pub mod wait;

pub use error::{FailureKind, HarnessError, HarnessResult};
pub use integrity::{hash_tree, DirectoryHash};
pub use session::{BundleConfig, LaunchOptions, PrefValue, ScopedException, Session};
pub use suite::{Harness, HarnessConfig, ScenarioResult, SuiteResult, SCENARIOS};
pub use wait::{wait_until, Observation};

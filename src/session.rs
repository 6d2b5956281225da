//! Browser session lifecycle - profile cloning, launch, commands, teardown

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use fantoccini::{Client, ClientBuilder, Locator};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::driver::{DriverConfig, DriverHandle};
use crate::error::{HarnessError, HarnessResult};

/// A preference override value, applied at session launch and immutable for
/// the session lifetime.
#[derive(Debug, Clone, PartialEq)]
pub enum PrefValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl PrefValue {
    fn to_json(&self) -> serde_json::Value {
        match self {
            PrefValue::Bool(b) => serde_json::Value::from(*b),
            PrefValue::Int(i) => serde_json::Value::from(*i),
            PrefValue::Str(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

impl From<bool> for PrefValue {
    fn from(v: bool) -> Self {
        PrefValue::Bool(v)
    }
}

impl From<i64> for PrefValue {
    fn from(v: i64) -> Self {
        PrefValue::Int(v)
    }
}

impl From<&str> for PrefValue {
    fn from(v: &str) -> Self {
        PrefValue::Str(v.to_string())
    }
}

/// Preference overrides keyed by preference name.
pub type Preferences = BTreeMap<String, PrefValue>;

/// A per-origin permission grant written into the session's profile clone
/// before launch (e.g. canvas extraction for the check page).
#[derive(Debug, Clone)]
pub struct ScopedException {
    pub origin: String,
    pub permission: String,
}

impl ScopedException {
    pub fn new(origin: impl Into<String>, permission: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            permission: permission.into(),
        }
    }

    /// Canvas-extraction grant for the origin of `url`.
    pub fn canvas(url: &str) -> Self {
        Self::new(origin_of(url), "canvas")
    }
}

/// Scheme://host origin of a URL, as stored in the permission database.
pub fn origin_of(url: &str) -> String {
    match url.find("://") {
        Some(i) => {
            let scheme = &url[..i];
            let rest = &url[i + 3..];
            let host = rest.split(&['/', '?', '#'][..]).next().unwrap_or(rest);
            format!("{}://{}", scheme, host)
        }
        None => url.trim_end_matches('/').to_string(),
    }
}

/// Location of the installed browser bundle.
///
/// Member paths default to the standard bundle layout but stay overridable;
/// the bundle location is always explicit configuration, never global state.
#[derive(Debug, Clone)]
pub struct BundleConfig {
    /// Root of the extracted bundle
    pub root: PathBuf,

    /// Browser executable (None = standard location under root)
    pub browser_binary: Option<PathBuf>,

    /// Default profile directory (None = standard location under root)
    pub profile_dir: Option<PathBuf>,
}

impl BundleConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            browser_binary: None,
            profile_dir: None,
        }
    }

    pub fn browser_binary(&self) -> PathBuf {
        self.browser_binary
            .clone()
            .unwrap_or_else(|| self.root.join("Browser").join("firefox"))
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.profile_dir.clone().unwrap_or_else(|| {
            self.root
                .join("Browser")
                .join("TorBrowser")
                .join("Data")
                .join("Browser")
                .join("profile.default")
        })
    }
}

/// Everything needed to launch one session.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub bundle: BundleConfig,
    pub driver: DriverConfig,
    pub preferences: Preferences,
    pub scoped_exceptions: Vec<ScopedException>,
    pub headless: bool,
}

impl LaunchOptions {
    pub fn new(bundle: BundleConfig) -> Self {
        Self {
            bundle,
            driver: DriverConfig::default(),
            preferences: Preferences::new(),
            scoped_exceptions: Vec::new(),
            headless: false,
        }
    }

    pub fn with_pref(mut self, key: impl Into<String>, value: impl Into<PrefValue>) -> Self {
        self.preferences.insert(key.into(), value.into());
        self
    }

    pub fn with_exception(mut self, exception: ScopedException) -> Self {
        self.scoped_exceptions.push(exception);
        self
    }
}

/// Handle to a running browser instance, remote-controlled over WebDriver.
///
/// The browser runs on a disposable clone of the bundle's default profile;
/// the pristine profile is never touched. A session must be torn down
/// exactly once; the contained driver handle reaps the OS process on drop
/// as a last resort.
#[derive(Debug)]
pub struct Session {
    driver: DriverHandle,
    client: Option<Client>,
    profile: TempDir,
    closed: bool,
}

impl Session {
    /// Launch a browser session with the given profile, preference
    /// overrides, and scoped permission exceptions.
    pub async fn launch(opts: LaunchOptions) -> HarnessResult<Session> {
        let source_profile = opts.bundle.profile_dir();
        if !source_profile.is_dir() {
            return Err(HarnessError::Launch(format!(
                "Profile directory not found: {}",
                source_profile.display()
            )));
        }
        let browser = opts.bundle.browser_binary();
        if !browser.is_file() {
            return Err(HarnessError::Launch(format!(
                "Browser binary not found: {}",
                browser.display()
            )));
        }

        let profile = tempfile::Builder::new()
            .prefix("veilcheck-profile-")
            .tempdir()?;
        debug!(
            "Cloning profile {} -> {}",
            source_profile.display(),
            profile.path().display()
        );
        copy_tree(&source_profile, profile.path())?;
        apply_scoped_exceptions(profile.path(), &opts.scoped_exceptions)?;

        let mut driver = DriverHandle::spawn(opts.driver.clone()).await?;
        let caps = build_capabilities(&opts, profile.path());

        info!("Opening WebDriver session for {}", browser.display());
        match ClientBuilder::native()
            .capabilities(caps)
            .connect(driver.endpoint())
            .await
        {
            Ok(client) => Ok(Session {
                driver,
                client: Some(client),
                profile,
                closed: false,
            }),
            Err(e) => {
                let _ = driver.stop();
                Err(HarnessError::Launch(format!(
                    "WebDriver session rejected: {}",
                    e
                )))
            }
        }
    }

    fn client(&self) -> HarnessResult<&Client> {
        self.client.as_ref().ok_or(HarnessError::SessionClosed)
    }

    /// Navigate to a URL and wait for the page load to complete
    pub async fn navigate(&self, url: &str) -> HarnessResult<()> {
        debug!("navigate: {}", url);
        self.client()?.goto(url).await?;
        Ok(())
    }

    /// URL of the current page
    pub async fn current_url(&self) -> HarnessResult<String> {
        Ok(self.client()?.current_url().await?.to_string())
    }

    /// Title of the current page
    pub async fn title(&self) -> HarnessResult<String> {
        Ok(self.client()?.title().await?)
    }

    /// Query an element by CSS selector. A selector that matches nothing
    /// fails with the client's no-such-element error, which is distinct
    /// from every other failure (see `HarnessError::is_no_such_element`).
    pub async fn find(&self, selector: &str) -> HarnessResult<()> {
        self.client()?.find(Locator::Css(selector)).await?;
        Ok(())
    }

    /// Text of the currently displayed alert, if any
    pub async fn alert_text(&self) -> HarnessResult<String> {
        Ok(self.client()?.get_alert_text().await?)
    }

    /// Dismiss the currently displayed alert
    pub async fn dismiss_alert(&self) -> HarnessResult<()> {
        self.client()?.dismiss_alert().await?;
        Ok(())
    }

    /// Capture a PNG screenshot to `path`, returning the byte count
    pub async fn screenshot_to_file(&self, path: &Path) -> HarnessResult<u64> {
        let png = self.client()?.screenshot().await?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &png)?;
        debug!("Screenshot written: {} ({} bytes)", path.display(), png.len());
        Ok(png.len() as u64)
    }

    /// Directory of the profile clone this session runs on
    pub fn profile_dir(&self) -> &Path {
        self.profile.path()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// End the WebDriver session (closing the browser) and stop the driver;
    /// the profile clone is removed when the handle is dropped.
    /// Idempotent: a second call is a no-op.
    pub async fn teardown(&mut self) -> HarnessResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        info!("Tearing down session");
        let mut close_err = None;
        if let Some(client) = self.client.take() {
            if let Err(e) = client.close().await {
                warn!("WebDriver session close failed: {}", e);
                close_err = Some(HarnessError::WebDriver(e));
            }
        }
        let stop = self.driver.stop();

        match close_err {
            Some(e) => Err(e),
            None => stop,
        }
    }

    /// Consume the session, tearing it down after the scenario body ran.
    ///
    /// The body's `outcome` wins over a teardown error, but teardown always
    /// runs before either is surfaced. Scenarios acquire a session, run
    /// their drive/observe/assert steps against it, and end with
    /// `session.finish(outcome)` so no exit path can skip release.
    pub async fn finish(mut self, outcome: HarnessResult<()>) -> HarnessResult<()> {
        let teardown = self.teardown().await;
        outcome.and(teardown)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Session dropped without teardown; driver process will be reaped");
        }
        // DriverHandle's own Drop force-stops the OS process.
    }
}

/// WebDriver capabilities naming the browser binary, the profile clone, and
/// the preference overrides.
fn build_capabilities(
    opts: &LaunchOptions,
    profile_dir: &Path,
) -> serde_json::Map<String, serde_json::Value> {
    let mut prefs = serde_json::Map::new();
    for (key, value) in &opts.preferences {
        prefs.insert(key.clone(), value.to_json());
    }

    let mut args = vec![
        serde_json::Value::from("-profile"),
        serde_json::Value::from(profile_dir.to_string_lossy().into_owned()),
    ];
    if opts.headless {
        args.push(serde_json::Value::from("-headless"));
    }

    let firefox_options = serde_json::json!({
        "binary": opts.bundle.browser_binary().to_string_lossy(),
        "args": args,
        "prefs": prefs,
    });

    let mut caps = serde_json::Map::new();
    caps.insert("moz:firefoxOptions".to_string(), firefox_options);
    caps.insert("acceptInsecureCerts".to_string(), serde_json::json!(false));
    caps
}

/// Recursively copy `src` into `dst` (which must already exist).
fn copy_tree(src: &Path, dst: &Path) -> HarnessResult<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| HarnessError::Io(e.into()))?;
        if entry.depth() == 0 {
            continue;
        }
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(rel);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = std::fs::read_link(entry.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(link, &target)?;
            #[cfg(not(unix))]
            let _ = link;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Write permission grants into the profile clone's permission database,
/// matching the browser's `moz_perms` schema.
fn apply_scoped_exceptions(profile: &Path, exceptions: &[ScopedException]) -> HarnessResult<()> {
    if exceptions.is_empty() {
        return Ok(());
    }

    let conn = rusqlite::Connection::open(profile.join("permissions.sqlite"))?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS moz_perms (\
            id INTEGER PRIMARY KEY, \
            origin TEXT, \
            type TEXT, \
            permission INTEGER, \
            expireType INTEGER, \
            expireTime INTEGER, \
            modificationTime INTEGER)",
    )?;

    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    for exception in exceptions {
        debug!(
            "Granting {} permission to {}",
            exception.permission, exception.origin
        );
        conn.execute(
            "INSERT INTO moz_perms (origin, type, permission, expireType, expireTime, modificationTime) \
             VALUES (?1, ?2, 1, 0, 0, ?3)",
            rusqlite::params![exception.origin, exception.permission, now_ms],
        )?;
    }
    Ok(())
}

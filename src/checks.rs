//! Assertion scenarios - the privacy behaviors the harness verifies
//!
//! Every scenario follows the same shape: launch a session with
//! scenario-specific options, drive and observe it, assert, and finish the
//! session so teardown runs on every exit path.

use tokio::time::sleep;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};
use crate::integrity::{assert_unchanged, hash_tree};
use crate::session::{ScopedException, Session};
use crate::suite::HarnessConfig;
use crate::wait::{wait_until, Observation};

/// Marker element the check page renders once it sees an anonymized
/// connection.
const ANONYMIZED_MARKER: &str = "h1.on";

/// Placeholder element the script blocker substitutes for blocked content.
const SCRIPT_PLACEHOLDER: &str = ".__noscriptPlaceholder__";

/// A selector that matches nothing, for the not-found sanity check.
const MISSING_SELECTOR: &str = ".__nosuch_class_exist";

/// The check page must report an anonymized connection.
pub async fn check_page_marker(cfg: &HarnessConfig) -> HarnessResult<()> {
    let session = Session::launch(cfg.launch_options()).await?;
    let outcome = drive_marker_wait(&session, cfg).await;
    session.finish(outcome).await
}

async fn drive_marker_wait(session: &Session, cfg: &HarnessConfig) -> HarnessResult<()> {
    session.navigate(&cfg.check_url).await?;
    wait_for_element(session, cfg, "anonymized-connection marker", ANONYMIZED_MARKER).await?;
    Ok(())
}

/// A full visit session must not modify the bundle's pristine profile.
pub async fn profile_immutable(cfg: &HarnessConfig) -> HarnessResult<()> {
    let profile = cfg.bundle.profile_dir();
    let before = hash_tree(&profile)?;

    let session = Session::launch(cfg.launch_options()).await?;
    let outcome = drive_plain_visit(&session, cfg).await;
    session.finish(outcome).await?;

    let after = hash_tree(&profile)?;
    assert_unchanged(&profile, &before, &after)
}

async fn drive_plain_visit(session: &Session, cfg: &HarnessConfig) -> HarnessResult<()> {
    session.navigate(&cfg.check_url).await?;
    sleep(cfg.settle).await;
    Ok(())
}

/// Navigating to the HTTP probe URL must land on its HTTPS counterpart.
pub async fn https_upgrade(cfg: &HarnessConfig) -> HarnessResult<()> {
    let session = Session::launch(cfg.launch_options()).await?;
    let outcome = drive_https_upgrade(&session, cfg).await;
    session.finish(outcome).await
}

async fn drive_https_upgrade(session: &Session, cfg: &HarnessConfig) -> HarnessResult<()> {
    session.navigate(&cfg.http_probe_url).await?;

    let observed = wait_until(
        "HTTPS upgrade of the probe URL",
        cfg.page_timeout,
        cfg.poll_interval,
        || async move {
            let url = session.current_url().await?;
            if url.starts_with("https://") {
                Ok(Observation::satisfied(url))
            } else {
                Ok(Observation::pending(url))
            }
        },
    )
    .await?;

    if observed == cfg.https_probe_url {
        Ok(())
    } else {
        Err(HarnessError::Assertion {
            check: "https-upgrade".into(),
            expected: cfg.https_probe_url.clone(),
            observed,
        })
    }
}

/// With the rewrite preference off, the probe URL must stay plain HTTP.
/// Paired with `https_upgrade`, this shows the upgrade is gated on the
/// preference rather than a server-side redirect.
pub async fn https_upgrade_disabled(cfg: &HarnessConfig) -> HarnessResult<()> {
    let opts = cfg
        .launch_options()
        .with_pref(cfg.https_rewrite_pref.as_str(), false);
    let session = Session::launch(opts).await?;
    let outcome = drive_https_upgrade_disabled(&session, cfg).await;
    session.finish(outcome).await
}

async fn drive_https_upgrade_disabled(
    session: &Session,
    cfg: &HarnessConfig,
) -> HarnessResult<()> {
    session.navigate(&cfg.http_probe_url).await?;
    sleep(cfg.settle).await;

    let observed = session.current_url().await?;
    if observed == cfg.http_probe_url {
        Ok(())
    } else {
        // Also fires if the probe site itself started forwarding to HTTPS;
        // the probe URL must then be reconfigured to a non-forwarding site.
        Err(HarnessError::Assertion {
            check: "https-upgrade-disabled".into(),
            expected: cfg.http_probe_url.clone(),
            observed,
        })
    }
}

/// Blocked script content must be replaced by a placeholder element, behind
/// a dismissable alert interstitial. Afterwards, a selector that matches
/// nothing must fail with the distinct not-found error.
pub async fn script_blocking(cfg: &HarnessConfig) -> HarnessResult<()> {
    let session = Session::launch(cfg.launch_options()).await?;
    let outcome = drive_script_blocking(&session, cfg).await;
    session.finish(outcome).await
}

async fn drive_script_blocking(session: &Session, cfg: &HarnessConfig) -> HarnessResult<()> {
    session.navigate(&cfg.webgl_url).await?;

    let alert = wait_until(
        "blocked-content alert",
        cfg.page_timeout,
        cfg.poll_interval,
        || async move {
            match session.alert_text().await {
                Ok(text) => Ok(Observation::satisfied(text)),
                Err(e) if e.is_no_such_alert() => Ok(Observation::pending("no alert displayed")),
                Err(e) => Err(e),
            }
        },
    )
    .await?;
    debug!("Dismissing alert: {}", alert);
    session.dismiss_alert().await?;

    wait_for_element(session, cfg, "script-blocking placeholder", SCRIPT_PLACEHOLDER).await?;

    // Sanity check: an empty match must not be reported as success.
    match session.find(MISSING_SELECTOR).await {
        Err(e) if e.is_no_such_element() => Ok(()),
        Ok(()) => Err(HarnessError::Assertion {
            check: "script-blocking".into(),
            expected: format!("no element matching {}", MISSING_SELECTOR),
            observed: "an element was found".into(),
        }),
        Err(e) => Err(e),
    }
}

/// A screenshot of the check page must be a real, non-blank image.
pub async fn screenshot_capture(cfg: &HarnessConfig) -> HarnessResult<()> {
    let opts = cfg
        .launch_options()
        .with_exception(ScopedException::canvas(&cfg.check_url));
    let session = Session::launch(opts).await?;
    let outcome = drive_screenshot_capture(&session, cfg).await;
    session.finish(outcome).await
}

async fn drive_screenshot_capture(session: &Session, cfg: &HarnessConfig) -> HarnessResult<()> {
    session.navigate(&cfg.check_url).await?;
    sleep(cfg.settle).await;

    let path = cfg.screenshot_dir.join("check-page.png");
    let bytes = session.screenshot_to_file(&path).await?;

    let (width, height) = image::image_dimensions(&path)?;
    debug!("Screenshot is {}x{}, {} bytes", width, height, bytes);

    // A blank capture of the check page comes out around 5 KB; a real one
    // is well past the threshold.
    if bytes > cfg.screenshot_min_bytes {
        Ok(())
    } else {
        Err(HarnessError::Assertion {
            check: "screenshot-capture".into(),
            expected: format!("screenshot larger than {} bytes", cfg.screenshot_min_bytes),
            observed: format!("{} bytes at {}", bytes, path.display()),
        })
    }
}

/// Wait until an element matching `selector` is present; a timeout reports
/// the actual page title as the last observed state.
async fn wait_for_element(
    session: &Session,
    cfg: &HarnessConfig,
    what: &str,
    selector: &str,
) -> HarnessResult<()> {
    wait_until(what, cfg.page_timeout, cfg.poll_interval, || async move {
        match session.find(selector).await {
            Ok(()) => Ok(Observation::satisfied(format!("{} present", selector))),
            Err(e) if e.is_no_such_element() => {
                let title = session
                    .title()
                    .await
                    .unwrap_or_else(|_| "<no title>".to_string());
                Ok(Observation::pending(format!("page title: {:?}", title)))
            }
            Err(e) => Err(e),
        }
    })
    .await?;
    Ok(())
}

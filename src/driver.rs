//! Driver process management - spawning and readiness-checking the
//! bundle's WebDriver server binary

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{HarnessError, HarnessResult};

/// Handle to a running WebDriver server process
#[derive(Debug)]
pub struct DriverHandle {
    child: Child,
    endpoint: String,
    pub port: u16,
    stopped: bool,
}

impl DriverHandle {
    /// Spawn the WebDriver server and wait until it reports ready
    pub async fn spawn(config: DriverConfig) -> HarnessResult<Self> {
        let port = config.port.unwrap_or_else(find_free_port);
        let endpoint = format!("http://127.0.0.1:{}", port);

        info!("Spawning WebDriver server on port {}", port);

        let mut cmd = Command::new(&config.binary);
        cmd.arg("--host")
            .arg("127.0.0.1")
            .arg("--port")
            .arg(port.to_string());

        match &config.log_path {
            Some(path) => {
                let log = std::fs::File::create(path)?;
                cmd.stdout(log.try_clone()?).stderr(log);
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        let child = cmd.spawn().map_err(|e| {
            HarnessError::DriverStartup(format!(
                "Failed to spawn {}: {}",
                config.binary.display(),
                e
            ))
        })?;

        let handle = DriverHandle {
            child,
            endpoint: endpoint.clone(),
            port,
            stopped: false,
        };

        handle.wait_for_ready(config.startup_timeout).await?;

        info!("Driver is ready at {}", endpoint);
        Ok(handle)
    }

    /// Poll the driver's /status endpoint until it reports ready
    async fn wait_for_ready(&self, timeout: Duration) -> HarnessResult<()> {
        let status_url = format!("{}/status", self.endpoint);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout {
            attempts += 1;

            match client.get(&status_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    match resp.json::<serde_json::Value>().await {
                        Ok(body) if body["value"]["ready"] == serde_json::json!(true) => {
                            return Ok(());
                        }
                        Ok(_) => {
                            warn!("Driver is up but not ready to accept a session");
                        }
                        Err(e) => {
                            warn!("Unparseable driver status: {}", e);
                        }
                    }
                }
                Ok(resp) => {
                    warn!("Driver status endpoint returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for driver to start...");
                    }
                    // Connection refused is expected while the driver is starting
                    if !e.is_connect() {
                        warn!("Driver status check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(100)).await;
        }

        Err(HarnessError::DriverUnready { attempts })
    }

    /// Base URL the WebDriver client should connect to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Stop the driver process; idempotent
    pub fn stop(&mut self) -> HarnessResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        info!("Stopping driver (pid: {})", self.child.id());

        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        // Force kill if still running
        let _ = self.child.kill();
        let _ = self.child.wait();

        Ok(())
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Configuration for spawning the WebDriver server
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Path to the driver binary
    pub binary: PathBuf,

    /// Port to listen on (None = find free port)
    pub port: Option<u16>,

    /// Timeout for driver startup
    pub startup_timeout: Duration,

    /// File to capture driver output (None = discard)
    pub log_path: Option<PathBuf>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("geckodriver"),
            port: None,
            startup_timeout: Duration::from_secs(15),
            log_path: None,
        }
    }
}

/// Find a free port to use
fn find_free_port() -> u16 {
    use std::net::TcpListener;

    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to find free port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

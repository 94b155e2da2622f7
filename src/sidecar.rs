//! Local inference server supervision
//!
//! Restarts `ollama serve` as a detached process and waits for its health
//! endpoint. Process control and health probing sit behind traits so the
//! readiness loop runs without a real server.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::{Error, Result};

/// Default local server address
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Timeout for a single health probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Answers whether the server is ready
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe once
    async fn is_ready(&self) -> bool;
}

/// Starts and stops server processes
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Terminate any running instance
    ///
    /// # Errors
    ///
    /// Returns error if the termination command cannot be run
    async fn terminate_existing(&self) -> Result<()>;

    /// Launch a new detached instance
    ///
    /// # Errors
    ///
    /// Returns `Error::Sidecar` if the binary is missing or fails to spawn
    async fn launch(&self) -> Result<()>;
}

/// Probes `GET {base}/api/version`
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthProbe {
    /// Create a probe for the server at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: format!("{}/api/version", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn is_ready(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "health probe failed");
                false
            }
        }
    }
}

/// Controls the `ollama` binary found on `PATH`
#[derive(Debug)]
pub struct OllamaProcess {
    binary: String,
    child: Mutex<Option<Child>>,
}

impl OllamaProcess {
    /// Control the binary named `binary`
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            child: Mutex::new(None),
        }
    }
}

impl Default for OllamaProcess {
    fn default() -> Self {
        Self::new("ollama")
    }
}

#[async_trait]
impl ProcessControl for OllamaProcess {
    async fn terminate_existing(&self) -> Result<()> {
        #[cfg(windows)]
        let image = format!("{}.exe", self.binary);
        #[cfg(windows)]
        let status = Command::new("taskkill")
            .args(["/F", "/IM", image.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        #[cfg(not(windows))]
        let status = Command::new("pkill")
            .args(["-x", self.binary.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        // Non-zero usually means nothing was running
        tracing::debug!(binary = %self.binary, code = ?status.code(), "terminated existing instances");
        Ok(())
    }

    async fn launch(&self) -> Result<()> {
        let path = which::which(&self.binary)
            .map_err(|e| Error::Sidecar(format!("{} not found on PATH: {e}", self.binary)))?;

        let mut command = Command::new(&path);
        command
            .arg("serve")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        command.process_group(0);

        #[cfg(windows)]
        {
            const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;
            command.creation_flags(CREATE_NEW_CONSOLE);
        }

        let child = command
            .spawn()
            .map_err(|e| Error::Sidecar(format!("failed to launch {}: {e}", path.display())))?;

        tracing::info!(binary = %path.display(), pid = ?child.id(), "launched inference server");

        if let Ok(mut slot) = self.child.lock() {
            *slot = Some(child);
        }
        Ok(())
    }
}

/// Timing of the restart and readiness loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Health polls after launch
    pub polls: u32,
    /// Sleep before each poll
    pub interval: Duration,
    /// Wait between termination and launch
    pub settle: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            polls: 5,
            interval: Duration::from_secs(3),
            settle: Duration::from_secs(2),
        }
    }
}

/// Supervises the local inference server
#[derive(Clone)]
pub struct SidecarManager {
    process: Arc<dyn ProcessControl>,
    probe: Arc<dyn HealthProbe>,
    policy: ReadinessPolicy,
}

impl std::fmt::Debug for SidecarManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidecarManager")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl SidecarManager {
    /// Supervise `ollama` serving at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: &str, policy: ReadinessPolicy) -> Result<Self> {
        Ok(Self::with_parts(
            Arc::new(OllamaProcess::default()),
            Arc::new(HttpHealthProbe::new(base_url)?),
            policy,
        ))
    }

    /// Build from explicit collaborators
    #[must_use]
    pub fn with_parts(
        process: Arc<dyn ProcessControl>,
        probe: Arc<dyn HealthProbe>,
        policy: ReadinessPolicy,
    ) -> Self {
        Self {
            process,
            probe,
            policy,
        }
    }

    /// Probe once without restarting
    pub async fn is_healthy(&self) -> bool {
        self.probe.is_ready().await
    }

    /// Restart the server and wait until it answers
    ///
    /// Returns `false` if the launch fails or every poll fails.
    pub async fn ensure_running(&self) -> bool {
        if let Err(e) = self.process.terminate_existing().await {
            tracing::warn!(error = %e, "failed to terminate existing server");
        }

        tokio::time::sleep(self.policy.settle).await;

        if let Err(e) = self.process.launch().await {
            tracing::error!(error = %e, "failed to launch server");
            return false;
        }

        for poll in 1..=self.policy.polls {
            tokio::time::sleep(self.policy.interval).await;
            if self.probe.is_ready().await {
                tracing::info!(poll, "inference server ready");
                return true;
            }
            tracing::debug!(poll, polls = self.policy.polls, "inference server not ready yet");
        }

        tracing::warn!(polls = self.policy.polls, "inference server did not become ready");
        false
    }
}

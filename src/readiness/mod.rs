//! Readiness checks.
//!
//! A [`ReadinessCheck`] is a stateless probe retried at a fixed interval until
//! it passes or its timeout elapses. Tasks with checks are only considered
//! ready, and their dependents only start, once every check has passed.
//!
//! Three probes are supported:
//!
//! - **port**: a TCP connect to `host:port` succeeds
//! - **http**: a request with the given method gets a status below 400
//! - **command**: a probe command exits with status 0
//!
//! The timeout bounds the whole retry loop, including an in-flight attempt, so
//! `wait` never blocks much past it.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use reqwest::Method;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, trace};

use crate::execution::CommandLine;

/// Default overall timeout for a check.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default pause between attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound for a single connect or request attempt.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

const DEFAULT_HOST: &str = "127.0.0.1";

/// Errors raised by readiness checks.
#[derive(Debug, Error)]
pub enum ReadinessError {
    /// The target did not become reachable in time.
    #[error("readiness check {target} did not pass within {timeout:?}")]
    Timeout { target: String, timeout: Duration },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// What a check probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// TCP connect.
    Port { host: String, port: u16 },
    /// HTTP request; any status below 400 passes.
    Http {
        host: String,
        port: u16,
        method: Method,
        path: String,
    },
    /// Probe command; exit status 0 passes.
    Command {
        command: CommandLine,
        cwd: Option<PathBuf>,
    },
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::Port { host, port } => write!(f, "port {}:{}", host, port),
            Probe::Http {
                host,
                port,
                method,
                path,
            } => write!(f, "{} http://{}:{}{}", method, host, port, path),
            Probe::Command { command, .. } => write!(f, "command `{}`", command),
        }
    }
}

/// A probe plus its retry timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessCheck {
    probe: Probe,
    timeout: Duration,
    interval: Duration,
}

impl ReadinessCheck {
    fn with_probe(probe: Probe) -> Self {
        Self {
            probe,
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Check that something accepts TCP connections on `port` (loopback by default).
    pub fn port(port: u16) -> Self {
        Self::with_probe(Probe::Port {
            host: DEFAULT_HOST.to_string(),
            port,
        })
    }

    /// Check that an HTTP server on `port` answers `method /` without an error status.
    pub fn http(port: u16, method: Method) -> Self {
        Self::with_probe(Probe::Http {
            host: DEFAULT_HOST.to_string(),
            port,
            method,
            path: "/".to_string(),
        })
    }

    /// Check that a probe command exits with status 0.
    pub fn command(command: CommandLine) -> Self {
        Self::with_probe(Probe::Command { command, cwd: None })
    }

    /// Builder: probe another host. Ignored for command probes.
    pub fn host(mut self, new_host: impl Into<String>) -> Self {
        match &mut self.probe {
            Probe::Port { host, .. } | Probe::Http { host, .. } => *host = new_host.into(),
            Probe::Command { .. } => {}
        }
        self
    }

    /// Builder: request path for HTTP probes.
    pub fn path(mut self, new_path: impl Into<String>) -> Self {
        if let Probe::Http { path, .. } = &mut self.probe {
            let new_path = new_path.into();
            *path = if new_path.starts_with('/') {
                new_path
            } else {
                format!("/{}", new_path)
            };
        }
        self
    }

    /// Builder: working directory for command probes.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        if let Probe::Command { cwd, .. } = &mut self.probe {
            *cwd = Some(dir.into());
        }
        self
    }

    /// Builder: overall timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder: pause between attempts.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    /// Human-readable description of the target.
    pub fn target(&self) -> String {
        self.probe.to_string()
    }

    /// Retry the probe until it passes or the timeout elapses.
    pub async fn wait(&self) -> Result<(), ReadinessError> {
        let client = match &self.probe {
            Probe::Http { .. } => Some(
                reqwest::Client::builder()
                    .timeout(ATTEMPT_TIMEOUT)
                    .no_proxy()
                    .build()
                    .map_err(|e| ReadinessError::Client(e.to_string()))?,
            ),
            _ => None,
        };

        let started = Instant::now();
        let attempts = timeout(self.timeout, async {
            let mut attempts = 0u32;
            loop {
                attempts += 1;
                if self.probe_once(client.as_ref()).await {
                    return attempts;
                }
                trace!(target = %self.probe, attempt = attempts, "not ready yet");
                sleep(self.interval).await;
            }
        })
        .await
        .map_err(|_| ReadinessError::Timeout {
            target: self.target(),
            timeout: self.timeout,
        })?;

        debug!(
            target = %self.probe,
            attempts = attempts,
            elapsed_ms = %started.elapsed().as_millis(),
            "readiness check passed"
        );
        Ok(())
    }

    async fn probe_once(&self, client: Option<&reqwest::Client>) -> bool {
        match &self.probe {
            Probe::Port { host, port } => {
                matches!(
                    timeout(ATTEMPT_TIMEOUT, TcpStream::connect((host.as_str(), *port))).await,
                    Ok(Ok(_))
                )
            }
            Probe::Http {
                host,
                port,
                method,
                path,
            } => {
                let Some(client) = client else {
                    return false;
                };
                let url = format!("http://{}:{}{}", host, port, path);
                match client.request(method.clone(), &url).send().await {
                    Ok(response) => {
                        let status = response.status();
                        !status.is_client_error() && !status.is_server_error()
                    }
                    Err(_) => false,
                }
            }
            Probe::Command { command, cwd } => {
                let mut cmd = command.to_command();
                if let Some(dir) = cwd {
                    cmd.current_dir(dir);
                }
                cmd.stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .kill_on_drop(true);
                matches!(cmd.status().await, Ok(status) if status.success())
            }
        }
    }
}

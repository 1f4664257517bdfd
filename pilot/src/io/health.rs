//! Readiness checks for the supervised server.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use tracing::{debug, instrument};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(400);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// A single readiness check. Must never panic or error; failure is `false`.
pub trait HealthProbe {
    fn check(&self, url: &str) -> bool;
}

/// HTTP GET probe; healthy iff the response status is 200.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    agent: ureq::Agent,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(PROBE_TIMEOUT).build(),
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthProbe for HttpProbe {
    fn check(&self, url: &str) -> bool {
        match self.agent.get(url).call() {
            Ok(response) => response.status() == 200,
            Err(ureq::Error::Status(code, _)) => {
                debug!(url, code, "health probe got error status");
                false
            }
            Err(err) => {
                debug!(url, err = %err, "health probe failed");
                false
            }
        }
    }
}

/// Probe `url` up to `max_attempts` times, sleeping `interval` between attempts.
///
/// Returns on the first success. Worst-case wait is `(max_attempts - 1) * interval`
/// plus the probes themselves.
#[instrument(skip(probe), fields(interval_ms = interval.as_millis() as u64))]
pub fn poll_health<P: HealthProbe + ?Sized>(
    probe: &P,
    url: &str,
    max_attempts: u32,
    interval: Duration,
) -> bool {
    for attempt in 1..=max_attempts {
        if attempt > 1 {
            thread::sleep(interval);
        }
        if probe.check(url) {
            debug!(attempt, "service healthy");
            return true;
        }
    }
    debug!(max_attempts, "service not healthy after all attempts");
    false
}

/// Whether something accepts TCP connections on `host:port`.
pub fn is_server_running(host: &str, port: u16) -> bool {
    let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(err) => {
            debug!(host, port, err = %err, "cannot resolve server address");
            return false;
        }
    };
    addrs
        .iter()
        .any(|addr| TcpStream::connect_timeout(addr, CONNECT_TIMEOUT).is_ok())
}

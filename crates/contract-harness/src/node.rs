//! Ephemeral `anvil` node for a test run.

use std::io::Read;
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use error_stack::{Report, ResultExt};

use crate::config::NodeConfig;
use crate::constants::PREFERRED_NODE_PORTS;
use crate::errors::{HarnessError, HarnessResult};
use crate::rpc::EvmRpc;

const READINESS_PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// A locally spawned anvil process. The process is killed on drop.
pub struct AnvilNode {
    process: Option<Child>,
    pub port: u16,
    pub url: String,
    pub chain_id: u64,
}

impl AnvilNode {
    /// Check if anvil is installed
    pub fn is_available() -> bool {
        Command::new("anvil")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Spawn anvil with deterministic, pre-funded accounts and wait until it
    /// answers JSON-RPC.
    pub async fn spawn(config: &NodeConfig) -> HarnessResult<Self> {
        if !Self::is_available() {
            return Err(Report::new(HarnessError::NodeUnavailable(
                "anvil not found; install Foundry: curl -L https://foundry.paradigm.xyz | bash"
                    .to_string(),
            )));
        }

        let port = if config.port == 0 { find_available_port()? } else { config.port };
        log::info!("starting anvil on port {}", port);

        let mut command = Command::new("anvil");
        command
            .arg("--port")
            .arg(port.to_string())
            .arg("--accounts")
            .arg(config.accounts.to_string())
            .arg("--balance")
            .arg(config.balance_eth.to_string())
            .arg("--mnemonic")
            .arg(&config.mnemonic)
            .arg("--chain-id")
            .arg(config.chain_id.to_string())
            .arg("--silent");
        if let Some(block_time) = config.block_time {
            command.arg("--block-time").arg(block_time.to_string());
        }

        let mut child = command
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Report::new(HarnessError::NodeUnavailable(e.to_string())))
            .attach_printable("Failed to spawn anvil")?;

        let url = format!("http://127.0.0.1:{}", port);
        let probe = EvmRpc::new(&url)?;
        let startup_timeout = Duration::from_millis(config.startup_timeout_ms);
        let started = Instant::now();
        while started.elapsed() < startup_timeout {
            tokio::time::sleep(READINESS_PROBE_INTERVAL).await;
            if let Ok(Some(status)) = child.try_wait() {
                let stderr = read_stderr(&mut child);
                return Err(Report::new(HarnessError::NodeUnavailable(format!(
                    "anvil exited during startup with {}",
                    status
                )))
                .attach_printable(stderr));
            }
            match probe.get_chain_id().await {
                Ok(chain_id) => {
                    log::info!(
                        "anvil ready at {} (pid {}, chain {}) after {} ms",
                        url,
                        child.id(),
                        chain_id,
                        started.elapsed().as_millis()
                    );
                    drain_stderr(&mut child);
                    return Ok(Self { process: Some(child), port, url, chain_id: config.chain_id });
                }
                Err(e) => log::debug!("anvil not ready yet: {}", e.current_context()),
            }
        }

        let _ = child.kill();
        let _ = child.wait();
        Err(Report::new(HarnessError::NodeUnavailable(format!(
            "anvil did not answer on port {} within {} ms",
            port, config.startup_timeout_ms
        ))))
    }

    pub fn client(&self) -> HarnessResult<EvmRpc> {
        EvmRpc::new(&self.url)
    }
}

impl Drop for AnvilNode {
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            log::info!("stopping anvil at {} (pid {})", self.url, process.id());
            let _ = process.kill();
            if let Err(e) = process.wait() {
                log::warn!("error waiting for anvil to exit: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for AnvilNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnvilNode")
            .field("url", &self.url)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

fn find_available_port() -> HarnessResult<u16> {
    for port in PREFERRED_NODE_PORTS {
        if TcpListener::bind(("127.0.0.1", port)).is_ok() {
            return Ok(port);
        }
    }

    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|e| Report::new(HarnessError::NodeUnavailable(e.to_string())))
        .attach_printable("No free local port for anvil")?;
    let port = listener
        .local_addr()
        .map_err(|e| Report::new(HarnessError::NodeUnavailable(e.to_string())))?
        .port();
    Ok(port)
}

fn read_stderr(child: &mut Child) -> String {
    let mut output = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut output);
    }
    output
}

/// Keep reading anvil's stderr for the life of the process so it never blocks
/// on a full pipe.
fn drain_stderr(child: &mut Child) {
    if let Some(mut stderr) = child.stderr.take() {
        std::thread::spawn(move || {
            let _ = std::io::copy(&mut stderr, &mut std::io::sink());
        });
    }
}

//! External Collaborator Interfaces (C10, §4.10): the adapter configuration
//! surface a host constructs in code. Generalized from the teacher's
//! `debug/manager.rs::SessionManager::create_session` per-language dispatch
//! (`adapters::{python,ruby,nodejs,rust,golang}`) into the generic
//! `{type, command, args, ...}` shape §4.10 names — this crate does not ship
//! per-language presets (see SPEC_FULL.md Non-goals).

use crate::error::{Error, Result};
use crate::transport::server::{DetectPort, ServerProcess, DEFAULT_PORT_DETECT_TIMEOUT};
use crate::transport::tcp::DEFAULT_CONNECT_TIMEOUT;
use crate::transport::{ServerTransport, StdioTransport, TcpTransport, Transport};
use std::sync::Arc;
use std::time::Duration;

/// `{type: "stdio"|"tcp"|"server", command?, args?, cwd?, env?, host?,
/// port?, detect_port?}` (§4.10).
#[derive(Clone)]
pub enum AdapterConfig {
    Stdio {
        command: String,
        args: Vec<String>,
        cwd: Option<String>,
        env: Vec<(String, String)>,
    },
    Tcp {
        host: String,
        port: u16,
        connect_timeout: Duration,
    },
    Server {
        command: String,
        args: Vec<String>,
        detect_port: DetectPort,
        port_detect_timeout: Duration,
        connect_timeout: Duration,
    },
}

impl std::fmt::Debug for AdapterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterConfig::Stdio { command, args, .. } => {
                f.debug_struct("Stdio").field("command", command).field("args", args).finish()
            }
            AdapterConfig::Tcp { host, port, .. } => {
                f.debug_struct("Tcp").field("host", host).field("port", port).finish()
            }
            AdapterConfig::Server { command, args, .. } => {
                f.debug_struct("Server").field("command", command).field("args", args).finish()
            }
        }
    }
}

impl AdapterConfig {
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        AdapterConfig::Stdio {
            command: command.into(),
            args,
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        AdapterConfig::Tcp {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn server(command: impl Into<String>, args: Vec<String>, detect_port: DetectPort) -> Self {
        AdapterConfig::Server {
            command: command.into(),
            args,
            detect_port,
            port_detect_timeout: DEFAULT_PORT_DETECT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// The `adapterID` value sent in the `initialize` request. Derived from
    /// the launch command, falling back to "tcp"/"server" for socket-based
    /// configs without a local command.
    pub fn adapter_id(&self) -> String {
        match self {
            AdapterConfig::Stdio { command, .. } => {
                std::path::Path::new(command)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or(command)
                    .to_string()
            }
            AdapterConfig::Tcp { host, port, .. } => format!("tcp:{host}:{port}"),
            AdapterConfig::Server { command, .. } => command.clone(),
        }
    }
}

/// An established (or about-to-be-spawned) connection to a debug adapter.
/// For `server` configs a connection shares a `ServerProcess` across
/// sibling sessions (§4.1, §4.3) — `Adapter::connect_child` reuses the same
/// process instead of respawning.
pub enum Adapter {
    Stdio(AdapterConfig),
    Tcp(AdapterConfig),
    Server {
        config: AdapterConfig,
        process: tokio::sync::OnceCell<Arc<ServerProcess>>,
    },
}

impl Adapter {
    pub fn new(config: AdapterConfig) -> Self {
        match &config {
            AdapterConfig::Stdio { .. } => Adapter::Stdio(config),
            AdapterConfig::Tcp { .. } => Adapter::Tcp(config),
            AdapterConfig::Server { .. } => Adapter::Server {
                config,
                process: tokio::sync::OnceCell::new(),
            },
        }
    }

    /// Open a fresh connection, spawning a process where the config calls
    /// for one.
    pub async fn connect(&self) -> Result<Arc<dyn Transport>> {
        match self {
            Adapter::Stdio(AdapterConfig::Stdio { command, args, cwd, env }) => {
                let transport = StdioTransport::spawn_with(command, args, cwd.as_deref(), Some(env))?;
                Ok(Arc::new(transport))
            }
            Adapter::Tcp(AdapterConfig::Tcp { host, port, connect_timeout }) => {
                let transport = TcpTransport::connect_with_timeout(host, *port, *connect_timeout).await?;
                Ok(Arc::new(transport))
            }
            Adapter::Server {
                config:
                    AdapterConfig::Server {
                        command,
                        args,
                        detect_port,
                        port_detect_timeout,
                        connect_timeout,
                    },
                process,
            } => {
                let proc = process
                    .get_or_try_init(|| async {
                        ServerProcess::spawn(command, args, detect_port.clone(), *port_detect_timeout).await
                    })
                    .await?;
                let transport = ServerTransport::connect(proc.clone(), *connect_timeout).await?;
                Ok(Arc::new(transport))
            }
            _ => Err(Error::Internal("adapter variant/config mismatch".to_string())),
        }
    }

    /// §4.3: "For `server` adapters the child reuses the parent's TCP
    /// endpoint; for `stdio` it respawns." Used by `startDebugging`.
    pub async fn connect_child(&self) -> Result<Arc<dyn Transport>> {
        self.connect().await
    }

    /// The `adapterID` to declare in `initialize` (§4.3).
    pub fn adapter_id(&self) -> String {
        match self {
            Adapter::Stdio(config) | Adapter::Tcp(config) => config.adapter_id(),
            Adapter::Server { config, .. } => config.adapter_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_id_defaults_to_the_command_basename() {
        let cfg = AdapterConfig::stdio("/usr/bin/debugpy-adapter", vec![]);
        assert_eq!(cfg.adapter_id(), "debugpy-adapter");
    }

    #[test]
    fn adapter_id_for_tcp_has_no_filesystem_command() {
        let cfg = AdapterConfig::tcp("127.0.0.1", 4711);
        assert_eq!(cfg.adapter_id(), "tcp:127.0.0.1:4711");
    }
}

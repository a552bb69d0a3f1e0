use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tokio::{spawn, task};
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::errors::{Result, TelloError};
use crate::listener::SharedListener;

pub const CONTROL_UDP_PORT: u16 = 8889;
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(250);

const MAX_RESPONSE_SIZE: usize = 256;

/// The command socket, talking to exactly one drone.
///
/// Only one command is ever in flight: the socket sits behind a fair async
/// mutex that is held from transmit until the response arrives or the
/// timeout expires, so concurrent callers are served in arrival order.
pub struct CommandChannel {
    sock: Mutex<UdpSocket>,
    local_addr: SocketAddr,
    open: AtomicBool,
    timeout: Duration,
    listener: SharedListener,
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("local_addr", &self.local_addr)
            .field("open", &self.is_open())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl CommandChannel {
    pub(crate) async fn bind(
        local_address: &str,
        drone_address: &str,
        timeout: Duration,
        listener: SharedListener,
    ) -> Result<Self> {
        info!("[Tello] CONNECT {local_address} → {drone_address}");
        let sock = UdpSocket::bind(local_address).await?;
        sock.connect(drone_address).await?;
        let local_addr = sock.local_addr()?;

        Ok(Self {
            sock: Mutex::new(sock),
            local_addr,
            open: AtomicBool::new(true),
            timeout,
            listener,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Stops accepting commands. A command already in flight still
    /// completes or times out.
    pub(crate) fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            info!("[Tello] command channel closed");
        }
    }

    /// Sends a command and waits for the drone's reply.
    pub async fn send(&self, command: &Command) -> Result<String> {
        let msg = command.to_string();
        let result = self.round_trip(&msg).await;

        if let Some(listener) = &self.listener {
            match &result {
                Ok(response) => listener.on_command_result(&msg, response),
                Err(err) => listener.on_command_error(&msg, &err.to_string()),
            }
        }

        result
    }

    /// Sends a command without waiting for it. The outcome only reaches the
    /// listener.
    pub fn dispatch(self: &Arc<Self>, command: Command) -> task::JoinHandle<()> {
        let channel = Arc::clone(self);
        spawn(async move {
            if let Err(err) = channel.send(&command).await {
                debug!("[Tello] {command} failed: {err}");
            }
        })
    }

    async fn round_trip(&self, msg: &str) -> Result<String> {
        if !self.is_open() {
            return Err(TelloError::SessionClosed);
        }

        let sock = self.sock.lock().await;

        // closed while queued behind another command
        if !self.is_open() {
            return Err(TelloError::SessionClosed);
        }

        debug!("[Tello] SEND {msg}");
        sock.send(msg.as_bytes()).await?;

        let mut buf = vec![0; MAX_RESPONSE_SIZE];
        let n = match timeout(self.timeout, sock.recv(&mut buf)).await {
            Ok(r) => r?,
            Err(_) => {
                warn!("[Tello] no response to {msg} within {:?}", self.timeout);
                return Err(TelloError::Timeout { command: msg.to_string(), timeout: self.timeout });
            }
        };
        buf.truncate(n);
        let response = String::from_utf8_lossy(&buf).into_owned();

        debug!("[Tello] RECEIVED {response}");

        Ok(response)
    }
}

use std::sync::Arc;

use tokio::time::Duration;

use crate::control::{CONTROL_UDP_PORT, DEFAULT_COMMAND_TIMEOUT};
use crate::listener::{SharedListener, TelloListener};
use crate::state::STATE_UDP_PORT;
use crate::video::*;

pub const DEFAULT_DRONE_HOST: &str = "192.168.10.1";

/// Tello drone connection and other usage options.
pub struct TelloOptions {
    pub(crate) drone_host: String,
    pub(crate) drone_port: u16,
    pub(crate) command_port: u16,
    pub(crate) video_port: u16,
    pub(crate) state_port: u16,
    pub(crate) command_timeout: Duration,
    pub(crate) listener: SharedListener,
    pub(crate) video_sender: Option<TelloVideoSender>,
}

impl Default for TelloOptions {
    fn default() -> Self {
        Self {
            drone_host: DEFAULT_DRONE_HOST.to_string(),
            drone_port: CONTROL_UDP_PORT,
            command_port: CONTROL_UDP_PORT,
            video_port: VIDEO_UDP_PORT,
            state_port: STATE_UDP_PORT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            listener: None,
            video_sender: None,
        }
    }
}

impl std::fmt::Debug for TelloOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelloOptions")
            .field("drone_host", &self.drone_host)
            .field("drone_port", &self.drone_port)
            .field("command_port", &self.command_port)
            .field("video_port", &self.video_port)
            .field("state_port", &self.state_port)
            .field("command_timeout", &self.command_timeout)
            .field("listener", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}

impl TelloOptions {
    /// The drone's address, `192.168.10.1:8889` unless the drone has joined
    /// another network in station mode.
    pub fn with_drone_address(&mut self, host: &str, port: u16) -> &mut Self {
        self.drone_host = host.to_string();
        self.drone_port = port;
        self
    }

    /// Local port for the command socket, 0 for any free port.
    pub fn with_command_port(&mut self, port: u16) -> &mut Self {
        self.command_port = port;
        self
    }

    /// Local port the drone sends video to.
    pub fn with_video_port(&mut self, port: u16) -> &mut Self {
        self.video_port = port;
        self
    }

    /// Local port the drone sends state to.
    pub fn with_state_port(&mut self, port: u16) -> &mut Self {
        self.state_port = port;
        self
    }

    /// How long to wait for the response to each command.
    pub fn with_command_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.command_timeout = timeout;
        self
    }

    /// Receive command results, errors and the end of the session.
    pub fn with_listener(&mut self, listener: Arc<dyn TelloListener>) -> &mut Self {
        self.listener = Some(listener);
        self
    }

    /// Request video from the drone as a stream of h264-encoded 720p YUV
    /// frames.
    ///
    /// Returns the receiver end of the channel used to pass on frames. Only
    /// the latest frame is kept, a slow reader skips frames rather than
    /// falling behind.
    ///
    pub fn with_video(&mut self) -> TelloVideoReceiver {
        match &self.video_sender {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = make_tello_video_channel();
                self.video_sender = Some(tx);
                rx
            }
        }
    }
}

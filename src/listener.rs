use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::errors::TelloError;
use crate::tello::EndReason;

/// One of the three UDP channels of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Command,
    Video,
    State,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Command => f.write_str("command"),
            Channel::Video => f.write_str("video"),
            Channel::State => f.write_str("state"),
        }
    }
}

/// Observer for command outcomes and session events.
///
/// Called from the session's background tasks, so implementations should
/// return quickly. All methods do nothing by default.
pub trait TelloListener: Send + Sync {
    /// A command got a response.
    fn on_command_result(&self, _command: &str, _response: &str) {}

    /// A command failed, timed out or was rejected.
    fn on_command_error(&self, _command: &str, _error: &str) {}

    /// A receive loop hit an error and carried on.
    fn on_channel_error(&self, _channel: Channel, _error: &TelloError) {}

    /// The session reached its terminal state.
    fn on_session_ended(&self, _reason: EndReason) {}
}

pub(crate) type SharedListener = Option<Arc<dyn TelloListener>>;

/// Pause after a failed receive before trying again, so a socket that keeps
/// failing doesn't spin the loop.
pub(crate) const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Reports a receive error on `channel` and waits out the backoff.
pub(crate) async fn receive_failed(channel: Channel, err: io::Error, listener: &SharedListener) {
    warn!("[{channel}] receive failed: {err}");
    if let Some(l) = listener {
        l.on_channel_error(channel, &TelloError::Transport(err));
    }
    sleep(RECEIVE_ERROR_BACKOFF).await;
}

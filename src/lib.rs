//! Client for the Tello SDK's UDP protocol.
//!
//! A session runs three channels against one drone: text commands with a
//! single request in flight at a time, the h264 video stream reassembled into
//! frames, and the state feed kept as a live snapshot. The drone ending the
//! session on the state channel stops all three.

mod command;
mod control;
mod decoder;
mod errors;
mod listener;
mod options;
mod state;
mod tello;
mod video;

pub use command::{clamp, Command, CommandArg, FlipDirection};
pub use command::{CURVE_SPEED_RANGE, DISTANCE_RANGE, RC_RANGE, ROTATION_RANGE, SPEED_RANGE};
pub use control::{CommandChannel, CONTROL_UDP_PORT, DEFAULT_COMMAND_TIMEOUT};
pub use decoder::{decode_frames, ParameterSets, VideoDecoder};
pub use errors::{DecoderError, Result, TelloError};
pub use listener::{Channel, TelloListener};
pub use options::{TelloOptions, DEFAULT_DRONE_HOST};
pub use state::{parse_state_message, StateMessage, TelemetrySnapshot, TelemetryStore, TelloState, Vector3};
pub use state::{END_SENTINEL, STATE_UDP_PORT};
pub use tello::{Connected, Disconnected, EndReason, SessionState, Tello};
pub use video::{is_terminal_fragment, make_tello_video_channel, FrameAccumulator};
pub use video::{TelloVideoFrame, TelloVideoReceiver, TelloVideoSender, VIDEO_HEIGHT, VIDEO_UDP_PORT, VIDEO_WIDTH};

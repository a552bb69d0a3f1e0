use tracing::{debug, info, warn};

use crate::errors::{DecoderError, Result, TelloError};
use crate::video::{TelloVideoFrame, TelloVideoReceiver};

/// Sequence parameter set the drone's h264 stream expects.
const TELLO_SPS: [u8; 20] = [
    0, 0, 0, 1, 103, 66, 0, 42, 149, 168, 30, 0, 137, 249, 102, 224, 32, 32, 32, 64,
];

/// Picture parameter set, followed by an SEI unit.
const TELLO_PPS: [u8; 17] = [0, 0, 0, 1, 104, 206, 60, 128, 0, 0, 0, 1, 6, 229, 1, 151, 128];

/// Codec configuration handed to a decoder before the first frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSets {
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
}

impl Default for ParameterSets {
    fn default() -> Self {
        Self { sps: TELLO_SPS.to_vec(), pps: TELLO_PPS.to_vec() }
    }
}

/// Something that turns encoded frames into pictures, eg a hardware codec.
pub trait VideoDecoder {
    fn configure(&mut self, params: &ParameterSets) -> std::result::Result<(), DecoderError>;

    fn decode(&mut self, frame: TelloVideoFrame) -> std::result::Result<(), DecoderError>;
}

/// Feeds the latest frame to `decoder` whenever a new one is published.
///
/// Configures the decoder first; a configuration failure is returned
/// straight away. Frames that arrive while the decoder is busy are skipped
/// in favour of the newest. Returns once the video channel has stopped.
pub async fn decode_frames<D>(
    mut frames: TelloVideoReceiver,
    decoder: &mut D,
    params: &ParameterSets,
) -> Result<()>
where
    D: VideoDecoder + ?Sized,
{
    decoder.configure(params).map_err(TelloError::DecoderConfig)?;
    info!("[Video] decoder configured");

    let mut decoded = 0usize;
    while frames.changed().await.is_ok() {
        let frame = frames.borrow_and_update().clone();
        let Some(frame) = frame else { continue };

        match decoder.decode(frame) {
            Ok(()) => decoded += 1,
            Err(err) => warn!("[Video] decoder error: {err}"),
        }
    }

    debug!("[Video] decoder finished after {decoded} frames");
    Ok(())
}

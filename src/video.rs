use std::net::SocketAddr;

use bytebuffer::ByteBuffer;
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, watch};
use tokio::{select, spawn, task};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::listener::{receive_failed, Channel, SharedListener};

pub const VIDEO_WIDTH: u32 = 960;
pub const VIDEO_HEIGHT: u32 = 720;

pub const VIDEO_UDP_PORT: u16 = 11111;

/// Largest datagram the drone sends on the video port.
const MAX_DATAGRAM_SIZE: usize = 1470;

/// Length of every datagram except the last one of a frame.
const FULL_DATAGRAM_SIZE: usize = 1460;

/// Transport header at the start of each datagram, not part of the stream.
const FRAGMENT_HEADER_SIZE: usize = 2;

/// Latest complete frame. Holds `None` until the first frame arrives.
pub type TelloVideoSender = watch::Sender<Option<TelloVideoFrame>>;
pub type TelloVideoReceiver = watch::Receiver<Option<TelloVideoFrame>>;

pub fn make_tello_video_channel() -> (TelloVideoSender, TelloVideoReceiver) {
    watch::channel(None)
}

/// A frame of video from the drone, one h264 access unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelloVideoFrame {
    pub data: Vec<u8>,
}

/// Whether a datagram of `len` bytes closes the current frame.
///
/// The drone doesn't mark frame boundaries: every fragment but the last is
/// exactly 1460 bytes. A frame whose last fragment happens to be 1460 bytes
/// long is therefore merged with the next one.
pub fn is_terminal_fragment(len: usize) -> bool {
    len != FULL_DATAGRAM_SIZE
}

/// Collects fragments until a frame boundary.
pub struct FrameAccumulator {
    buf: ByteBuffer,
}

impl std::fmt::Debug for FrameAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAccumulator").field("pending", &self.pending()).finish()
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self { buf: ByteBuffer::new() }
    }

    /// Number of stream bytes waiting for the end of their frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Appends one datagram, returning the frame it completes, if any.
    pub fn push(&mut self, datagram: &[u8]) -> Option<TelloVideoFrame> {
        if let Some(payload) = datagram.get(FRAGMENT_HEADER_SIZE..) {
            self.buf.write_bytes(payload);
        }

        if !is_terminal_fragment(datagram.len()) {
            return None;
        }

        let buf = std::mem::replace(&mut self.buf, ByteBuffer::new());
        if buf.len() == 0 {
            return None;
        }
        Some(TelloVideoFrame { data: buf.into_vec() })
    }
}

#[derive(Debug)]
pub(crate) struct VideoListener {
    local_addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: task::JoinHandle<()>,
}

impl VideoListener {
    pub(crate) async fn start_listening(
        port: u16,
        sender: TelloVideoSender,
        listener: SharedListener,
    ) -> Result<Self> {
        let local_address = format!("0.0.0.0:{port}");
        info!("[Video] START LISTENING at {local_address}");

        let sock = UdpSocket::bind(&local_address).await?;
        let local_addr = sock.local_addr()?;
        let (stop, mut stopped) = oneshot::channel();

        let task = spawn(async move {
            let mut frames = FrameAccumulator::new();
            let mut chunk = vec![0; MAX_DATAGRAM_SIZE];
            loop {
                let n = select! {
                    biased;
                    _ = &mut stopped => break,
                    r = sock.recv(&mut chunk) => match r {
                        Ok(n) => n,
                        Err(err) => {
                            receive_failed(Channel::Video, err, &listener).await;
                            continue;
                        }
                    }
                };

                if let Some(frame) = frames.push(&chunk[..n]) {
                    debug!("[Video] frame of {} bytes", frame.data.len());
                    sender.send_replace(Some(frame));
                }
            }
            debug!("[Video] dropped {} bytes of unfinished frame", frames.pending());
        });

        Ok(Self { local_addr, stop, task })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signals the loop to stop without waiting for it.
    pub(crate) fn cancel(self) {
        info!("[Video] STOP LISTENING (not waiting)");
        let _ = self.stop.send(());
    }

    pub(crate) async fn stop_listening(self) {
        info!("[Video] STOP LISTENING");
        let _ = self.stop.send(());
        if let Err(err) = self.task.await {
            warn!("[Video] listener task failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(len: usize, fill: u8) -> Vec<u8> {
        let mut d = vec![0xff, 0xee];
        d.resize(len, fill);
        d
    }

    #[test]
    fn only_1460_byte_datagrams_continue_a_frame() {
        assert!(!is_terminal_fragment(1460));
        assert!(is_terminal_fragment(1459));
        assert!(is_terminal_fragment(1461));
        assert!(is_terminal_fragment(800));
        assert!(is_terminal_fragment(0));
    }

    #[test]
    fn fragments_are_joined_without_headers() {
        let fragments = [fragment(1460, 1), fragment(1460, 2), fragment(800, 3)];
        let mut acc = FrameAccumulator::new();

        assert_eq!(acc.push(&fragments[0]), None);
        assert_eq!(acc.push(&fragments[1]), None);
        let frame = acc.push(&fragments[2]).expect("frame completes on the short fragment");

        let expected: Vec<u8> = fragments.iter().flat_map(|f| f[2..].to_vec()).collect();
        assert_eq!(frame.data.len(), 1458 + 1458 + 798);
        assert_eq!(frame.data, expected);
        assert_eq!(acc.pending(), 0);
    }

    #[test]
    fn single_short_datagram_is_a_frame() {
        let mut acc = FrameAccumulator::new();
        let frame = acc.push(&fragment(100, 7)).unwrap();
        assert_eq!(frame.data, vec![7; 98]);
    }

    #[test]
    fn full_length_final_fragment_never_completes() {
        // known ambiguity of the protocol, the frame stays pending
        let mut acc = FrameAccumulator::new();
        assert_eq!(acc.push(&fragment(1460, 1)), None);
        assert_eq!(acc.pending(), 1458);
    }

    #[test]
    fn header_only_datagrams_emit_nothing() {
        let mut acc = FrameAccumulator::new();
        assert_eq!(acc.push(&[0xff, 0xee]), None);
        assert_eq!(acc.push(&[0x01]), None);
        assert_eq!(acc.pending(), 0);
    }
}

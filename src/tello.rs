use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::sync::{oneshot, watch};
use tokio::{spawn, task};
use tracing::{debug, info};

use crate::command::{Command, FlipDirection};
use crate::control::CommandChannel;
use crate::errors::Result;
use crate::listener::SharedListener;
use crate::options::TelloOptions;
use crate::state::{StateListener, TelemetrySnapshot, TelemetryStore, TelloState};
use crate::video::{make_tello_video_channel, TelloVideoReceiver, VideoListener};

/// Lifecycle of a connected session. Only ever moves forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    ShuttingDown,
    Stopped,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The drone sent the end message on the state channel.
    DroneEnded,
    /// `stop` was called on the session.
    Requested,
}

// states
#[derive(Debug)]
pub struct Disconnected;

#[derive(Debug)]
pub struct Connected {
    session: Arc<Session>,
}

impl Drop for Connected {
    fn drop(&mut self) {
        self.session.abandon();
    }
}

#[derive(Debug)]
pub struct Tello<S = Disconnected> {
    state: S,
}

impl Default for Tello<Disconnected> {
    fn default() -> Self {
        Self::new()
    }
}

impl Tello<Disconnected> {
    pub fn new() -> Self {
        Self { state: Disconnected }
    }

    /// Connects with the default options.
    pub async fn connect(&self) -> Result<Tello<Connected>> {
        self.connect_with(TelloOptions::default()).await
    }

    /// Binds the command, state and video sockets, starts listening and puts
    /// the drone in command mode.
    pub async fn connect_with(&self, mut options: TelloOptions) -> Result<Tello<Connected>> {
        let drone_address = format!("{}:{}", options.drone_host, options.drone_port);
        let local_address = format!("0.0.0.0:{}", options.command_port);
        let listener = options.listener.take();

        let control = Arc::new(
            CommandChannel::bind(&local_address, &drone_address, options.command_timeout, listener.clone())
                .await?,
        );

        let telemetry = Arc::new(TelemetryStore::default());
        let (end_tx, end_rx) = oneshot::channel();
        let state_listener =
            StateListener::start_listening(options.state_port, telemetry.clone(), end_tx, listener.clone())
                .await?;

        let video_sender = match options.video_sender.take() {
            Some(tx) => tx,
            None => make_tello_video_channel().0,
        };
        let video = video_sender.subscribe();
        let video_listener =
            match VideoListener::start_listening(options.video_port, video_sender, listener.clone()).await {
                Ok(v) => v,
                Err(err) => {
                    state_listener.stop_listening().await;
                    return Err(err);
                }
            };

        let (state, _) = watch::channel(SessionState::Running);
        let session = Arc::new(Session {
            state,
            end_reason: OnceLock::new(),
            control,
            telemetry,
            video,
            state_address: state_listener.local_addr(),
            video_address: video_listener.local_addr(),
            listeners: Mutex::new(Some((video_listener, state_listener))),
            listener,
        });

        // weak, so dropping the handle still tears the session down
        let supervisor = Arc::downgrade(&session);
        spawn(async move {
            if end_rx.await.is_ok() {
                if let Some(session) = supervisor.upgrade() {
                    session.shutdown(EndReason::DroneEnded).await;
                }
            }
        });

        info!("[Tello] putting drone in command mode...");
        session.control.dispatch(Command::command());

        info!("[Tello] CONNECTED");

        Ok(Tello { state: Connected { session } })
    }
}

struct Session {
    state: watch::Sender<SessionState>,
    end_reason: OnceLock<EndReason>,
    control: Arc<CommandChannel>,
    telemetry: Arc<TelemetryStore>,
    video: TelloVideoReceiver,
    state_address: SocketAddr,
    video_address: SocketAddr,
    listeners: Mutex<Option<(VideoListener, StateListener)>>,
    listener: SharedListener,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &*self.state.borrow())
            .field("control", &self.control)
            .field("state_address", &self.state_address)
            .field("video_address", &self.video_address)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Stops video, then commands, then state. Whoever moves the session out
    /// of `Running` does the work; everyone else waits for `Stopped`.
    async fn shutdown(&self, reason: EndReason) {
        if !self.begin_shutdown() {
            let mut rx = self.state.subscribe();
            let _ = rx.wait_for(|s| *s == SessionState::Stopped).await;
            return;
        }

        info!("[Tello] SHUTTING DOWN ({reason:?})");

        let (video, state) = self.take_listeners();
        if let Some(video) = video {
            video.stop_listening().await;
        }
        self.control.close();
        if let Some(state) = state {
            state.stop_listening().await;
        }

        self.finish(reason);
    }

    /// Same order as `shutdown`, but only signals the loops; they release
    /// their sockets once the runtime next polls them.
    fn abandon(&self) {
        if !self.begin_shutdown() {
            return;
        }

        info!("[Tello] dropped while running, shutting down");

        let (video, state) = self.take_listeners();
        if let Some(video) = video {
            video.cancel();
        }
        self.control.close();
        if let Some(state) = state {
            state.cancel();
        }

        self.finish(EndReason::Requested);
    }

    /// Moves `Running` to `ShuttingDown`. True for the one caller that did.
    fn begin_shutdown(&self) -> bool {
        self.state.send_if_modified(|s| {
            if *s == SessionState::Running {
                *s = SessionState::ShuttingDown;
                true
            } else {
                false
            }
        })
    }

    fn take_listeners(&self) -> (Option<VideoListener>, Option<StateListener>) {
        match self.listeners.lock().unwrap_or_else(PoisonError::into_inner).take() {
            Some((video, state)) => (Some(video), Some(state)),
            None => (None, None),
        }
    }

    fn finish(&self, reason: EndReason) {
        let _ = self.end_reason.set(reason);
        self.state.send_replace(SessionState::Stopped);
        info!("[Tello] STOPPED");

        if let Some(listener) = &self.listener {
            listener.on_session_ended(reason);
        }
    }
}

impl Tello<Connected> {
    fn session(&self) -> &Session {
        &self.state.session
    }

    pub fn session_state(&self) -> SessionState {
        *self.session().state.borrow()
    }

    /// Stops all three channels. Does nothing once the session has stopped.
    ///
    /// Dropping a running session stops it too, without waiting for the
    /// receive loops to finish.
    pub async fn stop(&self) {
        self.session().shutdown(EndReason::Requested).await;
    }

    /// Waits for the session to stop, by request or because the drone ended
    /// it.
    pub async fn ended(&self) -> EndReason {
        let mut rx = self.session().state.subscribe();
        let _ = rx.wait_for(|s| *s == SessionState::Stopped).await;
        debug!("[Tello] session ended");
        self.session().end_reason.get().copied().unwrap_or(EndReason::Requested)
    }

    /// The latest value of every state field received so far.
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.session().telemetry.snapshot()
    }

    /// Typed view of the telemetry.
    pub fn drone_state(&self) -> Result<TelloState> {
        TelloState::from_snapshot(&self.telemetry())
    }

    /// Receiver for the latest complete video frame.
    pub fn video_frames(&self) -> TelloVideoReceiver {
        self.session().video.clone()
    }

    pub fn command_address(&self) -> SocketAddr {
        self.session().control.local_addr()
    }

    pub fn state_address(&self) -> SocketAddr {
        self.session().state_address
    }

    pub fn video_address(&self) -> SocketAddr {
        self.session().video_address
    }

    /// Sends a command and waits for the drone's response.
    pub async fn send(&self, command: Command) -> Result<String> {
        self.session().control.send(&command).await
    }

    /// Sends a command without waiting; the outcome goes to the listener.
    pub fn dispatch(&self, command: Command) -> task::JoinHandle<()> {
        self.session().control.dispatch(command)
    }

    pub async fn take_off(&self) -> Result<String> {
        self.send(Command::takeoff()).await
    }

    pub async fn land(&self) -> Result<String> {
        self.send(Command::land()).await
    }

    pub async fn start_video(&self) -> Result<String> {
        self.send(Command::streamon()).await
    }

    pub async fn stop_video(&self) -> Result<String> {
        self.send(Command::streamoff()).await
    }

    /// Stops the motors immediately, the drone drops like a brick.
    pub async fn emergency_stop(&self) -> Result<String> {
        self.send(Command::emergency()).await
    }

    pub async fn hover(&self) -> Result<String> {
        self.send(Command::stop()).await
    }

    pub async fn move_up(&self, cm: i32) -> Result<String> {
        self.send(Command::up(cm)).await
    }

    pub async fn move_down(&self, cm: i32) -> Result<String> {
        self.send(Command::down(cm)).await
    }

    pub async fn move_left(&self, cm: i32) -> Result<String> {
        self.send(Command::left(cm)).await
    }

    pub async fn move_right(&self, cm: i32) -> Result<String> {
        self.send(Command::right(cm)).await
    }

    pub async fn move_forward(&self, cm: i32) -> Result<String> {
        self.send(Command::forward(cm)).await
    }

    pub async fn move_back(&self, cm: i32) -> Result<String> {
        self.send(Command::back(cm)).await
    }

    pub async fn turn_clockwise(&self, degrees: i32) -> Result<String> {
        self.send(Command::cw(degrees)).await
    }

    pub async fn turn_counterclockwise(&self, degrees: i32) -> Result<String> {
        self.send(Command::ccw(degrees)).await
    }

    pub async fn flip(&self, direction: FlipDirection) -> Result<String> {
        self.send(Command::flip(direction)).await
    }

    pub async fn go_to(&self, x: i32, y: i32, z: i32, speed: i32) -> Result<String> {
        self.send(Command::go(x, y, z, speed)).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn curve(&self, x1: i32, y1: i32, z1: i32, x2: i32, y2: i32, z2: i32, speed: i32) -> Result<String> {
        self.send(Command::curve(x1, y1, z1, x2, y2, z2, speed)).await
    }

    pub async fn set_speed(&self, speed: i32) -> Result<String> {
        self.send(Command::speed(speed)).await
    }

    /// Remote control, each axis in [-100, 100]. The drone doesn't answer
    /// these so nothing is awaited.
    pub fn remote_control(&self, left_right: i32, forwards_backwards: i32, up_down: i32, yaw: i32) {
        self.dispatch(Command::rc(left_right, forwards_backwards, up_down, yaw));
    }

    /// Speed in cm/s.
    pub async fn get_speed(&self) -> Result<String> {
        self.send(Command::get_speed()).await
    }

    pub async fn get_battery(&self) -> Result<String> {
        self.send(Command::get_battery()).await
    }

    pub async fn get_flight_time(&self) -> Result<String> {
        self.send(Command::get_time()).await
    }

    pub async fn get_height(&self) -> Result<String> {
        self.send(Command::get_height()).await
    }

    pub async fn get_temperature(&self) -> Result<String> {
        self.send(Command::get_temperature()).await
    }

    pub async fn get_attitude(&self) -> Result<String> {
        self.send(Command::get_attitude()).await
    }

    pub async fn get_barometer(&self) -> Result<String> {
        self.send(Command::get_barometer()).await
    }

    pub async fn get_acceleration(&self) -> Result<String> {
        self.send(Command::get_acceleration()).await
    }

    pub async fn get_tof(&self) -> Result<String> {
        self.send(Command::get_tof()).await
    }

    pub async fn get_wifi_snr(&self) -> Result<String> {
        self.send(Command::get_wifi_snr()).await
    }
}

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::{select, spawn, task};
use tracing::{debug, info, trace, warn};

use crate::errors::{Result, TelloError};
use crate::listener::{receive_failed, Channel, SharedListener};

pub const STATE_UDP_PORT: u16 = 8890;

const MAX_STATE_SIZE: usize = 1024;

/// Sent by the drone in place of a state message when the session is over.
pub const END_SENTINEL: &str = "end";

/// Latest raw value for every telemetry key seen so far.
pub type TelemetrySnapshot = HashMap<String, String>;

/// A decoded state datagram.
#[derive(Debug, PartialEq, Eq)]
pub enum StateMessage<'a> {
    End,
    Entries(Vec<(&'a str, &'a str)>),
}

/// Parses a state string received from the drone.
///
/// Example message:
/// "mid:-1;x:-100;y:-100;z:-100;mpry:-1,-1,-1;pitch:0;roll:0;yaw:-3;vgx:0;vgy:0;vgz:1;templ:58;temph:60;tof:71;h:50;bat:82;baro:-57.14;time:14;agx:17.00;agy:-4.00;agz:-956.00;"
///
/// Entries that aren't a single non-empty `key:value` pair are skipped.
pub fn parse_state_message(s: &str) -> StateMessage<'_> {
    if s == END_SENTINEL {
        return StateMessage::End;
    }

    StateMessage::Entries(
        s.split(';')
            .filter(|f| !f.is_empty())
            .filter_map(split_key_value)
            .collect(),
    )
}

fn split_key_value(kv: &str) -> Option<(&str, &str)> {
    let mut i = kv.split(':');
    match (i.next(), i.next(), i.next()) {
        (Some(k), Some(v), None) if !k.is_empty() && !v.is_empty() => Some((k, v)),
        _ => None,
    }
}

/// Telemetry shared between the state listener and its readers.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    map: RwLock<TelemetrySnapshot>,
}

impl TelemetryStore {
    pub fn update<'a>(&self, entries: impl IntoIterator<Item = (&'a str, &'a str)>) {
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        for (k, v) in entries {
            map.insert(k.to_string(), v.to_string());
        }
    }

    /// Copy of the telemetry as it is right now.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.map.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// The live state of the drone.
#[derive(Debug, Default, PartialEq)]
pub struct TelloState {
    pub roll: i16,
    pub pitch: i16,
    pub yaw: i16,
    pub height: i16,
    pub barometer: f32,
    pub battery: u8,
    pub time_of_flight: u16,
    pub motor_time: u16,
    pub temperature_low: i16,
    pub temperature_high: i16,
    pub velocity: Vector3<i16>,
    pub acceleration: Vector3<f32>,
}

#[derive(Debug, Default, PartialEq)]
pub struct Vector3<T> {
    pub x: T,
    pub y: T,
    pub z: T,
}

impl TelloState {
    /// Typed view of a telemetry snapshot. Keys that haven't been received
    /// keep their default.
    pub fn from_snapshot(snapshot: &TelemetrySnapshot) -> Result<TelloState> {
        let mut state = TelloState::default();

        for (k, v) in snapshot {
            match k.as_str() {
                "roll" => state.roll = value_as(v)?,
                "pitch" => state.pitch = value_as(v)?,
                "yaw" => state.yaw = value_as(v)?,
                "h" => state.height = value_as(v)?,
                "baro" => state.barometer = value_as(v)?,
                "bat" => state.battery = value_as(v)?,
                "tof" => state.time_of_flight = value_as(v)?,
                "time" => state.motor_time = value_as(v)?,
                "templ" => state.temperature_low = value_as(v)?,
                "temph" => state.temperature_high = value_as(v)?,
                "vgx" => state.velocity.x = value_as(v)?,
                "vgy" => state.velocity.y = value_as(v)?,
                "vgz" => state.velocity.z = value_as(v)?,
                "agx" => state.acceleration.x = value_as(v)?,
                "agy" => state.acceleration.y = value_as(v)?,
                "agz" => state.acceleration.z = value_as(v)?,
                _ => {}
            }
        }

        Ok(state)
    }
}

fn value_as<T: std::str::FromStr>(s: &str) -> Result<T> {
    s.parse::<T>().map_err(|_| TelloError::ParseError { msg: s.to_string() })
}

#[derive(Debug)]
pub(crate) struct StateListener {
    local_addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: task::JoinHandle<()>,
}

impl StateListener {
    /// Starts receiving state into `store`. `end` fires if the drone sends
    /// the end sentinel, after which the listener stops by itself.
    pub(crate) async fn start_listening(
        port: u16,
        store: Arc<TelemetryStore>,
        end: oneshot::Sender<()>,
        listener: SharedListener,
    ) -> Result<Self> {
        let local_address = format!("0.0.0.0:{port}");
        info!("[State] START LISTENING at {local_address}");

        let sock = UdpSocket::bind(&local_address).await?;
        let local_addr = sock.local_addr()?;
        let (stop, mut stopped) = oneshot::channel();

        let task = spawn(async move {
            let mut end = Some(end);
            let mut buf = vec![0; MAX_STATE_SIZE];
            loop {
                let n = select! {
                    biased;
                    _ = &mut stopped => break,
                    r = sock.recv(&mut buf) => match r {
                        Ok(n) => n,
                        Err(err) => {
                            receive_failed(Channel::State, err, &listener).await;
                            continue;
                        }
                    }
                };

                let raw_state = String::from_utf8_lossy(&buf[..n]);
                match parse_state_message(&raw_state) {
                    StateMessage::End => {
                        info!("[State] drone sent end of session");
                        if let Some(end) = end.take() {
                            let _ = end.send(());
                        }
                        break;
                    }
                    StateMessage::Entries(entries) => {
                        trace!("[State] {} entries", entries.len());
                        store.update(entries);
                    }
                }
            }
            debug!("[State] listener finished");
        });

        Ok(Self { local_addr, stop, task })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signals the loop to stop without waiting for it.
    pub(crate) fn cancel(self) {
        info!("[State] STOP LISTENING (not waiting)");
        let _ = self.stop.send(());
    }

    pub(crate) async fn stop_listening(self) {
        info!("[State] STOP LISTENING");
        let _ = self.stop.send(());
        if let Err(err) = self.task.await {
            warn!("[State] listener task failed: {err}");
        }
    }
}

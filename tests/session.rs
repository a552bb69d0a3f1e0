use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout, Instant};

use tello_udp::{
    decode_frames, Command, Connected, DecoderError, EndReason, ParameterSets, SessionState, Tello, TelloError,
    TelloListener, TelloOptions, TelloVideoFrame, VideoDecoder,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A drone that answers "ok" to everything and remembers what it was sent.
async fn stub_drone() -> (u16, Arc<Mutex<Vec<String>>>) {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = sock.local_addr().unwrap().port();
    let received = Arc::new(Mutex::new(vec![]));
    let log = received.clone();
    tokio::spawn(async move {
        let mut buf = [0u8; 256];
        while let Ok((n, from)) = sock.recv_from(&mut buf).await {
            log.lock().unwrap().push(String::from_utf8_lossy(&buf[..n]).into_owned());
            let _ = sock.send_to(b"ok", from).await;
        }
    });
    (port, received)
}

#[derive(Default)]
struct Recorder {
    ended: Mutex<Vec<EndReason>>,
    results: Mutex<Vec<(String, String)>>,
}

impl TelloListener for Recorder {
    fn on_command_result(&self, command: &str, response: &str) {
        self.results.lock().unwrap().push((command.into(), response.into()));
    }

    fn on_session_ended(&self, reason: EndReason) {
        self.ended.lock().unwrap().push(reason);
    }
}

async fn connect(recorder: Option<Arc<Recorder>>) -> (Tello<Connected>, Arc<Mutex<Vec<String>>>) {
    init_tracing();
    let (port, received) = stub_drone().await;
    let mut options = TelloOptions::default();
    options
        .with_drone_address("127.0.0.1", port)
        .with_command_port(0)
        .with_video_port(0)
        .with_state_port(0);
    if let Some(recorder) = recorder {
        options.with_listener(recorder);
    }
    let drone = Tello::new().connect_with(options).await.unwrap();
    (drone, received)
}

async fn send_to(port: u16, datagram: &[u8]) {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sock.send_to(datagram, ("127.0.0.1", port)).await.unwrap();
}

fn fragment(len: usize, fill: u8) -> Vec<u8> {
    let mut d = vec![0, 1];
    d.resize(len, fill);
    d
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting");
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn connect_enters_command_mode_then_commands_round_trip() {
    let recorder = Arc::new(Recorder::default());
    let (drone, received) = connect(Some(recorder.clone())).await;

    assert_eq!(drone.session_state(), SessionState::Running);
    wait_until(|| received.lock().unwrap().len() == 1).await;

    assert_eq!(drone.take_off().await.unwrap(), "ok");
    assert_eq!(drone.move_right(10).await.unwrap(), "ok");

    assert_eq!(*received.lock().unwrap(), vec!["command", "takeoff", "right 20"]);
    wait_until(|| recorder.results.lock().unwrap().len() == 3).await;

    drone.stop().await;
}

#[tokio::test]
async fn state_datagrams_update_the_snapshot() {
    let (drone, _) = connect(None).await;
    let port = drone.state_address().port();

    send_to(port, b"pitch:0;roll:1;yaw:-2;\r\n").await;
    wait_until(|| drone.telemetry().len() == 3).await;

    let snapshot = drone.telemetry();
    assert_eq!(snapshot["pitch"], "0");
    assert_eq!(snapshot["roll"], "1");
    assert_eq!(snapshot["yaw"], "-2");

    send_to(port, b"yaw:5;bad;bat:80;a:b:c;").await;
    wait_until(|| drone.telemetry().contains_key("bat")).await;

    let snapshot = drone.telemetry();
    assert_eq!(snapshot.len(), 4);
    assert_eq!(snapshot["yaw"], "5");
    assert_eq!(drone.drone_state().unwrap().battery, 80);

    drone.stop().await;
}

#[tokio::test]
async fn end_message_stops_the_session() {
    let recorder = Arc::new(Recorder::default());
    let (drone, _) = connect(Some(recorder.clone())).await;
    let mut frames = drone.video_frames();

    send_to(drone.state_address().port(), b"end").await;

    let reason = timeout(Duration::from_secs(2), drone.ended()).await.unwrap();
    assert_eq!(reason, EndReason::DroneEnded);
    assert_eq!(drone.session_state(), SessionState::Stopped);

    // video listener is gone, commands are refused
    assert!(frames.changed().await.is_err());
    assert!(matches!(drone.land().await, Err(TelloError::SessionClosed)));

    drone.stop().await;
    drone.stop().await;
    assert_eq!(drone.session_state(), SessionState::Stopped);
    assert_eq!(*recorder.ended.lock().unwrap(), vec![EndReason::DroneEnded]);
}

#[tokio::test]
async fn end_with_line_ending_is_not_the_end_message() {
    let recorder = Arc::new(Recorder::default());
    let (drone, _) = connect(Some(recorder.clone())).await;
    let port = drone.state_address().port();

    send_to(port, b"end\r\n").await;
    send_to(port, b"bat:42;\r\n").await;
    wait_until(|| drone.telemetry().contains_key("bat")).await;

    assert_eq!(drone.session_state(), SessionState::Running);
    assert!(recorder.ended.lock().unwrap().is_empty());
    assert_eq!(drone.take_off().await.unwrap(), "ok");

    drone.stop().await;
}

#[tokio::test]
async fn dropping_a_running_session_releases_its_ports() {
    let recorder = Arc::new(Recorder::default());
    let (drone, received) = connect(Some(recorder.clone())).await;
    wait_until(|| received.lock().unwrap().len() == 1).await;

    let ports = [
        drone.command_address().port(),
        drone.state_address().port(),
        drone.video_address().port(),
    ];
    drop(drone);
    assert_eq!(*recorder.ended.lock().unwrap(), vec![EndReason::Requested]);

    for port in ports {
        let deadline = Instant::now() + Duration::from_secs(2);
        while let Err(err) = UdpSocket::bind(("0.0.0.0", port)).await {
            assert!(Instant::now() < deadline, "port {port} still bound: {err}");
            sleep(Duration::from_millis(10)).await;
        }
    }
}

#[tokio::test]
async fn stop_is_idempotent() {
    let recorder = Arc::new(Recorder::default());
    let (drone, _) = connect(Some(recorder.clone())).await;

    let started = Instant::now();
    tokio::join!(drone.stop(), drone.stop());
    assert!(started.elapsed() < Duration::from_secs(1));

    assert_eq!(drone.session_state(), SessionState::Stopped);
    assert_eq!(drone.ended().await, EndReason::Requested);

    drone.stop().await;
    assert_eq!(*recorder.ended.lock().unwrap(), vec![EndReason::Requested]);
}

#[tokio::test]
async fn video_fragments_become_one_frame() {
    let (drone, _) = connect(None).await;
    let mut frames = drone.video_frames();
    let port = drone.video_address().port();

    let fragments = [fragment(1460, 1), fragment(1460, 2), fragment(800, 3)];
    for f in &fragments {
        send_to(port, f).await;
    }

    timeout(Duration::from_secs(2), frames.changed()).await.unwrap().unwrap();
    let frame = frames.borrow_and_update().clone().unwrap();

    let expected: Vec<u8> = fragments.iter().flat_map(|f| f[2..].to_vec()).collect();
    assert_eq!(frame.data, expected);

    drone.stop().await;
}

#[tokio::test]
async fn unfinished_frame_is_dropped_on_stop() {
    let (drone, _) = connect(None).await;
    let frames = drone.video_frames();

    send_to(drone.video_address().port(), &fragment(1460, 1)).await;
    sleep(Duration::from_millis(50)).await;
    drone.stop().await;

    assert!(frames.borrow().is_none());
}

#[tokio::test]
async fn decoder_gets_frames_until_the_session_stops() {
    #[derive(Default)]
    struct Recording {
        configured: bool,
        frames: Vec<TelloVideoFrame>,
    }

    impl VideoDecoder for Recording {
        fn configure(&mut self, _: &ParameterSets) -> Result<(), DecoderError> {
            self.configured = true;
            Ok(())
        }

        fn decode(&mut self, frame: TelloVideoFrame) -> Result<(), DecoderError> {
            self.frames.push(frame);
            Ok(())
        }
    }

    let mut options = TelloOptions::default();
    let frames = options.with_video();
    let (port, _) = stub_drone().await;
    options
        .with_drone_address("127.0.0.1", port)
        .with_command_port(0)
        .with_video_port(0)
        .with_state_port(0);
    let drone = Tello::new().connect_with(options).await.unwrap();

    let decoding = tokio::spawn(async move {
        let mut decoder = Recording::default();
        decode_frames(frames, &mut decoder, &ParameterSets::default()).await?;
        Ok::<_, TelloError>(decoder)
    });

    send_to(drone.video_address().port(), &fragment(300, 4)).await;
    sleep(Duration::from_millis(100)).await;
    drone.stop().await;

    let decoder = timeout(Duration::from_secs(2), decoding).await.unwrap().unwrap().unwrap();
    assert!(decoder.configured);
    assert_eq!(decoder.frames, vec![TelloVideoFrame { data: vec![4; 298] }]);
}

#[tokio::test]
async fn fire_and_forget_reports_to_the_listener() {
    let recorder = Arc::new(Recorder::default());
    let (drone, received) = connect(Some(recorder.clone())).await;
    wait_until(|| received.lock().unwrap().len() == 1).await;

    drone.dispatch(Command::get_battery()).await.unwrap();
    drone.remote_control(0, 150, 0, 0);
    wait_until(|| received.lock().unwrap().len() == 3).await;

    assert_eq!(received.lock().unwrap()[1], "battery?");
    assert_eq!(received.lock().unwrap()[2], "rc 0 100 0 0");
    assert!(recorder.results.lock().unwrap().contains(&("battery?".to_string(), "ok".to_string())));

    drone.stop().await;
}

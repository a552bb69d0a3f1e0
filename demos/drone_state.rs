extern crate tello_udp;

use std::sync::Arc;
use std::time::Duration;

use tello_udp::{EndReason, Tello, TelloListener, TelloOptions};

struct PrintListener;

impl TelloListener for PrintListener {
    fn on_command_result(&self, command: &str, response: &str) {
        println!("{command} → {response}");
    }

    fn on_command_error(&self, command: &str, error: &str) {
        println!("{command} failed: {error}");
    }

    fn on_session_ended(&self, reason: EndReason) {
        println!("SESSION ENDED {reason:?}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut options = TelloOptions::default();
    options.with_listener(Arc::new(PrintListener));

    let drone = Tello::new().connect_with(options).await?;

    let printing = async {
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;
            println!("STATE {:#?}", drone.drone_state());
        }
    };

    drone.take_off().await?;
    drone.turn_clockwise(360).await?;
    drone.land().await?;

    // keep printing until the drone ends the session or 10s pass
    tokio::select! {
        reason = drone.ended() => println!("ended: {reason:?}"),
        _ = tokio::time::timeout(Duration::from_secs(10), printing) => drone.stop().await,
    }

    Ok(())
}

use std::time::Duration;

use anyhow::{bail, Context};
use tello_udp::{Command, Tello, TelloError, TelloOptions};

const MIN_BATTERY: u8 = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // the first reply after switching to SDK mode can be slow
    let mut options = TelloOptions::default();
    options.with_command_timeout(Duration::from_secs(1));

    let drone = Tello::new().connect_with(options).await?;

    let battery = drone.get_battery().await.context("battery query")?;
    let battery: u8 = battery.trim().parse().context("battery reply")?;
    println!("battery at {battery}%");
    if battery < MIN_BATTERY {
        drone.stop().await;
        bail!("battery too low to fly ({battery}% < {MIN_BATTERY}%)");
    }

    let flight = async {
        drone.take_off().await?;
        drone.move_up(50).await?;
        drone.send(Command::stop()).await
    };

    // whatever happened up there, try to come down
    if let Err(err) = flight.await {
        match err {
            TelloError::Timeout { ref command, .. } => println!("no reply to {command}, landing"),
            ref other => println!("flight failed: {other}, landing"),
        }
    }

    let landed = drone.land().await;
    drone.stop().await;
    println!("landed: {}", landed?);

    Ok(())
}

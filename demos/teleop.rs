// Keyboard teleop: WASD move, Z/X rotate, R/F speed, Q quit.
//
// Publishes normalized axis commands; the runtime's input shaping and
// configured maxima turn them into physical speeds.

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use swerve_zenoh_runtime::config::TOPIC_CMD_BASE;
use swerve_zenoh_runtime::messages::BaseCommand;

/// Axis magnitudes per speed step, normalized.
const SPEEDS: [f64; 3] = [0.3, 0.6, 1.0];

/// Reset axes after this much time with no input.
const INPUT_TIMEOUT_MS: u64 = 100;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_BASE).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    let mut x = 0.0;
    let mut y = 0.0;
    let mut r = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for a key with a 20ms timeout (50Hz effective rate).
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        x = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        x = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        y = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        y = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    KeyCode::Char('z') if pressed => {
                        r = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        r = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(SPEEDS.len() - 1);
                        info!("Speed: {}", speed_name(speed_idx));
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        info!("Speed: {}", speed_name(speed_idx));
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => {
                        // Leave the base stopped before exiting.
                        let stop = BaseCommand { x: 0.0, y: 0.0, r: 0.0 };
                        publisher.put(serde_json::to_string(&stop)?).await?;
                        info!("Quitting teleop");
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }

        // Terminals only report presses, not releases: decay to a stop when
        // no movement key has arrived for a while.
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            x = 0.0;
            y = 0.0;
            r = 0.0;
        }

        let cmd = BaseCommand { x, y, r };
        publisher.put(serde_json::to_string(&cmd)?).await?;
    }
}

fn speed_name(idx: usize) -> &'static str {
    match idx {
        0 => "LOW",
        1 => "MEDIUM",
        _ => "HIGH",
    }
}

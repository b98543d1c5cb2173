//! Interactive test harness: prints every global input event until Enter is
//! pressed.

use anyhow::Result;
use clap::Parser;
use shortcut_platform::{global_listener, start_listening, stop_listening, InputEvent};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shortcut-cli")]
#[command(about = "Print global keyboard and mouse events", long_about = None)]
struct Args {
    /// Only report events with this key code (0 = all keys)
    #[arg(short, long, default_value_t = 0)]
    key: u32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    start_listening(
        |event: InputEvent| {
            println!("{} {}", event.event_type, event.code);
        },
        args.key,
    )?;

    info!("listening for global input events, press Enter to stop");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    stop_listening();

    let dropped = global_listener().dropped_events();
    if dropped > 0 {
        info!(dropped, "some events were dropped under load");
    }
    Ok(())
}

use color_eyre::{eyre::eyre, Result};
use controlpoll::config::Config;
use controlpoll::listener::{Axis, Button, ChannelReader, Listenable, Listener, ListenerManager};
use controlpoll::source::GamepadSource;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

// Stick movements below this are treated as centered by the drive mix
const DRIVE_THRESHOLD: f64 = 0.2;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => Config::default_path()?,
    };
    let config = Config::load_or_default(&config_path).await?;
    let table = config.index_table()?;
    info!("Loaded config: {:?}", config);

    let source = GamepadSource::spawn(Some(config.gamepad.clone()))
        .map_err(|e| eyre!("Failed to open gamepad source: {}", e))?;

    let manager = ListenerManager::new(Arc::new(source), Some(config.dispatcher.clone()), table);
    register_listeners(&manager);
    manager.start()?;

    info!("Listening for controller input, press Ctrl+C to quit");
    tokio::signal::ctrl_c().await?;

    manager.stop()?;
    let stats = manager.stats();
    info!(
        "Shut down after {} cycles, {} listener calls, {} failures",
        stats.cycles(),
        stats.invoked(),
        stats.failures()
    );
    Ok(())
}

fn register_listeners(manager: &ListenerManager) {
    for button in Button::ALL {
        let pressed = Listenable::Down(button);
        let released = Listenable::Up(button);
        manager.register(
            pressed,
            Listener::new(format!("log-{pressed}"), move || {
                info!("{} pressed", pressed);
                Ok(())
            }),
        );
        manager.register(
            released,
            Listener::new(format!("log-{released}"), move || {
                info!("{} released", released);
                Ok(())
            }),
        );
    }

    // One listener on both stick axes: it runs once even if both moved
    let drive = arcade_drive_listener(manager.reader());
    manager.register(Listenable::Axis(Axis::Joy1X), drive.clone());
    manager.register(Listenable::Axis(Axis::Joy1Y), drive);

    let reader = manager.reader();
    manager.register(
        Listenable::Axis(Axis::Triggers),
        Listener::new("log-triggers", move || {
            info!("Triggers at {:.2}", reader.read_axis(Listenable::Axis(Axis::Triggers))?);
            Ok(())
        }),
    );
}

fn arcade_drive_listener(reader: ChannelReader) -> Listener {
    Listener::new("arcade-drive", move || {
        let x = dead_band(reader.read_axis(Listenable::Axis(Axis::Joy1X))?);
        let y = dead_band(reader.read_axis(Listenable::Axis(Axis::Joy1Y))?);
        let right = (y + x) / 2.0;
        let left = (y - x) / 2.0;
        info!("Drive speeds left={:.2} right={:.2}", left, right);
        Ok(())
    })
}

fn dead_band(value: f64) -> f64 {
    if value.abs() > DRIVE_THRESHOLD {
        value
    } else {
        0.0
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

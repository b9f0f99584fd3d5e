use tokio::time::interval;
use tracing::{error, info, warn};

use ifit_ble::{ble, Result, SessionConfig, Value};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("📊 iFit monitor");
    info!("Searching for iFit equipment...");

    let session = match ble::connect_first(SessionConfig::default()).await {
        Ok(session) => session,
        Err(e) => {
            error!("❌ Failed to connect: {}", e);
            return Err(e);
        }
    };

    let equipment = session.initialize().await?;
    info!(
        "✅ Connected to {:?} ({} characteristics)",
        equipment.equipment,
        equipment.characteristics.len()
    );
    if let Some(firmware) = &equipment.firmware_version {
        info!("Firmware: {firmware}");
    }

    info!("🔍 Monitoring current values, press Ctrl+C to stop");

    // Monitoring works from the Connected state; no activation code needed
    let mut ticker = interval(session.config().monitor_interval);
    loop {
        ticker.tick().await;

        let values = match session.read_current_values().await {
            Ok(values) => values,
            Err(e) if e.is_recoverable() => {
                warn!("poll failed: {e}");
                continue;
            }
            Err(e) => {
                error!("❌ Connection lost: {e}");
                return Err(e);
            }
        };

        let speed = values.get(&16).and_then(Value::as_f64).unwrap_or(0.0);
        let target = values.get(&0).and_then(Value::as_f64).unwrap_or(0.0);
        let incline = values.get(&17).and_then(Value::as_f64).unwrap_or(0.0);
        let mode = values.get(&12).and_then(Value::as_mode);

        print!("🏃 {speed:5.1} km/h (target {target:5.1})  ⛰ {incline:5.1} %");
        if let Some(pulse) = values.get(&10).and_then(|v| v.as_pulse()) {
            print!("  ❤ {}", pulse);
        }
        if let Some(mode) = mode {
            print!("  [{mode}]");
        }
        println!();
    }
}

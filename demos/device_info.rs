use tracing::{error, info, warn};

use ifit_ble::{ble, catalog, IfitError, Result, SessionConfig};

/// Parse the 72-hex-character activation code from the environment
fn activation_code_from_env() -> Result<Option<[u8; 36]>> {
    let Ok(hex) = std::env::var("IFIT_ACTIVATION_CODE") else {
        return Ok(None);
    };
    let hex = hex.trim();
    if hex.len() != 72 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(IfitError::InvalidParameters(
            "IFIT_ACTIVATION_CODE must be 72 hex characters".to_string(),
        ));
    }
    let mut code = [0u8; 36];
    for (index, byte) in code.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[index * 2..index * 2 + 2], 16)
            .map_err(|e| IfitError::InvalidParameters(e.to_string()))?;
    }
    Ok(Some(code))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("🔎 iFit device information");

    let session = match ble::connect_first(SessionConfig::default()).await {
        Ok(session) => session,
        Err(e) => {
            error!("❌ Failed to connect: {}", e);
            return Err(e);
        }
    };

    let equipment = session.initialize().await?;

    println!("\nEquipment:  {:?}", equipment.equipment);
    println!("Firmware:   {}", equipment.firmware_version.as_deref().unwrap_or("-"));
    println!("Serial:     {}", equipment.serial_number.as_deref().unwrap_or("-"));
    println!(
        "Reference:  {}",
        equipment
            .reference_number
            .map_or_else(|| "-".to_string(), |r| r.to_string())
    );

    println!("\nSupported characteristics:");
    for id in &equipment.characteristics {
        match catalog::by_id(*id) {
            Some(characteristic) => println!(
                "  {:3}  {:16} {}",
                id,
                characteristic.name,
                if characteristic.writable { "rw" } else { "ro" }
            ),
            None => println!("  {id:3}  (unmapped)"),
        }
    }

    println!("\nCapabilities:");
    for id in &equipment.supported_capabilities {
        match catalog::capability_by_id(*id) {
            Some(capability) => println!("  {:3}  {}", id, capability.name),
            None => println!("  {id:3}  (unmapped)"),
        }
    }

    println!("\nLimits:");
    for (name, value) in [
        ("MinKph", equipment.value_by_name("MinKph")),
        ("MaxKph", equipment.value_by_name("MaxKph")),
        ("MinIncline", equipment.value_by_name("MinIncline")),
        ("MaxIncline", equipment.value_by_name("MaxIncline")),
        ("MaxPulse", equipment.value_by_name("MaxPulse")),
        ("Metric", equipment.value_by_name("Metric")),
    ] {
        if let Some(value) = value {
            println!("  {name:12} {value}");
        }
    }

    // With an activation code in the environment, prove control works
    if let Some(code) = activation_code_from_env()? {
        info!("Activating equipment...");
        match session.enable(&code).await {
            Ok(()) => info!("✅ Activation accepted, session is write-capable"),
            Err(IfitError::AuthenticationFailed) => {
                warn!("❌ Activation code rejected; staying read-only");
            }
            Err(e) => return Err(e),
        }
    }

    session.disconnect().await?;
    Ok(())
}

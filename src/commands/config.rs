//! Config command handler.

use hitport::config::HitportConfig;

/// Config command.
pub fn cmd_config(config: &HitportConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !show {
        println!("Use --show to display the current configuration.");
        return Ok(());
    }

    println!("Current Configuration");
    println!("=====================");
    println!();
    println!("Data Directory: {}", config.data_dir.display());
    println!("Database: {}", config.database_path().display());
    println!("Export Directory: {}", config.export_dir_path().display());
    println!("Production Mode: {}", config.production);
    println!();

    println!("Export:");
    println!("  Batch Size: {}", config.export.batch_size);
    println!("  Batch Delay: {}ms", config.export.batch_delay_ms);
    println!();

    println!("Import:");
    println!(
        "  Pause: {}s every {} rows",
        config.import.pause_secs, config.import.pause_every
    );
    println!("  Settle Delay: {}s", config.import.settle_secs);
    println!("  Fault Capacity: {}", config.import.fault_capacity);
    println!();

    println!("Logging:");
    println!(
        "  Filter: {}",
        config.logging.filter.as_deref().unwrap_or("(default)")
    );
    println!(
        "  Format: {}",
        config.logging.format.as_deref().unwrap_or("pretty")
    );
    println!(
        "  File: {}",
        config
            .logging
            .file
            .as_ref()
            .map_or_else(|| "(stderr)".to_string(), |p| p.display().to_string())
    );
    println!();

    println!("Notifications:");
    println!(
        "  Webhook: {}",
        config.notify.webhook_url.as_deref().unwrap_or("(log only)")
    );
    println!("  Timeout: {}s", config.notify.timeout_secs);

    Ok(())
}

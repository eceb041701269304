//! Configuration display handler

use crate::config::AppConfig;
use crate::network::NetworkConfigDocument;
use crate::network::NetworkSelection;
use crate::network::SyncInterval;
use crate::Result;

/// Show the effective configuration and what `start` would select
///
/// # Errors
/// Returns `Config` errors for a malformed network document or an unknown
/// network/client.
pub fn handle_config_command(config: &AppConfig, args: &[String]) -> Result<()> {
    println!("📋 Configuration");
    println!("  Log level:          {}", config.logging.level);
    println!("  Log directory:      {}", config.logging.directory);
    println!("  Network config:     {}", config.network_config_path().display());
    println!("  State file:         {}", config.sync.state_file.display());
    println!("  Lock file:          {}", config.sync.lock_file.display());
    println!("  Schedule:           {:?}", config.schedule_mode());
    println!(
        "  Max concurrent:     {}",
        config
            .max_concurrent_channels()
            .map_or_else(|| "one per channel".to_string(), |n| n.to_string())
    );
    println!("  Drain timeout:      {:?}", config.drain_timeout());
    println!(
        "  Webhook:            {}",
        config.webhook_url().unwrap_or("(none)")
    );

    let document = NetworkConfigDocument::from_file(config.network_config_path())?;
    let selection = NetworkSelection::resolve(&document, args)?;
    let profile = selection.profile(&document)?;
    let interval = SyncInterval::resolve(
        document.blocks_sync_time.as_deref(),
        SyncInterval::resolve(config.blocks_sync_time(), SyncInterval::default()),
    );

    println!("\n🌐 Network selection");
    println!("  Selected:           {selection}");
    println!(
        "  Gateway:            {}",
        profile.gateway_url().unwrap_or("(none)")
    );
    println!(
        "  Organizations:      {}",
        profile
            .organizations
            .values()
            .map(|org| org.mspid.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Sync interval:      {} ms", interval.as_millis());
    println!("\n  Networks:");
    for (name, network) in &document.networks {
        let clients: Vec<&str> = network.clients.iter().map(|(c, _)| c.as_str()).collect();
        println!(
            "    {name} (default client {}): {}",
            network.name,
            clients.join(", ")
        );
    }
    Ok(())
}

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use padlink_device_link::{
    default_device_name, load_or_create_identity, save_identity, AccessMode, AuthSession,
    DesktopActions,
    DeviceIdentity, DeviceLinkError, HeartbeatScheduler, NetworkStatusMonitor,
    PairingStateMachine, TransportClient,
};

use crate::config::Config;
use crate::store::open_secret_store;

/// Everything a command needs, wired once from configuration.
pub struct Link {
    identity: DeviceIdentity,
    network: Arc<NetworkStatusMonitor>,
    transport: TransportClient,
}

impl Link {
    pub fn open(config: &Config) -> Result<Self> {
        let store = open_secret_store(config.secret_store, &config.data_dir)?;

        let default_name = config
            .device_name
            .clone()
            .unwrap_or_else(default_device_name);
        let mut identity = load_or_create_identity(store.as_ref(), &default_name)?;
        if let Some(name) = config.device_name.as_deref() {
            if identity.name != name {
                identity.rename(name);
                save_identity(store.as_ref(), &identity)?;
                tracing::info!(name, "Renamed device");
            }
        }

        let session = Arc::new(AuthSession::with_store(Arc::clone(&store)));
        let network = Arc::new(NetworkStatusMonitor::new());
        let transport = TransportClient::new(&config.server_url, session, Arc::clone(&network));

        Ok(Self {
            identity,
            network,
            transport,
        })
    }

    fn pairing(&self) -> PairingStateMachine {
        PairingStateMachine::new(self.transport.clone(), self.identity.clone())
    }

    fn actions(&self) -> DesktopActions {
        DesktopActions::new(self.transport.clone())
    }
}

fn failed(action: &'static str) -> impl FnOnce(DeviceLinkError) -> anyhow::Error {
    move |err| anyhow!("{} failed: {}", action, err.user_message())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

pub async fn status(link: &Link) -> Result<()> {
    println!("Device:    {} ({})", link.identity.name, link.identity.id());
    println!("Server:    {}", link.transport.base_url());

    let reachable = link.transport.probe_health().await.is_ok();
    println!("Reachable: {}", yes_no(reachable));
    println!("Token:     {}", yes_no(link.transport.session().has_token()));

    if reachable {
        let status = link.pairing().check_pairing_status().await;
        println!("Paired:    {}", yes_no(status.paired));
        if let Some(message) = status.message {
            println!("           {}", message);
        }
    }
    Ok(())
}

pub async fn pair(link: &Link) -> Result<()> {
    let pairing = link.pairing();
    let status = pairing.check_pairing_status().await;
    if status.paired {
        println!("{} is already paired.", link.identity.name);
        return Ok(());
    }
    if let Some(message) = status.message {
        println!("{}", message);
    }

    let payload = pairing.generate_pairing_payload()?;
    println!("Scan this pairing request on the desktop:\n\n{}\n", payload);
    println!("Then run `padlink verify <token>` with the token the desktop shows.");
    Ok(())
}

pub async fn verify(link: &Link, token: &str) -> Result<()> {
    let pairing = link.pairing();
    pairing.begin_token_entry();
    pairing
        .verify_token(token)
        .await
        .map_err(failed("Token verification"))?;
    println!("Paired {} with {}.", link.identity.name, link.transport.base_url());
    Ok(())
}

pub async fn run(link: &Link) -> Result<()> {
    let status = link.pairing().check_pairing_status().await;
    if !status.paired && !link.transport.session().has_token() {
        bail!("This device is not paired; run `padlink pair` first");
    }

    let listener = link.network.subscribe(|status| {
        tracing::info!(online = status.is_online, "Link status changed");
    });
    let health = Arc::new(link.transport.clone());
    link.network.start_probe(&health);

    let heartbeat = HeartbeatScheduler::new(link.transport.clone(), link.identity.id());
    heartbeat.start(link.identity.name.clone());
    tracing::info!(device_id = link.identity.id(), "Heartbeat running; press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl+C handler")?;
    tracing::info!("Shutdown signal received, stopping heartbeat...");

    heartbeat.stop();
    link.network.stop_probe();
    link.network.unsubscribe(listener);

    let stats = heartbeat.stats();
    println!(
        "Heartbeats sent: {}, failed: {}, skipped ticks: {}",
        stats.sent, stats.failed, stats.skipped_ticks
    );
    if let Some(error) = stats.last_error {
        println!("Last error: {}", error);
    }
    Ok(())
}

pub async fn send_text(link: &Link, text: &str) -> Result<()> {
    link.actions()
        .send_text(text)
        .await
        .map_err(failed("Sending text"))?;
    println!("Sent {} characters.", text.chars().count());
    Ok(())
}

pub async fn shortcut(link: &Link, combo: &str) -> Result<()> {
    link.actions()
        .execute_shortcut(combo)
        .await
        .map_err(failed("Shortcut"))?;
    println!("Executed {}.", combo);
    Ok(())
}

pub async fn mouse(link: &Link, action: &str) -> Result<()> {
    link.actions()
        .execute_mouse_action(action)
        .await
        .map_err(failed("Mouse action"))?;
    println!("Executed {}.", action);
    Ok(())
}

pub async fn token(link: &Link, enable: bool, hours: Option<u32>) -> Result<()> {
    let response = link
        .actions()
        .configure_auth_token(enable, hours)
        .await
        .map_err(failed("Token configuration"))?;

    if !response.enabled {
        println!("Token authentication disabled.");
        return Ok(());
    }
    println!("Token authentication enabled.");
    if let Some(token) = response.token {
        println!("Token:   {}", token);
    }
    if let Some(expiry) = response.expiry {
        println!("Expires: {}", expiry);
    }
    Ok(())
}

pub async fn unpair(link: &Link) -> Result<()> {
    let result = link.actions().unpair_device(link.identity.id()).await;
    link.transport.session().clear();
    let response = result.map_err(failed("Unpairing"))?;
    println!(
        "{}",
        response
            .message
            .unwrap_or_else(|| format!("Unpaired {}.", link.identity.name))
    );
    Ok(())
}

pub async fn devices(link: &Link) -> Result<()> {
    let status = link
        .actions()
        .connection_status()
        .await
        .map_err(failed("Listing devices"))?;

    println!("Active connections: {}", status.active_connections);
    let mut devices: Vec<_> = status.devices.into_iter().collect();
    devices.sort_by(|a, b| a.0.cmp(&b.0));
    for (id, device) in devices {
        let marker = if id == link.identity.id() { "*" } else { " " };
        println!(
            "{} {:<32} {:<20} {:<8} paired={} last_heartbeat={}",
            marker,
            id,
            device.name.as_deref().unwrap_or("-"),
            device.status,
            yes_no(device.is_paired),
            format_unix_seconds(device.last_heartbeat)
        );
    }
    Ok(())
}

pub async fn info(link: &Link) -> Result<()> {
    let actions = link.actions();
    let status = actions
        .network_status()
        .await
        .map_err(failed("Reading network status"))?;

    println!("Access mode: {} ({})", status.access_mode, status.access_mode_description);
    println!("Auth:        {}", yes_no(status.auth_enabled));
    if let Some(expiry) = status.token_expiry {
        println!("Token until: {}", expiry);
    }
    println!("HTTPS:       {}", yes_no(status.https_enabled));
    println!("Origins:     {}", status.allowed_origins.join(", "));
    println!("Paired devices: {}", status.paired_devices.len());
    for device in &status.paired_devices {
        let marker = if device.device_id == link.identity.id() { "*" } else { " " };
        println!(
            "{} {:<32} {:<20} last seen {}",
            marker,
            device.device_id,
            device.name.as_deref().unwrap_or("-"),
            device.last_seen.as_deref().unwrap_or("-")
        );
    }

    // Older servers lack this route; the status above is still useful.
    match actions.access_info().await {
        Ok(access) => {
            println!("Phone URL:   {}", access.phone_url);
            if let Some(error) = access.error {
                println!("             {}", error);
            }
        }
        Err(err) => tracing::debug!(error = %err, "Access info unavailable"),
    }
    Ok(())
}

pub async fn access_mode(link: &Link, mode: &str) -> Result<()> {
    let mode: AccessMode = mode.parse().map_err(failed("Access mode"))?;
    let response = link
        .actions()
        .set_access_mode(mode)
        .await
        .map_err(failed("Access mode"))?;
    match response.description {
        Some(description) => println!("Access mode set to {}: {}", mode, description),
        None => println!("Access mode set to {}.", mode),
    }
    Ok(())
}

pub async fn origins(link: &Link, add: Option<&str>, remove: Option<&str>) -> Result<()> {
    let actions = link.actions();
    let origins = match (add, remove) {
        (Some(origin), _) => actions.add_allowed_origin(origin).await,
        (None, Some(origin)) => actions.remove_allowed_origin(origin).await,
        (None, None) => actions.allowed_origins().await,
    }
    .map_err(failed("Allowed origins"))?;

    if origins.is_empty() {
        println!("No allowed origins.");
    }
    for origin in origins {
        println!("{}", origin);
    }
    Ok(())
}

fn format_unix_seconds(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "-".to_string();
    }
    chrono::DateTime::from_timestamp(seconds.trunc() as i64, 0)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SecretBackend;

    fn config(dir: &std::path::Path, name: Option<&str>) -> Config {
        Config {
            server_url: "http://127.0.0.1:9".to_string(),
            device_name: name.map(str::to_string),
            data_dir: dir.to_path_buf(),
            secret_store: Some(SecretBackend::File),
        }
    }

    #[test]
    fn identity_is_stable_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let first = Link::open(&config(dir.path(), Some("Phone"))).unwrap();
        let second = Link::open(&config(dir.path(), None)).unwrap();

        assert_eq!(first.identity.id(), second.identity.id());
        assert_eq!(second.identity.name, "Phone");
    }

    #[test]
    fn configured_name_renames_existing_identity() {
        let dir = tempfile::tempdir().unwrap();
        let first = Link::open(&config(dir.path(), Some("Phone"))).unwrap();
        let renamed = Link::open(&config(dir.path(), Some("Tablet"))).unwrap();
        let reopened = Link::open(&config(dir.path(), None)).unwrap();

        assert_eq!(renamed.identity.id(), first.identity.id());
        assert_eq!(reopened.identity.name, "Tablet");
    }

    #[test]
    fn heartbeat_timestamps_render_in_utc() {
        assert_eq!(format_unix_seconds(0.0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_unix_seconds(1_700_000_000.75), "2023-11-14 22:13:20 UTC");
        assert_eq!(format_unix_seconds(f64::NAN), "-");
    }
}

//! `shelly discover`: one mDNS discovery cycle.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tabled::Tabled;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use shelly_config::DeviceEntry;
use shelly_core::{ConnectorMessage, DeviceDescription, DiscoveryPipeline};

use crate::cli::{DiscoverArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct FoundRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Gen")]
    generation: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Auth")]
    auth: String,
    #[tabled(rename = "Channels")]
    channels: String,
}

impl From<&DeviceDescription> for FoundRow {
    fn from(d: &DeviceDescription) -> Self {
        let channels = d
            .channels
            .iter()
            .map(|c| c.identifier.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            id: d.identity.id.clone(),
            model: d.identity.model.clone(),
            generation: d.identity.generation.to_string(),
            ip: d.identity.ip_address.to_string(),
            auth: if d.identity.auth_enabled { "yes" } else { "no" }.into(),
            channels: if channels.is_empty() {
                "-".into()
            } else {
                channels
            },
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: DiscoverArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = util::load_config(global)?;
    let mut config = util::connector_config(&cfg, global)?;
    if let Some(secs) = args.wait {
        config.discovery_timeout = Duration::from_secs(secs);
    }
    if let Some(interface) = args.interface {
        config.bind_address = interface;
    }

    let pipeline = DiscoveryPipeline::new(&config, cfg.default_credentials())?;
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let spinner = spinner(global.quiet);
    let progress = {
        let spinner = spinner.clone();
        tokio::spawn(async move {
            let mut found = 0_usize;
            while let Some(message) = rx.recv().await {
                if let ConnectorMessage::DeviceFound { description, .. } = message {
                    found += 1;
                    spinner.set_message(format!(
                        "Found {found}: {} ({})",
                        description.identity.id, description.identity.ip_address
                    ));
                }
            }
        })
    };

    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = pipeline.run(&tx, &cancel).await;
    ctrl_c.abort();
    drop(tx);
    let _ = progress.await;
    spinner.finish_and_clear();

    let mut devices = result?;
    devices.sort_by(|a, b| a.identity.id.cmp(&b.identity.id));
    info!(found = devices.len(), "discovery finished");

    let out = output::render_list(
        global.output,
        &devices,
        |d| FoundRow::from(d),
        |d| d.identity.id.clone(),
    )?;
    output::print_output(&out, global.quiet);

    if args.save {
        let added = add_to_config(&mut cfg, &devices);
        if added > 0 {
            let path = util::config_file(global);
            shelly_config::save_config_to(&cfg, &path)?;
            if !global.quiet {
                eprintln!("Added {added} device(s) to {}", path.display());
            }
        } else {
            debug!("no new devices to save");
        }
    }
    Ok(())
}

fn spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message("Listening for devices...");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Append devices not yet configured. Returns how many were added.
fn add_to_config(cfg: &mut shelly_config::Config, devices: &[DeviceDescription]) -> usize {
    let mut added = 0;
    for d in devices {
        if cfg.device(&d.identity.id).is_some() {
            continue;
        }
        let mut entry = DeviceEntry::new(d.identity.id.clone(), d.identity.generation);
        entry.address = Some(d.identity.ip_address.to_string());
        entry.domain.clone_from(&d.identity.domain);
        cfg.devices.push(entry);
        added += 1;
    }
    added
}

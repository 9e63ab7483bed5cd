//! `shelly run`: drive the connector for the configured devices and
//! stream its messages until Ctrl-C.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use tokio::sync::mpsc;
use tracing::{info, warn};

use shelly_core::{Connector, ConnectorMessage, InMemoryDeviceRepository};

use crate::cli::{GlobalOpts, OutputFormat, RunArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load_config(global)?;
    let mut config = util::connector_config(&cfg, global)?;
    if args.no_coap {
        config.coap_enabled = false;
    }

    let mut devices = cfg.managed_devices()?;
    if !args.devices.is_empty() {
        devices.retain(|d| {
            args.devices
                .iter()
                .any(|wanted| wanted.eq_ignore_ascii_case(&d.identifier))
        });
    }
    if devices.is_empty() {
        return Err(CliError::Config {
            message: "no devices to manage".into(),
            path: util::config_file(global).display().to_string(),
        });
    }
    info!(devices = devices.len(), "starting connector");

    let repository: InMemoryDeviceRepository = devices.into_iter().collect();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let connector = Connector::new(config, Arc::new(repository), tx);
    connector.connect().await?;

    let color = output::should_color(global.color);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                }
                break;
            }
            message = rx.recv() => {
                let Some(message) = message else { break };
                let line = format_message(&message, global.output, color)?;
                output::print_output(&line, global.quiet);
            }
        }
    }

    connector.disconnect().await;
    // Flush the final state changes emitted during shutdown.
    while let Ok(message) = rx.try_recv() {
        let line = format_message(&message, global.output, color)?;
        output::print_output(&line, global.quiet);
    }
    Ok(())
}

/// One output line per message. Structured formats emit JSON lines.
fn format_message(
    message: &ConnectorMessage,
    format: OutputFormat,
    color: bool,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(message, true),
        OutputFormat::Yaml => serde_yaml::to_string(message)
            .map(|doc| format!("---\n{doc}"))
            .map_err(|e| CliError::Render(e.to_string())),
        OutputFormat::Table | OutputFormat::Plain => Ok(plain_line(message, color)),
    }
}

fn clock(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

fn plain_line(message: &ConnectorMessage, color: bool) -> String {
    match message {
        ConnectorMessage::DeviceState {
            device,
            state,
            cause,
            at,
        } => {
            let cause = cause.map(|c| format!(" ({c:?})")).unwrap_or_default();
            format!(
                "{}  {device}  state {}{cause}",
                clock(*at),
                output::paint_state(*state, color)
            )
        }
        ConnectorMessage::PropertyStatus {
            device, status, at, ..
        } => format!(
            "{}  {device}  {} = {}",
            clock(*at),
            status.property,
            status.value
        ),
        ConnectorMessage::DeviceFound { description, at } => format!(
            "{}  {}  found at {}",
            clock(*at),
            description.identity.id,
            description.identity.ip_address
        ),
        ConnectorMessage::DiscoveryFinished { found, at } => {
            format!("{}  discovery finished, {found} found", clock(*at))
        }
    }
}

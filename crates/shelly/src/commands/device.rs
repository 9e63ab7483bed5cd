//! One-shot device commands: `info`, `status`, `set`.

use serde::Serialize;
use tabled::Tabled;

use shelly_core::oneshot;
use shelly_core::{DeviceDescription, PropertyDescription, PropertyStatus, PropertyValue};

use crate::cli::{DeviceArgs, GlobalOpts, SetArgs};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct PropertyRow {
    #[tabled(rename = "Channel")]
    channel: String,
    #[tabled(rename = "Property")]
    property: String,
    #[tabled(rename = "Type")]
    data_type: String,
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Format")]
    format: String,
    #[tabled(rename = "Settable")]
    settable: String,
}

impl PropertyRow {
    fn new(channel: &str, p: &PropertyDescription) -> Self {
        Self {
            channel: channel.to_owned(),
            property: p.identifier.to_string(),
            data_type: p.data_type.to_string(),
            unit: p.unit.clone().unwrap_or_default(),
            format: p.format.clone().unwrap_or_default(),
            settable: if p.settable { "yes" } else { "" }.into(),
        }
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Property")]
    property: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl From<&PropertyStatus> for StatusRow {
    fn from(s: &PropertyStatus) -> Self {
        Self {
            property: s.property.to_string(),
            value: s.value.to_string(),
        }
    }
}

fn detail(d: &DeviceDescription) -> String {
    let identity = &d.identity;
    let mut lines = vec![
        format!("ID:       {}", identity.id),
        format!("Model:    {}", identity.model),
        format!("Gen:      {}", identity.generation),
        format!("MAC:      {}", identity.mac_address),
        format!("IP:       {}", identity.ip_address),
        format!("Firmware: {}", identity.firmware_version),
        format!("Auth:     {}", if identity.auth_enabled { "enabled" } else { "disabled" }),
    ];
    if let Some(ref domain) = identity.domain {
        lines.push(format!("Domain:   {domain}"));
    }

    let rows: Vec<PropertyRow> = d
        .channels
        .iter()
        .flat_map(|c| c.properties.iter().map(move |p| PropertyRow::new(&c.identifier, p)))
        .collect();
    if rows.is_empty() {
        lines.push("\nNo channels reported.".into());
    } else {
        lines.push(String::new());
        lines.push(output::render_table(&rows));
    }
    lines.join("\n")
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn info(args: DeviceArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load_config(global)?;
    let config = util::connector_config(&cfg, global)?;
    let device = util::resolve_target(&cfg, &args.target);

    let description = oneshot::describe(&device, &config).await?;
    let out = output::render_single(global.output, &description, detail, |d| {
        d.identity.id.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn status(args: DeviceArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load_config(global)?;
    let config = util::connector_config(&cfg, global)?;
    let device = util::resolve_target(&cfg, &args.target);

    let statuses = oneshot::read_status(&device, &config).await?;
    let out = output::render_list(global.output, &statuses, |s| StatusRow::from(s), |s| {
        format!("{}={}", s.property, s.value)
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[derive(Serialize)]
struct WriteResult<'a> {
    device: &'a str,
    #[serde(flatten)]
    status: PropertyStatus,
}

pub async fn set(args: SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load_config(global)?;
    let config = util::connector_config(&cfg, global)?;
    let device = util::resolve_target(&cfg, &args.target);
    let value = PropertyValue::parse(&args.value);

    oneshot::write_state(&device, &config, &args.property, &value).await?;

    let result = WriteResult {
        device: &device.identifier,
        status: PropertyStatus::new(args.property, value),
    };
    let out = output::render_single(
        global.output,
        &result,
        |r| format!("{}: {} = {}", r.device, r.status.property, r.status.value),
        |r| r.status.value.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

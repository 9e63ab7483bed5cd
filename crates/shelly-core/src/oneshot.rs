//! One-shot device operations.
//!
//! Single request/response helpers for command-line use. No connector task
//! and no sessions; a device of unknown generation is probed first.

use tracing::debug;

use shelly_api::{
    DeviceGeneration, DeviceStatus, Gen1Client, Gen2Client, PropertyKey, PropertyValue,
};

use crate::config::ConnectorConfig;
use crate::discovery::DiscoveryPipeline;
use crate::error::CoreError;
use crate::model::{DeviceDescription, ManagedDevice, PropertyStatus};
use crate::normalize::normalize_status;

/// Identity and channel schema of one device.
pub async fn describe(
    device: &ManagedDevice,
    config: &ConnectorConfig,
) -> Result<DeviceDescription, CoreError> {
    let address = require_address(device)?;
    DiscoveryPipeline::new(config, device.credentials())?
        .describe(address, device.generation, device.domain.clone())
        .await
}

/// Current normalized status of one device.
pub async fn read_status(
    device: &ManagedDevice,
    config: &ConnectorConfig,
) -> Result<Vec<PropertyStatus>, CoreError> {
    let address = require_address(device)?;
    let transport = config.transport();
    let credentials = device.credentials();

    match resolve_generation(device, config).await? {
        DeviceGeneration::Gen1 => {
            let client = Gen1Client::new(&transport)?;
            let description = client
                .get_device_description(address, credentials.as_ref())
                .await?;
            let status = client
                .get_device_status(address, credentials.as_ref())
                .await?;
            Ok(normalize_status(
                &DeviceStatus::Gen1(status),
                Some(&description),
            ))
        }
        DeviceGeneration::Gen2 => {
            let client = Gen2Client::new(&transport)?;
            let status = client
                .get_device_status(address, credentials.as_ref())
                .await?;
            Ok(normalize_status(&DeviceStatus::Gen2(status), None))
        }
        DeviceGeneration::Unknown => Err(unknown_generation(device)),
    }
}

/// Write one property over HTTP.
pub async fn write_state(
    device: &ManagedDevice,
    config: &ConnectorConfig,
    property: &PropertyKey,
    value: &PropertyValue,
) -> Result<(), CoreError> {
    if !property.is_settable() {
        return Err(CoreError::ValidationFailed {
            message: format!("property {property} is read-only"),
        });
    }

    let address = require_address(device)?;
    let transport = config.transport();
    let credentials = device.credentials();

    match resolve_generation(device, config).await? {
        DeviceGeneration::Gen1 => {
            Gen1Client::new(&transport)?
                .set_device_state(address, credentials.as_ref(), property, value)
                .await?;
        }
        DeviceGeneration::Gen2 => {
            let result = Gen2Client::new(&transport)?
                .set_device_state(address, credentials.as_ref(), property, value)
                .await?;
            debug!(device = %device.identifier, %result, "write result");
        }
        DeviceGeneration::Unknown => return Err(unknown_generation(device)),
    }
    Ok(())
}

async fn resolve_generation(
    device: &ManagedDevice,
    config: &ConnectorConfig,
) -> Result<DeviceGeneration, CoreError> {
    if device.generation != DeviceGeneration::Unknown {
        return Ok(device.generation);
    }
    let description = describe(device, config).await?;
    debug!(
        device = %device.identifier,
        generation = %description.identity.generation,
        "probed device generation"
    );
    Ok(description.identity.generation)
}

fn require_address(device: &ManagedDevice) -> Result<&str, CoreError> {
    device.address().ok_or_else(|| CoreError::Config {
        message: format!("device {} has no address or domain", device.identifier),
    })
}

fn unknown_generation(device: &ManagedDevice) -> CoreError {
    CoreError::Unsupported {
        operation: format!("device {} of unknown generation", device.identifier),
    }
}

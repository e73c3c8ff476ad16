//! Device selection: walk the enumerator, pick a controller, resolve its layout.

use tictune_traits::{DeviceDescriptor, DeviceEnumerator};

use crate::error::ControllerError;
use crate::protocol::ProductVariant;
use crate::transport_error::map_transport_error;

/// An opened session plus what we know about the device behind it.
#[derive(Debug)]
pub struct OpenedSession<S> {
    pub session: S,
    pub descriptor: DeviceDescriptor,
    pub variant: ProductVariant,
}

impl<S> OpenedSession<S> {
    /// Force the product variant instead of the one derived from the product id.
    pub fn with_variant(mut self, variant: ProductVariant) -> Self {
        if variant != self.variant {
            tracing::warn!(
                detected = %self.variant,
                forced = %variant,
                "product variant overridden"
            );
        }
        self.variant = variant;
        self
    }
}

/// All attached controllers, for display.
pub fn list_devices<E: DeviceEnumerator>(
    enumerator: &E,
) -> Result<Vec<DeviceDescriptor>, ControllerError> {
    enumerator
        .list()
        .map_err(|e| ControllerError::CommunicationFailure(map_transport_error(e.as_ref())))
}

/// Open the first controller matching `desired_serial` (any, when `None`).
///
/// Descriptors with an unknown product id are skipped.
pub fn open_session<E: DeviceEnumerator>(
    enumerator: &E,
    desired_serial: Option<&str>,
) -> Result<OpenedSession<E::Session>, ControllerError> {
    for descriptor in list_devices(enumerator)? {
        if desired_serial.is_some_and(|want| want != descriptor.serial_number) {
            tracing::debug!(serial = %descriptor.serial_number, "skipping device");
            continue;
        }
        let variant = match ProductVariant::from_product_id(descriptor.product_id) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(serial = %descriptor.serial_number, error = %e, "skipping device");
                continue;
            }
        };
        let session = enumerator
            .open(&descriptor)
            .map_err(|e| ControllerError::CommunicationFailure(map_transport_error(e.as_ref())))?;
        tracing::info!(
            serial = %descriptor.serial_number,
            name = %descriptor.short_name,
            %variant,
            "device opened"
        );
        return Ok(OpenedSession {
            session,
            descriptor,
            variant,
        });
    }
    Err(ControllerError::NoDeviceFound)
}

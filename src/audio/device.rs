use std::collections::HashSet;

use cpal::traits::{DeviceTrait, HostTrait};
use tracing::warn;

/// A selectable audio input.
///
/// `id` is the handle used to acquire the device; `label` is what the user
/// sees. The platform "default" alias entry never appears in a catalog —
/// it only informs the initial selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub id: String,
    pub label: String,
}

/// De-duplicated input device list plus the current selection.
#[derive(Debug, Clone, Default)]
pub struct DeviceCatalog {
    devices: Vec<InputDevice>,
    selected: String,
}

impl DeviceCatalog {
    /// Enumerate input devices on the default host.
    pub fn detect() -> Self {
        Self::from_entries(raw_input_entries())
    }

    /// Build a catalog from raw enumeration entries.
    ///
    /// Drops the "default" alias entry, de-duplicates by label, then picks
    /// the initial selection: if a default entry exists, its label minus
    /// the "default - " prefix is matched against catalog labels (suffix
    /// match); otherwise the first entry wins. No devices, no selection.
    pub fn from_entries(entries: Vec<InputDevice>) -> Self {
        let default_label = entries
            .iter()
            .find(|d| d.id == "default")
            .map(|d| d.label.clone());

        let mut devices = Vec::new();
        let mut seen = HashSet::new();
        for entry in entries {
            if entry.id == "default" {
                continue;
            }
            if seen.insert(entry.label.clone()) {
                devices.push(entry);
            }
        }

        let selected = select_initial(&devices, default_label.as_deref())
            .map(|d| d.id.clone())
            .unwrap_or_default();

        Self { devices, selected }
    }

    pub fn devices(&self) -> &[InputDevice] {
        &self.devices
    }

    /// Id of the selected device; empty means "use platform default".
    pub fn selected(&self) -> &str {
        &self.selected
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Select a device by id. Unknown ids leave the selection unchanged.
    pub fn select(&mut self, id: &str) -> bool {
        if self.devices.iter().any(|d| d.id == id) {
            self.selected = id.to_string();
            true
        } else {
            false
        }
    }
}

fn select_initial<'a>(
    devices: &'a [InputDevice],
    default_label: Option<&str>,
) -> Option<&'a InputDevice> {
    if let Some(label) = default_label {
        let base = strip_default_prefix(label);
        if !base.is_empty() {
            if let Some(matched) = devices.iter().find(|d| d.label.ends_with(base)) {
                return Some(matched);
            }
        }
    }
    devices.first()
}

/// Strip a leading `"default - "` (any case, flexible spacing) from a
/// device label. Labels without the prefix come back trimmed, unchanged.
pub fn strip_default_prefix(label: &str) -> &str {
    let trimmed = label.trim();
    let Some(head) = trimmed.get(..7) else {
        return trimmed;
    };
    if !head.eq_ignore_ascii_case("default") {
        return trimmed;
    }
    match trimmed[7..].trim_start().strip_prefix('-') {
        Some(rest) => rest.trim(),
        None => trimmed,
    }
}

/// Raw entries as the platform reports them: the default device is
/// surfaced as a "default" alias row ahead of the concrete inputs.
fn raw_input_entries() -> Vec<InputDevice> {
    let host = cpal::default_host();
    let mut entries = Vec::new();

    if let Some(device) = host.default_input_device() {
        if let Ok(name) = device.name() {
            entries.push(InputDevice {
                id: "default".to_string(),
                label: format!("default - {name}"),
            });
        }
    }

    match host.input_devices() {
        Ok(inputs) => {
            for device in inputs {
                let label = device
                    .name()
                    .unwrap_or_else(|_| "Unknown input".to_string());
                entries.push(InputDevice {
                    id: label.clone(),
                    label,
                });
            }
        }
        Err(e) => warn!("input device enumeration failed: {}", e),
    }

    entries
}

/// Resolve a catalog id back to a cpal device. Empty id means platform
/// default.
pub(crate) fn resolve_input_device(device_id: &str) -> Option<cpal::Device> {
    let host = cpal::default_host();

    if device_id.is_empty() || device_id == "default" {
        return host.default_input_device();
    }

    host.input_devices()
        .ok()?
        .find(|d| d.name().map(|n| n == device_id).unwrap_or(false))
}

// ── Device domain types ──

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use purelink_api::InventoryEntry;

use super::kind::ModelKind;

/// A device owned by the account, as known to the bridge.
///
/// Created on the first cloud sighting, renamed when the cloud name
/// changes, dropped when the cloud stops listing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    /// Vendor serial; unique and stable.
    pub id: String,
    pub model: ModelKind,
    pub display_name: String,
    /// Base64 cipher text from the cloud, decrypted when a session starts.
    #[serde(skip)]
    pub encrypted_credential: String,
    pub tags: BTreeMap<String, String>,
    /// Platform device-type id configured for this model, if any.
    pub device_type: Option<String>,
}

impl DeviceRecord {
    /// Build a record from a manifest entry. Returns `None` for unsupported models.
    pub fn from_inventory(
        entry: &InventoryEntry,
        device_types: &HashMap<String, String>,
    ) -> Option<Self> {
        let model = ModelKind::from_model_number(&entry.product_type)?;
        Some(Self {
            id: entry.serial.clone(),
            model,
            display_name: entry.name.clone(),
            encrypted_credential: entry.local_credentials.clone(),
            tags: model_tags(model),
            device_type: device_types.get(model.model_number()).cloned(),
        })
    }

    pub fn model_number(&self) -> &'static str {
        self.model.model_number()
    }

    /// Only the display name is compared when reconciling inventory.
    pub fn same_listing(&self, other: &Self) -> bool {
        self.display_name == other.display_name
    }
}

/// `manufacturer` plus `type`, `type1`, `type2`, … from the model's classes.
fn model_tags(model: ModelKind) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert("manufacturer".to_owned(), "Dyson".to_owned());
    for (i, class) in model.descriptor().classes.iter().enumerate() {
        let key = if i == 0 {
            "type".to_owned()
        } else {
            format!("type{i}")
        };
        tags.insert(key, class.to_string());
    }
    tags
}

/// Where a device's broker was found on the local network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkLocation {
    pub device_id: String,
    pub address: IpAddr,
    pub port: u16,
}

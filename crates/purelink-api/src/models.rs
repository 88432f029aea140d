// Wire models for the vendor cloud.
//
// Field names follow the cloud's PascalCase JSON. Only the fields the
// bridge needs are modelled; everything else is ignored.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Request body for the account login endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    #[serde(rename = "Email")]
    pub email: &'a str,
    #[serde(rename = "Password")]
    pub password: &'a str,
}

/// Response body of the account login endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(rename = "Account")]
    pub account: String,
    #[serde(rename = "Password")]
    pub password: String,
}

/// Basic-auth credentials for the manifest endpoint, obtained by logging in.
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub account: String,
    pub password: SecretString,
}

/// One device from the account's provisioning manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    /// Vendor serial, doubles as the broker username and topic id.
    #[serde(rename = "Serial")]
    pub serial: String,

    /// User-assigned display name.
    #[serde(rename = "Name")]
    pub name: String,

    /// Model number, e.g. `"475"`.
    #[serde(rename = "ProductType")]
    pub product_type: String,

    /// Encrypted local broker credential (base64).
    #[serde(rename = "LocalCredentials")]
    pub local_credentials: String,

    /// Firmware version, if reported.
    #[serde(rename = "Version", default)]
    pub version: Option<String>,

    /// Temperature scale preference (`"C"` / `"F"`), if reported.
    #[serde(rename = "ScaleUnit", default)]
    pub scale_unit: Option<String>,
}

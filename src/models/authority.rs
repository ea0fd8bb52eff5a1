use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ownership block returned with every authority response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityMeta {
    pub store_id: u64,
    pub product_id: u64,
    #[serde(default)]
    pub customer_id: Option<u64>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub variant_name: Option<String>,
}

/// One installation's binding to a license key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// The `license_key` block of an authority response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseDetails {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub activation_limit: Option<u32>,
    #[serde(default)]
    pub activation_usage: Option<u32>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

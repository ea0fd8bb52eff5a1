use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use super::result::{AuthorityGrant, AuthorityResult, RejectionReason};
use crate::config::AuthorityConfig;
use crate::error::{LicenseError, Result};
use crate::key::{is_well_formed, mask};
use crate::models::{AuthorityMeta, Instance, LicenseDetails};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Validate,
    Activate,
    Deactivate,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Validate => "validate",
            Endpoint::Activate => "activate",
            Endpoint::Deactivate => "deactivate",
        }
    }

    fn path(&self) -> &'static str {
        match self {
            Endpoint::Validate => "/v1/licenses/validate",
            Endpoint::Activate => "/v1/licenses/activate",
            Endpoint::Deactivate => "/v1/licenses/deactivate",
        }
    }
}

/// Body shared by the three license endpoints; each sets one verdict flag.
#[derive(Debug, Deserialize)]
struct AuthorityResponse {
    #[serde(default)]
    valid: Option<bool>,
    #[serde(default)]
    activated: Option<bool>,
    #[serde(default)]
    deactivated: Option<bool>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    meta: Option<AuthorityMeta>,
    #[serde(default)]
    instance: Option<Instance>,
    #[serde(default)]
    license_key: Option<LicenseDetails>,
}

impl AuthorityResponse {
    fn verdict(&self, endpoint: Endpoint) -> Option<bool> {
        match endpoint {
            Endpoint::Validate => self.valid,
            Endpoint::Activate => self.activated,
            Endpoint::Deactivate => self.deactivated,
        }
    }
}

/// Client for the license API of the licensing authority.
#[derive(Debug, Clone)]
pub struct AuthorityClient {
    client: Client,
    base_url: String,
    store_id: u64,
    product_id: u64,
}

impl AuthorityClient {
    pub fn new(config: &AuthorityConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LicenseError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            store_id: config.store_id,
            product_id: config.product_id,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check a key, optionally scoped to one activated instance.
    pub async fn validate(&self, key: &str, instance_id: Option<&str>) -> AuthorityResult {
        if !is_well_formed(key) {
            return malformed_key();
        }

        let mut form = vec![("license_key", key)];
        if let Some(id) = instance_id {
            form.push(("instance_id", id));
        }

        self.post(Endpoint::Validate, key, &form).await
    }

    /// Bind a new instance to the key.
    pub async fn activate(&self, key: &str, instance_name: &str) -> AuthorityResult {
        if !is_well_formed(key) {
            return malformed_key();
        }

        self.post(
            Endpoint::Activate,
            key,
            &[("license_key", key), ("instance_name", instance_name)],
        )
        .await
    }

    /// Release an instance so its slot can be reused.
    pub async fn deactivate(&self, key: &str, instance_id: &str) -> AuthorityResult {
        if !is_well_formed(key) {
            return malformed_key();
        }

        self.post(
            Endpoint::Deactivate,
            key,
            &[("license_key", key), ("instance_id", instance_id)],
        )
        .await
    }

    /// Lightweight reachability probe. Any HTTP answer counts as online.
    pub async fn ping(&self, timeout: Duration) -> bool {
        self.client
            .get(&self.base_url)
            .timeout(timeout)
            .send()
            .await
            .is_ok()
    }

    async fn post(&self, endpoint: Endpoint, key: &str, form: &[(&str, &str)]) -> AuthorityResult {
        let url = format!("{}{}", self.base_url, endpoint.path());

        let response = match self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    endpoint = endpoint.as_str(),
                    key = %mask(key),
                    error = %e,
                    "Licensing service request failed"
                );
                let message = if e.is_timeout() {
                    format!("request timed out: {}", e)
                } else {
                    format!("request failed: {}", e)
                };
                return AuthorityResult::TransportError {
                    http_status: None,
                    message,
                };
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                return AuthorityResult::TransportError {
                    http_status: Some(status),
                    message: format!("failed to read response body: {}", e),
                };
            }
        };

        let result = self.interpret(endpoint, status, &body);
        if let AuthorityResult::Invalid { reason } = &result {
            tracing::info!(
                endpoint = endpoint.as_str(),
                key = %mask(key),
                status,
                %reason,
                "Licensing service rejected key"
            );
        }
        result
    }

    /// Map an HTTP status and body onto an [`AuthorityResult`].
    pub(crate) fn interpret(&self, endpoint: Endpoint, status: u16, body: &str) -> AuthorityResult {
        let raw: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let parsed: Option<AuthorityResponse> = raw
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok());

        match status {
            404 => AuthorityResult::Invalid {
                reason: RejectionReason::NotFound {
                    message: parsed
                        .and_then(|p| p.error)
                        .unwrap_or_else(|| "license key not found".to_string()),
                },
            },
            429 => AuthorityResult::TransportError {
                http_status: Some(429),
                message: "rate limited by licensing service".to_string(),
            },
            200..=299 => match (raw, parsed) {
                (Some(raw), Some(parsed)) => self.evaluate(endpoint, raw, parsed),
                _ => AuthorityResult::TransportError {
                    http_status: Some(status),
                    message: "unreadable response from licensing service".to_string(),
                },
            },
            400 | 422 => match parsed {
                Some(p) if p.verdict(endpoint) == Some(false) && p.error.is_some() => {
                    AuthorityResult::Invalid {
                        reason: RejectionReason::NotValid {
                            message: p.error.unwrap_or_default(),
                        },
                    }
                }
                _ => http_error(status),
            },
            _ => http_error(status),
        }
    }

    fn evaluate(
        &self,
        endpoint: Endpoint,
        raw: serde_json::Value,
        response: AuthorityResponse,
    ) -> AuthorityResult {
        if response.verdict(endpoint) != Some(true) {
            let message = response.error.unwrap_or_else(|| match endpoint {
                Endpoint::Validate => "license key is not valid".to_string(),
                Endpoint::Activate => "activation was refused".to_string(),
                Endpoint::Deactivate => "deactivation was refused".to_string(),
            });
            return AuthorityResult::Invalid {
                reason: RejectionReason::NotValid { message },
            };
        }

        match (&response.meta, endpoint) {
            (Some(meta), _) => {
                if let Some(reason) = self.ownership_mismatch(meta) {
                    return AuthorityResult::Invalid { reason };
                }
            }
            // Ownership is established by validation; activate and deactivate
            // answers only have to agree with it when they repeat it.
            (None, Endpoint::Validate) => {
                return AuthorityResult::Invalid {
                    reason: RejectionReason::MissingMeta,
                };
            }
            (None, _) => {}
        }

        AuthorityResult::Valid(AuthorityGrant {
            meta: response.meta,
            instance: response.instance,
            license_key: response.license_key,
            raw,
        })
    }

    fn ownership_mismatch(&self, meta: &AuthorityMeta) -> Option<RejectionReason> {
        if meta.store_id != self.store_id {
            return Some(RejectionReason::StoreMismatch {
                expected: self.store_id,
                actual: meta.store_id,
            });
        }
        if meta.product_id != self.product_id {
            return Some(RejectionReason::ProductMismatch {
                expected: self.product_id,
                actual: meta.product_id,
            });
        }
        None
    }
}

fn malformed_key() -> AuthorityResult {
    AuthorityResult::Invalid {
        reason: RejectionReason::MalformedKey,
    }
}

fn http_error(status: u16) -> AuthorityResult {
    AuthorityResult::TransportError {
        http_status: Some(status),
        message: format!("licensing service returned HTTP {}", status),
    }
}

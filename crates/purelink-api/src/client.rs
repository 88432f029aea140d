// Vendor cloud HTTP client
//
// Two calls matter to the bridge: the account login that yields API
// credentials, and the provisioning manifest listing every device owned
// by the account. Both return typed errors on any non-2xx status so the
// caller can retry without ever mistaking a failure for an empty account.

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::models::{ApiCredentials, InventoryEntry, LoginRequest, LoginResponse};
use crate::transport::TransportConfig;

const LOGIN_PATH: &str = "v1/userregistration/authenticate";
const MANIFEST_PATH: &str = "v1/provisioningservice/manifest";

/// HTTP client for the vendor cloud.
#[derive(Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    base_url: Url,
}

impl CloudClient {
    /// Create a client for the given base URL (e.g. `https://api.cp.example.com`).
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client from a bare host name, assuming HTTPS.
    pub fn from_host(host: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let base_url = Url::parse(&format!("https://{host}/"))?;
        Self::new(base_url, transport)
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The cloud base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Exchange account credentials for API credentials.
    ///
    /// `POST {base}/v1/userregistration/authenticate?country={country}`
    pub async fn authenticate(
        &self,
        email: &str,
        password: &SecretString,
        country: &str,
    ) -> Result<ApiCredentials, Error> {
        let mut url = self.endpoint(LOGIN_PATH)?;
        url.query_pairs_mut().append_pair("country", country);

        debug!("authenticating at {}", url);

        let body = LoginRequest {
            email,
            password: password.expose_secret(),
        };

        let resp = self.http.post(url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                message: format!("login failed (HTTP {status}): {body}"),
            });
        }

        let login: LoginResponse = decode(resp).await?;
        debug!(account = %login.account, "cloud authentication successful");

        Ok(ApiCredentials {
            account: login.account,
            password: SecretString::from(login.password),
        })
    }

    /// Fetch every device registered to the account.
    ///
    /// Records missing a required field are logged and skipped; the rest of
    /// the manifest is still returned.
    pub async fn fetch_inventory(
        &self,
        credentials: &ApiCredentials,
    ) -> Result<Vec<InventoryEntry>, Error> {
        let url = self.endpoint(MANIFEST_PATH)?;
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .basic_auth(&credentials.account, Some(credentials.password.expose_secret()))
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::SessionExpired);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        let raw: Vec<serde_json::Value> = decode(resp).await?;
        Ok(parse_inventory(raw))
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }
}

/// Convert raw manifest records into typed entries, dropping malformed ones.
fn parse_inventory(raw: Vec<serde_json::Value>) -> Vec<InventoryEntry> {
    raw.into_iter()
        .filter_map(|record| {
            match serde_json::from_value::<InventoryEntry>(record.clone()) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, %record, "missing device field or malformed record");
                    None
                }
            }
        })
        .collect()
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

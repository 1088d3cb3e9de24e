use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::LemonSqueezyConfig;
use crate::error::{AppError, Result};

use super::events::SubscriptionUrls;

type HmacSha256 = Hmac<Sha256>;

/// Check the `X-Signature` header against an HMAC-SHA256 of the raw body.
///
/// The header is hex in either case. Never errors: a malformed header, wrong
/// length or unusable key all count as a mismatch.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };

    // Digest length is not secret (always 32 bytes for SHA-256).
    if expected.len() != provided.len() {
        return false;
    }

    expected.as_slice().ct_eq(&provided).into()
}

/// Failure reported by a read-API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// `{ data, error }` result of a read-API call. Check `error` before `data`.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn err(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(ApiError {
                status,
                message: message.into(),
            }),
        }
    }

    pub fn into_result(self) -> Result<T> {
        if let Some(error) = self.error {
            return Err(AppError::UpstreamApi(error.to_string()));
        }
        self.data
            .ok_or_else(|| AppError::UpstreamApi("empty response".into()))
    }
}

#[derive(Debug, Deserialize)]
struct Document<T> {
    data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductAttributes {
    pub store_id: i64,
    pub name: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductResource {
    pub id: String,
    pub attributes: ProductAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSubscriptionAttributes {
    pub status: Option<String>,
    pub customer_id: Option<i64>,
    pub urls: Option<SubscriptionUrls>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSubscription {
    pub id: String,
    pub attributes: RemoteSubscriptionAttributes,
}

/// Read-only client for the LemonSqueezy REST API.
#[derive(Debug, Clone)]
pub struct LemonSqueezyClient {
    client: Client,
    api_key: Option<String>,
    api_url: String,
}

impl LemonSqueezyClient {
    pub fn new(config: &LemonSqueezyConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResponse<T> {
        let Some(api_key) = &self.api_key else {
            return ApiResponse::err(None, "LEMON_SQUEEZY_API_KEY is not configured");
        };

        let url = format!("{}{}", self.api_url, path);
        let response = match self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Accept", "application/vnd.api+json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return ApiResponse::err(None, format!("request to {} failed: {}", path, e)),
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return ApiResponse::err(Some(status.as_u16()), error_text);
        }

        match response.json::<Document<T>>().await {
            Ok(doc) => ApiResponse::ok(doc.data),
            Err(e) => ApiResponse::err(
                Some(status.as_u16()),
                format!("failed to decode {} response: {}", path, e),
            ),
        }
    }

    /// Raw variant resources; callers validate each one.
    pub async fn list_variants(&self) -> ApiResponse<Vec<Value>> {
        self.get("/variants?page[size]=100").await
    }

    pub async fn list_products(&self) -> ApiResponse<Vec<ProductResource>> {
        self.get("/products?page[size]=100").await
    }

    pub async fn get_subscription(&self, id: &str) -> ApiResponse<RemoteSubscription> {
        self.get(&format!("/subscriptions/{}", id)).await
    }
}

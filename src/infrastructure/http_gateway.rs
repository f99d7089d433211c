use crate::domain::gateway::{GatewayOutcome, GatewayVerification};
use crate::domain::money::{Amount, Currency};
use crate::domain::ports::PaymentGateway;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Envelope returned by the verify endpoint.
#[derive(Debug, Deserialize)]
struct VerifyEnvelope {
    #[serde(default)]
    message: String,
    data: Option<VerifyData>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    /// Minor currency units.
    amount: Option<i64>,
    currency: Option<String>,
}

/// HTTP client for the payment provider's verify-by-reference endpoint.
///
/// Issues `GET {base_url}/transaction/verify/{reference}` with a bearer secret
/// and maps the reply onto [`GatewayOutcome`]. Never touches local state.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: Url,
    secret_key: String,
}

impl HttpPaymentGateway {
    /// Fails with `ConfigError` when `base_url` is not an absolute http(s)
    /// URL or the client cannot be built.
    pub fn new(
        base_url: impl AsRef<str>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref()).map_err(|e| {
            EngineError::ConfigError(format!("gateway URL {:?}: {e}", base_url.as_ref()))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(EngineError::ConfigError(format!(
                "gateway URL {base_url} cannot carry a path"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::ConfigError(format!("gateway client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            secret_key: secret_key.into(),
        })
    }

    /// The reference is pushed as one percent-encoded path segment, so `#`,
    /// `?` and `/` inside it cannot address a different gateway record.
    fn verify_url(&self, reference: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                EngineError::ConfigError(format!(
                    "gateway URL {} cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(["transaction", "verify", reference]);
        Ok(url)
    }

    fn interpret(status: StatusCode, body: Value) -> GatewayOutcome {
        let envelope: VerifyEnvelope = match serde_json::from_value(body.clone()) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return GatewayOutcome::Unreachable {
                    reason: format!("unreadable verify response: {e}"),
                };
            }
            Err(_) => VerifyEnvelope {
                message: String::new(),
                data: None,
            },
        };

        if status == StatusCode::NOT_FOUND
            || (status == StatusCode::BAD_REQUEST
                && envelope.message.to_ascii_lowercase().contains("not found"))
        {
            return GatewayOutcome::Determined(GatewayVerification::unknown(body));
        }

        if !status.is_success() {
            return GatewayOutcome::Unreachable {
                reason: format!("gateway returned HTTP {status}"),
            };
        }

        let Some(data) = envelope.data else {
            return GatewayOutcome::Unreachable {
                reason: "verify response has no data".to_string(),
            };
        };

        match data.status.to_ascii_lowercase().as_str() {
            "success" => {
                let amount = data.amount.map(Amount::from_minor_units);
                let currency = data.currency.as_deref().map(Currency::new);
                match (amount, currency) {
                    (Some(Ok(amount)), Some(Ok(currency))) => GatewayOutcome::Determined(
                        GatewayVerification::paid(amount, currency, body),
                    ),
                    _ => GatewayOutcome::Unreachable {
                        reason: "successful verify response without a valid amount or currency"
                            .to_string(),
                    },
                }
            }
            "pending" | "ongoing" | "processing" | "queued" => {
                GatewayOutcome::Unsettled { raw_response: body }
            }
            _ => GatewayOutcome::Determined(GatewayVerification::failed(body)),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn verify(&self, reference: &str) -> GatewayOutcome {
        let url = match self.verify_url(reference) {
            Ok(url) => url,
            Err(e) => {
                return GatewayOutcome::Unreachable {
                    reason: e.to_string(),
                };
            }
        };

        let response = match self
            .client
            .get(url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return GatewayOutcome::Unreachable {
                    reason: e.to_string(),
                };
            }
        };

        let status = response.status();
        let body = match response.json::<Value>().await {
            Ok(body) => body,
            Err(e) if status.is_success() => {
                return GatewayOutcome::Unreachable {
                    reason: format!("unreadable verify response: {e}"),
                };
            }
            Err(_) => Value::Null,
        };

        Self::interpret(status, body)
    }
}

use crate::application::verification::{VerificationOrchestrator, VerificationResult};
use crate::error::{EngineError, Result};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha512;
use std::sync::Arc;
use tracing::debug;

type HmacSha512 = Hmac<Sha512>;

/// Webhook event that signals a captured payment.
pub const CHARGE_SUCCESS_EVENT: &str = "charge.success";

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    event: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    reference: String,
}

/// Extracts the payment reference from a gateway redirect query string.
///
/// Accepts `reference=...` and falls back to `trxref=...`; a leading `?` is ignored.
pub fn reference_from_query(query: &str) -> Result<String> {
    let query = query.trim_start_matches('?');
    let mut fallback = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            "reference" => return Ok(value.into_owned()),
            "trxref" => fallback = Some(value.into_owned()),
            _ => {}
        }
    }
    fallback.ok_or_else(|| {
        EngineError::ValidationError("callback carries no payment reference".to_string())
    })
}

/// Checks the hex HMAC-SHA512 signature the gateway puts on webhook bodies.
#[derive(Clone)]
pub struct WebhookAuthenticator {
    secret: String,
}

impl WebhookAuthenticator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Constant-time comparison of `signature_hex` against the body's MAC.
    pub fn authenticate(&self, body: &[u8], signature_hex: &str) -> Result<()> {
        let expected = hex::decode(signature_hex.trim())
            .map_err(|_| EngineError::SignatureError("signature is not hex".to_string()))?;

        let mut mac = HmacSha512::new_from_slice(self.secret.as_bytes())
            .map_err(|_| EngineError::SignatureError("invalid webhook secret".to_string()))?;
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| EngineError::SignatureError("signature mismatch".to_string()))
    }

    /// Hex signature for `body`. Used by tests and local tooling.
    pub fn sign(&self, body: &[u8]) -> Result<String> {
        let mut mac = HmacSha512::new_from_slice(self.secret.as_bytes())
            .map_err(|_| EngineError::SignatureError("invalid webhook secret".to_string()))?;
        mac.update(body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// Funnels the redirect callback and the webhook into the same `verify` call.
pub struct CallbackHandler {
    orchestrator: Arc<VerificationOrchestrator>,
    authenticator: WebhookAuthenticator,
}

impl CallbackHandler {
    pub fn new(
        orchestrator: Arc<VerificationOrchestrator>,
        authenticator: WebhookAuthenticator,
    ) -> Self {
        Self {
            orchestrator,
            authenticator,
        }
    }

    /// Handles the browser returning from the gateway.
    pub async fn handle_redirect(&self, query: &str) -> Result<VerificationResult> {
        let reference = reference_from_query(query)?;
        self.orchestrator.verify(&reference).await
    }

    /// Handles a signed gateway webhook.
    ///
    /// Returns `None` for authenticated events that do not concern payments.
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature_hex: &str,
    ) -> Result<Option<VerificationResult>> {
        self.authenticator.authenticate(body, signature_hex)?;

        let payload: WebhookPayload = serde_json::from_slice(body)
            .map_err(|e| EngineError::ValidationError(format!("malformed webhook: {e}")))?;
        if payload.event != CHARGE_SUCCESS_EVENT {
            debug!(event = %payload.event, "ignoring webhook event");
            return Ok(None);
        }

        self.orchestrator
            .verify(&payload.data.reference)
            .await
            .map(Some)
    }
}

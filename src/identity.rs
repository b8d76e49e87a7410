//! World ID token verification against a remote JWKS.

use jsonwebtoken::{
    decode, decode_header,
    jwk::{Jwk, JwkSet},
    Algorithm, DecodingKey, Validation,
};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::IdentityConfig;
use crate::error::{InsightError, InsightResult};

#[derive(Debug, Clone)]
pub struct IdentityVerifier {
    client: Client,
    config: IdentityConfig,
    /// Last fetched key set; refreshed when a token names an unknown `kid`
    jwks: Arc<RwLock<Option<JwkSet>>>,
}

impl IdentityVerifier {
    pub fn new(client: Client, config: IdentityConfig) -> Self {
        Self {
            client,
            config,
            jwks: Arc::new(RwLock::new(None)),
        }
    }

    /// Verify signature, issuer and audience; returns the token's claims
    pub async fn verify(&self, token: &str) -> InsightResult<Value> {
        let header = decode_header(token).map_err(|e| rejected(format!("malformed token: {}", e)))?;
        let kid = header
            .kid
            .ok_or_else(|| rejected("token header has no kid".to_string()))?;

        let jwk = match self.cached_key(&kid).await {
            Some(jwk) => jwk,
            None => {
                self.refresh_jwks().await?;
                self.cached_key(&kid)
                    .await
                    .ok_or_else(|| rejected(format!("no signing key with kid {}", kid)))?
            }
        };

        let key = DecodingKey::from_jwk(&jwk)
            .map_err(|e| rejected(format!("unusable signing key: {}", e)))?;

        self.verify_with_key(token, &key, header.alg)
    }

    async fn cached_key(&self, kid: &str) -> Option<Jwk> {
        self.jwks.read().await.as_ref()?.find(kid).cloned()
    }

    async fn refresh_jwks(&self) -> InsightResult<()> {
        let jwks = self.fetch_jwks().await?;
        info!("Loaded {} identity signing keys", jwks.keys.len());
        *self.jwks.write().await = Some(jwks);
        Ok(())
    }

    pub fn verify_with_key(
        &self,
        token: &str,
        key: &DecodingKey,
        algorithm: Algorithm,
    ) -> InsightResult<Value> {
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_audience(&[self.config.audience.as_str()]);

        let data = decode::<Value>(token, key, &validation).map_err(|e| {
            warn!("Identity token rejected: {}", e);
            rejected(e.to_string())
        })?;

        debug!("Identity token verified for {:?}", data.claims.get("sub"));
        Ok(data.claims)
    }

    async fn fetch_jwks(&self) -> InsightResult<JwkSet> {
        let response = self
            .client
            .get(&self.config.jwks_url)
            .send()
            .await
            .map_err(|e| rejected(format!("JWKS unavailable: {}", e)))?;

        if !response.status().is_success() {
            return Err(rejected(format!(
                "JWKS unavailable: HTTP {}",
                response.status().as_u16()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| rejected(format!("invalid JWKS: {}", e)))
    }
}

fn rejected(message: String) -> InsightError {
    InsightError::IdentityRejected(message)
}

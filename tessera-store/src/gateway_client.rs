use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use tessera_core::payment::{
    GatewayError, GatewayOrder, GatewayPayment, GatewayPaymentStatus, PaymentGateway,
};

use crate::app_config::GatewayConfig;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// REST client for an orders/payments style gateway (Razorpay-compatible paths).
pub struct HttpPaymentGateway {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

#[derive(Debug, Deserialize)]
struct OrderBody {
    id: String,
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct PaymentBody {
    id: String,
    order_id: String,
    amount: i64,
    currency: String,
    status: String,
}

impl HttpPaymentGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        })
    }

    async fn read<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        what: &str,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(what.to_string()));
        }
        if status.is_server_error() {
            return Err(GatewayError::Transport(format!("{} returned {}", what, status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, what, "Gateway rejected request");
            return Err(GatewayError::Rejected(format!("{}: {}", status, body)));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Transport(format!("malformed {} response: {}", what, e)))
    }

    fn refund_request(
        &self,
        payment_ref: &str,
        amount: i64,
        idempotency_key: &str,
    ) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}/v1/payments/{}/refund", self.base_url, payment_ref))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(&serde_json::json!({ "amount": amount, "receipt": idempotency_key }))
    }
}

fn parse_status(status: &str) -> GatewayPaymentStatus {
    match status {
        "authorized" => GatewayPaymentStatus::Authorized,
        "captured" => GatewayPaymentStatus::Captured,
        "failed" => GatewayPaymentStatus::Failed,
        "refunded" => GatewayPaymentStatus::Refunded,
        _ => GatewayPaymentStatus::Created,
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_order(
        &self,
        receipt: &str,
        amount: i64,
        currency: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let response = self
            .http
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&serde_json::json!({
                "amount": amount,
                "currency": currency,
                "receipt": receipt,
            }))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let order: OrderBody = Self::read(response, "order").await?;
        debug!(order_ref = %order.id, "Gateway order created");
        Ok(GatewayOrder {
            order_ref: order.id,
            amount: order.amount,
            currency: order.currency,
        })
    }

    async fn fetch_payment(&self, payment_ref: &str) -> Result<GatewayPayment, GatewayError> {
        let response = self
            .http
            .get(format!("{}/v1/payments/{}", self.base_url, payment_ref))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let payment: PaymentBody = Self::read(response, payment_ref).await?;
        Ok(GatewayPayment {
            payment_ref: payment.id,
            order_ref: payment.order_id,
            amount: payment.amount,
            currency: payment.currency.to_uppercase(),
            status: parse_status(&payment.status),
        })
    }

    async fn refund(
        &self,
        payment_ref: &str,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<(), GatewayError> {
        let response = self
            .refund_request(payment_ref, amount, idempotency_key)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let _: serde_json::Value = Self::read(response, payment_ref).await?;
        Ok(())
    }
}

use super::{
    InitializePayment, PaymentGateway, PaymentInitiation, PaymentVerification,
    PaymentVerificationStatus,
};
use crate::config::GatewayConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// HTTP client for a Paystack-style payment provider. Every call is
/// bounded by the configured timeout; a timed-out or rejected call maps
/// to `ServiceError::ExternalService` and is retried by the caller at a
/// higher layer, never here.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    http: reqwest::Client,
    config: GatewayConfig,
}

#[derive(Debug, Deserialize)]
struct ProviderEnvelope<T> {
    status: bool,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    reference: String,
    authorization_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    amount: i64,
    paid_at: Option<DateTime<Utc>>,
}

impl HttpPaymentGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::ExternalService(format!("gateway client: {}", e)))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn map_transport_err(err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::ExternalService("payment gateway timed out".to_string())
        } else {
            ServiceError::ExternalService(format!("payment gateway unreachable: {}", err))
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(reference = %request.reference, amount = request.amount))]
    async fn initialize_payment(
        &self,
        request: InitializePayment,
    ) -> Result<PaymentInitiation, ServiceError> {
        let amount = request.amount;
        let response = self
            .http
            .post(self.endpoint("transaction/initialize"))
            .bearer_auth(&self.config.secret_key)
            .json(&serde_json::json!({
                "email": request.payer_email,
                "amount": request.amount,
                "reference": request.reference,
                "callback_url": request.callback_url,
                "metadata": request.metadata,
            }))
            .send()
            .await
            .map_err(Self::map_transport_err)?;

        let envelope: ProviderEnvelope<InitializeData> = response
            .error_for_status()
            .map_err(Self::map_transport_err)?
            .json()
            .await
            .map_err(Self::map_transport_err)?;

        let data = match envelope {
            ProviderEnvelope {
                status: true,
                data: Some(data),
                ..
            } => data,
            ProviderEnvelope { message, .. } => {
                warn!(?message, "payment initialization rejected");
                return Err(ServiceError::ExternalService(
                    message.unwrap_or_else(|| "payment initialization rejected".to_string()),
                ));
            }
        };

        info!(reference = %data.reference, "payment initialized");
        Ok(PaymentInitiation {
            reference: data.reference,
            authorization_url: data.authorization_url,
            amount,
        })
    }

    #[instrument(skip(self))]
    async fn verify_payment(
        &self,
        reference: &str,
    ) -> Result<PaymentVerification, ServiceError> {
        let response = self
            .http
            .get(self.endpoint(&format!("transaction/verify/{}", reference)))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(Self::map_transport_err)?;

        let envelope: ProviderEnvelope<VerifyData> = response
            .error_for_status()
            .map_err(Self::map_transport_err)?
            .json()
            .await
            .map_err(Self::map_transport_err)?;

        let data = envelope.data.ok_or_else(|| {
            ServiceError::ExternalService(
                envelope
                    .message
                    .unwrap_or_else(|| "payment verification rejected".to_string()),
            )
        })?;

        let status = match data.status.as_str() {
            "success" => PaymentVerificationStatus::Success,
            "failed" | "abandoned" => PaymentVerificationStatus::Failed,
            _ => PaymentVerificationStatus::Pending,
        };

        Ok(PaymentVerification {
            status,
            amount: data.amount,
            paid_at: data.paid_at,
        })
    }
}

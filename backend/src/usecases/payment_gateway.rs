use anyhow::Result as AnyResult;
use async_trait::async_trait;
use fieldops::payments::stripe_client::{
    CheckoutRequest, CheckoutSession, StripeClient, StripeEvent, WebhookSignatureError,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, request: CheckoutRequest) -> AnyResult<CheckoutSession>;

    /// Authenticates the payload before decoding it; nothing is parsed on failure.
    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<StripeEvent, WebhookSignatureError>;
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_checkout_session(&self, request: CheckoutRequest) -> AnyResult<CheckoutSession> {
        self.create_checkout_session(&request).await
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<StripeEvent, WebhookSignatureError> {
        self.verify_webhook_signature(payload, signature)
    }
}

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use tessera_core::payment::{
    GatewayError, GatewayOrder, GatewayPayment, GatewayPaymentStatus, PaymentGateway,
};

/// In-process gateway for development and tests. Payments are scripted with
/// `settle`; everything else behaves like the remote API.
#[derive(Default)]
pub struct MockPaymentGateway {
    payments: Mutex<HashMap<String, GatewayPayment>>,
    orders: Mutex<HashMap<String, GatewayOrder>>,
    /// idempotency key -> refunded payment ref
    refunds: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a payment against `order_ref` as the gateway would report it.
    pub fn settle(
        &self,
        order_ref: &str,
        payment_ref: &str,
        amount: i64,
        status: GatewayPaymentStatus,
    ) {
        let currency = self
            .orders
            .lock()
            .ok()
            .and_then(|orders| orders.get(order_ref).map(|o| o.currency.clone()))
            .unwrap_or_else(|| "INR".to_string());

        if let Ok(mut payments) = self.payments.lock() {
            payments.insert(
                payment_ref.to_string(),
                GatewayPayment {
                    payment_ref: payment_ref.to_string(),
                    order_ref: order_ref.to_string(),
                    amount,
                    currency,
                    status,
                },
            );
        }
    }

    /// Simulates an outage: every call fails with a transport error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn payment(&self, payment_ref: &str) -> Option<GatewayPayment> {
        self.payments.lock().ok()?.get(payment_ref).cloned()
    }

    fn ensure_available(&self) -> Result<(), GatewayError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("mock gateway offline".to_string()));
        }
        Ok(())
    }
}

fn poisoned() -> GatewayError {
    GatewayError::Transport("mock gateway state poisoned".to_string())
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_order(
        &self,
        receipt: &str,
        amount: i64,
        currency: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        self.ensure_available()?;
        let order = GatewayOrder {
            order_ref: format!("order_{}", Uuid::new_v4().simple()),
            amount,
            currency: currency.to_string(),
        };
        tracing::debug!(receipt, order_ref = %order.order_ref, amount, "Mock gateway order created");
        self.orders
            .lock()
            .map_err(|_| poisoned())?
            .insert(order.order_ref.clone(), order.clone());
        Ok(order)
    }

    async fn fetch_payment(&self, payment_ref: &str) -> Result<GatewayPayment, GatewayError> {
        self.ensure_available()?;
        self.payments
            .lock()
            .map_err(|_| poisoned())?
            .get(payment_ref)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(payment_ref.to_string()))
    }

    async fn refund(
        &self,
        payment_ref: &str,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<(), GatewayError> {
        self.ensure_available()?;
        let mut refunds = self.refunds.lock().map_err(|_| poisoned())?;
        if let Some(refunded) = refunds.get(idempotency_key) {
            if refunded == payment_ref {
                tracing::debug!(payment_ref, idempotency_key, "Mock gateway replayed refund");
                return Ok(());
            }
            return Err(GatewayError::Rejected(format!(
                "idempotency key {} already used for {}",
                idempotency_key, refunded
            )));
        }

        let mut payments = self.payments.lock().map_err(|_| poisoned())?;
        let payment = payments
            .get_mut(payment_ref)
            .ok_or_else(|| GatewayError::NotFound(payment_ref.to_string()))?;
        if payment.status != GatewayPaymentStatus::Captured || amount > payment.amount {
            return Err(GatewayError::Rejected(format!(
                "cannot refund {} of {} payment {}",
                amount,
                payment.status.as_str(),
                payment_ref
            )));
        }
        payment.status = GatewayPaymentStatus::Refunded;
        refunds.insert(idempotency_key.to_string(), payment_ref.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refund_replay_with_same_key_is_accepted() {
        let gateway = MockPaymentGateway::new();
        gateway.settle("order_1", "pay_1", 5000, GatewayPaymentStatus::Captured);

        gateway.refund("pay_1", 5000, "intent-a").await.unwrap();
        gateway.refund("pay_1", 5000, "intent-a").await.unwrap();
        assert_eq!(gateway.payment("pay_1").unwrap().status, GatewayPaymentStatus::Refunded);

        // a fresh key is a second refund of an already refunded payment
        assert!(matches!(
            gateway.refund("pay_1", 5000, "intent-b").await,
            Err(GatewayError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_refund_key_is_bound_to_one_payment() {
        let gateway = MockPaymentGateway::new();
        gateway.settle("order_1", "pay_1", 5000, GatewayPaymentStatus::Captured);
        gateway.settle("order_2", "pay_2", 5000, GatewayPaymentStatus::Captured);

        gateway.refund("pay_1", 5000, "intent-a").await.unwrap();
        assert!(gateway.refund("pay_2", 5000, "intent-a").await.is_err());
        assert_eq!(gateway.payment("pay_2").unwrap().status, GatewayPaymentStatus::Captured);
    }
}

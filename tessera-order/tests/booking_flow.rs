use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use tessera_catalog::LedgerError;
use tessera_core::offering::{NewOffering, OfferingKind};
use tessera_core::payment::{GatewayPaymentStatus, PaymentConfirmation, PaymentGateway};
use tessera_core::repository::IntentRepository;
use tessera_core::reservation::{BuyerContact, FailureReason, IntentStatus};
use tessera_core::ticket::{AttendeeIdentity, CheckInOutcome};
use tessera_order::verification::sign;
use tessera_order::{
    BookingDeps, BookingError, BookingOrchestrator, ConfirmationOutcome, MockPaymentGateway,
    ReservationReceipt, ReservationRequest,
};
use tessera_store::{LogEventProducer, MemoryStore};

const SECRET: &[u8] = b"whsec_booking_tests";

struct Harness {
    store: MemoryStore,
    gateway: Arc<MockPaymentGateway>,
    booking: Arc<BookingOrchestrator>,
}

fn harness_with_ttl(hold_ttl: Duration) -> Harness {
    let store = MemoryStore::new();
    let gateway = Arc::new(MockPaymentGateway::new());
    let booking = BookingOrchestrator::new(BookingDeps {
        offerings: Arc::new(store.clone()),
        intents: Arc::new(store.clone()),
        tickets: Arc::new(store.clone()),
        gateway: gateway.clone(),
        events: Arc::new(LogEventProducer),
        webhook_secret: SECRET.to_vec(),
        hold_ttl,
        max_seats_per_reservation: 10,
    });
    Harness { store, gateway, booking: Arc::new(booking) }
}

fn harness() -> Harness {
    harness_with_ttl(Duration::minutes(15))
}

async fn offering(h: &Harness, capacity: i32) -> Uuid {
    h.booking
        .ledger()
        .register(NewOffering {
            kind: OfferingKind::Package,
            code: "KER".to_string(),
            title: "Kerala Backwaters 3N".to_string(),
            total_capacity: capacity,
            unit_price: 12_000_00,
            currency: "INR".to_string(),
            starts_on: None,
            active: true,
        })
        .await
        .unwrap()
        .id
}

fn request(offering_id: Uuid, quantity: i32) -> ReservationRequest {
    ReservationRequest {
        offering_id,
        buyer: BuyerContact { name: "Lakshmi".to_string(), email: None, phone: None },
        attendees: vec!["Lakshmi".to_string()],
        quantity,
    }
}

fn confirmation(receipt: &ReservationReceipt, payment_ref: &str) -> PaymentConfirmation {
    PaymentConfirmation {
        gateway_order_ref: receipt.gateway_order_ref.clone(),
        gateway_payment_ref: payment_ref.to_string(),
        signature: sign(SECRET, &receipt.gateway_order_ref, payment_ref),
        claimed_amount: Some(receipt.amount),
        claimed_status: Some("captured".to_string()),
    }
}

async fn remaining(h: &Harness, offering_id: Uuid) -> i32 {
    h.booking.ledger().get(offering_id).await.unwrap().remaining
}

#[tokio::test]
async fn test_paid_reservation_issues_one_ticket_per_seat() {
    let h = harness();
    let offering_id = offering(&h, 5).await;

    let receipt = h.booking.reserve(request(offering_id, 2)).await.unwrap();
    assert_eq!(receipt.amount, 24_000_00);
    assert_eq!(remaining(&h, offering_id).await, 3);

    h.gateway.settle(&receipt.gateway_order_ref, "pay_1", receipt.amount, GatewayPaymentStatus::Captured);
    match h.booking.confirm_payment(&confirmation(&receipt, "pay_1")).await.unwrap() {
        ConfirmationOutcome::Confirmed { intent, tickets } => {
            assert_eq!(intent.status, IntentStatus::Paid);
            assert_eq!(intent.gateway_payment_ref.as_deref(), Some("pay_1"));
            assert_eq!(tickets.len(), 2);
            assert!(tickets.iter().all(|t| t.code.starts_with("KER-")));
        }
        other => panic!("expected Confirmed, got {:?}", other),
    }

    // committing the hold does not move the counter again
    assert_eq!(remaining(&h, offering_id).await, 3);

    let (intent, tickets) = h.booking.reservation_status(&receipt.gateway_order_ref).await.unwrap();
    assert_eq!(intent.status, IntentStatus::Paid);
    assert_eq!(tickets.len(), 2);
}

#[tokio::test]
async fn test_duplicate_confirmation_is_idempotent() {
    let h = harness();
    let offering_id = offering(&h, 5).await;
    let receipt = h.booking.reserve(request(offering_id, 2)).await.unwrap();
    h.gateway.settle(&receipt.gateway_order_ref, "pay_1", receipt.amount, GatewayPaymentStatus::Captured);

    let first = h.booking.confirm_payment(&confirmation(&receipt, "pay_1")).await.unwrap();
    let second = h.booking.confirm_payment(&confirmation(&receipt, "pay_1")).await.unwrap();

    let codes = |outcome: &ConfirmationOutcome| match outcome {
        ConfirmationOutcome::Confirmed { tickets, .. } | ConfirmationOutcome::AlreadyConfirmed { tickets, .. } => {
            let mut codes: Vec<String> = tickets.iter().map(|t| t.code.clone()).collect();
            codes.sort();
            codes
        }
        ConfirmationOutcome::Rejected { reason, .. } => panic!("rejected: {}", reason),
    };

    assert_eq!(first.status(), "confirmed");
    assert_eq!(second.status(), "already_confirmed");
    assert_eq!(codes(&first), codes(&second));
    assert_eq!(h.store.ticket_count(), 2);
    assert_eq!(remaining(&h, offering_id).await, 3);
}

#[tokio::test]
async fn test_concurrent_confirmations_single_winner() {
    let h = harness();
    let offering_id = offering(&h, 5).await;
    let receipt = h.booking.reserve(request(offering_id, 3)).await.unwrap();
    h.gateway.settle(&receipt.gateway_order_ref, "pay_1", receipt.amount, GatewayPaymentStatus::Captured);
    let confirmation = confirmation(&receipt, "pay_1");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let booking = h.booking.clone();
        let confirmation = confirmation.clone();
        handles.push(tokio::spawn(async move { booking.confirm_payment(&confirmation).await }));
    }

    let mut confirmed = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ConfirmationOutcome::Confirmed { .. } => confirmed += 1,
            ConfirmationOutcome::AlreadyConfirmed { tickets, .. } => assert_eq!(tickets.len(), 3),
            ConfirmationOutcome::Rejected { reason, .. } => panic!("rejected: {}", reason),
        }
    }
    assert_eq!(confirmed, 1);
    assert_eq!(h.store.ticket_count(), 3);
    assert_eq!(remaining(&h, offering_id).await, 2);
}

#[tokio::test]
async fn test_forged_signature_leaves_intent_pending() {
    let h = harness();
    let offering_id = offering(&h, 5).await;
    let receipt = h.booking.reserve(request(offering_id, 1)).await.unwrap();
    h.gateway.settle(&receipt.gateway_order_ref, "pay_1", receipt.amount, GatewayPaymentStatus::Captured);

    let mut forged = confirmation(&receipt, "pay_1");
    let last = forged.signature.pop().unwrap();
    forged.signature.push(if last == '0' { '1' } else { '0' });

    let outcome = h.booking.confirm_payment(&forged).await.unwrap();
    assert!(matches!(outcome, ConfirmationOutcome::Rejected { reason: "signature_mismatch", .. }));

    let intent = h.store.get_intent(receipt.intent_id).await.unwrap().unwrap();
    assert_eq!(intent.status, IntentStatus::Pending);
    assert_eq!(remaining(&h, offering_id).await, 4);
    assert_eq!(h.store.ticket_count(), 0);
    assert_eq!(h.store.rejections().len(), 1);

    // the genuine callback still goes through afterwards
    let genuine = h.booking.confirm_payment(&confirmation(&receipt, "pay_1")).await.unwrap();
    assert_eq!(genuine.status(), "confirmed");
}

#[tokio::test]
async fn test_amount_mismatch_fails_intent_and_releases_capacity() {
    let h = harness();
    let offering_id = offering(&h, 5).await;
    let receipt = h.booking.reserve(request(offering_id, 2)).await.unwrap();
    h.gateway.settle(&receipt.gateway_order_ref, "pay_1", 1_00, GatewayPaymentStatus::Captured);

    let outcome = h.booking.confirm_payment(&confirmation(&receipt, "pay_1")).await.unwrap();
    assert!(matches!(outcome, ConfirmationOutcome::Rejected { reason: "amount_mismatch", .. }));

    let intent = h.store.get_intent(receipt.intent_id).await.unwrap().unwrap();
    assert_eq!(intent.status, IntentStatus::Failed);
    assert_eq!(intent.failure_reason, Some(FailureReason::AmountMismatch));
    assert_eq!(remaining(&h, offering_id).await, 5);

    // a retry cannot release the seats a second time
    let retry = h.booking.confirm_payment(&confirmation(&receipt, "pay_1")).await.unwrap();
    assert!(matches!(retry, ConfirmationOutcome::Rejected { reason: "intent_closed", .. }));
    assert_eq!(remaining(&h, offering_id).await, 5);
}

#[tokio::test]
async fn test_uncaptured_payment_is_rejected() {
    let h = harness();
    let offering_id = offering(&h, 5).await;
    let receipt = h.booking.reserve(request(offering_id, 1)).await.unwrap();
    h.gateway.settle(&receipt.gateway_order_ref, "pay_1", receipt.amount, GatewayPaymentStatus::Failed);

    let outcome = h.booking.confirm_payment(&confirmation(&receipt, "pay_1")).await.unwrap();
    assert!(matches!(outcome, ConfirmationOutcome::Rejected { reason: "status_not_captured", .. }));

    let intent = h.store.get_intent(receipt.intent_id).await.unwrap().unwrap();
    assert_eq!(intent.failure_reason, Some(FailureReason::GatewayDeclined));
}

#[tokio::test]
async fn test_unknown_order_is_logged() {
    let h = harness();
    let bogus = PaymentConfirmation {
        gateway_order_ref: "order_missing".to_string(),
        gateway_payment_ref: "pay_x".to_string(),
        signature: sign(SECRET, "order_missing", "pay_x"),
        claimed_amount: None,
        claimed_status: None,
    };

    let outcome = h.booking.confirm_payment(&bogus).await.unwrap();
    assert!(matches!(outcome, ConfirmationOutcome::Rejected { intent_id: None, reason: "unknown_order" }));
    assert_eq!(h.store.rejections()[0].gateway_order_ref, "order_missing");
}

#[tokio::test]
async fn test_payment_ref_cannot_settle_two_intents() {
    let h = harness();
    let offering_id = offering(&h, 5).await;
    let first = h.booking.reserve(request(offering_id, 1)).await.unwrap();
    let second = h.booking.reserve(request(offering_id, 1)).await.unwrap();
    h.gateway.settle(&first.gateway_order_ref, "pay_1", first.amount, GatewayPaymentStatus::Captured);

    assert_eq!(h.booking.confirm_payment(&confirmation(&first, "pay_1")).await.unwrap().status(), "confirmed");

    // the gateway's record says pay_1 belongs to the first order
    let outcome = h.booking.confirm_payment(&confirmation(&second, "pay_1")).await.unwrap();
    assert!(matches!(outcome, ConfirmationOutcome::Rejected { reason: "order_mismatch", .. }));
    assert_eq!(h.store.ticket_count(), 1);
}

#[tokio::test]
async fn test_gateway_outage_is_retryable() {
    let h = harness();
    let offering_id = offering(&h, 5).await;
    let receipt = h.booking.reserve(request(offering_id, 1)).await.unwrap();
    h.gateway.settle(&receipt.gateway_order_ref, "pay_1", receipt.amount, GatewayPaymentStatus::Captured);

    h.gateway.set_unavailable(true);
    assert!(matches!(
        h.booking.confirm_payment(&confirmation(&receipt, "pay_1")).await,
        Err(BookingError::Gateway(_))
    ));
    let intent = h.store.get_intent(receipt.intent_id).await.unwrap().unwrap();
    assert_eq!(intent.status, IntentStatus::Pending);

    h.gateway.set_unavailable(false);
    assert_eq!(h.booking.confirm_payment(&confirmation(&receipt, "pay_1")).await.unwrap().status(), "confirmed");
}

#[tokio::test]
async fn test_payment_ref_unknown_to_gateway_is_rejected_not_retried() {
    let h = harness();
    let offering_id = offering(&h, 5).await;
    let receipt = h.booking.reserve(request(offering_id, 1)).await.unwrap();

    // correctly signed, but the gateway never saw this payment
    let outcome = h.booking.confirm_payment(&confirmation(&receipt, "pay_ghost")).await.unwrap();
    assert!(matches!(
        outcome,
        ConfirmationOutcome::Rejected { reason: "gateway_no_record", .. }
    ));

    let intent = h.store.get_intent(receipt.intent_id).await.unwrap().unwrap();
    assert_eq!(intent.status, IntentStatus::Pending);
    assert_eq!(remaining(&h, offering_id).await, 4);
    let rejections = h.store.rejections();
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].reason, "gateway_no_record");
    assert_eq!(rejections[0].gateway_payment_ref.as_deref(), Some("pay_ghost"));

    // the real payment still settles the intent
    h.gateway.settle(&receipt.gateway_order_ref, "pay_1", receipt.amount, GatewayPaymentStatus::Captured);
    assert_eq!(h.booking.confirm_payment(&confirmation(&receipt, "pay_1")).await.unwrap().status(), "confirmed");
}

#[tokio::test]
async fn test_sold_out_and_order_failure_rollback() {
    let h = harness();
    let offering_id = offering(&h, 1).await;

    h.gateway.set_unavailable(true);
    assert!(matches!(h.booking.reserve(request(offering_id, 1)).await, Err(BookingError::Gateway(_))));
    assert_eq!(remaining(&h, offering_id).await, 1);

    h.gateway.set_unavailable(false);
    h.booking.reserve(request(offering_id, 1)).await.unwrap();
    assert!(matches!(
        h.booking.reserve(request(offering_id, 1)).await,
        Err(BookingError::Ledger(LedgerError::CapacityExceeded { requested: 1, available: 0, .. }))
    ));
}

#[tokio::test]
async fn test_reservation_validation() {
    let h = harness();
    let offering_id = offering(&h, 50).await;

    assert!(matches!(h.booking.reserve(request(offering_id, 0)).await, Err(BookingError::Invalid(_))));
    assert!(matches!(h.booking.reserve(request(offering_id, 11)).await, Err(BookingError::Invalid(_))));

    let mut nameless = request(offering_id, 1);
    nameless.buyer.name = "  ".to_string();
    assert!(matches!(h.booking.reserve(nameless).await, Err(BookingError::Invalid(_))));

    assert!(matches!(
        h.booking.reserve(request(Uuid::new_v4(), 1)).await,
        Err(BookingError::Ledger(LedgerError::NotFound(_)))
    ));
    assert_eq!(remaining(&h, offering_id).await, 50);
}

#[tokio::test]
async fn test_expired_hold_is_reclaimed_once() {
    let h = harness_with_ttl(Duration::zero());
    let offering_id = offering(&h, 3).await;
    let receipt = h.booking.reserve(request(offering_id, 2)).await.unwrap();
    assert_eq!(remaining(&h, offering_id).await, 1);

    let later = Utc::now() + Duration::seconds(1);
    assert_eq!(h.booking.expire_stale(later, 100).await.unwrap(), 1);
    assert_eq!(h.booking.expire_stale(later, 100).await.unwrap(), 0);
    assert_eq!(remaining(&h, offering_id).await, 3);

    let intent = h.store.get_intent(receipt.intent_id).await.unwrap().unwrap();
    assert_eq!(intent.failure_reason, Some(FailureReason::Expired));

    // the buyer paid anyway: logged for a refund, nothing issued
    h.gateway.settle(&receipt.gateway_order_ref, "pay_late", receipt.amount, GatewayPaymentStatus::Captured);
    let outcome = h.booking.confirm_payment(&confirmation(&receipt, "pay_late")).await.unwrap();
    assert!(matches!(outcome, ConfirmationOutcome::Rejected { reason: "intent_closed", .. }));
    assert_eq!(h.store.ticket_count(), 0);
    assert_eq!(remaining(&h, offering_id).await, 3);
}

#[tokio::test]
async fn test_refund_paid_intent() {
    let h = harness();
    let offering_id = offering(&h, 5).await;
    let receipt = h.booking.reserve(request(offering_id, 1)).await.unwrap();

    // nothing to refund yet
    assert!(h.booking.refund(receipt.intent_id).await.is_err());

    h.gateway.settle(&receipt.gateway_order_ref, "pay_1", receipt.amount, GatewayPaymentStatus::Captured);
    h.booking.confirm_payment(&confirmation(&receipt, "pay_1")).await.unwrap();

    let refunded = h.booking.refund(receipt.intent_id).await.unwrap();
    assert_eq!(refunded.status, IntentStatus::Refunded);
    assert_eq!(h.gateway.payment("pay_1").unwrap().status, GatewayPaymentStatus::Refunded);

    // replayed callback after the refund changes nothing
    let replay = h.booking.confirm_payment(&confirmation(&receipt, "pay_1")).await.unwrap();
    assert_eq!(replay.status(), "already_confirmed");
    let intent = h.store.get_intent(receipt.intent_id).await.unwrap().unwrap();
    assert_eq!(intent.status, IntentStatus::Refunded);
}

#[tokio::test]
async fn test_refund_retry_after_gateway_already_refunded() {
    let h = harness();
    let offering_id = offering(&h, 5).await;
    let receipt = h.booking.reserve(request(offering_id, 1)).await.unwrap();
    h.gateway.settle(&receipt.gateway_order_ref, "pay_1", receipt.amount, GatewayPaymentStatus::Captured);
    h.booking.confirm_payment(&confirmation(&receipt, "pay_1")).await.unwrap();

    // an earlier attempt reached the gateway but never recorded the refund
    let key = receipt.intent_id.to_string();
    h.gateway.refund("pay_1", receipt.amount, &key).await.unwrap();
    let intent = h.store.get_intent(receipt.intent_id).await.unwrap().unwrap();
    assert_eq!(intent.status, IntentStatus::Paid);

    let refunded = h.booking.refund(receipt.intent_id).await.unwrap();
    assert_eq!(refunded.status, IntentStatus::Refunded);
    assert_eq!(h.gateway.payment("pay_1").unwrap().status, GatewayPaymentStatus::Refunded);
}

#[tokio::test]
async fn test_manual_registration_is_idempotent() {
    let h = harness();
    let offering_id = offering(&h, 2).await;
    let attendee = AttendeeIdentity::manual("9876543210", "Walk-in Guest".to_string());

    let first = h.booking.register_attendee(offering_id, attendee.clone()).await.unwrap();
    let second = h.booking.register_attendee(offering_id, attendee).await.unwrap();

    assert!(first.newly_issued);
    assert!(!second.newly_issued);
    assert_eq!(first.ticket.code, second.ticket.code);
    assert_eq!(remaining(&h, offering_id).await, 1);
}

#[tokio::test]
async fn test_repeat_registration_on_full_offering_returns_existing_ticket() {
    let h = harness();
    let offering_id = offering(&h, 1).await;
    let attendee = AttendeeIdentity::manual("9876543210", "Walk-in Guest".to_string());

    let first = h.booking.register_attendee(offering_id, attendee.clone()).await.unwrap();
    assert!(first.newly_issued);
    assert_eq!(remaining(&h, offering_id).await, 0);

    let repeat = h.booking.register_attendee(offering_id, attendee.clone()).await.unwrap();
    assert!(!repeat.newly_issued);
    assert_eq!(repeat.ticket.code, first.ticket.code);
    assert_eq!(remaining(&h, offering_id).await, 0);

    let newcomer = AttendeeIdentity::manual("9123456780", "Second Guest".to_string());
    assert!(matches!(
        h.booking.register_attendee(offering_id, newcomer).await,
        Err(BookingError::Ledger(LedgerError::CapacityExceeded { .. }))
    ));

    h.booking.ledger().set_active(offering_id, false).await.unwrap();
    let after_close = h.booking.register_attendee(offering_id, attendee).await.unwrap();
    assert_eq!(after_close.ticket.code, first.ticket.code);
    assert_eq!(h.store.ticket_count(), 1);
}

#[tokio::test]
async fn test_repeat_registration_does_not_hold_a_seat() {
    let h = harness();
    let offering_id = offering(&h, 2).await;
    let attendee = AttendeeIdentity::manual("9876543210", "Walk-in Guest".to_string());
    h.booking.register_attendee(offering_id, attendee.clone()).await.unwrap();

    let repeat = tokio::spawn({
        let booking = h.booking.clone();
        async move { booking.register_attendee(offering_id, attendee).await }
    });
    let buyer = tokio::spawn({
        let booking = h.booking.clone();
        async move { booking.reserve(request(offering_id, 1)).await }
    });

    assert!(!repeat.await.unwrap().unwrap().newly_issued);
    assert!(buyer.await.unwrap().is_ok());
    assert_eq!(remaining(&h, offering_id).await, 0);
}

#[tokio::test]
async fn test_check_in_through_booking() {
    let h = harness();
    let offering_id = offering(&h, 2).await;
    let issued = h
        .booking
        .register_attendee(offering_id, AttendeeIdentity::manual("9876543210", "Guest".to_string()))
        .await
        .unwrap();

    let first = h.booking.check_in(&issued.ticket.code, offering_id, Some("staff-1")).await.unwrap();
    assert!(matches!(first, CheckInOutcome::Success(_)));
    let second = h.booking.check_in(&issued.ticket.code, offering_id, Some("staff-1")).await.unwrap();
    assert!(matches!(second, CheckInOutcome::AlreadyCheckedIn(_)));

    assert!(matches!(
        h.booking.check_in(&issued.ticket.code, Uuid::new_v4(), None).await,
        Err(BookingError::CheckIn(_))
    ));
}

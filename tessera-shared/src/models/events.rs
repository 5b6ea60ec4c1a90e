use uuid::Uuid;

pub const TOPIC_RESERVATION_CREATED: &str = "reservations.created";
pub const TOPIC_PAYMENT_CONFIRMED: &str = "payments.confirmed";
pub const TOPIC_PAYMENT_REJECTED: &str = "payments.rejected";
pub const TOPIC_TICKET_ISSUED: &str = "tickets.issued";
pub const TOPIC_TICKET_CHECKED_IN: &str = "tickets.checked_in";
pub const TOPIC_INQUIRY_INGESTED: &str = "inquiries.ingested";

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReservationCreatedEvent {
    pub intent_id: Uuid,
    pub offering_id: Uuid,
    pub quantity: i32,
    pub amount: i64,
    pub currency: String,
    pub gateway_order_ref: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PaymentConfirmedEvent {
    pub intent_id: Uuid,
    pub offering_id: Uuid,
    pub gateway_payment_ref: String,
    pub amount: i64,
    pub ticket_codes: Vec<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PaymentRejectedEvent {
    pub intent_id: Option<Uuid>,
    pub gateway_order_ref: String,
    pub gateway_payment_ref: Option<String>,
    pub reason: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct TicketIssuedEvent {
    pub ticket_id: Uuid,
    pub code: String,
    pub offering_id: Uuid,
    pub intent_id: Option<Uuid>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct TicketCheckedInEvent {
    pub ticket_id: Uuid,
    pub code: String,
    pub offering_id: Uuid,
    pub checked_in_by: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct InquiryIngestedEvent {
    pub inquiry_id: Uuid,
    pub merged: bool,
    pub source: Option<String>,
    pub timestamp: i64,
}

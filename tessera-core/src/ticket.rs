use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Issued,
    CheckedIn,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Issued => "issued",
            TicketStatus::CheckedIn => "checked_in",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "issued" => Some(TicketStatus::Issued),
            "checked_in" => Some(TicketStatus::CheckedIn),
            _ => None,
        }
    }
}

/// Who a ticket is for. `key` is the idempotency key within an offering:
/// issuing twice for the same key yields the same ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendeeIdentity {
    pub key: String,
    pub display_name: String,
}

impl AttendeeIdentity {
    pub fn for_seat(intent_id: Uuid, seat: usize, display_name: String) -> Self {
        Self {
            key: format!("intent:{}:{}", intent_id.simple(), seat),
            display_name,
        }
    }

    /// Identity for operator-registered attendees, keyed by a normalized contact.
    pub fn manual(contact_key: &str, display_name: String) -> Self {
        Self {
            key: format!("manual:{}", contact_key),
            display_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    /// Human-presentable identifier, also the lookup key encoded in the QR payload.
    pub code: String,
    pub offering_id: Uuid,
    pub intent_id: Option<Uuid>,
    pub attendee_key: String,
    pub attendee_name: String,
    pub status: TicketStatus,
    pub issued_at: DateTime<Utc>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub checked_in_by: Option<String>,
}

impl Ticket {
    pub fn new(
        code: String,
        offering_id: Uuid,
        intent_id: Option<Uuid>,
        attendee: &AttendeeIdentity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code,
            offering_id,
            intent_id,
            attendee_key: attendee.key.clone(),
            attendee_name: attendee.display_name.clone(),
            status: TicketStatus::Issued,
            issued_at: Utc::now(),
            checked_in_at: None,
            checked_in_by: None,
        }
    }

    /// Guarded `issued -> checked_in` on an in-memory copy; false if already checked in.
    pub fn check_in(&mut self, actor: Option<&str>, at: DateTime<Utc>) -> bool {
        if self.status != TicketStatus::Issued {
            return false;
        }
        self.status = TicketStatus::CheckedIn;
        self.checked_in_at = Some(at);
        self.checked_in_by = actor.map(str::to_string);
        true
    }

    pub fn qr_payload(&self) -> QrPayload {
        QrPayload {
            ticket_id: self.code.clone(),
            attendee_name: self.attendee_name.clone(),
            offering_or_event_id: self.offering_id,
        }
    }
}

/// What the scannable code carries. Lookup data only; check-in re-reads the
/// stored ticket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub ticket_id: String,
    pub attendee_name: String,
    pub offering_or_event_id: Uuid,
}

#[derive(Debug, Clone)]
pub enum CheckInOutcome {
    Success(Ticket),
    AlreadyCheckedIn(Ticket),
}

impl CheckInOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            CheckInOutcome::Success(_) => "success",
            CheckInOutcome::AlreadyCheckedIn(_) => "already_checked_in",
        }
    }

    pub fn ticket(&self) -> &Ticket {
        match self {
            CheckInOutcome::Success(t) | CheckInOutcome::AlreadyCheckedIn(t) => t,
        }
    }
}

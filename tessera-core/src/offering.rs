use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferingKind {
    Package,
    Event,
}

impl OfferingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferingKind::Package => "package",
            OfferingKind::Event => "event",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "package" => Some(OfferingKind::Package),
            "event" => Some(OfferingKind::Event),
            _ => None,
        }
    }
}

/// A capacity-limited purchasable unit: a travel package or an event.
///
/// `remaining` is only ever changed through the guarded counter operations on
/// `OfferingRepository`, which keep `0 <= remaining <= total_capacity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offering {
    pub id: Uuid,
    pub kind: OfferingKind,
    pub code: String,
    pub title: String,
    pub total_capacity: i32,
    pub remaining: i32,
    /// Price per seat in minor currency units.
    pub unit_price: i64,
    pub currency: String,
    pub starts_on: Option<NaiveDate>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOffering {
    pub kind: OfferingKind,
    pub code: String,
    pub title: String,
    pub total_capacity: i32,
    pub unit_price: i64,
    pub currency: String,
    pub starts_on: Option<NaiveDate>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool { true }

impl NewOffering {
    pub fn validate(&self) -> CoreResult<()> {
        if self.code.is_empty() || !self.code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::ValidationError(
                "offering code must be non-empty and alphanumeric".to_string(),
            ));
        }
        if self.title.trim().is_empty() {
            return Err(CoreError::ValidationError("offering title is required".to_string()));
        }
        if self.total_capacity < 0 {
            return Err(CoreError::ValidationError("total capacity cannot be negative".to_string()));
        }
        if self.unit_price < 0 {
            return Err(CoreError::ValidationError("unit price cannot be negative".to_string()));
        }
        if self.currency.len() != 3 {
            return Err(CoreError::ValidationError("currency must be an ISO 4217 code".to_string()));
        }
        Ok(())
    }
}

impl Offering {
    pub fn new(fields: NewOffering) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: fields.kind,
            code: fields.code.to_uppercase(),
            title: fields.title,
            total_capacity: fields.total_capacity,
            remaining: fields.total_capacity,
            unit_price: fields.unit_price,
            currency: fields.currency.to_uppercase(),
            starts_on: fields.starts_on,
            active: fields.active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Total charge for `quantity` seats, `None` on overflow.
    pub fn price_for(&self, quantity: i32) -> Option<i64> {
        self.unit_price.checked_mul(i64::from(quantity))
    }

    pub fn is_sold_out(&self) -> bool {
        self.remaining == 0
    }
}

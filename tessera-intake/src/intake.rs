use chrono::Utc;
use std::sync::Arc;

use tessera_core::events::{publish_event, EventPublisher};
use tessera_core::inquiry::{normalize_phone, ContactSubmission, InquiryRecord, IntakeOutcome};
use tessera_core::repository::{InquiryRepository, StoreError};
use tessera_shared::models::events::{InquiryIngestedEvent, TOPIC_INQUIRY_INGESTED};

/// Public contact-form intake. Submissions are keyed by normalized phone, so a
/// repeat inquiry lands on the existing record instead of creating a second.
pub struct InquiryIntake {
    inquiries: Arc<dyn InquiryRepository>,
    events: Arc<dyn EventPublisher>,
    significant_digits: usize,
}

impl InquiryIntake {
    pub fn new(
        inquiries: Arc<dyn InquiryRepository>,
        events: Arc<dyn EventPublisher>,
        significant_digits: usize,
    ) -> Self {
        Self {
            inquiries,
            events,
            significant_digits,
        }
    }

    pub async fn ingest(
        &self,
        submission: ContactSubmission,
    ) -> Result<IntakeOutcome, IntakeError> {
        let normalized = normalize_phone(&submission.phone, self.significant_digits)
            .ok_or_else(|| IntakeError::InvalidPhone(submission.phone.clone()))?;

        let candidate = InquiryRecord::from_submission(normalized, &submission);
        // Single upsert on the phone key; a read-then-insert would race.
        let outcome = self.inquiries.upsert_inquiry(&candidate).await?;
        let record = outcome.record();

        tracing::info!(
            inquiry_id = %record.id,
            merged = outcome.is_merged(),
            inquiry_count = record.inquiry_count,
            source = ?record.source,
            "Inquiry ingested"
        );

        publish_event(
            self.events.as_ref(),
            TOPIC_INQUIRY_INGESTED,
            &record.id.to_string(),
            &InquiryIngestedEvent {
                inquiry_id: record.id,
                merged: outcome.is_merged(),
                source: record.source.clone(),
                timestamp: Utc::now().timestamp(),
            },
        )
        .await;

        Ok(outcome)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Phone number is not usable: {0}")]
    InvalidPhone(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

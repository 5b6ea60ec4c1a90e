use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

pub const DEFAULT_STAGE: &str = "new";
pub const REPEAT_TAG: &str = "repeat-inquiry";

/// Digits-only form of a phone number, keeping the trailing `significant_digits`
/// so a country prefix does not split one contact into two records.
/// Returns `None` when fewer than `significant_digits` digits are present.
pub fn normalize_phone(raw: &str, significant_digits: usize) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if significant_digits == 0 || digits.len() < significant_digits {
        return None;
    }
    Some(digits[digits.len() - significant_digits..].to_string())
}

/// Free-form contact fields from a public form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactSubmission {
    pub name: Option<String>,
    pub phone: String,
    pub email: Option<String>,
    pub source: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InquiryRecord {
    pub id: Uuid,
    pub normalized_phone: String,
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
    pub notes: Vec<String>,
    pub tags: Vec<String>,
    /// Set by an operator; intake never writes it.
    pub assigned_to: Option<String>,
    /// Set by an operator; intake only initialises it.
    pub stage: String,
    pub inquiry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InquiryRecord {
    pub fn from_submission(normalized_phone: String, submission: &ContactSubmission) -> Self {
        let now = Utc::now();
        let mut tags = Vec::new();
        for tag in &submission.tags {
            push_unique(&mut tags, tag);
        }
        Self {
            id: Uuid::new_v4(),
            normalized_phone,
            phone: submission.phone.trim().to_string(),
            name: non_empty(&submission.name),
            email: non_empty(&submission.email),
            source: non_empty(&submission.source),
            notes: non_empty(&submission.message).into_iter().collect(),
            tags,
            assigned_to: None,
            stage: DEFAULT_STAGE.to_string(),
            inquiry_count: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Folds a newer inquiry into this record. Only blank contact fields are
    /// filled; notes and tags are appended; owner and stage are left alone.
    pub fn absorb(&mut self, newer: &InquiryRecord) {
        if self.name.is_none() {
            self.name = newer.name.clone();
        }
        if self.email.is_none() {
            self.email = newer.email.clone();
        }
        if self.source.is_none() {
            self.source = newer.source.clone();
        }
        self.notes.extend(newer.notes.iter().cloned());
        for tag in &newer.tags {
            push_unique(&mut self.tags, tag);
        }
        push_unique(&mut self.tags, REPEAT_TAG);
        self.inquiry_count += 1;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone)]
pub enum IntakeOutcome {
    Created(InquiryRecord),
    Merged(InquiryRecord),
}

impl IntakeOutcome {
    pub fn record(&self) -> &InquiryRecord {
        match self {
            IntakeOutcome::Created(r) | IntakeOutcome::Merged(r) => r,
        }
    }

    pub fn is_merged(&self) -> bool {
        matches!(self, IntakeOutcome::Merged(_))
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn push_unique(tags: &mut Vec<String>, tag: &str) {
    let tag = tag.trim().to_lowercase();
    if !tag.is_empty() && !tags.contains(&tag) {
        tags.push(tag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_code_and_punctuation_collapse() {
        assert_eq!(normalize_phone("+91 98765-43210", 10).as_deref(), Some("9876543210"));
        assert_eq!(normalize_phone("9876543210", 10).as_deref(), Some("9876543210"));
        assert_eq!(normalize_phone("(098765) 43210", 10).as_deref(), Some("9876543210"));
    }

    #[test]
    fn test_short_numbers_are_rejected() {
        assert_eq!(normalize_phone("12345", 10), None);
        assert_eq!(normalize_phone("call me", 10), None);
    }

    #[test]
    fn test_absorb_keeps_operator_fields() {
        let first = ContactSubmission {
            name: Some("Ravi".to_string()),
            phone: "9876543210".to_string(),
            message: Some("Goa package".to_string()),
            tags: vec!["Website".to_string()],
            ..Default::default()
        };
        let mut record = InquiryRecord::from_submission("9876543210".to_string(), &first);
        record.assigned_to = Some("agent-7".to_string());
        record.stage = "qualified".to_string();

        let second = ContactSubmission {
            name: Some("Ravi Kumar".to_string()),
            phone: "+91 98765 43210".to_string(),
            email: Some("ravi@example.com".to_string()),
            message: Some("Also Kerala?".to_string()),
            tags: vec!["whatsapp".to_string(), "website".to_string()],
            ..Default::default()
        };
        let newer = InquiryRecord::from_submission("9876543210".to_string(), &second);
        record.absorb(&newer);

        assert_eq!(record.name.as_deref(), Some("Ravi"));
        assert_eq!(record.email.as_deref(), Some("ravi@example.com"));
        assert_eq!(record.assigned_to.as_deref(), Some("agent-7"));
        assert_eq!(record.stage, "qualified");
        assert_eq!(record.notes, vec!["Goa package", "Also Kerala?"]);
        assert_eq!(record.tags, vec!["website", "whatsapp", REPEAT_TAG]);
        assert_eq!(record.inquiry_count, 2);
    }
}

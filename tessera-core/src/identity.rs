use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Customer,
    Staff,
    Admin,
}

/// The authenticated caller, as resolved by the outer auth layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub subject: String,
    pub role: ActorRole,
}

impl Actor {
    /// Staff and admins may scan tickets and register attendees.
    pub fn is_operator(&self) -> bool {
        matches!(self.role, ActorRole::Staff | ActorRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles() {
        let staff = Actor { subject: "s-1".to_string(), role: ActorRole::Staff };
        assert!(staff.is_operator());
        assert!(!staff.is_admin());

        let customer = Actor { subject: "c-1".to_string(), role: ActorRole::Customer };
        assert!(!customer.is_operator());

        let role: ActorRole = serde_json::from_str("\"ADMIN\"").unwrap();
        assert_eq!(role, ActorRole::Admin);
    }
}

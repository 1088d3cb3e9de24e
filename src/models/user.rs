use serde::{Deserialize, Serialize};

use super::SubscriptionStatus;

/// Access tier. `Premium` is the privileged tier granted by a live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    User,
    Premium,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Premium => "PREMIUM",
            Self::Admin => "ADMIN",
        }
    }

    /// Role implied by a subscription status.
    ///
    /// `None` means the status is ambiguous and the current role must be kept.
    pub fn for_status(status: SubscriptionStatus) -> Option<Self> {
        match status {
            SubscriptionStatus::Active | SubscriptionStatus::OnTrial => Some(Self::Premium),
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired => Some(Self::User),
            SubscriptionStatus::Paused
            | SubscriptionStatus::PastDue
            | SubscriptionStatus::Unpaid => None,
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Self::User),
            "PREMIUM" => Ok(Self::Premium),
            "ADMIN" => Ok(Self::Admin),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,
    /// External customer id, set the first time an event links it
    pub lemon_squeezy_customer_id: Option<String>,
    /// Latest known subscription status (denormalized)
    pub subscription_status: Option<String>,
    /// Latest known plan name (denormalized)
    pub plan_name: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub name: Option<String>,
}

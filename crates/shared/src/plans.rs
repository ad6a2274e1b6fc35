//! Subscription plans

use serde::{Deserialize, Serialize};

/// The plans a user can be subscribed to.
///
/// `Free` is the default for users without an active subscription;
/// paid plans are derived from the Stripe price on the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    Free,
    Pro,
    Enterprise,
}

impl SubscriptionPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::Free => "free",
            SubscriptionPlan::Pro => "pro",
            SubscriptionPlan::Enterprise => "enterprise",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "free" => Some(SubscriptionPlan::Free),
            "pro" => Some(SubscriptionPlan::Pro),
            "enterprise" => Some(SubscriptionPlan::Enterprise),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_round_trips_through_str() {
        for plan in [
            SubscriptionPlan::Free,
            SubscriptionPlan::Pro,
            SubscriptionPlan::Enterprise,
        ] {
            assert_eq!(SubscriptionPlan::from_str(plan.as_str()), Some(plan));
        }
    }

    #[test]
    fn unknown_plan_is_none() {
        assert_eq!(SubscriptionPlan::from_str("platinum"), None);
    }
}

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Res};

/// Subscription tiers, ordered by rank. Every plan/credit derivation in the
/// service goes through this module so price-id mapping lives in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Light,
    Basic,
    Pro,
}

impl Plan {
    /// Rank order used by the downgrade gate: free < light < basic < pro.
    pub fn rank(&self) -> u8 {
        match self {
            Plan::Free => 0,
            Plan::Light => 1,
            Plan::Basic => 2,
            Plan::Pro => 3,
        }
    }

    /// Per-cycle credit allowance for the tier.
    pub fn credit_allowance(&self) -> i32 {
        match self {
            Plan::Free => 10,
            Plan::Light => 100,
            Plan::Basic => 300,
            Plan::Pro => 1000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Light => "light",
            Plan::Basic => "basic",
            Plan::Pro => "pro",
        }
    }

    pub fn from_key(key: &str) -> Res<Plan> {
        match key {
            "free" => Ok(Plan::Free),
            "light" => Ok(Plan::Light),
            "basic" => Ok(Plan::Basic),
            "pro" => Ok(Plan::Pro),
            other => Err(AppError::BadRequest(format!("Unknown plan key: {}", other))),
        }
    }

    /// True when switching to `target` is a strict downgrade.
    pub fn can_downgrade_to(&self, target: Plan) -> bool {
        target.rank() < self.rank()
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static price-id table for the paid tiers, loaded from the environment
/// once at startup. The free tier has no Stripe price.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    pub light_price_id: String,
    pub basic_price_id: String,
    pub pro_price_id: String,
}

impl PlanCatalog {
    pub fn price_id(&self, plan: Plan) -> Option<&str> {
        match plan {
            Plan::Free => None,
            Plan::Light => Some(&self.light_price_id),
            Plan::Basic => Some(&self.basic_price_id),
            Plan::Pro => Some(&self.pro_price_id),
        }
    }

    pub fn plan_for_price(&self, price_id: &str) -> Option<Plan> {
        if price_id == self.light_price_id {
            Some(Plan::Light)
        } else if price_id == self.basic_price_id {
            Some(Plan::Basic)
        } else if price_id == self.pro_price_id {
            Some(Plan::Pro)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PlanCatalog {
        PlanCatalog {
            light_price_id: "price_light".to_string(),
            basic_price_id: "price_basic".to_string(),
            pro_price_id: "price_pro".to_string(),
        }
    }

    #[test]
    fn paid_plans_resolve_to_configured_price_ids() {
        let catalog = catalog();
        assert_eq!(catalog.price_id(Plan::Light), Some("price_light"));
        assert_eq!(catalog.price_id(Plan::Basic), Some("price_basic"));
        assert_eq!(catalog.price_id(Plan::Pro), Some("price_pro"));
        assert_eq!(catalog.price_id(Plan::Free), None);
    }

    #[test]
    fn price_ids_map_back_to_plans() {
        let catalog = catalog();
        assert_eq!(catalog.plan_for_price("price_light"), Some(Plan::Light));
        assert_eq!(catalog.plan_for_price("price_pro"), Some(Plan::Pro));
        assert_eq!(catalog.plan_for_price("price_unknown"), None);
    }

    #[test]
    fn unknown_plan_key_is_a_bad_request() {
        assert!(Plan::from_key("enterprise").is_err());
        assert_eq!(Plan::from_key("basic").unwrap(), Plan::Basic);
    }

    #[test]
    fn rank_order_is_free_light_basic_pro() {
        assert!(Plan::Free.rank() < Plan::Light.rank());
        assert!(Plan::Light.rank() < Plan::Basic.rank());
        assert!(Plan::Basic.rank() < Plan::Pro.rank());
    }

    #[test]
    fn only_strictly_lower_targets_are_downgrades() {
        assert!(Plan::Pro.can_downgrade_to(Plan::Basic));
        assert!(Plan::Basic.can_downgrade_to(Plan::Free));
        assert!(!Plan::Basic.can_downgrade_to(Plan::Basic));
        assert!(!Plan::Basic.can_downgrade_to(Plan::Pro));
    }

    #[test]
    fn free_allowance_is_fixed_at_ten() {
        assert_eq!(Plan::Free.credit_allowance(), 10);
        assert!(Plan::Pro.credit_allowance() > Plan::Basic.credit_allowance());
    }
}

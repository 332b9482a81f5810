//! Credit packs on sale. Prices live here, server-side; clients only ever send a plan id.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub id: &'static str,
    pub name: &'static str,
    /// Price in minor currency units.
    pub amount: i64,
    pub currency: &'static str,
    pub credits: i32,
}

pub const PLANS: &[Plan] = &[
    Plan {
        id: "starter",
        name: "Starter Pack",
        amount: 499,
        currency: "usd",
        credits: 5,
    },
    Plan {
        id: "standard",
        name: "Standard Pack",
        amount: 999,
        currency: "usd",
        credits: 15,
    },
    Plan {
        id: "pro",
        name: "Pro Pack",
        amount: 1999,
        currency: "usd",
        credits: 40,
    },
];

pub fn find_plan(plan_id: &str) -> Option<&'static Plan> {
    PLANS.iter().find(|p| p.id == plan_id)
}

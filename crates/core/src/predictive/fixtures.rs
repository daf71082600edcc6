//! Snapshot builders shared by the predictive unit tests.

use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;

use crate::domain::opportunity::{Opportunity, OpportunityId, OpportunityStatus, Stage};

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single().expect("valid fixture date")
}

pub fn amount(value: f64) -> Decimal {
    Decimal::try_from(value).expect("finite fixture amount")
}

pub fn open_deal(id: &str, stage: Stage, value: f64, created: DateTime<Utc>) -> Opportunity {
    Opportunity {
        id: OpportunityId(id.to_string()),
        status: OpportunityStatus::Open,
        stage,
        amount: amount(value),
        assigned_rep: "rep-a".to_string(),
        created_date: created,
        proj_close_date: None,
        actual_close_date: None,
        company_name: format!("{id} Holdings"),
    }
}

pub fn closed_deal(
    id: &str,
    status: OpportunityStatus,
    stage: Stage,
    value: f64,
    created: DateTime<Utc>,
    closed: DateTime<Utc>,
) -> Opportunity {
    Opportunity {
        status,
        actual_close_date: Some(closed),
        ..open_deal(id, stage, value, created)
    }
}

/// `count` closed deals at one stage, the first `won` of which are wins,
/// closing monthly from January 2024.
pub fn closed_batch(prefix: &str, stage: Stage, count: usize, won: usize, value: f64) -> Vec<Opportunity> {
    (0..count)
        .map(|index| {
            let status = if index < won { OpportunityStatus::Won } else { OpportunityStatus::Lost };
            let month = (index % 12) as u32 + 1;
            closed_deal(
                &format!("{prefix}-{index}"),
                status,
                stage,
                value,
                at(2023, month, 1),
                at(2024, month, 15),
            )
        })
        .collect()
}

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

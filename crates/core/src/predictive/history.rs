//! Historical partitioning of an opportunity snapshot.
//!
//! Splits records into closed and open sets and derives the revenue series and
//! per-stage / per-rep aggregates the analyzers share. Only `Won` and `Lost`
//! records ever feed a base rate.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::opportunity::{Opportunity, Stage};

const UNASSIGNED_REP: &str = "Unassigned";

/// Revenue from won deals closed within one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRevenuePoint {
    /// Sort key, `YYYY-MM`.
    pub month: String,
    /// Chart label, e.g. `Mar 2024`.
    pub label: String,
    pub revenue: f64,
    /// First day of the month.
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterlyRevenue {
    pub quarter: String,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStatistic {
    pub stage: Stage,
    pub won: usize,
    pub total: usize,
    /// Ratio in `[0, 1]`.
    pub win_rate: f64,
    pub avg_deal_size: f64,
    pub amounts: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepPerformance {
    pub rep: String,
    pub won: usize,
    pub total: usize,
    pub total_value: f64,
    pub won_value: f64,
    /// Ratio in `[0, 1]`.
    pub win_rate: f64,
    pub avg_deal_size: f64,
    /// Average days from creation to close.
    pub avg_velocity: f64,
}

/// Closed/open split plus the monthly revenue series of a snapshot.
#[derive(Debug, Clone)]
pub struct HistoricalData<'a> {
    pub closed: Vec<&'a Opportunity>,
    pub open: Vec<&'a Opportunity>,
    pub monthly_revenue: Vec<MonthlyRevenuePoint>,
}

impl<'a> HistoricalData<'a> {
    pub fn partition(opportunities: &'a [Opportunity]) -> Self {
        let (closed, open): (Vec<&Opportunity>, Vec<&Opportunity>) =
            opportunities.iter().partition(|opportunity| opportunity.is_closed());

        Self { monthly_revenue: monthly_revenue_series(&closed), closed, open }
    }

    pub fn won(&self) -> impl Iterator<Item = &&'a Opportunity> {
        self.closed.iter().filter(|opportunity| opportunity.is_won())
    }

    /// Overall closed-deal win rate in `[0, 1]`; zero without closed deals.
    pub fn overall_win_rate(&self) -> f64 {
        ratio(self.won().count(), self.closed.len())
    }

    /// Won revenue closed from the start of the month two months before `now` up to `now`.
    pub fn trailing_quarter_revenue(&self, now: DateTime<Utc>) -> f64 {
        let (year, month) = shift_month(now.year(), now.month(), -2);
        let Some(start) = NaiveDate::from_ymd_opt(year, month, 1) else {
            return 0.0;
        };

        self.won()
            .filter_map(|opportunity| {
                let closed = opportunity.actual_close_date?;
                (closed.date_naive() >= start && closed <= now).then(|| opportunity.amount_f64())
            })
            .sum()
    }

    pub fn quarterly_revenue(&self) -> Vec<QuarterlyRevenue> {
        let mut quarters: BTreeMap<(i32, u32), f64> = BTreeMap::new();
        for point in &self.monthly_revenue {
            let quarter = (point.date.month() - 1) / 3 + 1;
            *quarters.entry((point.date.year(), quarter)).or_default() += point.revenue;
        }

        quarters
            .into_iter()
            .map(|((year, quarter), revenue)| QuarterlyRevenue {
                quarter: format!("{year}-Q{quarter}"),
                revenue,
            })
            .collect()
    }

    /// Mean revenue across the quarters that booked any revenue.
    pub fn average_quarterly_revenue(&self) -> f64 {
        let quarters = self.quarterly_revenue();
        mean(&quarters.iter().map(|quarter| quarter.revenue).collect::<Vec<_>>())
    }

    /// Per-stage aggregates over closed deals, in funnel order.
    pub fn stage_statistics(&self) -> Vec<StageStatistic> {
        let mut grouped: BTreeMap<Stage, Vec<&Opportunity>> = BTreeMap::new();
        for opportunity in &self.closed {
            grouped.entry(opportunity.stage).or_default().push(*opportunity);
        }

        grouped
            .into_iter()
            .map(|(stage, deals)| {
                let won = deals.iter().filter(|deal| deal.is_won()).count();
                let amounts: Vec<f64> = deals.iter().map(|deal| deal.amount_f64()).collect();
                StageStatistic {
                    stage,
                    won,
                    total: deals.len(),
                    win_rate: ratio(won, deals.len()),
                    avg_deal_size: mean(&amounts),
                    amounts,
                }
            })
            .collect()
    }

    /// Per-rep aggregates over closed deals, sorted by rep name.
    pub fn rep_performance(&self) -> Vec<RepPerformance> {
        let mut grouped: BTreeMap<String, Vec<&Opportunity>> = BTreeMap::new();
        for opportunity in &self.closed {
            grouped.entry(rep_key(&opportunity.assigned_rep)).or_default().push(*opportunity);
        }

        grouped
            .into_iter()
            .map(|(rep, deals)| {
                let won_deals: Vec<&&Opportunity> = deals.iter().filter(|deal| deal.is_won()).collect();
                let total_value: f64 = deals.iter().map(|deal| deal.amount_f64()).sum();
                let won_value: f64 = won_deals.iter().map(|deal| deal.amount_f64()).sum();
                let velocities: Vec<f64> =
                    deals.iter().filter_map(|deal| deal.days_to_close()).map(|days| days as f64).collect();

                RepPerformance {
                    rep,
                    won: won_deals.len(),
                    total: deals.len(),
                    total_value,
                    won_value,
                    win_rate: ratio(won_deals.len(), deals.len()),
                    avg_deal_size: if deals.is_empty() { 0.0 } else { total_value / deals.len() as f64 },
                    avg_velocity: mean(&velocities),
                }
            })
            .collect()
    }
}

/// Group won deals by close month and sum their amounts, ascending by month.
pub fn monthly_revenue_series(closed: &[&Opportunity]) -> Vec<MonthlyRevenuePoint> {
    let mut months: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for opportunity in closed.iter().filter(|opportunity| opportunity.is_won()) {
        if let Some(closed_at) = opportunity.actual_close_date {
            *months.entry((closed_at.year(), closed_at.month())).or_default() +=
                opportunity.amount_f64();
        }
    }

    months
        .into_iter()
        .filter_map(|((year, month), revenue)| {
            let date = NaiveDate::from_ymd_opt(year, month, 1)?;
            Some(MonthlyRevenuePoint {
                month: month_key(date),
                label: month_label(date),
                revenue,
                date,
            })
        })
        .collect()
}

/// Whole days since creation, floored at zero.
pub fn deal_age_days(opportunity: &Opportunity, now: DateTime<Utc>) -> i64 {
    opportunity.age_days(now)
}

/// Least-squares slope of `values` against their index.
pub fn linear_regression_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let n_f = n as f64;
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n_f;

    let (numerator, denominator) =
        values.iter().enumerate().fold((0.0, 0.0), |(num, den), (index, value)| {
            let dx = index as f64 - x_mean;
            (num + dx * (value - y_mean), den + dx * dx)
        });

    if denominator <= f64::EPSILON {
        0.0
    } else {
        numerator / denominator
    }
}

pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

pub fn month_label(date: NaiveDate) -> String {
    date.format("%b %Y").to_string()
}

/// Move a (year, month) pair by `delta` calendar months.
pub fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let zero_based = year * 12 + month as i32 - 1 + delta;
    (zero_based.div_euclid(12), zero_based.rem_euclid(12) as u32 + 1)
}

pub(crate) fn rep_key(rep: &str) -> String {
    let trimmed = rep.trim();
    if trimmed.is_empty() {
        UNASSIGNED_REP.to_string()
    } else {
        trimmed.to_string()
    }
}

pub(crate) fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let variance = values.iter().map(|value| (value - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

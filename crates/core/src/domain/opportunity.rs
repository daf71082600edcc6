use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpportunityId(pub String);

impl fmt::Display for OpportunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OpportunityStatus {
    Open,
    Won,
    Lost,
}

impl OpportunityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Won => "Won",
            Self::Lost => "Lost",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

impl FromStr for OpportunityStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_label(value).as_str() {
            "open" => Ok(Self::Open),
            "won" | "closed won" => Ok(Self::Won),
            "lost" | "closed lost" => Ok(Self::Lost),
            _ => Err(DomainError::UnknownStatus(value.to_string())),
        }
    }
}

impl TryFrom<String> for OpportunityStatus {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OpportunityStatus> for String {
    fn from(value: OpportunityStatus) -> Self {
        value.as_str().to_string()
    }
}

/// Canonical pipeline stages in funnel order.
///
/// Legacy CRM labels (`Prospecting`, `Qualification`, `Needs Analysis`) are
/// folded into their canonical stage when parsed, so nothing downstream ever
/// compares raw stage strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Stage {
    Lead,
    Qualified,
    FirstDemo,
    Discovery,
    TechnicalReview,
    Proposal,
    Negotiation,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Lead,
        Stage::Qualified,
        Stage::FirstDemo,
        Stage::Discovery,
        Stage::TechnicalReview,
        Stage::Proposal,
        Stage::Negotiation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "Lead",
            Self::Qualified => "Qualified",
            Self::FirstDemo => "1st Demo",
            Self::Discovery => "Discovery",
            Self::TechnicalReview => "Technical Review",
            Self::Proposal => "Proposal",
            Self::Negotiation => "Negotiation",
        }
    }

    pub fn phase(&self) -> FunnelPhase {
        match self {
            Self::Lead => FunnelPhase::Prospecting,
            Self::Qualified => FunnelPhase::Qualification,
            Self::FirstDemo | Self::Discovery | Self::TechnicalReview => FunnelPhase::NeedsAnalysis,
            Self::Proposal => FunnelPhase::Proposal,
            Self::Negotiation => FunnelPhase::Negotiation,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_label(value).as_str() {
            "lead" | "prospecting" => Ok(Self::Lead),
            "qualified" | "qualification" => Ok(Self::Qualified),
            "1st demo" | "first demo" => Ok(Self::FirstDemo),
            "discovery" | "needs analysis" => Ok(Self::Discovery),
            "technical review" => Ok(Self::TechnicalReview),
            "proposal" => Ok(Self::Proposal),
            "negotiation" => Ok(Self::Negotiation),
            _ => Err(DomainError::UnknownStage(value.to_string())),
        }
    }
}

impl TryFrom<String> for Stage {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Stage> for String {
    fn from(value: Stage) -> Self {
        value.as_str().to_string()
    }
}

/// Coarse funnel phases used for distribution targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelPhase {
    Prospecting,
    Qualification,
    NeedsAnalysis,
    Proposal,
    Negotiation,
}

impl FunnelPhase {
    pub const ALL: [FunnelPhase; 5] = [
        FunnelPhase::Prospecting,
        FunnelPhase::Qualification,
        FunnelPhase::NeedsAnalysis,
        FunnelPhase::Proposal,
        FunnelPhase::Negotiation,
    ];

    pub fn is_early(&self) -> bool {
        matches!(self, Self::Prospecting | Self::Qualification)
    }

    pub fn is_late(&self) -> bool {
        matches!(self, Self::Proposal | Self::Negotiation)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub id: OpportunityId,
    pub status: OpportunityStatus,
    pub stage: Stage,
    pub amount: Decimal,
    #[serde(default)]
    pub assigned_rep: String,
    pub created_date: DateTime<Utc>,
    #[serde(default)]
    pub proj_close_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_close_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub company_name: String,
}

impl Opportunity {
    pub fn is_open(&self) -> bool {
        self.status == OpportunityStatus::Open
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }

    pub fn is_won(&self) -> bool {
        self.status == OpportunityStatus::Won
    }

    pub fn amount_f64(&self) -> f64 {
        decimal_to_f64(self.amount)
    }

    /// Whole days between creation and `now`, never negative.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_date).num_days().max(0)
    }

    /// Days from creation to close for closed deals that carry a close date.
    pub fn days_to_close(&self) -> Option<i64> {
        if !self.is_closed() {
            return None;
        }
        self.actual_close_date.map(|closed| (closed - self.created_date).num_days().max(0))
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.0.trim().is_empty() {
            return Err(DomainError::InvariantViolation("opportunity id is empty".to_string()));
        }
        if self.amount.is_sign_negative() {
            return Err(DomainError::InvariantViolation(format!(
                "opportunity `{}` has a negative amount",
                self.id
            )));
        }
        if self.status == OpportunityStatus::Open && self.actual_close_date.is_some() {
            return Err(DomainError::InvariantViolation(format!(
                "open opportunity `{}` carries an actual close date",
                self.id
            )));
        }
        Ok(())
    }
}

/// Validate every record in a snapshot, failing on the first violation.
pub fn validate_snapshot(opportunities: &[Opportunity]) -> Result<(), DomainError> {
    opportunities.iter().try_for_each(Opportunity::validate)
}

pub fn decimal_to_f64(value: Decimal) -> f64 {
    value.try_into().unwrap_or(0.0)
}

fn normalize_label(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{FunnelPhase, Opportunity, OpportunityId, OpportunityStatus, Stage};
    use crate::errors::DomainError;

    #[test]
    fn legacy_stage_aliases_normalize_to_canonical_stages() {
        assert_eq!("Prospecting".parse::<Stage>(), Ok(Stage::Lead));
        assert_eq!("qualification".parse::<Stage>(), Ok(Stage::Qualified));
        assert_eq!("  Needs   Analysis ".parse::<Stage>(), Ok(Stage::Discovery));
        assert_eq!("1st Demo".parse::<Stage>(), Ok(Stage::FirstDemo));
    }

    #[test]
    fn unknown_stage_is_rejected() {
        assert_eq!(
            "Closing".parse::<Stage>(),
            Err(DomainError::UnknownStage("Closing".to_string()))
        );
    }

    #[test]
    fn stages_map_onto_funnel_phases() {
        assert_eq!(Stage::Lead.phase(), FunnelPhase::Prospecting);
        assert_eq!(Stage::TechnicalReview.phase(), FunnelPhase::NeedsAnalysis);
        assert!(Stage::Qualified.phase().is_early());
        assert!(Stage::Negotiation.phase().is_late());
        assert!(!Stage::Discovery.phase().is_late());
    }

    #[test]
    fn opportunity_deserializes_from_dashboard_export() {
        let raw = r#"{
            "id": "opp-1",
            "status": "Open",
            "stage": "Needs Analysis",
            "amount": 12500.5,
            "assignedRep": "jordan",
            "createdDate": "2024-01-10T00:00:00Z",
            "projCloseDate": null,
            "companyName": "Acme"
        }"#;

        let opportunity: Opportunity = serde_json::from_str(raw).expect("valid record");
        assert_eq!(opportunity.stage, Stage::Discovery);
        assert_eq!(opportunity.status, OpportunityStatus::Open);
        assert_eq!(opportunity.assigned_rep, "jordan");
        assert!(opportunity.actual_close_date.is_none());
        assert!((opportunity.amount_f64() - 12_500.5).abs() < 1e-9);
    }

    #[test]
    fn validation_rejects_negative_amounts() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let opportunity = Opportunity {
            id: OpportunityId("opp-neg".to_string()),
            status: OpportunityStatus::Open,
            stage: Stage::Lead,
            amount: Decimal::new(-100, 0),
            assigned_rep: String::new(),
            created_date: created,
            proj_close_date: None,
            actual_close_date: None,
            company_name: String::new(),
        };

        assert!(matches!(opportunity.validate(), Err(DomainError::InvariantViolation(_))));
        assert_eq!(opportunity.age_days(created + Duration::days(12)), 12);
        assert_eq!(opportunity.age_days(created - Duration::days(3)), 0);
    }
}

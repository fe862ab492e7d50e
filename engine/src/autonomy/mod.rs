//! Autonomy decision engine
//!
//! Decides whether a requested action runs immediately or waits for the
//! user. Each action type belongs to a domain and each domain has a tier:
//!
//! - **guardian**: always ask
//! - **partner**: run read and reversible write actions, ask for the
//!   execute class (sending, deleting)
//! - **alter_ego**: run everything
//!
//! When the tier asks, a learned approval pattern can still let the action
//! through: once the user has approved the same kind of request as many
//! times in a row as the pattern's threshold, it is auto-approved until the
//! next rejection.
//!
//! Runtime tier changes are stored in the database and take precedence
//! over the configuration file.

pub mod escalation;

use anyhow::Result;
use sdk::actions::{ActionClass, ActionType, Domain};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::approval::ApprovalPatternTracker;
use crate::config::AutonomyConfig;
use crate::db::AutonomyRepository;

/// How much the agent may do without asking in one domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyTier {
    Guardian,
    Partner,
    AlterEgo,
}

impl AutonomyTier {
    pub const ALL: [AutonomyTier; 3] = [
        AutonomyTier::Guardian,
        AutonomyTier::Partner,
        AutonomyTier::AlterEgo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AutonomyTier::Guardian => "guardian",
            AutonomyTier::Partner => "partner",
            AutonomyTier::AlterEgo => "alter_ego",
        }
    }

    /// Whether this tier runs actions of `class` without asking
    pub fn permits(&self, class: ActionClass) -> bool {
        match self {
            AutonomyTier::Guardian => false,
            AutonomyTier::Partner => matches!(class, ActionClass::Read | ActionClass::Write),
            AutonomyTier::AlterEgo => true,
        }
    }

    /// Next more autonomous tier
    pub fn next(&self) -> Option<AutonomyTier> {
        match self {
            AutonomyTier::Guardian => Some(AutonomyTier::Partner),
            AutonomyTier::Partner => Some(AutonomyTier::AlterEgo),
            AutonomyTier::AlterEgo => None,
        }
    }
}

impl fmt::Display for AutonomyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutonomyTier {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AutonomyTier::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EngineError::UnknownTier(s.to_string()))
    }
}

/// Outcome of an autonomy decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    AutoApprove,
    RequireApproval,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::AutoApprove => "auto_approve",
            Decision::RequireApproval => "require_approval",
        }
    }
}

/// Pure decision rule
///
/// The tier wins when it permits the class; otherwise the approval streak
/// must have reached the threshold.
pub fn evaluate(tier: AutonomyTier, class: ActionClass, streak: u32, threshold: u32) -> Decision {
    if tier.permits(class) || streak >= threshold {
        Decision::AutoApprove
    } else {
        Decision::RequireApproval
    }
}

/// A decision together with the inputs it was made from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub decision: Decision,
    pub domain: Domain,
    pub tier: AutonomyTier,
}

pub struct AutonomyEngine {
    config: AutonomyConfig,
    overrides: AutonomyRepository,
    tracker: Arc<ApprovalPatternTracker>,
}

impl AutonomyEngine {
    pub fn new(
        config: AutonomyConfig,
        overrides: AutonomyRepository,
        tracker: Arc<ApprovalPatternTracker>,
    ) -> Self {
        Self {
            config,
            overrides,
            tracker,
        }
    }

    /// Effective tier of a domain
    pub async fn tier_for(&self, domain: Domain) -> Result<AutonomyTier> {
        Ok(self
            .overrides
            .get_override(domain)
            .await?
            .unwrap_or_else(|| self.config.tier_for(domain)))
    }

    pub async fn decide(&self, action: ActionType, payload: &Value) -> Result<Decision> {
        Ok(self.assess(action, payload).await?.decision)
    }

    /// Decide and report the domain and tier used
    ///
    /// Never writes; approval history is only read.
    pub async fn assess(&self, action: ActionType, payload: &Value) -> Result<Assessment> {
        let domain = action.domain();
        let tier = self.tier_for(domain).await?;

        let decision = if tier.permits(action.class()) {
            Decision::AutoApprove
        } else {
            let (streak, threshold) = match self.tracker.get_pattern(action, payload).await? {
                Some(p) => (p.consecutive_approvals, p.threshold),
                None => (0, self.tracker.default_threshold(action)),
            };
            evaluate(tier, action.class(), streak, threshold)
        };

        debug!(
            "Autonomy decision for {}: {} (domain={}, tier={})",
            action,
            decision.as_str(),
            domain,
            tier
        );

        Ok(Assessment {
            decision,
            domain,
            tier,
        })
    }

    /// Persist a tier for a domain
    pub async fn set_tier(&self, domain: Domain, tier: AutonomyTier) -> Result<()> {
        self.overrides.set_override(domain, tier).await?;
        info!("Autonomy tier for {} set to {}", domain, tier);
        Ok(())
    }

    /// Effective tier of every domain
    pub async fn tiers(&self) -> Result<BTreeMap<Domain, AutonomyTier>> {
        let mut tiers: BTreeMap<Domain, AutonomyTier> = Domain::ALL
            .into_iter()
            .map(|d| (d, self.config.tier_for(d)))
            .collect();

        for (domain, tier) in self.overrides.get_overrides().await? {
            tiers.insert(domain, tier);
        }

        Ok(tiers)
    }

    pub fn tracker(&self) -> &ApprovalPatternTracker {
        &self.tracker
    }

    pub(crate) fn repository(&self) -> &AutonomyRepository {
        &self.overrides
    }
}

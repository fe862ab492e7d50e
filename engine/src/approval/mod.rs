//! Approval pattern tracking
//!
//! Learns which kinds of requests the user reliably approves. Every
//! approval or rejection is recorded against the request's
//! [fingerprint](fingerprint); once a fingerprint's consecutive approvals
//! reach its threshold, the autonomy engine auto-approves it.
//!
//! - A rejection resets the approval streak to zero.
//! - The threshold a pattern starts with is the domain default from
//!   configuration. Afterwards it only moves up ([`ApprovalPatternTracker::raise_threshold`])
//!   unless the pattern is reset.

pub mod fingerprint;

use anyhow::Result;
use sdk::actions::{ActionType, Domain};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::AutonomyConfig;
use crate::db::{ApprovalPattern, ApprovalPatternRepository};
use fingerprint::{Fingerprint, Fingerprinter};

pub struct ApprovalPatternTracker {
    repo: ApprovalPatternRepository,
    fingerprinter: Fingerprinter,
    thresholds: HashMap<Domain, u32>,
}

impl ApprovalPatternTracker {
    pub fn new(repo: ApprovalPatternRepository, config: &AutonomyConfig) -> Self {
        let thresholds = Domain::ALL
            .into_iter()
            .map(|d| (d, config.threshold_for(d)))
            .collect();

        Self {
            repo,
            fingerprinter: Fingerprinter::new(&config.fingerprint_rules),
            thresholds,
        }
    }

    pub fn fingerprint(&self, action: ActionType, payload: &Value) -> Fingerprint {
        self.fingerprinter.fingerprint(action, payload)
    }

    /// Threshold assigned to patterns seen for the first time
    pub fn default_threshold(&self, action: ActionType) -> u32 {
        self.thresholds
            .get(&action.domain())
            .copied()
            .unwrap_or(1)
    }

    pub async fn record_approval(&self, action: ActionType, payload: &Value) -> Result<ApprovalPattern> {
        let fp = self.fingerprint(action, payload);
        let pattern = self
            .repo
            .record_approval(&fp.hash, action, &fp.descriptor, self.default_threshold(action))
            .await?;

        if pattern.consecutive_approvals == pattern.threshold {
            info!(
                "Pattern {} for {} reached its approval threshold ({})",
                short(&fp.hash),
                action,
                pattern.threshold
            );
        } else {
            debug!(
                "Approval recorded for {} ({}/{})",
                action, pattern.consecutive_approvals, pattern.threshold
            );
        }

        Ok(pattern)
    }

    pub async fn record_rejection(&self, action: ActionType, payload: &Value) -> Result<ApprovalPattern> {
        let fp = self.fingerprint(action, payload);
        let pattern = self
            .repo
            .record_rejection(&fp.hash, action, &fp.descriptor, self.default_threshold(action))
            .await?;

        debug!(
            "Rejection recorded for {} (pattern {}, {} in a row)",
            action,
            short(&fp.hash),
            pattern.consecutive_rejections
        );

        Ok(pattern)
    }

    /// Stored pattern for a request, if it was ever approved or rejected
    pub async fn get_pattern(&self, action: ActionType, payload: &Value) -> Result<Option<ApprovalPattern>> {
        let fp = self.fingerprint(action, payload);
        self.repo.get(&fp.hash).await
    }

    /// Current approval streak; zero for unseen patterns
    pub async fn get_consecutive_approvals(&self, action: ActionType, payload: &Value) -> Result<u32> {
        Ok(self
            .get_pattern(action, payload)
            .await?
            .map(|p| p.consecutive_approvals)
            .unwrap_or(0))
    }

    /// Approvals required before auto-approval; the domain default for unseen patterns
    pub async fn get_threshold(&self, action: ActionType, payload: &Value) -> Result<u32> {
        Ok(self
            .get_pattern(action, payload)
            .await?
            .map(|p| p.threshold)
            .unwrap_or_else(|| self.default_threshold(action)))
    }

    pub async fn get_all_patterns(&self) -> Result<Vec<ApprovalPattern>> {
        self.repo.list_all().await
    }

    /// Require more approvals for a pattern. Lower values are ignored.
    pub async fn raise_threshold(&self, fingerprint: &str, threshold: u32) -> Result<bool> {
        self.repo.raise_threshold(fingerprint, threshold).await
    }

    /// Forget a pattern; its next approval starts from the domain default
    pub async fn reset_pattern(&self, fingerprint: &str) -> Result<bool> {
        let removed = self.repo.delete(fingerprint).await?;
        if removed {
            info!("Approval pattern {} reset", short(fingerprint));
        }
        Ok(removed)
    }
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

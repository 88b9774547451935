//! Synthesizer: fuses normalized producer scores into the final verdict.
//!
//! The fusion policy is deterministic:
//! 1. `final = round_half_up(Σ weight_k × score_k)`
//! 2. GO iff `final ≥ go_threshold` AND every normalized score ≥ `floor`
//! 3. Otherwise NO_GO
//!
//! The floor is conjunctive: one excellent score cannot paper over a hard
//! failure elsewhere.
//!
//! Weights are held as integer parts per billion that always total exactly
//! one billion, so the weighted sum and its rounding are exact;
//! `0.4 × 82 + 0.3 × 70 + 0.3 × 60` is 71.8 and rounds to 72 on every
//! platform.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extraction::{ScoreExtractor, ScoringPolicy};
use crate::types::{
    Decision, EvaluationBundle, NormalizedScore, ProducerKind, ProducerResult, ProducerStatus,
    SiteContext,
};

const WEIGHT_SCALE: u64 = 1_000_000_000;
const SUM_TOLERANCE: f64 = 1e-6;

/// Errors from fusion policy validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("Weights must sum to 1.0 (got {0})")]
    WeightSum(f64),

    #[error("Weight for {0} must be a finite, non-negative number")]
    InvalidWeight(ProducerKind),

    #[error("No weights configured")]
    NoWeights,

    #[error("{0} must be within 0..=100 (got {1})")]
    OutOfRange(&'static str, u8),
}

/// Weights and thresholds for the fusion rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusionPolicy {
    /// Weight per producer kind; must sum to 1.0
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<ProducerKind, f64>,

    /// Minimum weighted total for GO
    #[serde(default = "default_go_threshold")]
    pub go_threshold: u8,

    /// Minimum score every individual producer must reach for GO
    #[serde(default = "default_floor")]
    pub floor: u8,
}

fn default_weights() -> BTreeMap<ProducerKind, f64> {
    let mut weights = BTreeMap::new();
    weights.insert(ProducerKind::Research, 0.4);
    weights.insert(ProducerKind::Permitting, 0.3);
    weights.insert(ProducerKind::Design, 0.3);
    weights
}

fn default_go_threshold() -> u8 {
    65
}

fn default_floor() -> u8 {
    50
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            go_threshold: default_go_threshold(),
            floor: default_floor(),
        }
    }
}

impl FusionPolicy {
    /// Check the policy and convert weights to integer parts per billion.
    ///
    /// The converted weights always total exactly one billion; rounding
    /// leftovers go to the weights with the largest fractional parts.
    pub fn validate(&self) -> Result<BTreeMap<ProducerKind, u64>, PolicyError> {
        if self.weights.is_empty() {
            return Err(PolicyError::NoWeights);
        }
        if self.go_threshold > 100 {
            return Err(PolicyError::OutOfRange("go_threshold", self.go_threshold));
        }
        if self.floor > 100 {
            return Err(PolicyError::OutOfRange("floor", self.floor));
        }
        for (kind, weight) in &self.weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(PolicyError::InvalidWeight(*kind));
            }
        }

        let sum: f64 = self.weights.values().sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(PolicyError::WeightSum(sum));
        }
        Ok(scale_weights(&self.weights, sum))
    }
}

/// Largest-remainder apportionment of `WEIGHT_SCALE` across the weights.
fn scale_weights(weights: &BTreeMap<ProducerKind, f64>, sum: f64) -> BTreeMap<ProducerKind, u64> {
    let mut parts: Vec<(ProducerKind, u64, f64)> = weights
        .iter()
        .map(|(kind, weight)| {
            let exact = weight / sum * WEIGHT_SCALE as f64;
            let whole = exact.floor();
            (*kind, whole as u64, exact - whole)
        })
        .collect();

    // Largest fraction first; ties keep kind order.
    parts.sort_by(|a, b| b.2.total_cmp(&a.2));

    let assigned: u64 = parts.iter().map(|(_, whole, _)| whole).sum();
    if assigned < WEIGHT_SCALE {
        // Zero weights never receive a share.
        let eligible: Vec<usize> = (0..parts.len())
            .filter(|&i| parts[i].1 > 0 || parts[i].2 > 0.0)
            .collect();
        if !eligible.is_empty() {
            for step in 0..(WEIGHT_SCALE - assigned) as usize {
                parts[eligible[step % eligible.len()]].1 += 1;
            }
        }
    } else {
        let mut excess = assigned - WEIGHT_SCALE;
        for (_, whole, _) in parts.iter_mut().rev() {
            let take = excess.min(*whole);
            *whole -= take;
            excess -= take;
            if excess == 0 {
                break;
            }
        }
    }

    parts.into_iter().map(|(kind, whole, _)| (kind, whole)).collect()
}

/// Numeric outcome of fusing a set of scores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fusion {
    pub final_score: u8,
    pub decision: Decision,

    /// Kinds whose score fell below the floor, in input order
    pub below_floor: Vec<NormalizedScore>,
}

/// The Synthesizer turns producer results into an evaluation bundle.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    policy: FusionPolicy,
    scaled_weights: BTreeMap<ProducerKind, u64>,
    extractor: ScoreExtractor,
}

impl Synthesizer {
    /// Create a synthesizer, rejecting invalid policies.
    pub fn new(policy: FusionPolicy, scoring: ScoringPolicy) -> Result<Self, PolicyError> {
        let scaled_weights = policy.validate()?;
        Ok(Self {
            policy,
            scaled_weights,
            extractor: ScoreExtractor::new(scoring),
        })
    }

    pub fn policy(&self) -> &FusionPolicy {
        &self.policy
    }

    pub fn extractor(&self) -> &ScoreExtractor {
        &self.extractor
    }

    /// Apply the fusion rule to normalized scores.
    ///
    /// A weighted kind with no score counts as 0. Scores for kinds without
    /// a weight contribute nothing to the total but are still held to the
    /// floor.
    pub fn fuse(&self, scores: &[NormalizedScore]) -> Fusion {
        let by_kind: BTreeMap<ProducerKind, u8> =
            scores.iter().map(|s| (s.kind, s.value)).collect();

        let weighted: u64 = self
            .scaled_weights
            .iter()
            .map(|(kind, w)| w * u64::from(by_kind.get(kind).copied().unwrap_or(0)))
            .sum();
        // Round half up; the quotient is at most 100.
        let final_score = u8::try_from((weighted + WEIGHT_SCALE / 2) / WEIGHT_SCALE).unwrap_or(100);

        let mut below_floor: Vec<NormalizedScore> = scores
            .iter()
            .filter(|s| s.value < self.policy.floor)
            .copied()
            .collect();
        for kind in self.scaled_weights.keys() {
            if !by_kind.contains_key(kind) && self.policy.floor > 0 {
                below_floor.push(NormalizedScore::new(*kind, 0));
            }
        }

        let decision = if final_score >= self.policy.go_threshold && below_floor.is_empty() {
            Decision::Go
        } else {
            Decision::NoGo
        };

        Fusion {
            final_score,
            decision,
            below_floor,
        }
    }

    /// Extract, fuse, and justify producer results into a bundle.
    ///
    /// This function is fully deterministic: same inputs always produce the
    /// same bundle.
    pub fn synthesize_at(
        &self,
        address: &str,
        context: SiteContext,
        producer_results: Vec<ProducerResult>,
        evaluated_at: DateTime<Utc>,
    ) -> EvaluationBundle {
        let scores: Vec<NormalizedScore> = producer_results
            .iter()
            .map(|r| self.extractor.extract(r))
            .collect();
        let fusion = self.fuse(&scores);

        let mut justification: Vec<String> = producer_results
            .iter()
            .zip(&scores)
            .map(|(result, score)| self.producer_line(result, score))
            .collect();
        justification.push(self.closing_line(&fusion));

        EvaluationBundle {
            address: address.to_string(),
            context: Some(context),
            producer_results,
            normalized_scores: scores.into_iter().map(|s| (s.kind, s)).collect(),
            final_score: fusion.final_score,
            decision: fusion.decision,
            justification,
            evaluated_at,
        }
    }

    /// Bundle for an address that could not be resolved.
    ///
    /// No producer ran; every expected kind scores 0.
    pub fn unresolved_at(
        &self,
        address: &str,
        kinds: &[ProducerKind],
        reason: &str,
        evaluated_at: DateTime<Utc>,
    ) -> EvaluationBundle {
        EvaluationBundle {
            address: address.to_string(),
            context: None,
            producer_results: Vec::new(),
            normalized_scores: kinds.iter().map(|k| (*k, NormalizedScore::new(*k, 0))).collect(),
            final_score: 0,
            decision: Decision::Invalid,
            justification: vec![
                format!("Address could not be resolved: {reason}"),
                "No producers were run; all scores are 0 and the site is marked INVALID."
                    .to_string(),
            ],
            evaluated_at,
        }
    }

    fn producer_line(&self, result: &ProducerResult, score: &NormalizedScore) -> String {
        let kind = result.kind;
        match result.status {
            ProducerStatus::Ok => format!(
                "{} score {} reflects {}.",
                kind,
                score.value,
                kind.descriptor()
            ),
            ProducerStatus::Degraded => format!(
                "{} score {} reflects {} (fallback data was substituted).",
                kind,
                score.value,
                kind.descriptor()
            ),
            ProducerStatus::Failed => format!(
                "{} score {}: producer failed ({}).",
                kind,
                score.value,
                result.error().unwrap_or("unknown error")
            ),
        }
    }

    fn closing_line(&self, fusion: &Fusion) -> String {
        let mut line = format!(
            "Weighted overall feasibility score is {}, resulting in a '{}' decision",
            fusion.final_score, fusion.decision
        );

        if fusion.final_score < self.policy.go_threshold {
            line.push_str(&format!(
                "; below the GO threshold of {}",
                self.policy.go_threshold
            ));
        }
        for score in &fusion.below_floor {
            line.push_str(&format!(
                "; {} score {} is below the floor of {}",
                score.kind, score.value, self.policy.floor
            ));
        }
        line.push('.');
        line
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        let policy = FusionPolicy::default();
        let scaled_weights = policy
            .validate()
            .unwrap_or_else(|_| BTreeMap::new());
        Self {
            policy,
            scaled_weights,
            extractor: ScoreExtractor::default(),
        }
    }
}

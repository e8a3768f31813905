//! Verification decision maker.

use relia_core::{QueryMode, ReasonCode, VerificationDecision, VerificationResult};

/// Self-consistency below this adds a reason code (never changes the
/// decision).
const SELF_INCONSISTENCY_THRESHOLD: f32 = 0.4;

/// Pass/warn thresholds per mode.
#[derive(Debug, Clone)]
pub struct VerificationThresholds {
    pub groundedness_pass: f32,
    pub groundedness_warn: f32,
    pub contradiction_pass: f32,
    pub contradiction_warn: f32,
    pub strict_groundedness_pass: f32,
    pub strict_contradiction_pass: f32,
}

impl Default for VerificationThresholds {
    fn default() -> Self {
        Self {
            groundedness_pass: 0.70,
            groundedness_warn: 0.50,
            contradiction_pass: 0.20,
            contradiction_warn: 0.40,
            strict_groundedness_pass: 0.85,
            strict_contradiction_pass: 0.10,
        }
    }
}

/// Combines the verifier signals into pass / warn / abstain.
#[derive(Debug, Clone, Default)]
pub struct VerificationDecisionMaker {
    thresholds: VerificationThresholds,
}

impl VerificationDecisionMaker {
    pub fn new(thresholds: VerificationThresholds) -> Self {
        Self { thresholds }
    }

    pub fn decide(
        &self,
        groundedness: f32,
        contradiction_rate: f32,
        self_consistency: Option<f32>,
        mode: QueryMode,
    ) -> VerificationResult {
        let (ground_pass, contra_pass) = match mode {
            QueryMode::Strict => (
                self.thresholds.strict_groundedness_pass,
                self.thresholds.strict_contradiction_pass,
            ),
            QueryMode::Normal => (
                self.thresholds.groundedness_pass,
                self.thresholds.contradiction_pass,
            ),
        };
        let ground_warn = self.thresholds.groundedness_warn;
        let contra_warn = self.thresholds.contradiction_warn;

        let mut reason_codes = Vec::new();
        if groundedness < ground_warn {
            reason_codes.push(ReasonCode::LowGroundedness);
        }
        if contradiction_rate > contra_warn {
            reason_codes.push(ReasonCode::ContradictionFound);
        }
        if let Some(sc) = self_consistency {
            if sc < SELF_INCONSISTENCY_THRESHOLD {
                reason_codes.push(ReasonCode::SelfInconsistency);
            }
        }

        let decision = if groundedness >= ground_pass && contradiction_rate <= contra_pass {
            VerificationDecision::Pass
        } else if groundedness >= ground_warn && contradiction_rate <= contra_warn {
            VerificationDecision::Warn
        } else {
            VerificationDecision::Abstain
        };

        VerificationResult {
            groundedness,
            contradiction_rate,
            self_consistency,
            decision,
            reason_codes,
        }
    }
}

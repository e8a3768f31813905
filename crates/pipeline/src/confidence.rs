//! Final confidence scoring.

/// Confidence weights. `alpha + beta + gamma = 1` is enforced at config
/// load time.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceWeights {
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            alpha: 0.50,
            beta: 0.35,
            gamma: 0.15,
        }
    }
}

/// `confidence = clamp(alpha*rq + beta*groundedness - gamma*contradiction, 0, 1)`.
///
/// Self-consistency deliberately does not enter the formula; it only ever
/// surfaces as a reason code.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    weights: ConfidenceWeights,
}

impl ConfidenceScorer {
    pub fn new(weights: ConfidenceWeights) -> Self {
        Self { weights }
    }

    pub fn score(&self, rq: f32, groundedness: f32, contradiction_rate: f32) -> f32 {
        (self.weights.alpha * rq + self.weights.beta * groundedness
            - self.weights.gamma * contradiction_rate)
            .clamp(0.0, 1.0)
    }
}

//! Verifier bank: groundedness, contradiction, self-consistency, and the
//! decision maker that combines their signals.

mod contradiction;
mod decision;
mod groundedness;
mod self_consistency;

#[cfg(test)]
pub(crate) mod test_support;

pub use contradiction::ContradictionDetector;
pub use decision::{VerificationDecisionMaker, VerificationThresholds};
pub use groundedness::GroundednessChecker;
pub use self_consistency::SelfConsistencyChecker;

//! Order creation saga stages.

use serde::{Deserialize, Serialize};

/// The stage an order creation saga has reached.
///
/// Stages run strictly in order:
/// ```text
/// Validate ──► Check ──► Reserve ──► Persist ──► Publish ──► Done
///                                       │
///                                       └──► release stock, fail
/// ```
///
/// Only a failure at `Persist` has a reservation to compensate. A failure
/// at `Publish` keeps the order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum SagaStage {
    #[default]
    Validate,
    Check,
    Reserve,
    Persist,
    Publish,
    Done,
}

impl SagaStage {
    /// Returns true once stock has been reserved for this saga.
    pub fn holds_reservation(&self) -> bool {
        *self > SagaStage::Reserve
    }

    /// Returns the stage name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStage::Validate => "validate",
            SagaStage::Check => "check",
            SagaStage::Reserve => "reserve",
            SagaStage::Persist => "persist",
            SagaStage::Publish => "publish",
            SagaStage::Done => "done",
        }
    }
}

impl std::fmt::Display for SagaStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

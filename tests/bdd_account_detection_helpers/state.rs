//! Scenario state for account detection BDD tests.

use carina::credentials::CredentialInputs;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

/// Convenience alias for step outcomes.
pub type StepResult<T> = Result<T, String>;

/// What resolution produced.
#[derive(Clone, Debug)]
pub enum ResolveOutcome {
    /// An account was resolved.
    Resolved {
        /// Backend name, e.g. `magnum`.
        cloud: String,
        username: String,
        endpoint: String,
        /// Keystone domain; magnum accounts only.
        domain: Option<String>,
    },
    /// Resolution failed with the given error message.
    Failed {
        /// The `Display` representation of the error.
        message: String,
    },
}

/// State shared across account detection scenarios.
#[derive(ScenarioState)]
pub struct AccountDetectionState {
    /// Environment visible to the resolver.
    pub(crate) env: Slot<Vec<(String, String)>>,
    /// Flags given on the command line.
    pub(crate) inputs: Slot<CredentialInputs>,
    /// Outcome of the most recent resolution.
    pub(crate) outcome: Slot<ResolveOutcome>,
}

#[expect(
    clippy::derivable_impls,
    reason = "ScenarioState guidance discourages deriving Default in this module"
)]
impl Default for AccountDetectionState {
    fn default() -> Self {
        Self {
            env: Slot::default(),
            inputs: Slot::default(),
            outcome: Slot::default(),
        }
    }
}

/// Fixture providing fresh state for each account detection scenario.
#[rstest::fixture]
pub fn account_detection_state() -> AccountDetectionState {
    AccountDetectionState::default()
}

//! Policy engine for signing requests.
//!
//! # Rule Evaluation Order
//!
//! Rules are evaluated in strict order and the first failure wins:
//!
//! 1. **Chain allowlist** - `chainId` must be in `allowedChains` (if both are set)
//! 2. **Blocked contract** - `to` must not be in `blockedContracts`
//! 3. **Allowed contract** - `to` must be in `allowedContracts` (empty = no restriction)
//! 4. **Blocked selector** - the calldata selector must not be in `blockedFunctions`
//! 5. **Value cap** - `value` must not exceed `maxValuePerTx`
//! 6. **Approval gate** - decides `needs_approval` for an allowed request
//!
//! Message and typed-data signing carry no recipient or value, so only the
//! approval gate applies: approval is needed unless `requireApproval` is
//! `never`.
//!
//! # Example
//!
//! ```
//! use agentek_core::types::{PolicyConfig, TxRequest};
//! use agentek_policy::engine::{DefaultPolicyEngine, PolicyEngine};
//! use alloy_primitives::U256;
//!
//! let engine = DefaultPolicyEngine::new(PolicyConfig::default()).unwrap();
//!
//! let tx = TxRequest {
//!     chain_id: Some(999_999),
//!     value: Some(U256::from(1u64)),
//!     ..Default::default()
//! };
//! let decision = engine.check(&tx);
//! assert!(!decision.allowed);
//! assert!(decision.reason.unwrap().contains("999999"));
//! ```

use agentek_core::error::PolicyError;
use agentek_core::types::{PolicyConfig, PolicyDecision, RequireApproval, TxRequest};
use alloy_primitives::U256;
use tracing::debug;

/// Trait for policy engines that gate signing requests.
///
/// All implementations must be `Send + Sync` so one engine can serve
/// concurrent request handlers.
pub trait PolicyEngine: Send + Sync {
    /// Evaluate a transaction request.
    fn check(&self, tx: &TxRequest) -> PolicyDecision;

    /// Evaluate a message or typed-data signing request.
    fn check_message(&self) -> PolicyDecision;

    /// The policy this engine enforces.
    fn config(&self) -> &PolicyConfig;
}

/// Detailed result of the rule checks, before the approval gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyCheckResult {
    /// Every rule passed.
    Allowed,

    /// The chain is not in `allowedChains`.
    DeniedChainNotAllowed {
        /// The requested chain id.
        chain_id: u64,
        /// The configured allowlist.
        allowed: Vec<u64>,
    },

    /// The target is in `blockedContracts`.
    DeniedBlockedContract {
        /// The blocked address.
        address: String,
    },

    /// The target is missing from a non-empty `allowedContracts`.
    DeniedContractNotAllowed {
        /// The rejected address.
        address: String,
    },

    /// The calldata selector is in `blockedFunctions`.
    DeniedBlockedSelector {
        /// The blocked selector.
        selector: String,
    },

    /// The value exceeds `maxValuePerTx`.
    DeniedExceedsMaxValue {
        /// Requested value in wei.
        value: U256,
        /// Cap in wei.
        max: U256,
    },

    /// The policy itself cannot be evaluated.
    DeniedInvalidPolicy {
        /// What is wrong with it.
        reason: String,
    },
}

impl PolicyCheckResult {
    /// Returns `true` if the request passed every rule.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Returns the rule name that caused the denial, if any.
    #[must_use]
    pub const fn rule_name(&self) -> Option<&'static str> {
        match self {
            Self::Allowed => None,
            Self::DeniedChainNotAllowed { .. } => Some("allowed_chains"),
            Self::DeniedBlockedContract { .. } => Some("blocked_contracts"),
            Self::DeniedContractNotAllowed { .. } => Some("allowed_contracts"),
            Self::DeniedBlockedSelector { .. } => Some("blocked_functions"),
            Self::DeniedExceedsMaxValue { .. } => Some("max_value_per_tx"),
            Self::DeniedInvalidPolicy { .. } => Some("policy"),
        }
    }

    /// Returns a human-readable reason for the denial, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Allowed => None,
            Self::DeniedChainNotAllowed { chain_id, allowed } => Some(format!(
                "chain {chain_id} is not allowed (allowed chains: {})",
                allowed
                    .iter()
                    .map(u64::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            Self::DeniedBlockedContract { address } => {
                Some(format!("contract {address} is blocked"))
            }
            Self::DeniedContractNotAllowed { address } => {
                Some(format!("contract {address} is not in the allowed list"))
            }
            Self::DeniedBlockedSelector { selector } => {
                Some(format!("function selector {selector} is blocked"))
            }
            Self::DeniedExceedsMaxValue { value, max } => Some(format!(
                "value {value} wei exceeds maximum of {max} wei per transaction"
            )),
            Self::DeniedInvalidPolicy { reason } => Some(reason.clone()),
        }
    }
}

/// Runs rules 1-5 in order and returns the first failure.
#[must_use]
pub fn check_rules(policy: &PolicyConfig, tx: &TxRequest) -> PolicyCheckResult {
    if let Some(chain_id) = tx.chain_id {
        if !policy.allowed_chains.is_empty() && !policy.allowed_chains.contains(&chain_id) {
            return PolicyCheckResult::DeniedChainNotAllowed {
                chain_id,
                allowed: policy.allowed_chains.clone(),
            };
        }
    }

    if let Some(to) = tx.to.as_deref() {
        let to = to.to_lowercase();
        if policy.is_blocked_contract(&to) {
            return PolicyCheckResult::DeniedBlockedContract { address: to };
        }
        if !policy.is_allowed_contract(&to) {
            return PolicyCheckResult::DeniedContractNotAllowed { address: to };
        }
    }

    if let Some(selector) = tx.selector() {
        if policy.is_blocked_function(&selector) {
            return PolicyCheckResult::DeniedBlockedSelector { selector };
        }
    }

    let max = match policy.max_value_wei() {
        Ok(max) => max,
        Err(e) => {
            return PolicyCheckResult::DeniedInvalidPolicy {
                reason: e.to_string(),
            }
        }
    };
    let value = tx.value_or_zero();
    if value > max {
        return PolicyCheckResult::DeniedExceedsMaxValue { value, max };
    }

    PolicyCheckResult::Allowed
}

/// The value above which `above_threshold` asks for approval:
/// `max * pct / 100`, truncated.
#[must_use]
pub fn approval_threshold(max: U256, pct: u8) -> U256 {
    let pct = U256::from(pct);
    let hundred = U256::from(100u8);
    max.checked_mul(pct).map_or_else(
        // max = 100q + r, so max * pct / 100 = q * pct + r * pct / 100
        || {
            (max / hundred)
                .saturating_mul(pct)
                .saturating_add((max % hundred) * pct / hundred)
        },
        |scaled| scaled / hundred,
    )
}

/// Evaluate a transaction request against a policy.
///
/// Pure and deterministic: the same inputs always give the same decision.
#[must_use]
pub fn evaluate(policy: &PolicyConfig, tx: &TxRequest) -> PolicyDecision {
    let result = check_rules(policy, tx);
    if !result.is_allowed() {
        let reason = result
            .reason()
            .unwrap_or_else(|| "policy denied".to_string());
        debug!(rule = result.rule_name().unwrap_or("unknown"), %reason, "policy denied request");
        return PolicyDecision::deny(reason);
    }

    let needs_approval = match policy.require_approval {
        RequireApproval::Always => true,
        RequireApproval::Never => false,
        RequireApproval::AboveThreshold => {
            // check_rules already denied an unparseable cap
            let max = policy.max_value_wei().unwrap_or(U256::ZERO);
            tx.value_or_zero() > approval_threshold(max, policy.approval_threshold_pct)
        }
    };
    PolicyDecision::allow(needs_approval)
}

/// Evaluate a message or typed-data signing request.
#[must_use]
pub fn evaluate_message(policy: &PolicyConfig) -> PolicyDecision {
    PolicyDecision::allow(policy.require_approval != RequireApproval::Never)
}

/// Default policy engine over a validated [`PolicyConfig`].
#[derive(Debug, Clone)]
pub struct DefaultPolicyEngine {
    config: PolicyConfig,
}

impl DefaultPolicyEngine {
    /// Creates a new policy engine.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidConfiguration`] if the policy does not
    /// pass [`PolicyConfig::validate`].
    pub fn new(config: PolicyConfig) -> Result<Self, PolicyError> {
        config.validate()?;
        Ok(Self { config })
    }
}

impl PolicyEngine for DefaultPolicyEngine {
    fn check(&self, tx: &TxRequest) -> PolicyDecision {
        evaluate(&self.config, tx)
    }

    fn check_message(&self) -> PolicyDecision {
        evaluate_message(&self.config)
    }

    fn config(&self) -> &PolicyConfig {
        &self.config
    }
}

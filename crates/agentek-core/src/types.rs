//! Policy and request types shared across the signing daemon.
//!
//! - [`PolicyConfig`] - the declarative signing policy stored encrypted in the keyfile
//! - [`RequireApproval`] - when the operator must confirm a request
//! - [`TxRequest`] - the transaction fields the policy engine looks at
//! - [`PolicyDecision`] - the outcome of a policy evaluation
//!
//! All types serialize to the camelCase JSON used inside the keyfile and on
//! the wire.

use crate::error::PolicyError;
use alloy_primitives::utils::parse_ether;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chains allowed by a freshly created policy: mainnet, Optimism, Polygon,
/// Base, Arbitrum One and Sepolia.
pub const DEFAULT_ALLOWED_CHAINS: [u64; 6] = [1, 10, 137, 8453, 42161, 11_155_111];

/// Per-transaction value cap of a freshly created policy, in ETH.
pub const DEFAULT_MAX_VALUE_PER_TX: &str = "0.1";

/// Approval threshold of a freshly created policy, in percent of the cap.
pub const DEFAULT_APPROVAL_THRESHOLD_PCT: u8 = 50;

// ============================================================================
// RequireApproval
// ============================================================================

/// When the operator has to confirm a signing request interactively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequireApproval {
    /// Every request needs approval.
    Always,
    /// Transactions above `approvalThresholdPct` of the cap need approval;
    /// messages and typed data always do.
    #[default]
    AboveThreshold,
    /// Nothing needs approval.
    Never,
}

impl RequireApproval {
    /// Returns the wire name (`always`, `above_threshold`, `never`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::AboveThreshold => "above_threshold",
            Self::Never => "never",
        }
    }
}

impl fmt::Display for RequireApproval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PolicyConfig
// ============================================================================

/// Declarative signing policy.
///
/// The decrypted form only ever lives in daemon memory; on disk it is part
/// of the AES-256-GCM encrypted section of the keyfile.
///
/// Addresses and selectors are compared case-insensitively; the builder
/// methods lowercase them on entry.
///
/// # Examples
///
/// ```
/// use agentek_core::types::{PolicyConfig, RequireApproval};
///
/// let policy = PolicyConfig::default()
///     .with_max_value_per_tx("0.5")
///     .with_allowed_chains(vec![1, 8453])
///     .with_blocked_functions(vec!["0x095EA7B3".to_string()])
///     .with_require_approval(RequireApproval::Always);
///
/// assert!(policy.validate().is_ok());
/// assert_eq!(policy.blocked_functions, vec!["0x095ea7b3".to_string()]);
///
/// let json = serde_json::to_value(&policy).unwrap();
/// assert_eq!(json["maxValuePerTx"], "0.5");
/// assert_eq!(json["requireApproval"], "always");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    /// Maximum value of a single transaction, as a decimal ETH string.
    pub max_value_per_tx: String,

    /// Chain ids that may be signed for. Empty means any chain.
    #[serde(default)]
    pub allowed_chains: Vec<u64>,

    /// Contract addresses that may never be called.
    #[serde(default)]
    pub blocked_contracts: Vec<String>,

    /// Contract addresses that may be called. Empty means no restriction.
    #[serde(default)]
    pub allowed_contracts: Vec<String>,

    /// 4-byte function selectors (`0x` + 8 hex chars) that may never be called.
    #[serde(default)]
    pub blocked_functions: Vec<String>,

    /// When interactive approval is required.
    #[serde(default)]
    pub require_approval: RequireApproval,

    /// Percentage of `max_value_per_tx` above which a transaction needs
    /// approval under [`RequireApproval::AboveThreshold`].
    #[serde(default = "default_approval_threshold_pct")]
    pub approval_threshold_pct: u8,
}

const fn default_approval_threshold_pct() -> u8 {
    DEFAULT_APPROVAL_THRESHOLD_PCT
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_value_per_tx: DEFAULT_MAX_VALUE_PER_TX.to_string(),
            allowed_chains: DEFAULT_ALLOWED_CHAINS.to_vec(),
            blocked_contracts: Vec::new(),
            allowed_contracts: Vec::new(),
            blocked_functions: Vec::new(),
            require_approval: RequireApproval::default(),
            approval_threshold_pct: DEFAULT_APPROVAL_THRESHOLD_PCT,
        }
    }
}

impl PolicyConfig {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the per-transaction cap in wei.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidConfiguration`] if `max_value_per_tx`
    /// is not a non-negative decimal ETH amount.
    ///
    /// # Examples
    ///
    /// ```
    /// use agentek_core::types::PolicyConfig;
    /// use alloy_primitives::U256;
    ///
    /// let policy = PolicyConfig::default().with_max_value_per_tx("0.1");
    /// assert_eq!(
    ///     policy.max_value_wei().unwrap(),
    ///     U256::from(100_000_000_000_000_000u64)
    /// );
    /// ```
    pub fn max_value_wei(&self) -> Result<U256, PolicyError> {
        parse_ether(self.max_value_per_tx.trim()).map_err(|e| {
            PolicyError::invalid_configuration(format!(
                "maxValuePerTx '{}' is not a valid ETH amount: {e}",
                self.max_value_per_tx
            ))
        })
    }

    /// Returns true if `address` is in `blocked_contracts`.
    #[must_use]
    pub fn is_blocked_contract(&self, address: &str) -> bool {
        contains_ignore_case(&self.blocked_contracts, address)
    }

    /// Returns true if `allowed_contracts` is empty or contains `address`.
    #[must_use]
    pub fn is_allowed_contract(&self, address: &str) -> bool {
        self.allowed_contracts.is_empty() || contains_ignore_case(&self.allowed_contracts, address)
    }

    /// Returns true if `selector` is in `blocked_functions`.
    #[must_use]
    pub fn is_blocked_function(&self, selector: &str) -> bool {
        contains_ignore_case(&self.blocked_functions, selector)
    }

    /// Validates the policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidConfiguration`] if:
    /// - `max_value_per_tx` is not a decimal ETH amount
    /// - `approval_threshold_pct` is above 100
    /// - a contract entry is not a `0x`-prefixed 20-byte hex address
    /// - a function entry is not a `0x`-prefixed 4-byte hex selector
    pub fn validate(&self) -> Result<(), PolicyError> {
        self.max_value_wei()?;

        if self.approval_threshold_pct > 100 {
            return Err(PolicyError::invalid_configuration(format!(
                "approvalThresholdPct must be between 0 and 100, got {}",
                self.approval_threshold_pct
            )));
        }

        for address in self.blocked_contracts.iter().chain(&self.allowed_contracts) {
            if !is_hex_with_len(address, 40) {
                return Err(PolicyError::invalid_configuration(format!(
                    "'{address}' is not a valid contract address"
                )));
            }
        }

        for selector in &self.blocked_functions {
            if !is_hex_with_len(selector, 8) {
                return Err(PolicyError::invalid_configuration(format!(
                    "'{selector}' is not a valid 4-byte function selector"
                )));
            }
        }

        Ok(())
    }

    /// Lowercases the contract and selector lists, for a policy read from
    /// user input rather than built with the `with_*` methods.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.blocked_contracts = lowercase_all(self.blocked_contracts);
        self.allowed_contracts = lowercase_all(self.allowed_contracts);
        self.blocked_functions = lowercase_all(self.blocked_functions);
        self
    }

    /// Builder method to set the per-transaction cap (decimal ETH).
    #[must_use]
    pub fn with_max_value_per_tx(mut self, eth: impl Into<String>) -> Self {
        self.max_value_per_tx = eth.into();
        self
    }

    /// Builder method to set the chain allowlist.
    #[must_use]
    pub fn with_allowed_chains(mut self, chains: Vec<u64>) -> Self {
        self.allowed_chains = chains;
        self
    }

    /// Builder method to set the blocked contracts (lowercased).
    #[must_use]
    pub fn with_blocked_contracts(mut self, addresses: Vec<String>) -> Self {
        self.blocked_contracts = lowercase_all(addresses);
        self
    }

    /// Builder method to set the allowed contracts (lowercased).
    #[must_use]
    pub fn with_allowed_contracts(mut self, addresses: Vec<String>) -> Self {
        self.allowed_contracts = lowercase_all(addresses);
        self
    }

    /// Builder method to set the blocked function selectors (lowercased).
    #[must_use]
    pub fn with_blocked_functions(mut self, selectors: Vec<String>) -> Self {
        self.blocked_functions = lowercase_all(selectors);
        self
    }

    /// Builder method to set the approval mode.
    #[must_use]
    pub const fn with_require_approval(mut self, mode: RequireApproval) -> Self {
        self.require_approval = mode;
        self
    }

    /// Builder method to set the approval threshold percentage.
    #[must_use]
    pub const fn with_approval_threshold_pct(mut self, pct: u8) -> Self {
        self.approval_threshold_pct = pct;
        self
    }
}

fn lowercase_all(values: Vec<String>) -> Vec<String> {
    values.into_iter().map(|v| v.to_lowercase()).collect()
}

fn contains_ignore_case(list: &[String], needle: &str) -> bool {
    list.iter().any(|item| item.eq_ignore_ascii_case(needle))
}

fn is_hex_with_len(value: &str, digits: usize) -> bool {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .is_some_and(|hex| hex.len() == digits && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

// ============================================================================
// TxRequest
// ============================================================================

/// The parts of a transaction the policy engine evaluates.
///
/// `to` and `data` are `0x`-prefixed hex strings; `value` is in wei and
/// defaults to zero when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRequest {
    /// Target chain id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,

    /// Recipient or called contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    /// Value transferred, in wei.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,

    /// Calldata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl TxRequest {
    /// Returns the value in wei, treating a missing value as zero.
    #[must_use]
    pub fn value_or_zero(&self) -> U256 {
        self.value.unwrap_or(U256::ZERO)
    }

    /// Returns the lowercased 4-byte selector (`0x` + 8 hex chars) if `data`
    /// is at least 10 characters long.
    ///
    /// # Examples
    ///
    /// ```
    /// use agentek_core::types::TxRequest;
    ///
    /// let tx = TxRequest {
    ///     data: Some("0x095EA7B3000000".to_string()),
    ///     ..Default::default()
    /// };
    /// assert_eq!(tx.selector().as_deref(), Some("0x095ea7b3"));
    ///
    /// let short = TxRequest { data: Some("0x1234".to_string()), ..Default::default() };
    /// assert!(short.selector().is_none());
    /// ```
    #[must_use]
    pub fn selector(&self) -> Option<String> {
        let data = self.data.as_deref()?;
        data.get(..10).map(str::to_lowercase)
    }
}

// ============================================================================
// PolicyDecision
// ============================================================================

/// The outcome of evaluating a request against a [`PolicyConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecision {
    /// Whether the request may proceed.
    pub allowed: bool,

    /// Whether the operator has to approve it first. Always false on denial.
    pub needs_approval: bool,

    /// Why the request was denied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PolicyDecision {
    /// An allowed decision.
    #[must_use]
    pub const fn allow(needs_approval: bool) -> Self {
        Self {
            allowed: true,
            needs_approval,
            reason: None,
        }
    }

    /// A denied decision carrying the reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            needs_approval: false,
            reason: Some(reason.into()),
        }
    }
}

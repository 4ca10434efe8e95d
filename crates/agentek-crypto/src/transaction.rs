//! Transaction requests as they arrive over JSON.
//!
//! JSON has no integer type wide enough for wei amounts, so every numeric
//! field accepts a JSON number, a decimal string or a `0x` hex string, and
//! is written back out as a decimal string.
//!
//! ```
//! use agentek_crypto::transaction::TransactionRequest;
//!
//! let tx: TransactionRequest = serde_json::from_str(r#"{
//!     "chainId": 8453,
//!     "to": "0x000000000000000000000000000000000000dEaD",
//!     "value": "1000000000000000000",
//!     "nonce": "0x7",
//!     "gas": 21000,
//!     "maxFeePerGas": "30000000000",
//!     "maxPriorityFeePerGas": "1000000000"
//! }"#).unwrap();
//!
//! assert_eq!(tx.nonce, Some(7));
//! assert_eq!(tx.policy_view().to.as_deref(), Some("0x000000000000000000000000000000000000dead"));
//! ```

use alloy_consensus::{SignableTransaction, TxEip1559, TxLegacy};
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use serde::{Deserialize, Serialize};

use agentek_core::error::SignError;
use agentek_core::types::TxRequest;

/// A transaction to sign, with every field optional until
/// [`build`](TransactionRequest::build) checks what the chosen type needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// Chain id; required for EIP-1559, optional (pre-EIP-155) for legacy.
    #[serde(default, with = "quantity::opt_u64", skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,

    /// Recipient; `None` deploys a contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,

    /// Value in wei.
    #[serde(default, with = "quantity::opt_u256", skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,

    /// Calldata.
    #[serde(default, alias = "input", skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,

    /// Sender nonce.
    #[serde(default, with = "quantity::opt_u64", skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,

    /// Gas limit.
    #[serde(default, alias = "gasLimit", with = "quantity::opt_u64", skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,

    /// Legacy gas price in wei.
    #[serde(default, with = "quantity::opt_u128", skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u128>,

    /// EIP-1559 fee cap in wei.
    #[serde(default, with = "quantity::opt_u128", skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<u128>,

    /// EIP-1559 priority fee in wei.
    #[serde(default, with = "quantity::opt_u128", skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<u128>,
}

/// A transaction ready for its signature hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsignedTransaction {
    /// Legacy transaction, EIP-155 protected when a chain id is present.
    Legacy(TxLegacy),
    /// EIP-1559 dynamic-fee transaction.
    Eip1559(TxEip1559),
}

impl UnsignedTransaction {
    /// The hash to sign.
    #[must_use]
    pub fn signature_hash(&self) -> B256 {
        match self {
            Self::Legacy(tx) => tx.signature_hash(),
            Self::Eip1559(tx) => tx.signature_hash(),
        }
    }
}

impl TransactionRequest {
    /// The fields the policy engine evaluates, with `to` and `data`
    /// rendered as lowercase `0x` hex.
    #[must_use]
    pub fn policy_view(&self) -> TxRequest {
        TxRequest {
            chain_id: self.chain_id,
            to: self.to.map(|to| format!("0x{}", hex::encode(to))),
            value: self.value,
            data: self
                .data
                .as_ref()
                .map(|data| format!("0x{}", hex::encode(data))),
        }
    }

    /// Build the unsigned transaction.
    ///
    /// `maxFeePerGas` selects EIP-1559; otherwise `gasPrice` selects legacy.
    ///
    /// # Errors
    ///
    /// Returns [`SignError::InvalidTransaction`] if `nonce`, `gas` or a fee
    /// field is missing, or an EIP-1559 request has no chain id.
    pub fn build(&self) -> Result<UnsignedTransaction, SignError> {
        let nonce = self
            .nonce
            .ok_or_else(|| SignError::invalid_transaction("nonce is required"))?;
        let gas_limit = self
            .gas
            .ok_or_else(|| SignError::invalid_transaction("gas is required"))?;
        let to = self.to.map_or(TxKind::Create, TxKind::Call);
        let value = self.value.unwrap_or(U256::ZERO);
        let input = self.data.clone().unwrap_or_default();

        if let Some(max_fee_per_gas) = self.max_fee_per_gas {
            let chain_id = self.chain_id.ok_or_else(|| {
                SignError::invalid_transaction("chainId is required for EIP-1559 transactions")
            })?;
            let max_priority_fee_per_gas = self.max_priority_fee_per_gas.unwrap_or(0);
            if max_priority_fee_per_gas > max_fee_per_gas {
                return Err(SignError::invalid_transaction(
                    "maxPriorityFeePerGas exceeds maxFeePerGas",
                ));
            }
            return Ok(UnsignedTransaction::Eip1559(TxEip1559 {
                chain_id,
                nonce,
                gas_limit,
                max_fee_per_gas,
                max_priority_fee_per_gas,
                to,
                value,
                access_list: Default::default(),
                input,
            }));
        }

        let gas_price = self.gas_price.ok_or_else(|| {
            SignError::invalid_transaction("either gasPrice or maxFeePerGas is required")
        })?;
        Ok(UnsignedTransaction::Legacy(TxLegacy {
            chain_id: self.chain_id,
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            input,
        }))
    }
}

/// Serde helpers for numbers that may arrive as JSON numbers, decimal
/// strings or hex strings.
pub mod quantity {
    use alloy_primitives::U256;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(u64),
        Text(String),
    }

    fn parse(repr: Repr) -> Result<U256, String> {
        match repr {
            Repr::Number(n) => Ok(U256::from(n)),
            Repr::Text(text) => {
                let text = text.trim();
                let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                    U256::from_str_radix(hex, 16)
                } else {
                    U256::from_str_radix(text, 10)
                };
                parsed.map_err(|e| format!("invalid quantity '{text}': {e}"))
            }
        }
    }

    fn deserialize_u256<'de, D: Deserializer<'de>>(d: D) -> Result<Option<U256>, D::Error> {
        Option::<Repr>::deserialize(d)?
            .map(parse)
            .transpose()
            .map_err(D::Error::custom)
    }

    /// `Option<U256>` as a decimal string.
    pub mod opt_u256 {
        use super::{deserialize_u256, Deserializer, Serializer, U256};

        /// Serialize as a decimal string.
        ///
        /// # Errors
        ///
        /// Propagates serializer errors.
        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(value: &Option<U256>, s: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => s.serialize_str(&v.to_string()),
                None => s.serialize_none(),
            }
        }

        /// Deserialize from a number, decimal string or hex string.
        ///
        /// # Errors
        ///
        /// Fails on anything else.
        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<U256>, D::Error> {
            deserialize_u256(d)
        }
    }

    /// `Option<u128>` as a decimal string.
    pub mod opt_u128 {
        use super::{deserialize_u256, Deserializer, Serializer};
        use serde::de::Error as _;

        /// Serialize as a decimal string.
        ///
        /// # Errors
        ///
        /// Propagates serializer errors.
        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(value: &Option<u128>, s: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => s.serialize_str(&v.to_string()),
                None => s.serialize_none(),
            }
        }

        /// Deserialize from a number, decimal string or hex string.
        ///
        /// # Errors
        ///
        /// Fails on anything else or on values above `u128::MAX`.
        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u128>, D::Error> {
            deserialize_u256(d)?
                .map(u128::try_from)
                .transpose()
                .map_err(|_| D::Error::custom("quantity does not fit in 128 bits"))
        }
    }

    /// `Option<u64>` as a decimal string.
    pub mod opt_u64 {
        use super::{deserialize_u256, Deserializer, Serializer};
        use serde::de::Error as _;

        /// Serialize as a decimal string.
        ///
        /// # Errors
        ///
        /// Propagates serializer errors.
        #[allow(clippy::ref_option, clippy::trivially_copy_pass_by_ref)]
        pub fn serialize<S: Serializer>(value: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => s.serialize_str(&v.to_string()),
                None => s.serialize_none(),
            }
        }

        /// Deserialize from a number, decimal string or hex string.
        ///
        /// # Errors
        ///
        /// Fails on anything else or on values above `u64::MAX`.
        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
            deserialize_u256(d)?
                .map(u64::try_from)
                .transpose()
                .map_err(|_| D::Error::custom("quantity does not fit in 64 bits"))
        }
    }
}

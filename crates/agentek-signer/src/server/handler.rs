//! Request dispatch.
//!
//! [`RequestHandler`] owns the signing key and the policy for the daemon's
//! lifetime. It turns one request line into one response; the socket layer
//! runs each call on its own task, so nothing in here serializes requests.

use std::sync::Arc;
use std::time::Duration;

use agentek_core::error::{AgentekError, SignError};
use agentek_crypto::{Account, DecryptedPayload, LocalAccount, Secp256k1KeyPair};
use agentek_policy::{DefaultPolicyEngine, PolicyEngine};
use alloy_primitives::Address;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{info, info_span, warn, Instrument};

use super::approval::{ApprovalRequest, Approver};
use super::daemon::DaemonError;
use super::protocol::{
    parse_request, JsonRpcError, JsonRpcRequest, JsonRpcResponse, Method, SignMessageParams,
    SignTransactionParams, SignTypedDataParams,
};
use crate::logging::{new_correlation_id, redact_sensitive};

/// Serves requests against one key and one policy.
pub struct RequestHandler {
    account: LocalAccount,
    engine: Box<dyn PolicyEngine>,
    approver: Arc<dyn Approver>,
    approval_timeout: Duration,
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler")
            .field("address", &self.account.address())
            .field("approval_timeout", &self.approval_timeout)
            .finish_non_exhaustive()
    }
}

impl RequestHandler {
    /// Take ownership of a decrypted payload.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Key`] if the key is not a valid secp256k1
    /// scalar and [`DaemonError::Policy`] if the policy does not validate.
    pub fn new(
        payload: DecryptedPayload,
        approver: Arc<dyn Approver>,
        approval_timeout: Duration,
    ) -> Result<Self, DaemonError> {
        let DecryptedPayload {
            private_key,
            policy,
        } = payload;
        let engine = DefaultPolicyEngine::new(policy)?;
        let keypair = Secp256k1KeyPair::from_secret_key(&private_key)?;

        Ok(Self {
            account: LocalAccount::new(keypair),
            engine: Box::new(engine),
            approver,
            approval_timeout,
        })
    }

    /// The address of the loaded key.
    #[must_use]
    pub fn address(&self) -> Address {
        self.account.address()
    }

    /// Handle one request line and produce its response.
    pub async fn handle_line(&self, line: &str) -> JsonRpcResponse {
        let request = match parse_request(line) {
            Ok(request) => request,
            Err(response) => {
                if let Some(error) = &response.error {
                    warn!(
                        code = error.code,
                        error = %redact_sensitive(&error.message),
                        "rejected malformed request"
                    );
                }
                return response;
            }
        };

        let span = info_span!(
            "request",
            method = %redact_sensitive(&request.method),
            id = %request.id,
            correlation_id = %new_correlation_id(),
        );

        async {
            match self.dispatch(&request).await {
                Ok(result) => {
                    info!("request completed");
                    JsonRpcResponse::success(request.id.clone(), result)
                }
                Err(error) => {
                    info!(code = error.code, error = %redact_sensitive(&error.message), "request failed");
                    JsonRpcResponse::error(request.id.clone(), error)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run a parsed request.
    ///
    /// # Errors
    ///
    /// Returns the JSON-RPC error to send back.
    pub async fn dispatch(&self, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        let method: Method = request
            .method
            .parse()
            .map_err(|_| JsonRpcError::method_not_found(&request.method))?;

        let result = match method {
            Method::Ping => return Ok(json!("pong")),
            Method::GetAddress => return Ok(json!(self.account.address().to_checksum(None))),
            Method::SignTransaction => self.sign_transaction(params(request)?).await,
            Method::SignMessage => self.sign_message(params(request)?).await,
            Method::SignTypedData => self.sign_typed_data(params(request)?).await,
        };
        result.map_err(|e| JsonRpcError::from(&e))
    }

    async fn sign_transaction(&self, params: SignTransactionParams) -> agentek_core::Result<Value> {
        let tx = params.transaction;
        let view = tx.policy_view();

        let decision = self.engine.check(&view);
        if !decision.allowed {
            return Err(AgentekError::policy_denied(decision.reason.unwrap_or_default()));
        }

        let unsigned = tx.build()?;

        if decision.needs_approval {
            self.approve(ApprovalRequest::Transaction {
                value: view.value_or_zero(),
                to: view.to,
                chain_id: view.chain_id,
            })
            .await?;
        }

        let signed = self.account.sign_unsigned(unsigned)?;
        Ok(json!(signed))
    }

    async fn sign_message(&self, params: SignMessageParams) -> agentek_core::Result<Value> {
        if self.engine.check_message().needs_approval {
            self.approve(ApprovalRequest::Message {
                preview: params.message.preview(),
            })
            .await?;
        }

        let signature = self.account.sign_message(&params.message).await?;
        Ok(json!(signature))
    }

    async fn sign_typed_data(&self, params: SignTypedDataParams) -> agentek_core::Result<Value> {
        let typed_data = params.typed_data;

        // Reject unhashable payloads before bothering the operator.
        typed_data
            .eip712_signing_hash()
            .map_err(|e| SignError::invalid_typed_data(e.to_string()))?;

        if self.engine.check_message().needs_approval {
            self.approve(ApprovalRequest::TypedData {
                primary_type: typed_data.primary_type.clone(),
            })
            .await?;
        }

        let signature = self.account.sign_typed_data(&typed_data).await?;
        Ok(json!(signature))
    }

    async fn approve(&self, request: ApprovalRequest) -> agentek_core::Result<()> {
        info!(timeout_secs = self.approval_timeout.as_secs(), "awaiting operator approval");
        let outcome = self
            .approver
            .request_approval(&request, self.approval_timeout)
            .await;

        if outcome.is_approved() {
            info!("operator approved");
            Ok(())
        } else {
            warn!(?outcome, "operator did not approve");
            Err(AgentekError::approval_denied(outcome.reason()))
        }
    }
}

fn params<T: DeserializeOwned>(request: &JsonRpcRequest) -> Result<T, JsonRpcError> {
    serde_json::from_value(request.params.clone())
        .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))
}

//! # EVM JSON-RPC Ledger Gateway
//!
//! Production gateway for KYC contracts deployed on an EVM-compatible chain.
//!
//! ## How It Works
//!
//! 1. Reads are `eth_call` against the target contract at the latest block.
//! 2. Writes are submitted with `eth_sendTransaction`. The RPC endpoint signs
//!    for the configured `from` address; this gateway holds no keys.
//! 3. After submission the gateway polls `eth_getTransactionReceipt` and
//!    `eth_blockNumber` until the configured confirmation depth is reached
//!    or the confirmation window closes.
//!
//! ## Failure mapping
//!
//! | Observation | Error |
//! |-------------|-------|
//! | connection refused, HTTP 5xx, malformed body | `Unreachable` |
//! | JSON-RPC error object, receipt status `0x0` | `Reverted` |
//! | send request timed out | `Timeout { tx_hash: None }` |
//! | no confirmation within the window | `Timeout { tx_hash: Some(..) }` |

use async_trait::async_trait;
use serde_json::{json, Value};

use kyc_core::{
    ContentHash, JurisdictionCode, RiskScore, SignerId, Timestamp, UserId, VerificationRecord,
    VerificationStatus,
};

use crate::abi::{self, Decoder, Token};
use crate::config::{ConfigError, EvmLedgerConfig};
use crate::contract::ContractId;
use crate::error::LedgerError;
use crate::gateway::LedgerGateway;
use crate::operation::{JurisdictionRuleSet, LedgerOperation, LedgerQuery, LedgerValue};
use crate::receipt::Receipt;

/// Ledger gateway over EVM JSON-RPC.
#[derive(Debug)]
pub struct EvmLedgerGateway {
    client: reqwest::Client,
    config: EvmLedgerConfig,
}

impl EvmLedgerGateway {
    /// Create a gateway from configuration.
    pub fn new(config: EvmLedgerConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.call_timeout())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// The configuration in use.
    pub fn config(&self) -> &EvmLedgerConfig {
        &self.config
    }

    /// Send a JSON-RPC request and return the `result` field.
    async fn rpc_call(
        &self,
        contract: ContractId,
        method: &str,
        params: Value,
    ) -> Result<Value, LedgerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let unavailable = |reason: String| LedgerError::Unreachable { contract, reason };

        let resp = self
            .client
            .post(self.config.rpc_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() && method == "eth_sendTransaction" {
                    LedgerError::Timeout {
                        contract,
                        tx_hash: None,
                    }
                } else {
                    unavailable(format!("{method}: {e}"))
                }
            })?;

        if !resp.status().is_success() {
            return Err(unavailable(format!("{method}: HTTP {}", resp.status())));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| unavailable(format!("{method}: invalid JSON response: {e}")))?;

        if let Some(error) = json.get("error") {
            let msg = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown RPC error");
            return Err(LedgerError::Reverted {
                contract,
                reason: msg.to_string(),
            });
        }

        json.get("result").cloned().ok_or_else(|| {
            LedgerError::Encoding(format!("{method}: JSON-RPC response missing 'result' field"))
        })
    }

    async fn eth_call(&self, contract: ContractId, data: Vec<u8>) -> Result<Vec<u8>, LedgerError> {
        let call = json!({
            "to": self.config.contracts.get(contract),
            "data": abi::to_hex_data(&data),
        });
        let result = self
            .rpc_call(contract, "eth_call", json!([call, "latest"]))
            .await?;
        let hex = result
            .as_str()
            .ok_or_else(|| LedgerError::Encoding("eth_call returned non-string result".into()))?;
        abi::from_hex_data(hex)
    }

    async fn block_number(&self, contract: ContractId) -> Result<u64, LedgerError> {
        let v = self
            .rpc_call(contract, "eth_blockNumber", json!([]))
            .await?;
        parse_quantity(&v)
    }

    /// Poll until the transaction is buried under the configured depth.
    async fn await_confirmation(
        &self,
        contract: ContractId,
        tx_hash: &str,
    ) -> Result<Receipt, LedgerError> {
        let deadline = tokio::time::Instant::now() + self.config.confirmation_timeout();
        loop {
            match self.poll_receipt(contract, tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(e @ LedgerError::Reverted { .. }) => return Err(e),
                Err(e) => tracing::debug!(%contract, tx_hash, "receipt poll failed: {e}"),
            }
            if tokio::time::Instant::now() + self.config.poll_interval() > deadline {
                return Err(LedgerError::Timeout {
                    contract,
                    tx_hash: Some(tx_hash.to_string()),
                });
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    async fn poll_receipt(
        &self,
        contract: ContractId,
        tx_hash: &str,
    ) -> Result<Option<Receipt>, LedgerError> {
        let receipt = self
            .rpc_call(contract, "eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        if receipt.is_null() {
            return Ok(None);
        }
        let block = receipt
            .get("blockNumber")
            .map(parse_quantity)
            .transpose()?
            .unwrap_or(0);
        let status = receipt.get("status").and_then(|s| s.as_str()).unwrap_or("0x0");
        if status == "0x0" {
            return Err(LedgerError::Reverted {
                contract,
                reason: format!("transaction {tx_hash} reverted in block {block}"),
            });
        }
        let head = self.block_number(contract).await?;
        if head.saturating_sub(block) + 1 < self.config.confirmations {
            return Ok(None);
        }
        Ok(Some(Receipt {
            contract,
            tx_hash: tx_hash.to_string(),
            block_number: block,
            confirmed_at: Timestamp::now(),
        }))
    }
}

#[async_trait]
impl LedgerGateway for EvmLedgerGateway {
    async fn read(&self, query: &LedgerQuery) -> Result<LedgerValue, LedgerError> {
        let contract = query.contract();
        let data = self.eth_call(contract, encode_query(query)).await?;
        decode_value(query, &data)
    }

    async fn write(&self, operation: &LedgerOperation) -> Result<Receipt, LedgerError> {
        let contract = operation.contract();
        let tx = json!({
            "from": self.config.from_address,
            "to": self.config.contracts.get(contract),
            "data": abi::to_hex_data(&encode_operation(operation)),
            "chainId": format!("0x{:x}", self.config.chain_id),
        });
        let result = self
            .rpc_call(contract, "eth_sendTransaction", json!([tx]))
            .await?;
        let tx_hash = result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LedgerError::Encoding("eth_sendTransaction returned non-string result".into()))?;
        tracing::debug!(
            %contract,
            function = operation.function_name(),
            tx_hash = %tx_hash,
            "transaction submitted"
        );
        self.await_confirmation(contract, &tx_hash).await
    }
}

fn parse_quantity(v: &Value) -> Result<u64, LedgerError> {
    v.as_str()
        .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
        .ok_or_else(|| LedgerError::Encoding(format!("invalid quantity {v}")))
}

fn address_token(bytes: [u8; 20]) -> Token {
    Token::Address(bytes)
}

/// Calldata for a write.
pub fn encode_operation(op: &LedgerOperation) -> Vec<u8> {
    match op {
        LedgerOperation::StoreKycData {
            subject,
            user_id,
            content_hash,
            risk_score,
            jurisdiction,
        } => abi::encode_call(
            "storeKycData(address,string,string,uint8,string)",
            &[
                address_token(subject.to_bytes()),
                Token::String(user_id.as_str().into()),
                Token::String(content_hash.as_str().into()),
                Token::Uint(u128::from(risk_score.value())),
                Token::String(jurisdiction.as_str().into()),
            ],
        ),
        LedgerOperation::UpdateKycStatus { subject, status } => abi::encode_call(
            "updateKycStatus(address,uint8)",
            &[
                address_token(subject.to_bytes()),
                Token::Uint(u128::from(status.status().code())),
            ],
        ),
        LedgerOperation::UpdateRiskScore {
            subject,
            risk_score,
        } => abi::encode_call(
            "updateRiskScore(address,uint8)",
            &[
                address_token(subject.to_bytes()),
                Token::Uint(u128::from(risk_score.value())),
            ],
        ),
        LedgerOperation::AppendAuditEntry(entry) => abi::encode_call(
            "appendEntry(bytes32,address,address,string,bytes32,string)",
            &[
                Token::Bytes32(entry.event_id.to_bytes32()),
                Token::Address(entry.actor),
                address_token(entry.subject.to_bytes()),
                Token::String(entry.action.as_str().into()),
                Token::Bytes32(entry.prior_state.map(|d| d.0).unwrap_or([0u8; 32])),
                Token::String(entry.outcome.as_str().into()),
            ],
        ),
        LedgerOperation::SetJurisdictionRules(rules) => abi::encode_call(
            "setJurisdictionRules(string,uint8,bool,bool,uint32)",
            &[
                Token::String(rules.jurisdiction.as_str().into()),
                Token::Uint(u128::from(rules.max_risk_score.value())),
                Token::Bool(rules.requires_documents),
                Token::Bool(rules.requires_active),
                Token::Uint(u128::from(rules.max_record_age_days.unwrap_or(0))),
            ],
        ),
        LedgerOperation::AddSigner { signer } => {
            abi::encode_call("addSigner(address)", &[address_token(signer.to_bytes())])
        }
        LedgerOperation::RemoveSigner { signer } => {
            abi::encode_call("removeSigner(address)", &[address_token(signer.to_bytes())])
        }
        LedgerOperation::SetThreshold { threshold } => abi::encode_call(
            "setThreshold(uint8)",
            &[Token::Uint(u128::from(threshold.get()))],
        ),
    }
}

/// Calldata for a read.
pub fn encode_query(query: &LedgerQuery) -> Vec<u8> {
    match query {
        LedgerQuery::GetVerification { subject } => {
            abi::encode_call("getKycData(address)", &[address_token(subject.to_bytes())])
        }
        LedgerQuery::AuditEntryExists { event_id } => abi::encode_call(
            "entryExists(bytes32)",
            &[Token::Bytes32(event_id.to_bytes32())],
        ),
        LedgerQuery::GetJurisdictionRules { jurisdiction } => abi::encode_call(
            "getJurisdictionRules(string)",
            &[Token::String(jurisdiction.as_str().into())],
        ),
        LedgerQuery::GetSigners => abi::encode_call("getSigners()", &[]),
        LedgerQuery::GetThreshold => abi::encode_call("threshold()", &[]),
    }
}

fn invalid(what: &str, e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Encoding(format!("contract returned invalid {what}: {e}"))
}

/// Decode `eth_call` return data for `query`.
pub fn decode_value(query: &LedgerQuery, data: &[u8]) -> Result<LedgerValue, LedgerError> {
    let d = Decoder::new(data);
    match query {
        LedgerQuery::GetVerification { subject } => {
            // (bool exists, string userId, string contentHash, uint8 riskScore,
            //  string jurisdiction, uint8 status, uint64 updatedAt)
            if !d.bool(0)? {
                return Ok(LedgerValue::Verification(None));
            }
            let status_code = d.uint8(5)?;
            let updated = i64::try_from(d.uint(6)?).map_err(|e| invalid("timestamp", e))?;
            let record = VerificationRecord {
                subject: subject.clone(),
                user_id: UserId::new(&d.string(1)?).map_err(|e| invalid("user id", e))?,
                content_hash: ContentHash::new(&d.string(2)?)
                    .map_err(|e| invalid("content hash", e))?,
                risk_score: RiskScore::new(u32::from(d.uint8(3)?))
                    .map_err(|e| invalid("risk score", e))?,
                jurisdiction: JurisdictionCode::new(&d.string(4)?)
                    .map_err(|e| invalid("jurisdiction", e))?,
                status: VerificationStatus::from_code(status_code)
                    .ok_or_else(|| invalid("status", status_code))?,
                updated_at: Timestamp::from_unix_secs(updated)
                    .ok_or_else(|| invalid("timestamp", updated))?,
            };
            Ok(LedgerValue::Verification(Some(record)))
        }
        LedgerQuery::AuditEntryExists { .. } => Ok(LedgerValue::Flag(d.bool(0)?)),
        LedgerQuery::GetJurisdictionRules { jurisdiction } => {
            // (bool supported, uint8 maxRisk, bool requiresDocuments,
            //  bool requiresActive, uint32 maxRecordAgeDays)
            if !d.bool(0)? {
                return Ok(LedgerValue::Rules(None));
            }
            let max_age = u32::try_from(d.uint(4)?).map_err(|e| invalid("max record age", e))?;
            Ok(LedgerValue::Rules(Some(JurisdictionRuleSet {
                jurisdiction: jurisdiction.clone(),
                max_risk_score: RiskScore::new(u32::from(d.uint8(1)?))
                    .map_err(|e| invalid("max risk score", e))?,
                requires_documents: d.bool(2)?,
                requires_active: d.bool(3)?,
                max_record_age_days: (max_age > 0).then_some(max_age),
            })))
        }
        LedgerQuery::GetSigners => {
            let signers = d
                .address_array(0)?
                .into_iter()
                .map(|a| {
                    SignerId::new(&format!("0x{}", hex::encode(a))).map_err(|e| invalid("signer", e))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(LedgerValue::Signers(signers))
        }
        LedgerQuery::GetThreshold => Ok(LedgerValue::Threshold(d.uint8(0)?)),
    }
}

//! Shared types for the crawl pipeline.

use serde::{Deserialize, Serialize};

use crate::abi::AbiHandle;

// ─── TrackedContract ──────────────────────────────────────────────────────────

/// A smart contract the engine crawls: its ABI, bound addresses and the
/// event names worth extracting.
#[derive(Debug, Clone)]
pub struct TrackedContract {
    /// Contract name as used in the configuration.
    pub name: String,
    /// ABI handle; its name is the checkpoint key.
    pub abi: AbiHandle,
    /// Addresses the contract is deployed at, crawled in order.
    pub addresses: Vec<String>,
    /// Event identifiers (first topic, UTF-8) to extract.
    pub tracked_events: Vec<String>,
}

impl TrackedContract {
    pub fn new(
        name: impl Into<String>,
        abi: AbiHandle,
        addresses: Vec<String>,
        tracked_events: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            abi,
            addresses,
            tracked_events,
        }
    }

    /// Key under which the checkpoint for this contract is stored.
    pub fn entity_key(&self) -> &str {
        &self.abi.name
    }
}

// ─── Ledger API payloads ─────────────────────────────────────────────────────

/// Status value the API reports for executed transactions.
pub const STATUS_SUCCESS: &str = "success";

/// Transfer type of a smart-contract result (callback of another transaction).
pub const TYPE_SMART_CONTRACT_RESULT: &str = "SmartContractResult";

/// One row of `GET /accounts/{address}/transfers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    #[serde(rename = "txHash")]
    pub tx_hash: String,
    #[serde(rename = "originalTxHash", default, skip_serializing_if = "Option::is_none")]
    pub original_tx_hash: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl TransferSummary {
    /// Hash the row's events should be attributed to, or `None` if the
    /// transfer did not succeed.
    ///
    /// Smart-contract results resolve to their originating transaction.
    pub fn root_hash(&self) -> Option<&str> {
        if self.status != STATUS_SUCCESS {
            return None;
        }
        match self.kind.as_deref() {
            Some(TYPE_SMART_CONTRACT_RESULT) => self.original_tx_hash.as_deref(),
            _ => Some(&self.tx_hash),
        }
    }
}

/// `GET /transactions/{hash}` response, reduced to what extraction needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionDetail {
    #[serde(rename = "txHash", default)]
    pub tx_hash: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<TransactionLogs>,
}

/// The `logs` object of a transaction detail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionLogs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<LogEvent>>,
}

/// A single log entry emitted during execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Base64-encoded topics; `topics[0]` names the event.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Base64-encoded payload, absent for identification-only entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u64>,
}

// ─── TransactionBatch ────────────────────────────────────────────────────────

/// Hashes discovered in one listing window.
///
/// `scanned` counts every ledger entry the window covered, including failed
/// transactions that contributed no hash. Checkpoints advance by `scanned`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionBatch {
    pub hashes: Vec<String>,
    pub scanned: u64,
}

impl TransactionBatch {
    /// Build a batch from one listing page.
    ///
    /// Duplicate root hashes are collapsed, keeping the first occurrence.
    pub fn from_transfers(transfers: &[TransferSummary]) -> Self {
        let mut hashes: Vec<String> = Vec::with_capacity(transfers.len());
        for hash in transfers.iter().filter_map(TransferSummary::root_hash) {
            if !hashes.iter().any(|h| h == hash) {
                hashes.push(hash.to_string());
            }
        }
        Self {
            hashes,
            scanned: transfers.len() as u64,
        }
    }
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// A tracked log entry extracted from a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// `{tx_hash}_{order}`, unique per transaction and log position.
    pub id: String,
    pub tx_hash: String,
    /// Unix timestamp (seconds) of the transaction.
    pub timestamp: i64,
    /// Address that emitted the entry.
    pub source_address: String,
    /// Base64 topics, kept opaque and in order.
    pub topics: Vec<String>,
    /// Decoded payload bytes.
    pub data: Vec<u8>,
    /// `topics[0]` decoded as UTF-8.
    pub event_name: String,
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(hash: &str, status: &str, kind: Option<&str>, original: Option<&str>) -> TransferSummary {
        TransferSummary {
            tx_hash: hash.into(),
            original_tx_hash: original.map(Into::into),
            status: status.into(),
            kind: kind.map(Into::into),
        }
    }

    #[test]
    fn failed_transfers_have_no_root_hash() {
        assert_eq!(transfer("a", "fail", None, None).root_hash(), None);
        assert_eq!(transfer("a", "pending", None, None).root_hash(), None);
        assert_eq!(transfer("a", "success", Some("Transaction"), None).root_hash(), Some("a"));
    }

    #[test]
    fn smart_contract_result_resolves_to_original() {
        let scr = transfer("scr", "success", Some("SmartContractResult"), Some("root"));
        assert_eq!(scr.root_hash(), Some("root"));

        let orphan = transfer("scr", "success", Some("SmartContractResult"), None);
        assert_eq!(orphan.root_hash(), None);
    }

    #[test]
    fn batch_counts_failed_entries() {
        let page = vec![
            transfer("a", "success", None, None),
            transfer("b", "fail", None, None),
            transfer("c", "success", Some("SmartContractResult"), Some("a")),
            transfer("d", "success", None, None),
        ];
        let batch = TransactionBatch::from_transfers(&page);
        assert_eq!(batch.hashes, vec!["a".to_string(), "d".to_string()]);
        assert_eq!(batch.scanned, 4);
    }

    #[test]
    fn transfer_summary_parses_api_json() {
        let json = serde_json::json!([
            { "txHash": "h1", "status": "success", "type": "Transaction" },
            { "txHash": "h2", "originalTxHash": "h1", "status": "success", "type": "SmartContractResult" },
            { "txHash": "h3", "status": "fail" }
        ]);
        let rows: Vec<TransferSummary> = serde_json::from_value(json).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].root_hash(), Some("h1"));
        assert_eq!(rows[2].kind, None);
    }

    #[test]
    fn detail_without_logs_parses() {
        let detail: TransactionDetail =
            serde_json::from_value(serde_json::json!({ "txHash": "h", "timestamp": 1700000000 }))
                .unwrap();
        assert!(detail.logs.is_none());
        assert_eq!(detail.timestamp, 1_700_000_000);
    }
}

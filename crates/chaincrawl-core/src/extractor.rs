//! Event extraction: maps a transaction's log payload to tracked events.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::types::{Event, LogEvent, TransactionDetail};

/// Extracts the events named in a fixed tracking set.
///
/// Extraction is pure: the same detail always yields the same events.
#[derive(Debug, Clone, Default)]
pub struct EventExtractor {
    tracked: HashSet<String>,
}

impl EventExtractor {
    pub fn new<I, S>(tracking_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tracked: tracking_names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.tracked.contains(name)
    }

    /// Extract the tracked events of one transaction.
    ///
    /// Returns `None` when the transaction carries no log events at all,
    /// and `Some(vec![])` when it has logs but none are tracked.
    pub fn extract(&self, detail: &TransactionDetail) -> Option<Vec<Event>> {
        let entries = detail.logs.as_ref()?.events.as_ref()?;

        let events = entries
            .iter()
            .enumerate()
            .filter_map(|(position, entry)| {
                let name = self.tracked_name(entry)?;
                let data = entry.data.as_deref()?;
                let data = match BASE64.decode(data) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(
                            tx_hash = %detail.tx_hash,
                            event = %name,
                            error = %e,
                            "dropping event with malformed payload"
                        );
                        return None;
                    }
                };
                let order = entry.order.unwrap_or(position as u64);
                Some(Event {
                    id: format!("{}_{}", detail.tx_hash, order),
                    tx_hash: detail.tx_hash.clone(),
                    timestamp: detail.timestamp,
                    source_address: entry.address.clone(),
                    topics: entry.topics.clone(),
                    data,
                    event_name: name,
                })
            })
            .collect();

        Some(events)
    }

    /// Decoded first topic, if it names a tracked event.
    fn tracked_name(&self, entry: &LogEvent) -> Option<String> {
        let first = entry.topics.first()?;
        let bytes = BASE64.decode(first).ok()?;
        let name = String::from_utf8(bytes).ok()?;
        self.is_tracked(&name).then_some(name)
    }
}

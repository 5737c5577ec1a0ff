//! Broadcast: one body, many recipients, independent outcomes.

use serde::ser::{Serialize, SerializeStruct, Serializer};
use thiserror::Error;
use tracing::info;

use crate::address::{AddressError, normalize};
use crate::dispatch::{DispatchError, Dispatcher};

/// Why one recipient of a broadcast was not sent to.
#[derive(Debug, Error)]
pub enum BroadcastFailure {
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Debug)]
pub enum BroadcastOutcome {
    Sent,
    Failed(BroadcastFailure),
}

/// Outcome for one input recipient.
///
/// `target` is the canonical address when the input normalized, otherwise
/// the raw input.
#[derive(Debug)]
pub struct BroadcastEntry {
    pub target: String,
    pub outcome: BroadcastOutcome,
}

impl BroadcastEntry {
    pub fn is_sent(&self) -> bool {
        matches!(self.outcome, BroadcastOutcome::Sent)
    }
}

impl Serialize for BroadcastEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.outcome {
            BroadcastOutcome::Sent => {
                let mut s = serializer.serialize_struct("BroadcastEntry", 2)?;
                s.serialize_field("target", &self.target)?;
                s.serialize_field("status", "sent")?;
                s.end()
            }
            BroadcastOutcome::Failed(failure) => {
                let mut s = serializer.serialize_struct("BroadcastEntry", 3)?;
                s.serialize_field("target", &self.target)?;
                s.serialize_field("status", "failed")?;
                s.serialize_field("error", &failure.to_string())?;
                s.end()
            }
        }
    }
}

/// Send `body` to each raw target in order, one at a time.
///
/// Never stops early: the result has one entry per input, in input order.
pub async fn broadcast<S: AsRef<str>>(
    dispatcher: &Dispatcher,
    raw_targets: &[S],
    body: &str,
) -> Vec<BroadcastEntry> {
    let mut results = Vec::with_capacity(raw_targets.len());

    for raw in raw_targets {
        let raw = raw.as_ref();
        let entry = match normalize(raw) {
            Err(e) => BroadcastEntry {
                target: raw.to_string(),
                outcome: BroadcastOutcome::Failed(e.into()),
            },
            Ok(address) => match dispatcher.dispatch(&address, body).await {
                Ok(sent) => BroadcastEntry {
                    target: sent.into_string(),
                    outcome: BroadcastOutcome::Sent,
                },
                Err(e) => BroadcastEntry {
                    target: address.into_string(),
                    outcome: BroadcastOutcome::Failed(e.into()),
                },
            },
        };
        results.push(entry);
    }

    let sent = results.iter().filter(|e| e.is_sent()).count();
    info!(
        total = results.len(),
        sent,
        failed = results.len() - sent,
        "Broadcast finished"
    );
    results
}

//! Local research-result store.
//!
//! An ordered, append-only list of research results held in memory. Nothing
//! is persisted: results disappear on exit or when the app reloads.

pub mod data_provider;

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Address, keccak256};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const SIMULATED_TOPIC: &str = "Drug Discovery - Phase 1";
/// Agent recorded when a simulation runs without a connected wallet.
pub const SIMULATED_AGENT_FALLBACK: &str = "0xSimulatedAgentAddress";

/// Accuracy percentage, always within `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Accuracy(u8);

impl Accuracy {
    pub const MAX: u8 = 100;

    pub fn new(percent: u8) -> Option<Self> {
        (percent <= Self::MAX).then_some(Self(percent))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Accuracy {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("accuracy {value} is above 100"))
    }
}

impl From<Accuracy> for u8 {
    fn from(value: Accuracy) -> Self {
        value.0
    }
}

impl std::fmt::Display for Accuracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored research result. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResult {
    pub id: u64,
    pub topic: String,
    pub result_hash: String,
    pub accuracy: Accuracy,
    pub agent_address: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything but the id, which the store assigns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResearchResult {
    pub topic: String,
    pub result_hash: String,
    pub accuracy: Accuracy,
    pub agent_address: String,
    pub timestamp: DateTime<Utc>,
}

impl NewResearchResult {
    /// Fabricate the outcome of a simulated research run.
    pub fn simulated(agent: Option<Address>) -> Self {
        Self::simulated_at(agent, Utc::now(), &mut rand::thread_rng())
    }

    pub fn simulated_at<R: Rng + ?Sized>(
        agent: Option<Address>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Self {
        let seed = format!("SimulatedResult_{}", now.timestamp_millis());
        let accuracy = Accuracy(rng.gen_range(80..=99));
        Self {
            topic: SIMULATED_TOPIC.to_string(),
            result_hash: keccak256(seed.as_bytes()).to_string(),
            accuracy,
            agent_address: agent
                .map(|a| a.to_string())
                .unwrap_or_else(|| SIMULATED_AGENT_FALLBACK.to_string()),
            timestamp: now,
        }
    }
}

#[derive(Debug, Default)]
pub struct ResultStore {
    results: RwLock<Vec<ResearchResult>>,
    next_id: AtomicU64,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the end and return the stored record.
    ///
    /// Ids keep increasing across [`clear`](Self::clear), so they are unique
    /// for the life of the process.
    pub fn append(&self, result: NewResearchResult) -> ResearchResult {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let stored = ResearchResult {
            id,
            topic: result.topic,
            result_hash: result.result_hash,
            accuracy: result.accuracy,
            agent_address: result.agent_address,
            timestamp: result.timestamp,
        };
        self.results
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(stored.clone());
        tracing::debug!(id, topic = %stored.topic, "Stored research result");
        stored
    }

    /// Current results in insertion order.
    pub fn list_all(&self) -> Vec<ResearchResult> {
        self.results
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn get(&self, id: u64) -> Option<ResearchResult> {
        self.results
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn latest(&self) -> Option<ResearchResult> {
        self.results
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.results.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every result; used when the app reloads.
    pub fn clear(&self) {
        self.results
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn example() -> NewResearchResult {
        NewResearchResult {
            topic: "Drug Discovery - Phase 1".to_string(),
            result_hash: "0xabc".to_string(),
            accuracy: Accuracy::new(92).expect("valid"),
            agent_address: "0xdef".to_string(),
            timestamp: "2024-01-01T00:00:00Z".parse().expect("timestamp"),
        }
    }

    #[test]
    fn append_then_list_returns_the_record() {
        let store = ResultStore::new();
        let stored = store.append(example());

        let all = store.list_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], stored);
        assert_eq!(all[0].topic, "Drug Discovery - Phase 1");
        assert_eq!(all[0].accuracy.get(), 92);
        assert_eq!(all[0].result_hash, "0xabc");
        assert_eq!(all[0].agent_address, "0xdef");
        assert_eq!(all[0].timestamp.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn append_grows_by_one_and_keeps_prior_entries() {
        let store = ResultStore::new();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            let before = store.list_all();
            store.append(NewResearchResult::simulated_at(None, Utc::now(), &mut rng));
            let after = store.list_all();
            assert_eq!(after.len(), before.len() + 1);
            assert_eq!(&after[..before.len()], before.as_slice());
        }
    }

    #[test]
    fn ids_stay_unique_across_clear() {
        let store = ResultStore::new();
        let first = store.append(example());
        store.clear();
        assert!(store.is_empty());
        let second = store.append(example());
        assert!(second.id > first.id);
        assert_eq!(store.get(second.id), Some(second));
        assert!(store.get(first.id).is_none());
    }

    #[test]
    fn simulated_results_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let now: DateTime<Utc> = "2024-05-01T12:00:00Z".parse().expect("timestamp");
        for _ in 0..200 {
            let result = NewResearchResult::simulated_at(None, now, &mut rng);
            assert!((80..=99).contains(&result.accuracy.get()));
            assert_eq!(result.agent_address, SIMULATED_AGENT_FALLBACK);
            assert_eq!(result.topic, SIMULATED_TOPIC);
        }

        let expected = keccak256(format!("SimulatedResult_{}", now.timestamp_millis()));
        let agent = Address::repeat_byte(0xab);
        let result = NewResearchResult::simulated_at(Some(agent), now, &mut rng);
        assert_eq!(result.result_hash, expected.to_string());
        assert_eq!(result.agent_address, agent.to_string());
    }

    #[test]
    fn accuracy_rejects_values_above_100() {
        assert!(Accuracy::new(101).is_none());
        assert!(serde_json::from_str::<Accuracy>("150").is_err());
        assert_eq!(serde_json::from_str::<Accuracy>("100").expect("ok").get(), 100);
    }
}

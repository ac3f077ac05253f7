//! Tally of replica responses for one quorum read.

use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};

use crate::error::{QuorumError, QuorumResult};

type Fields = BTreeMap<String, Box<RawValue>>;

/// Counts identical replica bodies and remembers the current winner.
///
/// Bodies are compared by fingerprint: SHA-256 over each raw field value
/// followed by `:`, keys in lexicographic order. Field order and the keys
/// themselves do not affect the fingerprint.
#[derive(Debug, Default)]
pub struct ConsensusMap {
    threshold: usize,
    counts: HashMap<String, usize>,
    max_consensus: usize,
    win_map: Option<Fields>,
    win_info: Option<String>,
    win_error: Option<String>,
    responses: usize,
}

impl ConsensusMap {
    /// `threshold` is the agreement count at which the read may stop
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    /// Record one replica answer.
    ///
    /// A non-200 status only records the body as the last error. A 200 body
    /// that is not a JSON object is rejected and leaves the tally untouched.
    pub fn add(&mut self, status_code: u16, body: &str) -> QuorumResult<()> {
        self.responses += 1;

        if status_code != 200 {
            self.win_error = Some(body.to_string());
            return Ok(());
        }

        let fields: Fields =
            serde_json::from_str(body).map_err(|e| QuorumError::Decode(e.to_string()))?;
        let fingerprint = Self::fingerprint(&fields);

        let count = self.counts.entry(fingerprint).or_insert(0);
        *count += 1;

        // Strictly greater: on a tie the body that got there first keeps the win.
        if *count > self.max_consensus {
            self.max_consensus = *count;
            self.win_map = Some(fields);
            self.win_info = Some(body.to_string());
        }
        Ok(())
    }

    /// Fingerprint of a parsed body
    pub fn fingerprint(fields: &BTreeMap<String, Box<RawValue>>) -> String {
        let mut hasher = Sha256::new();
        for value in fields.values() {
            hasher.update(value.get().as_bytes());
            hasher.update(b":");
        }
        hex::encode(hasher.finalize())
    }

    /// Raw JSON of `name` in the winning body
    pub fn value(&self, name: &str) -> Option<&RawValue> {
        self.win_map.as_ref()?.get(name).map(|v| &**v)
    }

    /// Decode `name` from the winning body. `Ok(None)` when it is absent.
    pub fn decode_value<T: DeserializeOwned>(&self, name: &str) -> QuorumResult<Option<T>> {
        match self.value(name) {
            Some(raw) => serde_json::from_str(raw.get())
                .map(Some)
                .map_err(|e| QuorumError::Decode(format!("field {}: {}", name, e))),
            None => Ok(None),
        }
    }

    /// Highest number of identical bodies seen
    pub fn max_consensus(&self) -> usize {
        self.max_consensus
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn is_reached(&self) -> bool {
        self.max_consensus >= self.threshold
    }

    /// Raw winning body
    pub fn win_info(&self) -> Option<&str> {
        self.win_info.as_deref()
    }

    /// Body of the most recent non-200 answer
    pub fn win_error(&self) -> Option<&str> {
        self.win_error.as_deref()
    }

    /// Answers fed in so far, decode failures and errors included
    pub fn responses(&self) -> usize {
        self.responses
    }

    /// Agreement as a percentage of `replicas`
    pub fn rate(&self, replicas: usize) -> f32 {
        if replicas == 0 {
            return 0.0;
        }
        self.max_consensus as f32 * 100.0 / replicas as f32
    }
}

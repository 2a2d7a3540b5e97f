use serde::{Deserialize, Serialize};
use std::fmt;

/// Decision identifier: instrument plus a lane-local sequence number.
///
/// Deterministic across replays of the same data, so decision sequences
/// from two runs can be compared byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DecisionId(pub String);

impl DecisionId {
    pub fn new(instrument: &str, seq: u64) -> Self {
        Self(format!("{instrument}-{seq:06}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Version tag of a prediction model. Monotonic within one model store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelVersion(pub u64);

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Content hash of a dataset (candles + OI snapshots) fed to a replay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHash(pub String);

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash of the engine configuration used for a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigHash(pub String);

impl fmt::Display for ConfigHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a replay: which data, which config, which model.
///
/// Two runs with the same fingerprint must produce the same decision digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunFingerprint {
    pub config: ConfigHash,
    pub dataset: DatasetHash,
    pub model_version: ModelVersion,
}

impl RunFingerprint {
    pub fn hash(&self) -> String {
        let canonical = serde_json::json!({
            "config": &self.config.0,
            "dataset": &self.dataset.0,
            "model_version": self.model_version.0,
        });
        blake3::hash(canonical.to_string().as_bytes())
            .to_hex()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_id_is_zero_padded() {
        assert_eq!(DecisionId::new("NIFTY", 42).as_str(), "NIFTY-000042");
    }

    #[test]
    fn fingerprint_hash_is_stable_and_sensitive() {
        let a = RunFingerprint {
            config: ConfigHash("c".into()),
            dataset: DatasetHash("d".into()),
            model_version: ModelVersion(1),
        };
        let mut b = a.clone();
        assert_eq!(a.hash(), b.hash());
        b.model_version = ModelVersion(2);
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
    }
}

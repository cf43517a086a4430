use serde::{Deserialize, Serialize};

use crate::protocol::JobId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCount {
    pub key: String,
    pub value: u64,
}

impl From<(String, u64)> for KeyCount {
    fn from((key, value): (String, u64)) -> Self {
        Self { key, value }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResults {
    pub job_id: JobId,
    /// Artefacto final con todas las claves ordenadas
    pub final_results: String,
    pub unique_keys: usize,
    pub top: Vec<KeyCount>,
}

/// Ordena de mayor a menor valor. El sort es estable: los empates
/// conservan el orden de inserción.
pub fn rank_by_value(entries: &mut [(String, u64)]) {
    entries.sort_by(|a, b| b.1.cmp(&a.1));
}

use crate::app::MapReduceApp;

const TRIMMED_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':'];

/// WordCount: emite (palabra, 1) y suma los conteos.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCount;

/// Minúsculas, separa por espacios y recorta puntuación de los extremos.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|raw| raw.to_lowercase())
        .map(|w| w.trim_matches(TRIMMED_PUNCTUATION).to_string())
        .filter(|w| !w.is_empty())
}

impl MapReduceApp for WordCount {
    fn name(&self) -> &str {
        "wordcount"
    }

    fn map(&self, input: &str) -> Vec<(String, u64)> {
        tokenize(input).map(|w| (w, 1)).collect()
    }

    fn reduce(&self, _key: &str, values: &[u64]) -> u64 {
        values.iter().sum()
    }
}

use fnv::FnvHasher;
use std::hash::Hasher;

/// Hash FNV-1a de 64 bits sobre los bytes UTF-8 de la clave.
///
/// A diferencia de `DefaultHasher` (SipHash con semilla aleatoria por
/// proceso), el resultado es el mismo en cualquier worker y en cualquier
/// ejecución, así que todos mandan la misma clave al mismo reducer.
pub fn stable_hash(key: &str) -> u64 {
    let mut h = FnvHasher::default();
    h.write(key.as_bytes());
    h.finish()
}

/// Reducer al que pertenece `key`: `stable_hash(key) % num_reducers`.
/// Siempre devuelve un índice en `[0, num_reducers)`.
pub fn partition(key: &str, num_reducers: u32) -> u32 {
    let n = u64::from(num_reducers.max(1));
    (stable_hash(key) % n) as u32
}

/// Funciones de usuario que ejecutan los workers.
///
/// `map` recibe una unidad de entrada completa y devuelve pares
/// (clave, valor); `reduce` recibe todos los valores de una clave y
/// devuelve el agregado.
pub trait MapReduceApp: Send + Sync {
    fn name(&self) -> &str;

    fn map(&self, input: &str) -> Vec<(String, u64)>;

    fn reduce(&self, key: &str, values: &[u64]) -> u64;
}

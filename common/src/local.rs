use std::collections::HashMap;

use crate::app::MapReduceApp;
use crate::results::rank_by_value;

/// MapReduce en un solo proceso y en memoria: map -> shuffle -> reduce.
///
/// Sirve para correr un job chico sin master ni workers y como referencia
/// para comparar la salida distribuida. El resultado sale ordenado por
/// valor descendente (empates por clave).
pub fn run_local<A, I>(app: &A, inputs: I) -> Vec<(String, u64)>
where
    A: MapReduceApp + ?Sized,
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    // map
    let mut mapped: Vec<(String, u64)> = Vec::new();
    for input in inputs {
        mapped.extend(app.map(input.as_ref()));
    }

    // shuffle
    let mut grouped: HashMap<String, Vec<u64>> = HashMap::new();
    for (key, value) in mapped {
        grouped.entry(key).or_default().push(value);
    }

    // reduce
    let mut out: Vec<(String, u64)> = grouped
        .into_iter()
        .map(|(key, values)| {
            let agg = app.reduce(&key, &values);
            (key, agg)
        })
        .collect();

    out.sort_by(|a, b| a.0.cmp(&b.0));
    rank_by_value(&mut out);
    out
}

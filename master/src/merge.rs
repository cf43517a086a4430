// master/src/merge.rs

use common::{paths::final_results_file, records, results::rank_by_value};
use std::{
    io,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub final_results: PathBuf,
    pub unique_keys: usize,
    pub top: Vec<(String, u64)>,
}

/// Junta las salidas de los reducers en `final_results.txt`, ordenado de
/// mayor a menor valor.
///
/// Cada clave vive en un solo reducer, así que no hay nada que sumar:
/// alcanza con concatenar y ordenar. Archivos faltantes o líneas mal
/// formadas se saltean con un warning.
pub fn merge_outputs(
    outputs: &[PathBuf],
    output_dir: &Path,
    top_n: usize,
) -> io::Result<MergeSummary> {
    let mut entries: Vec<(String, u64)> = Vec::new();

    for path in outputs {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("salida de reduce {} no existe; se omite", path.display());
                continue;
            }
            Err(e) => {
                warn!("no se pudo leer {}: {}; se omite", path.display(), e);
                continue;
            }
        };

        for (lineno, line) in content.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            match records::parse_record(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    "{}:{} línea inválida ({}); se omite",
                    path.display(),
                    lineno + 1,
                    e
                ),
            }
        }
    }

    rank_by_value(&mut entries);

    let final_path = final_results_file(output_dir);
    records::write_records_file(&final_path, entries.iter().map(|(k, v)| (k.as_str(), *v)))?;

    let summary = MergeSummary {
        final_results: final_path,
        unique_keys: entries.len(),
        top: entries.into_iter().take(top_n).collect(),
    };

    info!(
        "merge listo: {} claves únicas -> {}",
        summary.unique_keys,
        summary.final_results.display()
    );
    Ok(summary)
}

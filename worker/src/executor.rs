//! Ejecución de tareas map y reduce sobre el filesystem compartido.
//!
//! Todo es bloqueante (std::fs); el handler HTTP lo corre con
//! `spawn_blocking`.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    io,
    path::Path,
};

use common::{
    partition, paths, records, MapReduceApp, MapTaskRequest, ReduceTaskRequest, ReducerId,
};

fn with_path(e: io::Error, what: &str, path: &Path) -> io::Error {
    io::Error::new(e.kind(), format!("{} {}: {}", what, path.display(), e))
}

/// Map: lee la entrada completa, aplica `app.map`, reparte por reducer y
/// escribe un archivo por cada reducer que recibió al menos un par.
///
/// Devuelve reducer -> archivos producidos.
pub fn run_map(
    app: &dyn MapReduceApp,
    req: &MapTaskRequest,
    intermediate_dir: &Path,
) -> io::Result<BTreeMap<ReducerId, Vec<String>>> {
    if req.num_reducers == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("tarea {} con num_reducers = 0", req.task_id),
        ));
    }

    let input_path = Path::new(&req.input_file);
    let text = fs::read_to_string(input_path).map_err(|e| with_path(e, "leyendo", input_path))?;

    let mapped = app.map(&text);

    let mut buckets: BTreeMap<ReducerId, Vec<(String, u64)>> = BTreeMap::new();
    for (key, value) in mapped {
        let reducer = partition(&key, req.num_reducers);
        buckets.entry(reducer).or_default().push((key, value));
    }

    let mut produced: BTreeMap<ReducerId, Vec<String>> = BTreeMap::new();
    for (reducer, entries) in buckets {
        let path = paths::intermediate_file(intermediate_dir, req.task_num, reducer);
        records::write_records_file(&path, entries.iter().map(|(k, v)| (k.as_str(), *v)))
            .map_err(|e| with_path(e, "escribiendo", &path))?;

        produced
            .entry(reducer)
            .or_default()
            .push(path.to_string_lossy().to_string());
    }

    Ok(produced)
}

/// Reduce: agrupa todos los valores por clave leyendo cada archivo de la
/// lista, aplica `app.reduce` una vez por clave y escribe un único archivo
/// de salida (vacío si no hubo archivos de entrada).
///
/// Devuelve la ruta del archivo de salida.
pub fn run_reduce(
    app: &dyn MapReduceApp,
    req: &ReduceTaskRequest,
    output_dir: &Path,
) -> io::Result<String> {
    let mut grouped: HashMap<String, Vec<u64>> = HashMap::new();

    for file in &req.input_files {
        // el error ya trae la ruta
        let entries = records::read_records_file(Path::new(file))?;
        for (key, value) in entries {
            grouped.entry(key).or_default().push(value);
        }
    }

    // determinista: ordenar por clave
    let mut reduced: Vec<(String, u64)> = grouped
        .into_iter()
        .map(|(key, values)| {
            let agg = app.reduce(&key, &values);
            (key, agg)
        })
        .collect();
    reduced.sort_by(|a, b| a.0.cmp(&b.0));

    let out_path = paths::reduce_output_file(output_dir, req.reducer_id);
    records::write_records_file(&out_path, reduced.iter().map(|(k, v)| (k.as_str(), *v)))
        .map_err(|e| with_path(e, "escribiendo", &out_path))?;

    Ok(out_path.to_string_lossy().to_string())
}

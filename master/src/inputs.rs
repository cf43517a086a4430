// master/src/inputs.rs

use anyhow::{bail, Context, Result};
use common::paths::chunk_file;
use glob::glob;
use std::{fs, path::Path};
use tracing::info;

pub const SAMPLE_CHUNKS: usize = 6;
const SAMPLE_SENTENCE: &str = "the quick brown fox jumps over the lazy dog ";
const SAMPLE_REPEAT: usize = 100;

/// Expande las entradas del CLI (rutas o patrones glob) a archivos
/// concretos. Sin entradas genera los chunks de ejemplo en `chunks_dir`.
/// Un patrón que no matchea nada es error.
pub fn resolve_inputs(patterns: &[String], chunks_dir: &Path) -> Result<Vec<String>> {
    if patterns.is_empty() {
        return generate_sample_chunks(chunks_dir, SAMPLE_CHUNKS);
    }

    let mut files = Vec::new();
    for pattern in patterns {
        let mut matched: Vec<String> = glob(pattern)
            .with_context(|| format!("patrón inválido: {pattern}"))?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .map(|path| path.to_string_lossy().to_string())
            .collect();

        if matched.is_empty() {
            bail!("ningún archivo coincide con {pattern}");
        }
        matched.sort();
        files.extend(matched);
    }

    info!("{} archivos de entrada", files.len());
    Ok(files)
}

/// Escribe `count` chunks de texto; el chunk i repite la frase
/// `100 * (i + 1)` veces.
pub fn generate_sample_chunks(dir: &Path, count: usize) -> Result<Vec<String>> {
    fs::create_dir_all(dir).with_context(|| format!("no se pudo crear {}", dir.display()))?;

    let mut files = Vec::with_capacity(count);
    for i in 0..count {
        let path = chunk_file(dir, i);
        fs::write(&path, SAMPLE_SENTENCE.repeat(SAMPLE_REPEAT * (i + 1)))
            .with_context(|| format!("no se pudo escribir {}", path.display()))?;
        files.push(path.to_string_lossy().to_string());
    }

    info!("generados {} chunks de ejemplo en {}", count, dir.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, path::PathBuf};

    fn temp_dir(sub: &str) -> PathBuf {
        let dir = env::temp_dir().join("mapreduce-master-inputs").join(sub);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn sin_entradas_genera_chunks_de_ejemplo() {
        let dir = temp_dir("sample").join("chunks");

        let files = resolve_inputs(&[], &dir).unwrap();

        assert_eq!(files.len(), SAMPLE_CHUNKS);
        let first = fs::read_to_string(&files[0]).unwrap();
        let last = fs::read_to_string(&files[5]).unwrap();
        assert_eq!(first.split_whitespace().count(), 9 * 100);
        assert_eq!(last.split_whitespace().count(), 9 * 600);
    }

    #[test]
    fn glob_expande_ordenado() {
        let dir = temp_dir("glob");
        fs::write(dir.join("b.txt"), "b").unwrap();
        fs::write(dir.join("a.txt"), "a").unwrap();
        fs::write(dir.join("c.log"), "c").unwrap();

        let pattern = dir.join("*.txt").to_string_lossy().to_string();
        let files = resolve_inputs(&[pattern], &dir).unwrap();

        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.txt"));
        assert!(files[1].ends_with("b.txt"));
    }

    #[test]
    fn patron_sin_coincidencias_es_error() {
        let dir = temp_dir("nomatch");
        let pattern = dir.join("nada-*.txt").to_string_lossy().to_string();
        assert!(resolve_inputs(&[pattern], &dir).is_err());
    }
}

use std::path::{Path, PathBuf};

pub const FINAL_RESULTS_FILE: &str = "final_results.txt";

/// `<dir>/map-<task_num>-reduce-<reducer_id>.txt`: único por (tarea, reducer).
pub fn intermediate_file(dir: &Path, task_num: u32, reducer_id: u32) -> PathBuf {
    dir.join(format!("map-{}-reduce-{}.txt", task_num, reducer_id))
}

/// `<dir>/reduce-<reducer_id>.txt`
pub fn reduce_output_file(dir: &Path, reducer_id: u32) -> PathBuf {
    dir.join(format!("reduce-{}.txt", reducer_id))
}

pub fn final_results_file(dir: &Path) -> PathBuf {
    dir.join(FINAL_RESULTS_FILE)
}

pub fn chunk_file(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("chunk-{}.txt", index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nombres_siguen_el_layout_esperado() {
        let dir = Path::new("data/intermediate");
        assert_eq!(
            intermediate_file(dir, 3, 1),
            PathBuf::from("data/intermediate/map-3-reduce-1.txt")
        );
        assert_eq!(
            reduce_output_file(Path::new("data/output"), 2),
            PathBuf::from("data/output/reduce-2.txt")
        );
        assert_eq!(
            final_results_file(Path::new("data/output")),
            PathBuf::from("data/output/final_results.txt")
        );
    }
}

use common::{local::run_local, records::read_records_file, JobPhase, MapReduceApp, WordCount};
use master::{build_router, config::MasterConfig, run_job, AppState};
use std::{collections::BTreeMap, env, fs, path::PathBuf, sync::Arc, time::Duration};
use tokio::{net::TcpListener, time::timeout};
use worker::config::WorkerConfig;

const JOB_TIMEOUT: Duration = Duration::from_secs(60);

fn temp_dir(sub: &str) -> PathBuf {
    let dir = env::temp_dir().join("mapreduce-job-flow").join(sub);
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_inputs(dir: &PathBuf, texts: &[&str]) -> Vec<String> {
    let inputs = dir.join("inputs");
    fs::create_dir_all(&inputs).unwrap();
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let path = inputs.join(format!("input-{}.txt", i));
            fs::write(&path, text).unwrap();
            path.to_string_lossy().to_string()
        })
        .collect()
}

// Master + N workers en el mismo proceso, todos sobre la misma carpeta de datos
async fn start_cluster(data_dir: &PathBuf, workers: u32, reducers: u32) -> AppState {
    start_cluster_with(data_dir, workers, reducers, Arc::new(WordCount), Duration::from_secs(30)).await
}

async fn start_cluster_with(
    data_dir: &PathBuf,
    workers: u32,
    reducers: u32,
    app: Arc<dyn MapReduceApp>,
    dispatch_timeout: Duration,
) -> AppState {
    let mut cfg = MasterConfig::new(data_dir.clone(), reducers, workers as usize);
    cfg.dispatch_stagger = Duration::from_millis(5);
    cfg.dispatch_timeout = dispatch_timeout;
    let state = AppState::new(cfg);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let master_url = format!("http://{}", listener.local_addr().unwrap());
    let router = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    for id in 0..workers {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cfg = WorkerConfig::new(id, &master_url, data_dir.clone());
        let app = app.clone();
        tokio::spawn(async move {
            worker::run(cfg, listener, app, std::future::pending())
                .await
                .unwrap();
        });
    }

    state
}

// WordCount con un map lento
struct SlowWordCount(Duration);

impl MapReduceApp for SlowWordCount {
    fn name(&self) -> &str {
        "slow-wordcount"
    }

    fn map(&self, input: &str) -> Vec<(String, u64)> {
        std::thread::sleep(self.0);
        WordCount.map(input)
    }

    fn reduce(&self, key: &str, values: &[u64]) -> u64 {
        WordCount.reduce(key, values)
    }
}

fn as_map(entries: Vec<(String, u64)>) -> BTreeMap<String, u64> {
    entries.into_iter().collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wordcount_distribuido_de_punta_a_punta() {
    let data = temp_dir("e2e_basico");
    let inputs = write_inputs(&data, &["the cat sat", "the dog sat"]);
    let state = start_cluster(&data, 3, 2).await;

    let phase = timeout(JOB_TIMEOUT, run_job(state.clone(), inputs))
        .await
        .unwrap();
    assert_eq!(phase, JobPhase::Done);

    let results = state.coordinator.results().unwrap();
    assert_eq!(results.unique_keys, 4);

    let final_entries = read_records_file(&PathBuf::from(&results.final_results)).unwrap();
    let values: Vec<u64> = final_entries.iter().map(|(_, v)| *v).collect();
    assert_eq!(values, vec![2, 2, 1, 1]);

    let mut top_two: Vec<&str> = final_entries[..2].iter().map(|(k, _)| k.as_str()).collect();
    top_two.sort();
    assert_eq!(top_two, vec!["sat", "the"]);

    let status = state.coordinator.status();
    assert_eq!(status.map_progress, "2/2");
    assert_eq!(status.reduce_progress, "2/2");
    assert!(status.failures.is_empty());
    assert!(status.finished_at.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reducers_sin_claves_igual_terminan() {
    let data = temp_dir("e2e_reducers_vacios");
    let inputs = write_inputs(&data, &["a b", "b a"]);
    let state = start_cluster(&data, 2, 8).await;

    let phase = timeout(JOB_TIMEOUT, run_job(state.clone(), inputs))
        .await
        .unwrap();
    assert_eq!(phase, JobPhase::Done);

    // 8 reducers y sólo 2 claves: la mayoría no recibe archivos pero escribe su salida
    for r in 0..8 {
        let out = data.join("output").join(format!("reduce-{}.txt", r));
        assert!(out.exists(), "falta {}", out.display());
    }

    let results = state.coordinator.results().unwrap();
    assert_eq!(results.unique_keys, 2);
    assert!(results.top.iter().all(|kc| kc.value == 2));
    assert_eq!(state.coordinator.status().reduce_progress, "8/8");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distribuido_coincide_con_local() {
    let texts = [
        "It was the best of times, it was the worst of times;",
        "it was the age of wisdom, it was the age of foolishness!",
        "It was the epoch of belief. It was the epoch of incredulity?",
        "it was the season of Light, it was the season of Darkness:",
        "",
    ];
    let data = temp_dir("e2e_vs_local");
    let inputs = write_inputs(&data, &texts);
    let state = start_cluster(&data, 3, 4).await;

    let phase = timeout(JOB_TIMEOUT, run_job(state.clone(), inputs))
        .await
        .unwrap();
    assert_eq!(phase, JobPhase::Done);

    let results = state.coordinator.results().unwrap();
    let distributed = read_records_file(&PathBuf::from(&results.final_results)).unwrap();
    let expected = run_local(&WordCount, texts);

    // el orden entre empates depende del reducer; comparamos por clave
    assert_eq!(as_map(distributed.clone()), as_map(expected));

    let values: Vec<u64> = distributed.iter().map(|(_, v)| *v).collect();
    let mut sorted = values.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(values, sorted);

    // cada clave aparece en la salida de un solo reducer
    let mut seen = BTreeMap::new();
    for r in 0..4 {
        let out = data.join("output").join(format!("reduce-{}.txt", r));
        for (key, _) in read_records_file(&out).unwrap() {
            assert!(seen.insert(key.clone(), r).is_none(), "{} en dos reducers", key);
        }
    }
    assert_eq!(seen.len(), results.unique_keys);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn entrada_inexistente_falla_el_job() {
    let data = temp_dir("e2e_falla");
    let mut inputs = write_inputs(&data, &["the cat sat"]);
    inputs.push(data.join("no-existe.txt").to_string_lossy().to_string());
    let state = start_cluster(&data, 2, 2).await;

    let phase = timeout(JOB_TIMEOUT, run_job(state.clone(), inputs))
        .await
        .unwrap();
    assert_eq!(phase, JobPhase::Failed);

    let status = state.coordinator.status();
    assert_eq!(status.phase, JobPhase::Failed);
    assert_eq!(status.failures.len(), 1);
    assert_eq!(status.failures[0].task_id, "map-1");
    assert!(status.failures[0].reason.contains("no-existe.txt"));
    assert!(state.coordinator.results().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tareas_en_cola_en_el_worker_no_vencen_el_timeout() {
    let data = temp_dir("e2e_cola");
    let inputs = write_inputs(&data, &["the cat sat", "the dog sat"]);

    // un solo worker con un slot: map-1 espera ~0.7s detrás de map-0 y
    // el total supera el timeout de despacho
    let app = Arc::new(SlowWordCount(Duration::from_millis(700)));
    let state = start_cluster_with(&data, 1, 1, app, Duration::from_secs(1)).await;

    let phase = timeout(JOB_TIMEOUT, run_job(state.clone(), inputs))
        .await
        .unwrap();
    assert_eq!(phase, JobPhase::Done);

    let status = state.coordinator.status();
    assert_eq!(status.map_progress, "2/2");
    assert!(status.failures.is_empty());
    assert_eq!(state.coordinator.results().unwrap().unique_keys, 4);
}

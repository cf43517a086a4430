use anyhow::{bail, Result};
use clap::Parser;
use std::{env, path::PathBuf, time::Duration};

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_NUM_REDUCERS: u32 = 4;
pub const DEFAULT_MIN_WORKERS: usize = 3;
const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 300;
const DEFAULT_DISPATCH_STAGGER_MS: u64 = 100;
const DEFAULT_TOP_N: usize = 10;

#[derive(Parser, Debug)]
#[command(name = "master")]
#[command(about = "Master de MapReduce: registra workers y coordina map -> reduce -> merge")]
pub struct MasterArgs {
    /// Archivos (o patrones glob) de entrada; sin entradas se generan chunks de ejemplo
    #[arg(value_name = "INPUT")]
    pub inputs: Vec<String>,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Cantidad de reducers (R), fija para todo el job
    #[arg(long, default_value_t = DEFAULT_NUM_REDUCERS)]
    pub reducers: u32,

    /// Workers que tienen que registrarse antes de arrancar
    #[arg(long, default_value_t = DEFAULT_MIN_WORKERS)]
    pub min_workers: usize,

    /// Carpeta base de datos (por defecto DATA_DIR o ./data)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub host: String,
    pub port: u16,
    pub num_reducers: u32,
    pub min_workers: usize,
    pub data_dir: PathBuf,
    /// Timeout de cada POST /map o /reduce a un worker
    pub dispatch_timeout: Duration,
    /// Pausa entre despachos consecutivos
    pub dispatch_stagger: Duration,
    pub top_n: usize,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.parse::<T>().ok())
}

impl MasterConfig {
    pub fn new(data_dir: PathBuf, num_reducers: u32, min_workers: usize) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            num_reducers,
            min_workers,
            data_dir,
            dispatch_timeout: Duration::from_secs(DEFAULT_DISPATCH_TIMEOUT_SECS),
            dispatch_stagger: Duration::from_millis(DEFAULT_DISPATCH_STAGGER_MS),
            top_n: DEFAULT_TOP_N,
        }
    }

    pub fn from_args(args: &MasterArgs) -> Result<Self> {
        let data_dir = args
            .data_dir
            .clone()
            .or_else(|| env::var("DATA_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("data"));

        let mut cfg = Self::new(data_dir, args.reducers, args.min_workers);
        cfg.host = args.host.clone();
        cfg.port = args.port;

        if let Some(secs) = env_parse::<u64>("DISPATCH_TIMEOUT_SECS") {
            cfg.dispatch_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("DISPATCH_STAGGER_MS") {
            cfg.dispatch_stagger = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<usize>("TOP_N") {
            cfg.top_n = n;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_reducers == 0 {
            bail!("la cantidad de reducers tiene que ser al menos 1");
        }
        if self.min_workers == 0 {
            bail!("min_workers tiene que ser al menos 1");
        }
        Ok(())
    }

    pub fn intermediate_dir(&self) -> PathBuf {
        self.data_dir.join("intermediate")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.data_dir.join("chunks")
    }
}

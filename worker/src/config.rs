use clap::Parser;
use std::{env, path::PathBuf, time::Duration};

use common::WorkerId;

pub const DEFAULT_MASTER_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_WORKER_CONCURRENCY: usize = 1;
const DEFAULT_MASTER_TIMEOUT_SECS: u64 = 30;

#[derive(Parser, Debug)]
#[command(name = "worker")]
#[command(about = "Worker de MapReduce: ejecuta tareas map/reduce que le manda el master")]
pub struct WorkerArgs {
    /// Id numérico del worker
    #[arg(value_name = "WORKER_ID")]
    pub worker_id: WorkerId,

    /// Puerto donde escucha tareas
    #[arg(value_name = "PORT")]
    pub port: u16,

    /// URL del master (por defecto MASTER_URL o http://127.0.0.1:5000)
    #[arg(long)]
    pub master: Option<String>,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// URL que se anuncia al master, ej: http://worker-1:5001
    /// (hace falta si se escucha en 0.0.0.0)
    #[arg(long)]
    pub advertise: Option<String>,

    /// Carpeta base de datos (por defecto DATA_DIR o ./data)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: WorkerId,
    pub host: String,
    pub port: u16,
    pub master_url: String,
    /// Dirección anunciada al registrarse; sin ella se arma con host:puerto
    pub advertise_url: Option<String>,
    pub intermediate_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Tareas ejecutándose a la vez en este worker
    pub concurrency: usize,
    /// Timeout de los requests hacia el master
    pub master_timeout: Duration,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.parse::<T>().ok())
}

impl WorkerConfig {
    pub fn new(worker_id: WorkerId, master_url: &str, data_dir: PathBuf) -> Self {
        Self {
            worker_id,
            host: "127.0.0.1".to_string(),
            port: 0,
            master_url: master_url.trim_end_matches('/').to_string(),
            advertise_url: None,
            intermediate_dir: data_dir.join("intermediate"),
            output_dir: data_dir.join("output"),
            concurrency: DEFAULT_WORKER_CONCURRENCY,
            master_timeout: Duration::from_secs(DEFAULT_MASTER_TIMEOUT_SECS),
        }
    }

    pub fn from_args(args: WorkerArgs) -> Self {
        let master_url = args
            .master
            .or_else(|| env::var("MASTER_URL").ok())
            .unwrap_or_else(|| DEFAULT_MASTER_URL.to_string());

        let data_dir = args
            .data_dir
            .or_else(|| env::var("DATA_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("data"));

        let mut cfg = Self::new(args.worker_id, &master_url, data_dir);
        cfg.host = args.host;
        cfg.advertise_url = args.advertise.map(|url| url.trim_end_matches('/').to_string());
        cfg.port = args.port;
        cfg.concurrency = env_parse::<usize>("WORKER_CONCURRENCY")
            .unwrap_or(DEFAULT_WORKER_CONCURRENCY)
            .max(1);
        if let Some(secs) = env_parse::<u64>("MASTER_TIMEOUT_SECS") {
            cfg.master_timeout = Duration::from_secs(secs);
        }
        cfg
    }

    /// URL base con la que el master llega a este worker. Con `--advertise`
    /// se usa tal cual; si se escucha en una dirección comodín (0.0.0.0, ::)
    /// se anuncia el hostname.
    pub fn advertised_address(&self, port: u16, hostname: Option<&str>) -> String {
        if let Some(url) = &self.advertise_url {
            return url.clone();
        }

        let wildcard = self
            .host
            .parse::<std::net::IpAddr>()
            .map(|ip| ip.is_unspecified())
            .unwrap_or(false);
        let host = match hostname {
            Some(h) if wildcard => h,
            _ => self.host.as_str(),
        };
        format!("http://{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_posicionales_y_defaults() {
        let args = WorkerArgs::parse_from(["worker", "2", "5003", "--master", "http://m:5000/"]);
        let cfg = WorkerConfig::from_args(args);

        assert_eq!(cfg.worker_id, 2);
        assert_eq!(cfg.port, 5003);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.master_url, "http://m:5000");
        assert!(cfg.concurrency >= 1);
    }

    #[test]
    fn data_dir_define_subcarpetas() {
        let cfg = WorkerConfig::new(0, DEFAULT_MASTER_URL, PathBuf::from("/tmp/mr"));
        assert_eq!(cfg.intermediate_dir, PathBuf::from("/tmp/mr/intermediate"));
        assert_eq!(cfg.output_dir, PathBuf::from("/tmp/mr/output"));
    }

    #[test]
    fn direccion_anunciada() {
        let mut cfg = WorkerConfig::new(0, DEFAULT_MASTER_URL, PathBuf::from("data"));
        assert_eq!(cfg.advertised_address(5001, Some("nodo-1")), "http://127.0.0.1:5001");

        cfg.host = "0.0.0.0".to_string();
        assert_eq!(cfg.advertised_address(5001, Some("nodo-1")), "http://nodo-1:5001");

        let args = WorkerArgs::parse_from([
            "worker",
            "1",
            "5001",
            "--host",
            "0.0.0.0",
            "--advertise",
            "http://worker-1:5001/",
        ]);
        let cfg = WorkerConfig::from_args(args);
        assert_eq!(cfg.advertised_address(5001, Some("nodo-1")), "http://worker-1:5001");
    }
}

pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod inputs;
pub mod job;
pub mod merge;
pub mod scheduler;
pub mod state;

pub use handlers::build_router;
pub use job::run_job;
pub use state::AppState;

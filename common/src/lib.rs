pub mod app;
pub mod local;
pub mod partition;
pub mod paths;
pub mod protocol;
pub mod records;
pub mod results;
pub mod wordcount;

pub use app::MapReduceApp;
pub use partition::{partition, stable_hash};
pub use protocol::*;
pub use results::{JobResults, KeyCount};
pub use wordcount::WordCount;

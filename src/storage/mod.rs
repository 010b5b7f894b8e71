pub mod dir;
pub mod dotenv;
pub mod file;

pub use dir::{process_env, scan_env_files};
pub use file::write_atomic;

//! Data persistence for scans and temperature logs.

pub mod storage;

pub use storage::{next_scan_number, scan_file_path, write_matrix, write_metadata};

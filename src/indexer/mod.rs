pub mod code_parser;
pub mod scanner;

pub use scanner::{ScanReport, Scanner, scan};

pub mod alarm;
pub mod completions;
pub mod config;
pub mod next;
pub mod session;
pub mod simulate;
pub mod status;

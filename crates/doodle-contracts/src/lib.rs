pub mod config;
pub mod intent;
pub mod program;
pub mod ratelimit;
pub mod speech;
pub mod style;
pub mod trace;
pub mod transcript;

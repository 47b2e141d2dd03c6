pub mod chaos;
pub mod config;
pub mod formula;
pub mod launcher;
pub mod logging;
pub mod retry;

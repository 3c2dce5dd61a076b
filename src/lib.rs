pub mod cli;
pub mod clients;
pub mod descriptor;
pub mod entity;
pub mod format;
pub mod logging;
pub mod pattern;
pub mod provider;

mod app;
mod commands;
pub mod config;

pub use app::App;
pub use config::Config;

// Disable colors for all tests to get clean output
#[cfg(test)]
#[ctor::ctor]
fn init_tests() {
    colored::control::set_override(false);
}

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod protocol;
pub mod repositories;
pub mod services;
pub mod utils;

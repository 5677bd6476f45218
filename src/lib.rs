pub mod app_state;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod repositories;
pub mod services;

#[cfg(test)]
pub mod test_utils;

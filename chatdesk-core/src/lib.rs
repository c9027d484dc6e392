// src/lib.rs

pub mod db;
pub mod repositories;
pub mod eventbus;
pub mod services;
pub mod tasks;
pub mod test_utils;

pub use db::Database;
pub use chatdesk_common::error::Error;
pub use chatdesk_common::models;

//! PostgreSQL repositories for the Advisor reports platform.

pub mod db;

pub use db::*;

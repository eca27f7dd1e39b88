// File: convobot-core/src/lib.rs

pub mod config;
pub mod db;
pub mod repositories;
pub mod runtime;
pub mod services;
pub mod sync;
pub mod test_utils;

pub use config::CoreConfig;
pub use convobot_common::error::Error;
pub use db::Database;
pub use runtime::{Collaborators, CoreRuntime};

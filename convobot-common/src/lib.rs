// File: convobot-common/src/lib.rs

pub mod error;
pub mod models;
pub mod traits;
pub mod validate;

pub use error::Error;

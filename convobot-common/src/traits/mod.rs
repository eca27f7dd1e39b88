// File: convobot-common/src/traits/mod.rs
pub mod collaborator_traits;
pub mod repository_traits;

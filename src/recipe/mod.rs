//! Recipe parsing, validation, and canonical re-emission.

pub mod catalog;
pub mod emitter;
pub mod loader;
pub mod validator;

pub use catalog::RecipeCatalog;
pub use emitter::emit_recipe;
pub use loader::{load_recipe_str, LoaderError};
pub use validator::validate_recipe;

//! Recipe discovery from a flat directory of YAML files.
//!
//! Generalizes the teacher's `recipes.rs` three-tier resolution (explicit
//! path / project directory / bundled default), which only ever resolved a
//! fixed pair of recipe names, into discovery over an arbitrary directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::Recipe;
use crate::recipe::loader::{load_recipe_str, LoaderError};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("recipes directory {0:?} does not exist or is not readable")]
    UnreadableDirectory(PathBuf),
    #[error("failed to read recipe file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load recipe file {path:?}: {source}")]
    Loader {
        path: PathBuf,
        #[source]
        source: LoaderError,
    },
    #[error("recipe {id:?} not found in catalog (known: {known:?})")]
    NotFound { id: String, known: Vec<String> },
}

/// All recipes found under a directory, keyed by catalog key.
///
/// The catalog key is the recipe's own `id` field when present, otherwise
/// the file stem. Files are read in filename-sorted order so catalog
/// iteration is deterministic.
pub struct RecipeCatalog {
    recipes: HashMap<String, Recipe>,
    /// Catalog keys in the filename-sorted order they were discovered.
    order: Vec<String>,
}

impl RecipeCatalog {
    /// Scans `dir` for `*.yaml`/`*.yml` files and loads each as a recipe.
    /// Does not validate the recipes; callers should run
    /// [`crate::recipe::validate_recipe`] before executing one.
    pub fn load_from_dir(dir: &Path) -> Result<Self, CatalogError> {
        if !dir.is_dir() {
            return Err(CatalogError::UnreadableDirectory(dir.to_path_buf()));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|source| CatalogError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|ext| ext.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        paths.sort();

        let mut recipes = HashMap::with_capacity(paths.len());
        let mut order = Vec::with_capacity(paths.len());

        for path in paths {
            let content = std::fs::read_to_string(&path).map_err(|source| CatalogError::Io {
                path: path.clone(),
                source,
            })?;
            let recipe = load_recipe_str(&content).map_err(|source| CatalogError::Loader {
                path: path.clone(),
                source,
            })?;
            let key = if recipe.id.is_empty() {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string()
            } else {
                recipe.id.clone()
            };
            order.push(key.clone());
            recipes.insert(key, recipe);
        }

        Ok(Self { recipes, order })
    }

    pub fn get(&self, id: &str) -> Result<&Recipe, CatalogError> {
        self.recipes.get(id).ok_or_else(|| CatalogError::NotFound {
            id: id.to_string(),
            known: self.order.clone(),
        })
    }

    /// Catalog keys in filename-sorted discovery order.
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

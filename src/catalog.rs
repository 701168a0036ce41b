//! Model asset discovery and lookup.
//!
//! Assets live under one canonical root per asset type plus any number of
//! user-configured extra roots. Scans are non-recursive, invalid candidates
//! are filtered out silently, and a root that fails to scan is skipped
//! rather than aborting the whole listing.

use std::collections::HashSet;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{keys, Settings};
use crate::error::Result;
use crate::session::SessionContext;

/// File extension shared by single-file model assets.
pub const MODEL_FILE_EXT: &str = "ckpt";

/// Single-file primary assets at or below this size are rejected as
/// truncated or incompatible downloads.
pub const MIN_PRIMARY_MODEL_BYTES: u64 = 2_010_000_000;

/// Immediate subdirectories a directory-based asset must contain.
pub const REQUIRED_COMPONENT_DIRS: [&str; 5] =
    ["unet", "text_encoder", "vae_decoder", "vae_encoder", "tokenizer"];

/// Which directory layout and validation rule applies to an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetType {
    Primary,
    Vae,
}

impl AssetType {
    /// Settings key holding the extra search roots for this type.
    pub fn custom_dirs_key(self) -> &'static str {
        match self {
            AssetType::Primary => keys::CUSTOM_MODEL_DIRS_PRIMARY,
            AssetType::Vae => keys::CUSTOM_MODEL_DIRS_VAE,
        }
    }
}

/// Supported backend variants, each with its own asset layout rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Implementation {
    InvokeAi,
    OptimizedSd,
    DiffusersOnnx,
}

impl Implementation {
    /// Whether assets for this variant are directories rather than files.
    pub fn is_directory_based(self) -> bool {
        matches!(self, Implementation::DiffusersOnnx)
    }

    /// Translate the UI option index into a variant. Out-of-range indices
    /// fall back to the default variant.
    pub fn from_option_index(index: i64) -> Self {
        match index {
            1 => Implementation::OptimizedSd,
            2 => Implementation::DiffusersOnnx,
            _ => Implementation::InvokeAi,
        }
    }
}

/// One on-disk asset. Constructed fresh on every enumeration; two models
/// with the same locator are the same asset regardless of other fields.
/// Serializable so the presentation layer can render listings directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Display name, unique within one listing.
    pub name: String,
    /// File path for single-file assets, directory path otherwise.
    pub locator: PathBuf,
    /// Size in bytes; single-file assets only.
    pub size: Option<u64>,
    /// Backend variants this asset is valid for.
    pub supported_implementations: Vec<Implementation>,
}

impl Model {
    fn from_file(path: PathBuf, size: u64) -> Self {
        let name = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            locator: path,
            size: Some(size),
            supported_implementations: vec![Implementation::InvokeAi, Implementation::OptimizedSd],
        }
    }

    fn from_directory(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            locator: path,
            size: None,
            supported_implementations: vec![Implementation::DiffusersOnnx],
        }
    }

    /// Whether this asset is usable with the given backend variant.
    pub fn supports(&self, implementation: Implementation) -> bool {
        self.supported_implementations.contains(&implementation)
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.locator == other.locator
    }
}

impl Eq for Model {}

impl Hash for Model {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.locator.hash(state);
    }
}

/// Outcome of resolving the user's configured model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSelection {
    /// The configured model exists in the catalog.
    Found(Model),
    /// A name is configured but no matching asset was found.
    Missing(String),
    /// No model name has been configured yet.
    Unset,
}

/// Whether a primary model file passes the minimum-size check. The boundary
/// is exclusive: a file of exactly `MIN_PRIMARY_MODEL_BYTES` is rejected.
pub fn model_filesize_valid(size: u64, asset_type: AssetType) -> bool {
    match asset_type {
        AssetType::Primary => size > MIN_PRIMARY_MODEL_BYTES,
        AssetType::Vae => true,
    }
}

/// Enumerates and resolves model assets across the configured search roots.
pub struct ModelCatalog {
    session: SessionContext,
    settings: Settings,
}

impl ModelCatalog {
    pub fn new(session: SessionContext, settings: Settings) -> Self {
        Self { session, settings }
    }

    /// List all valid assets for an (asset type, implementation) pair,
    /// de-duplicated by locator and sorted ascending by name.
    pub fn list_models(
        &self,
        asset_type: AssetType,
        implementation: Implementation,
    ) -> Result<Vec<Model>> {
        let mut roots = vec![self.session.models_dir(asset_type)?];
        roots.extend(
            self.settings
                .string_list(asset_type.custom_dirs_key())
                .into_iter()
                .map(PathBuf::from),
        );

        let mut models = Vec::new();
        for root in &roots {
            let scanned = if implementation.is_directory_based() {
                scan_directory_assets(root)
            } else {
                scan_file_assets(root, asset_type, self.size_validation_enabled())
            };

            match scanned {
                Ok(found) => models.extend(found),
                Err(e) => log::warn!("Skipping model root {:?}: {}", root, e),
            }
        }

        let mut seen: HashSet<PathBuf> = HashSet::new();
        models.retain(|model| seen.insert(model.locator.clone()));
        models.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(models)
    }

    /// Resolve a single asset by exact name. Not-found is a normal outcome.
    pub fn get_model(
        &self,
        name: &str,
        asset_type: AssetType,
        implementation: Implementation,
    ) -> Result<Option<Model>> {
        let models = self.list_models(asset_type, implementation)?;
        Ok(Self::get_model_cached(&models, name).cloned())
    }

    /// Resolve by name against a caller-supplied snapshot, avoiding a
    /// redundant re-scan when checking many names against one listing.
    pub fn get_model_cached<'a>(snapshot: &'a [Model], name: &str) -> Option<&'a Model> {
        snapshot.iter().find(|model| model.name == name)
    }

    /// Resolve the model the user has configured for generation.
    pub fn current_model(&self, snapshot: Option<&[Model]>) -> Result<ModelSelection> {
        let name = self.settings.str(keys::SD_MODEL_NAME);
        if name.trim().is_empty() {
            return Ok(ModelSelection::Unset);
        }

        let implementation =
            Implementation::from_option_index(self.settings.int(keys::IMPLEMENTATION));

        let model = match snapshot {
            Some(models) => Self::get_model_cached(models, &name).cloned(),
            None => self.get_model(&name, AssetType::Primary, implementation)?,
        };

        Ok(match model {
            Some(model) => ModelSelection::Found(model),
            None => ModelSelection::Missing(name),
        })
    }

    fn size_validation_enabled(&self) -> bool {
        !self.settings.bool(keys::DISABLE_MODEL_SIZE_VALIDATION)
    }
}

fn scan_file_assets(
    root: &Path,
    asset_type: AssetType,
    validate_size: bool,
) -> io::Result<Vec<Model>> {
    let mut models = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(MODEL_FILE_EXT) {
            continue;
        }

        let size = entry.metadata()?.len();
        if validate_size && !model_filesize_valid(size, asset_type) {
            log::debug!("Dropping undersized model candidate {:?} ({} bytes)", path, size);
            continue;
        }

        models.push(Model::from_file(path, size));
    }

    Ok(models)
}

fn scan_directory_assets(root: &Path) -> io::Result<Vec<Model>> {
    let mut models = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        // An unreadable candidate only disqualifies itself, not its
        // siblings in the same root.
        match has_required_components(&path) {
            Ok(true) => models.push(Model::from_directory(path)),
            Ok(false) => {}
            Err(e) => log::debug!("Skipping unreadable model candidate {:?}: {}", path, e),
        }
    }

    Ok(models)
}

fn has_required_components(dir: &Path) -> io::Result<bool> {
    let mut children: HashSet<String> = HashSet::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().is_dir() {
            children.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }

    Ok(REQUIRED_COMPONENT_DIRS
        .iter()
        .all(|required| children.contains(*required)))
}

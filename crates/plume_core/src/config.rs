//! # Dataset Configuration
//!
//! Loaded once from TOML when an emitter is initialized.
//!
//! ```toml
//! name = "sparks"
//! initial_buffers = 2
//! max_buffers = 8
//! persistent_ids = true
//!
//! [[attributes]]
//! name = "Position"
//! type = "vec3"
//!
//! [[attributes]]
//! name = "Age"
//! type = "float"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{CoreError, CoreResult};
use crate::layout::{AttributeDesc, ComponentLayout};

/// Configuration for one [`crate::Dataset`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetConfig {
    /// Name used in logs and errors.
    pub name: String,
    /// Buffers brought into service at creation.
    pub initial_buffers: usize,
    /// Upper bound on buffers; the arena is sized to this.
    pub max_buffers: usize,
    /// Whether instances carry persistent IDs.
    pub persistent_ids: bool,
    /// Attribute declarations, in layout order.
    pub attributes: Vec<AttributeDesc>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: "particles".to_owned(),
            initial_buffers: 2,
            max_buffers: 8,
            persistent_ids: false,
            attributes: Vec::new(),
        }
    }
}

impl DatasetConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> CoreResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| CoreError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Checks buffer counts.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] describing the first violation.
    pub fn validate(&self) -> CoreResult<()> {
        if self.initial_buffers == 0 {
            return Err(CoreError::InvalidConfig(
                "initial_buffers must be at least 1".into(),
            ));
        }
        if self.max_buffers < 2 {
            return Err(CoreError::InvalidConfig(
                "max_buffers must be at least 2 for double buffering".into(),
            ));
        }
        if self.max_buffers < self.initial_buffers {
            return Err(CoreError::InvalidConfig(format!(
                "max_buffers ({}) is below initial_buffers ({})",
                self.max_buffers, self.initial_buffers
            )));
        }
        Ok(())
    }

    /// Compiles the declared attributes into a layout.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateAttribute`] on repeated names.
    pub fn compile_layout(&self) -> CoreResult<ComponentLayout> {
        if self.persistent_ids {
            ComponentLayout::compile_with_persistent_ids(&self.attributes)
        } else {
            ComponentLayout::compile(&self.attributes)
        }
    }
}

//! # Component Layout
//!
//! Maps named particle attributes onto float and int component columns.
//!
//! ```text
//! attributes:  Position(vec3)  Age(float)  Tag(int)  Color(color)
//! float cols:  [0 1 2]         [3]                   [4 5 6 7]
//! int cols:                                [0]
//! ```
//!
//! A layout is compiled once per simulation configuration and never changes
//! afterwards; buffers and accessors only ever read it.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use serde::Deserialize;

use crate::error::{CoreError, CoreResult};

/// Name of the attribute holding persistent particle IDs.
pub const PERSISTENT_ID_ATTRIBUTE: &str = "ID";

/// Storage type of a particle attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// One float.
    Float,
    /// Two floats.
    Vec2,
    /// Three floats.
    Vec3,
    /// Four floats.
    Vec4,
    /// Linear RGBA, four floats.
    Color,
    /// Rotation quaternion, four floats.
    Quat,
    /// One 32-bit integer.
    Int,
    /// Boolean stored as one 32-bit integer.
    Bool,
    /// Persistent ID: index and acquire tag, two integers.
    Id,
}

impl AttributeType {
    /// Number of float components this type occupies.
    #[must_use]
    pub const fn float_components(self) -> usize {
        match self {
            Self::Float => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 | Self::Color | Self::Quat => 4,
            Self::Int | Self::Bool | Self::Id => 0,
        }
    }

    /// Number of int components this type occupies.
    #[must_use]
    pub const fn int_components(self) -> usize {
        match self {
            Self::Int | Self::Bool => 1,
            Self::Id => 2,
            _ => 0,
        }
    }

    /// Size of one value in bytes.
    #[must_use]
    pub const fn byte_size(self) -> usize {
        (self.float_components() + self.int_components()) * 4
    }
}

/// A named attribute as declared by a simulation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttributeDesc {
    /// Attribute name, unique within a layout.
    pub name: String,
    /// Storage type.
    #[serde(rename = "type")]
    pub ty: AttributeType,
}

impl AttributeDesc {
    /// Creates an attribute description.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: AttributeType) -> Self {
        Self { name: name.into(), ty }
    }
}

/// Where one attribute lives inside the component columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentLayoutEntry {
    /// Attribute name.
    pub name: String,
    /// Storage type.
    pub ty: AttributeType,
    /// Total size of one value in bytes.
    pub byte_size: usize,
    /// Number of float components.
    pub float_count: usize,
    /// First float component.
    pub float_offset: usize,
    /// Number of int components.
    pub int_count: usize,
    /// First int component.
    pub int_offset: usize,
}

/// Compiled attribute layout shared by a dataset, its buffers and accessors.
#[derive(Debug, Default)]
pub struct ComponentLayout {
    entries: Vec<ComponentLayoutEntry>,
    by_name: HashMap<String, usize>,
    num_float_components: usize,
    num_int_components: usize,
}

impl ComponentLayout {
    /// Compiles a layout from attribute declarations.
    ///
    /// Components are assigned in declaration order; float and int offsets
    /// advance independently.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateAttribute`] if a name appears twice.
    pub fn compile(attributes: &[AttributeDesc]) -> CoreResult<Self> {
        let mut layout = Self::default();
        for desc in attributes {
            layout.push(desc)?;
        }
        tracing::debug!(
            attributes = layout.entries.len(),
            floats = layout.num_float_components,
            ints = layout.num_int_components,
            "compiled component layout"
        );
        Ok(layout)
    }

    /// Compiles a layout and appends the persistent [`PERSISTENT_ID_ATTRIBUTE`]
    /// if the declarations do not already carry one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateAttribute`] if a name appears twice, or if
    /// `ID` is declared with a type other than [`AttributeType::Id`].
    pub fn compile_with_persistent_ids(attributes: &[AttributeDesc]) -> CoreResult<Self> {
        let mut layout = Self::compile(attributes)?;
        match layout.find(PERSISTENT_ID_ATTRIBUTE) {
            Some(entry) if entry.ty == AttributeType::Id => {}
            Some(_) => {
                return Err(CoreError::DuplicateAttribute(
                    PERSISTENT_ID_ATTRIBUTE.to_owned(),
                ))
            }
            None => layout.push(&AttributeDesc::new(PERSISTENT_ID_ATTRIBUTE, AttributeType::Id))?,
        }
        Ok(layout)
    }

    /// Shared layout with no attributes.
    ///
    /// Datasets created without a compiled layout fall back to this, so every
    /// operation stays well-defined with zero components.
    #[must_use]
    pub fn empty() -> Arc<Self> {
        static EMPTY: OnceLock<Arc<ComponentLayout>> = OnceLock::new();
        Arc::clone(EMPTY.get_or_init(|| Arc::new(Self::default())))
    }

    fn push(&mut self, desc: &AttributeDesc) -> CoreResult<()> {
        if self.by_name.contains_key(&desc.name) {
            return Err(CoreError::DuplicateAttribute(desc.name.clone()));
        }
        let entry = ComponentLayoutEntry {
            name: desc.name.clone(),
            ty: desc.ty,
            byte_size: desc.ty.byte_size(),
            float_count: desc.ty.float_components(),
            float_offset: self.num_float_components,
            int_count: desc.ty.int_components(),
            int_offset: self.num_int_components,
        };
        self.num_float_components += entry.float_count;
        self.num_int_components += entry.int_count;
        self.by_name.insert(desc.name.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Looks up an attribute by name.
    #[inline]
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ComponentLayoutEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    /// All entries in declaration order.
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[ComponentLayoutEntry] {
        &self.entries
    }

    /// Total float components across all attributes.
    #[inline]
    #[must_use]
    pub fn num_float_components(&self) -> usize {
        self.num_float_components
    }

    /// Total int components across all attributes.
    #[inline]
    #[must_use]
    pub fn num_int_components(&self) -> usize {
        self.num_int_components
    }

    /// Number of attributes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the layout has no attributes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the layout carries persistent IDs.
    #[must_use]
    pub fn has_persistent_ids(&self) -> bool {
        self.find(PERSISTENT_ID_ATTRIBUTE)
            .is_some_and(|entry| entry.ty == AttributeType::Id)
    }
}

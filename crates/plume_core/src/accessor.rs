//! # Typed Attribute Access
//!
//! Resolves an attribute name to its components once, then reads and writes
//! typed values straight from the columns.
//!
//! ```rust,ignore
//! let age = Accessor::<f32>::bind(dataset.layout(), "Age");
//!
//! // Simulation: write the destination.
//! let mut writer = age.destination_writer(&mut dataset);
//! writer.set(0, 1.5);
//!
//! // Render: read the current buffer, never panicking.
//! let current = dataset.current_data().unwrap();
//! let value = age.reader(&current).get_safe(0, 0.0);
//! ```
//!
//! A failed bind is not an error: reads return the caller's default and
//! writes do nothing.

use std::marker::PhantomData;

use crate::buffer::ParticleBuffer;
use crate::dataset::{Dataset, ParticleId};
use crate::layout::{AttributeType, ComponentLayout, ComponentLayoutEntry};

/// A value type that can be stored in particle columns.
pub trait AttributeValue: Copy {
    /// Whether values of this type can be stored in an attribute of `ty`.
    fn accepts(ty: AttributeType) -> bool;

    /// Reads the value of `instance`.
    fn read(buffer: &ParticleBuffer, entry: &ComponentLayoutEntry, instance: usize) -> Self;

    /// Writes the value of `instance`.
    fn write(self, buffer: &mut ParticleBuffer, entry: &ComponentLayoutEntry, instance: usize);
}

impl AttributeValue for f32 {
    fn accepts(ty: AttributeType) -> bool {
        ty == AttributeType::Float
    }

    #[inline]
    fn read(buffer: &ParticleBuffer, entry: &ComponentLayoutEntry, instance: usize) -> Self {
        buffer.float(entry.float_offset, instance)
    }

    #[inline]
    fn write(self, buffer: &mut ParticleBuffer, entry: &ComponentLayoutEntry, instance: usize) {
        buffer.set_float(entry.float_offset, instance, self);
    }
}

macro_rules! impl_float_array {
    ($n:literal, $($ty:ident),+) => {
        impl AttributeValue for [f32; $n] {
            fn accepts(ty: AttributeType) -> bool {
                matches!(ty, $(AttributeType::$ty)|+)
            }

            #[inline]
            fn read(buffer: &ParticleBuffer, entry: &ComponentLayoutEntry, instance: usize) -> Self {
                std::array::from_fn(|i| buffer.float(entry.float_offset + i, instance))
            }

            #[inline]
            fn write(self, buffer: &mut ParticleBuffer, entry: &ComponentLayoutEntry, instance: usize) {
                for (i, value) in self.into_iter().enumerate() {
                    buffer.set_float(entry.float_offset + i, instance, value);
                }
            }
        }
    };
}

impl_float_array!(2, Vec2);
impl_float_array!(3, Vec3);
impl_float_array!(4, Vec4, Color, Quat);

impl AttributeValue for i32 {
    fn accepts(ty: AttributeType) -> bool {
        ty == AttributeType::Int
    }

    #[inline]
    fn read(buffer: &ParticleBuffer, entry: &ComponentLayoutEntry, instance: usize) -> Self {
        buffer.int(entry.int_offset, instance)
    }

    #[inline]
    fn write(self, buffer: &mut ParticleBuffer, entry: &ComponentLayoutEntry, instance: usize) {
        buffer.set_int(entry.int_offset, instance, self);
    }
}

impl AttributeValue for bool {
    fn accepts(ty: AttributeType) -> bool {
        ty == AttributeType::Bool
    }

    #[inline]
    fn read(buffer: &ParticleBuffer, entry: &ComponentLayoutEntry, instance: usize) -> Self {
        buffer.int(entry.int_offset, instance) != 0
    }

    #[inline]
    fn write(self, buffer: &mut ParticleBuffer, entry: &ComponentLayoutEntry, instance: usize) {
        buffer.set_int(entry.int_offset, instance, i32::from(self));
    }
}

impl AttributeValue for ParticleId {
    fn accepts(ty: AttributeType) -> bool {
        ty == AttributeType::Id
    }

    #[inline]
    fn read(buffer: &ParticleBuffer, entry: &ComponentLayoutEntry, instance: usize) -> Self {
        ParticleId {
            index: buffer.int(entry.int_offset, instance),
            acquire_tag: buffer.int(entry.int_offset + 1, instance),
        }
    }

    #[inline]
    fn write(self, buffer: &mut ParticleBuffer, entry: &ComponentLayoutEntry, instance: usize) {
        buffer.set_int(entry.int_offset, instance, self.index);
        buffer.set_int(entry.int_offset + 1, instance, self.acquire_tag);
    }
}

/// A typed attribute binding, resolved once against a layout.
#[derive(Debug, Clone)]
pub struct Accessor<T> {
    entry: Option<ComponentLayoutEntry>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: AttributeValue> Accessor<T> {
    /// Binds to attribute `name`.
    ///
    /// The accessor is invalid if the attribute is missing or its type does
    /// not match `T`.
    #[must_use]
    pub fn bind(layout: &ComponentLayout, name: &str) -> Self {
        let entry = match layout.find(name) {
            Some(entry) if T::accepts(entry.ty) => Some(entry.clone()),
            Some(entry) => {
                tracing::debug!(attribute = name, ty = ?entry.ty, "accessor type mismatch");
                None
            }
            None => {
                tracing::debug!(attribute = name, "accessor attribute not found");
                None
            }
        };
        Self {
            entry,
            _marker: PhantomData,
        }
    }

    /// An accessor bound to nothing.
    #[must_use]
    pub fn unbound() -> Self {
        Self {
            entry: None,
            _marker: PhantomData,
        }
    }

    /// Whether the bind succeeded.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.entry.is_some()
    }

    /// The resolved layout entry.
    #[inline]
    #[must_use]
    pub fn entry(&self) -> Option<&ComponentLayoutEntry> {
        self.entry.as_ref()
    }

    /// Reads from `buffer` (typically a current-buffer read guard).
    #[inline]
    #[must_use]
    pub fn reader<'a>(&'a self, buffer: &'a ParticleBuffer) -> AttributeReader<'a, T> {
        AttributeReader {
            entry: self.entry.as_ref(),
            buffer,
            _marker: PhantomData,
        }
    }

    /// Writes into `buffer`.
    #[inline]
    #[must_use]
    pub fn writer<'a>(&'a self, buffer: &'a mut ParticleBuffer) -> AttributeWriter<'a, T> {
        AttributeWriter {
            entry: self.entry.as_ref(),
            buffer: Some(buffer),
            _marker: PhantomData,
        }
    }

    /// Writes into the dataset's destination buffer. Outside a simulate pass
    /// the writer ignores every write.
    #[must_use]
    pub fn destination_writer<'a>(&'a self, dataset: &'a mut Dataset) -> AttributeWriter<'a, T> {
        AttributeWriter {
            entry: self.entry.as_ref(),
            buffer: dataset.destination_mut(),
            _marker: PhantomData,
        }
    }
}

/// Typed reads from one buffer.
#[derive(Debug, Clone, Copy)]
pub struct AttributeReader<'a, T> {
    entry: Option<&'a ComponentLayoutEntry>,
    buffer: &'a ParticleBuffer,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: AttributeValue> AttributeReader<'a, T> {
    /// Whether reads can succeed.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.entry.is_some()
    }

    /// Live instances in the buffer.
    #[inline]
    #[must_use]
    pub fn num_instances(&self) -> usize {
        self.buffer.num_instances()
    }

    /// Reads one value.
    ///
    /// # Panics
    ///
    /// Panics if the accessor is unbound or `instance` is not live.
    #[inline]
    #[must_use]
    pub fn get(&self, instance: usize) -> T {
        let Some(entry) = self.entry else {
            panic!("read through an unbound accessor");
        };
        assert!(instance < self.buffer.num_instances(), "instance {instance} out of range");
        T::read(self.buffer, entry, instance)
    }

    /// Reads one value, or `None` if unbound or out of range.
    #[inline]
    #[must_use]
    pub fn try_get(&self, instance: usize) -> Option<T> {
        let entry = self.entry?;
        (instance < self.buffer.num_instances()).then(|| T::read(self.buffer, entry, instance))
    }

    /// Reads one value, or `default` if unbound or out of range.
    #[inline]
    #[must_use]
    pub fn get_safe(&self, instance: usize, default: T) -> T {
        self.try_get(instance).unwrap_or(default)
    }
}

/// Typed writes into one buffer.
#[derive(Debug)]
pub struct AttributeWriter<'a, T> {
    entry: Option<&'a ComponentLayoutEntry>,
    buffer: Option<&'a mut ParticleBuffer>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: AttributeValue> AttributeWriter<'a, T> {
    /// Whether writes will land.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.entry.is_some() && self.buffer.is_some()
    }

    /// Writes one value. Returns `false` (and writes nothing) if unbound or
    /// `instance` is beyond the allocation.
    #[inline]
    pub fn set(&mut self, instance: usize, value: T) -> bool {
        match (self.entry, self.buffer.as_deref_mut()) {
            (Some(entry), Some(buffer)) if instance < buffer.num_instances_allocated() => {
                value.write(buffer, entry, instance);
                true
            }
            _ => false,
        }
    }

    /// Reads back a value from the buffer being written, for dependent passes.
    #[inline]
    #[must_use]
    pub fn get_safe(&self, instance: usize, default: T) -> T {
        match (self.entry, self.buffer.as_deref()) {
            (Some(entry), Some(buffer)) if instance < buffer.num_instances_allocated() => {
                T::read(buffer, entry, instance)
            }
            _ => default,
        }
    }
}

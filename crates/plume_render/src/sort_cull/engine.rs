//! # Sort/Cull Engine
//!
//! Turns one published particle buffer into a per-view draw index list.
//!
//! ```text
//! buffer ──► cull predicates ──► survivors ──► 32-bit keys ──► sort ──► indices
//!            (tag, mesh, band,                 (view depth,     (comparison
//!             frustum)                          distance,        below threshold,
//!                                               custom)          radix above)
//! ```
//!
//! The engine only reads the buffer and owns nothing but its output, so any
//! number of views can build indices from the same read guard in parallel.

use serde::Deserialize;

use plume_core::{Accessor, BufferReadGuard, ComponentLayout, ParticleBuffer};

use super::keys::{encode_ascending, encode_descending, encode_non_negative};
use super::radix::{comparison_sort, radix_sort, SortEntry};
use super::request::{AttributeMatch, DistanceBand, DistanceSource, SortCullRequest, SortMode};
use crate::culling::Frustum;
use crate::error::{RenderError, RenderResult};

/// Instance count at which the radix path takes over.
pub const DEFAULT_RADIX_SORT_THRESHOLD: usize = 400;

/// Tuning for [`SortCullEngine`].
///
/// ```toml
/// radix_sort_threshold = 400
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SortCullConfig {
    /// Sorts of at least this many instances use radix sort.
    pub radix_sort_threshold: usize,
}

impl Default for SortCullConfig {
    fn default() -> Self {
        Self {
            radix_sort_threshold: DEFAULT_RADIX_SORT_THRESHOLD,
        }
    }
}

impl SortCullConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidConfig`] on malformed TOML.
    pub fn from_toml_str(source: &str) -> RenderResult<Self> {
        toml::from_str(source).map_err(|e| RenderError::InvalidConfig(e.to_string()))
    }
}

/// Which CPU sort produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortPath {
    /// O(N log N) comparison sort.
    Comparison,
    /// 4-pass 8-bit LSD radix sort.
    Radix,
}

/// Draw indices for one view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortCullResult {
    /// Surviving instance indices in draw order.
    pub indices: Vec<u32>,
    /// Instances removed by cull predicates.
    pub culled_count: usize,
    /// Sort that ordered `indices`, if any ran.
    pub sort_path: Option<SortPath>,
}

impl SortCullResult {
    /// Number of indices to draw.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// True when nothing survived.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Whether `indices` are in key order rather than buffer order.
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.sort_path.is_some()
    }
}

/// Builds sorted, culled index lists.
#[derive(Debug, Clone, Default)]
pub struct SortCullEngine {
    config: SortCullConfig,
}

impl SortCullEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(config: SortCullConfig) -> Self {
        Self { config }
    }

    /// Active tuning.
    #[must_use]
    pub fn config(&self) -> &SortCullConfig {
        &self.config
    }

    /// Picks the sort for `len` surviving instances.
    #[must_use]
    pub fn select_path(&self, len: usize) -> SortPath {
        if len >= self.config.radix_sort_threshold {
            SortPath::Radix
        } else {
            SortPath::Comparison
        }
    }

    /// Builds indices from a published buffer.
    #[must_use]
    pub fn build_for(&self, current: &BufferReadGuard, request: &SortCullRequest) -> SortCullResult {
        self.build_indices(current, current.layout(), request)
    }

    /// Builds the draw index list for `request` over `buffer`.
    ///
    /// Predicates whose attribute is missing from `layout` are skipped. A
    /// sort whose key attribute is missing leaves survivors in buffer order.
    ///
    /// # Panics
    ///
    /// Panics if `layout` and `buffer` disagree on component counts.
    #[must_use]
    pub fn build_indices(
        &self,
        buffer: &ParticleBuffer,
        layout: &ComponentLayout,
        request: &SortCullRequest,
    ) -> SortCullResult {
        assert!(
            buffer.num_float_components() == layout.num_float_components()
                && buffer.num_int_components() == layout.num_int_components(),
            "layout has {}f/{}i components, buffer has {}f/{}i",
            layout.num_float_components(),
            layout.num_int_components(),
            buffer.num_float_components(),
            buffer.num_int_components()
        );
        let num_instances = buffer.num_instances();

        if !request.wants_cull() && !request.wants_sort() {
            return SortCullResult {
                indices: (0..num_instances).map(to_index).collect(),
                culled_count: 0,
                sort_path: None,
            };
        }

        let cull = request
            .wants_cull()
            .then(|| CullPass::bind(layout, request))
            .filter(CullPass::is_active);
        let candidates: Vec<u32> = match &cull {
            Some(cull) => (0..num_instances)
                .filter(|&instance| cull.keeps(buffer, instance))
                .map(to_index)
                .collect(),
            None => (0..num_instances).map(to_index).collect(),
        };
        let culled_count = num_instances - candidates.len();
        if cull.is_some() {
            tracing::trace!(
                num_instances,
                culled = culled_count,
                survivors = candidates.len(),
                "cull pass"
            );
        }

        let Some(mut entries) = sort_entries(buffer, layout, request, &candidates) else {
            return SortCullResult {
                indices: candidates,
                culled_count,
                sort_path: None,
            };
        };

        let path = self.select_path(entries.len());
        match path {
            SortPath::Radix => radix_sort(&mut entries),
            SortPath::Comparison => comparison_sort(&mut entries),
        }
        tracing::trace!(len = entries.len(), ?path, mode = ?request.sort_mode, "sort pass");

        SortCullResult {
            indices: entries.iter().map(|entry| entry.index).collect(),
            culled_count,
            sort_path: Some(path),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
#[inline]
fn to_index(instance: usize) -> u32 {
    instance as u32
}

#[inline]
fn distance_squared(a: [f32; 3], b: [f32; 3]) -> f32 {
    let d = [a[0] - b[0], a[1] - b[1], a[2] - b[2]];
    d[0] * d[0] + d[1] * d[1] + d[2] * d[2]
}

#[inline]
fn depth_along(p: [f32; 3], origin: [f32; 3], direction: [f32; 3]) -> f32 {
    (p[0] - origin[0]) * direction[0]
        + (p[1] - origin[1]) * direction[1]
        + (p[2] - origin[2]) * direction[2]
}

enum BandSource {
    Point([f32; 3]),
    Attribute(Accessor<f32>),
}

/// Cull predicates resolved against one layout.
struct CullPass<'a> {
    tag: Option<(Accessor<i32>, i32)>,
    mesh: Option<(Accessor<i32>, i32)>,
    band: Option<(BandSource, &'a DistanceBand)>,
    frustum: Option<(&'a Frustum, f32)>,
    position: Accessor<[f32; 3]>,
}

impl<'a> CullPass<'a> {
    fn bind(layout: &ComponentLayout, request: &'a SortCullRequest) -> Self {
        let position = Accessor::<[f32; 3]>::bind(layout, &request.position_attribute);

        let band = request.distance_band.as_ref().and_then(|band| {
            let source = match &band.source {
                DistanceSource::Point(point) if position.is_valid() => BandSource::Point(*point),
                DistanceSource::Point(_) => {
                    skipped("distance_band", &request.position_attribute);
                    return None;
                }
                DistanceSource::Attribute(name) => {
                    let accessor = Accessor::<f32>::bind(layout, name);
                    if !accessor.is_valid() {
                        skipped("distance_band", name);
                        return None;
                    }
                    BandSource::Attribute(accessor)
                }
            };
            Some((source, band))
        });

        let frustum = request
            .frustum
            .as_ref()
            .filter(|frustum| !frustum.is_empty())
            .and_then(|frustum| {
                if position.is_valid() {
                    Some((frustum, request.cull_radius))
                } else {
                    skipped("frustum", &request.position_attribute);
                    None
                }
            });

        Self {
            tag: bind_match(layout, request.visibility_tag.as_ref(), "visibility_tag"),
            mesh: bind_match(layout, request.mesh_index.as_ref(), "mesh_index"),
            band,
            frustum,
            position,
        }
    }

    fn is_active(&self) -> bool {
        self.tag.is_some() || self.mesh.is_some() || self.band.is_some() || self.frustum.is_some()
    }

    fn keeps(&self, buffer: &ParticleBuffer, instance: usize) -> bool {
        for (accessor, value) in [&self.tag, &self.mesh].into_iter().flatten() {
            if accessor.reader(buffer).get(instance) != *value {
                return false;
            }
        }

        if let Some((source, band)) = &self.band {
            let inside = match source {
                BandSource::Point(point) => {
                    let p = self.position.reader(buffer).get(instance);
                    band.contains_squared(distance_squared(p, *point))
                }
                BandSource::Attribute(accessor) => band.contains(accessor.reader(buffer).get(instance)),
            };
            if !inside {
                return false;
            }
        }

        if let Some((frustum, radius)) = self.frustum {
            let p = self.position.reader(buffer).get(instance);
            if !frustum.contains_sphere(p, radius) {
                return false;
            }
        }

        true
    }
}

fn bind_match(
    layout: &ComponentLayout,
    predicate: Option<&AttributeMatch>,
    kind: &'static str,
) -> Option<(Accessor<i32>, i32)> {
    let predicate = predicate?;
    let accessor = Accessor::<i32>::bind(layout, &predicate.attribute);
    if accessor.is_valid() {
        Some((accessor, predicate.value))
    } else {
        skipped(kind, &predicate.attribute);
        None
    }
}

fn skipped(predicate: &'static str, attribute: &str) {
    tracing::warn!(predicate, attribute, "cull attribute not bound, predicate skipped");
}

/// Keys for the survivors, or `None` when no sort applies.
fn sort_entries(
    buffer: &ParticleBuffer,
    layout: &ComponentLayout,
    request: &SortCullRequest,
    candidates: &[u32],
) -> Option<Vec<SortEntry>> {
    match request.sort_mode {
        SortMode::None => None,
        SortMode::ViewDepth | SortMode::ViewDistance => {
            let position = Accessor::<[f32; 3]>::bind(layout, &request.position_attribute);
            if !position.is_valid() {
                tracing::warn!(
                    attribute = %request.position_attribute,
                    "position not bound, view sort skipped"
                );
                return None;
            }
            let reader = position.reader(buffer);
            let origin = request.view_origin;
            let direction = request.view_direction;
            let by_depth = request.sort_mode == SortMode::ViewDepth;

            Some(
                candidates
                    .iter()
                    .map(|&index| {
                        let p = reader.get(index as usize);
                        let key = if by_depth {
                            encode_descending(depth_along(p, origin, direction))
                        } else {
                            !encode_non_negative(distance_squared(p, origin))
                        };
                        SortEntry::new(key, index)
                    })
                    .collect(),
            )
        }
        SortMode::CustomAscending | SortMode::CustomDescending => {
            let Some(name) = request.sort_attribute.as_deref() else {
                tracing::warn!(mode = ?request.sort_mode, "custom sort without attribute, skipped");
                return None;
            };
            let accessor = Accessor::<f32>::bind(layout, name);
            if !accessor.is_valid() {
                tracing::warn!(attribute = name, "sort attribute not bound, sort skipped");
                return None;
            }
            let reader = accessor.reader(buffer);
            let encode = if request.sort_mode == SortMode::CustomAscending {
                encode_ascending
            } else {
                encode_descending
            };

            Some(
                candidates
                    .iter()
                    .map(|&index| SortEntry::new(encode(reader.get(index as usize)), index))
                    .collect(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plume_core::{AttributeDesc, AttributeType};

    fn layout() -> ComponentLayout {
        ComponentLayout::compile(&[
            AttributeDesc::new("Position", AttributeType::Vec3),
            AttributeDesc::new("Age", AttributeType::Float),
            AttributeDesc::new("Tag", AttributeType::Int),
            AttributeDesc::new("Mesh", AttributeType::Int),
        ])
        .unwrap()
    }

    /// Instance `i` sits at `(0, 0, z[i])` with age `z[i]`, tag `i % 2`, mesh `i % 3`.
    fn buffer(layout: &ComponentLayout, z: &[f32]) -> ParticleBuffer {
        let mut buffer = ParticleBuffer::new(layout);
        buffer.allocate(z.len(), false);
        buffer.set_num_instances(z.len());
        let position = Accessor::<[f32; 3]>::bind(layout, "Position");
        let age = Accessor::<f32>::bind(layout, "Age");
        let tag = Accessor::<i32>::bind(layout, "Tag");
        let mesh = Accessor::<i32>::bind(layout, "Mesh");
        for (i, &value) in z.iter().enumerate() {
            position.writer(&mut buffer).set(i, [0.0, 0.0, value]);
            age.writer(&mut buffer).set(i, value);
            tag.writer(&mut buffer).set(i, (i % 2) as i32);
            mesh.writer(&mut buffer).set(i, (i % 3) as i32);
        }
        buffer
    }

    #[test]
    fn test_passthrough_is_identity() {
        let layout = layout();
        let buffer = buffer(&layout, &[3.0, 1.0, 2.0]);
        let result = SortCullEngine::default().build_indices(&buffer, &layout, &SortCullRequest::new());
        assert_eq!(result.indices, vec![0, 1, 2]);
        assert_eq!(result.culled_count, 0);
        assert!(!result.is_sorted());
    }

    #[test]
    fn test_empty_frustum_is_identity() {
        let layout = layout();
        let buffer = buffer(&layout, &[3.0, 1.0, 2.0]);
        let request = SortCullRequest::new().with_frustum(Frustum::from_planes(&[]));
        assert!(!request.wants_cull());
        let result = SortCullEngine::default().build_indices(&buffer, &layout, &request);
        assert_eq!(result.indices, vec![0, 1, 2]);
        assert_eq!(result.culled_count, 0);
        assert_eq!(result.sort_path, None);
    }

    #[test]
    fn test_custom_ascending() {
        let layout = layout();
        let buffer = buffer(&layout, &[3.0, -1.0, 2.0, 0.0]);
        let request = SortCullRequest::new().with_sort_attribute(SortMode::CustomAscending, "Age");
        let result = SortCullEngine::default().build_indices(&buffer, &layout, &request);
        assert_eq!(result.indices, vec![1, 3, 2, 0]);
        assert_eq!(result.sort_path, Some(SortPath::Comparison));
    }

    #[test]
    fn test_view_depth_is_back_to_front() {
        let layout = layout();
        let buffer = buffer(&layout, &[5.0, -2.0, 10.0, 1.0]);
        let request = SortCullRequest::new()
            .with_sort(SortMode::ViewDepth)
            .with_view([0.0; 3], [0.0, 0.0, 1.0]);
        let result = SortCullEngine::default().build_indices(&buffer, &layout, &request);
        assert_eq!(result.indices, vec![2, 0, 3, 1]);
    }

    #[test]
    fn test_view_distance_is_back_to_front() {
        let layout = layout();
        let buffer = buffer(&layout, &[5.0, -20.0, 10.0, 1.0]);
        let request = SortCullRequest::new()
            .with_sort(SortMode::ViewDistance)
            .with_view([0.0; 3], [0.0, 0.0, 1.0]);
        let result = SortCullEngine::default().build_indices(&buffer, &layout, &request);
        assert_eq!(result.indices, vec![1, 2, 0, 3]);
    }

    #[test]
    fn test_int_predicates() {
        let layout = layout();
        let buffer = buffer(&layout, &[0.0; 6]);
        let request = SortCullRequest::new()
            .with_visibility_tag("Tag", 1)
            .with_mesh_index("Mesh", 0);
        let result = SortCullEngine::default().build_indices(&buffer, &layout, &request);
        assert_eq!(result.indices, vec![3]);
        assert_eq!(result.culled_count, 5);
    }

    #[test]
    fn test_point_distance_band() {
        let layout = layout();
        let buffer = buffer(&layout, &[1.0, 4.0, 6.0, 9.0]);
        let request = SortCullRequest::new()
            .with_distance_band(DistanceBand::around_point([0.0, 0.0, 0.0], 2.0, 6.0));
        let result = SortCullEngine::default().build_indices(&buffer, &layout, &request);
        assert_eq!(result.indices, vec![1, 2]);
    }

    #[test]
    fn test_frustum_with_radius() {
        let layout = layout();
        let buffer = buffer(&layout, &[-1.0, 0.5, 3.0]);
        let near = crate::culling::Plane::from_point_normal([0.0; 3], [0.0, 0.0, 1.0]);
        let request = SortCullRequest::new().with_frustum(Frustum::from_planes(&[near]));
        let engine = SortCullEngine::default();

        assert_eq!(engine.build_indices(&buffer, &layout, &request).indices, vec![1, 2]);

        let padded = request.with_cull_radius(1.0);
        assert_eq!(engine.build_indices(&buffer, &layout, &padded).indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_missing_cull_attribute_skips_predicate() {
        let layout = layout();
        let buffer = buffer(&layout, &[1.0, 2.0]);
        let request = SortCullRequest::new().with_visibility_tag("NoSuchTag", 7);
        let result = SortCullEngine::default().build_indices(&buffer, &layout, &request);
        assert_eq!(result.indices, vec![0, 1]);
        assert_eq!(result.culled_count, 0);
    }

    #[test]
    fn test_missing_sort_attribute_keeps_cull_order() {
        let layout = layout();
        let buffer = buffer(&layout, &[5.0, 4.0, 3.0, 2.0]);
        let request = SortCullRequest::new()
            .with_visibility_tag("Tag", 0)
            .with_sort_attribute(SortMode::CustomAscending, "Missing");
        let result = SortCullEngine::default().build_indices(&buffer, &layout, &request);
        assert_eq!(result.indices, vec![0, 2]);
        assert!(!result.is_sorted());
    }

    #[test]
    fn test_everything_culled_is_empty() {
        let layout = layout();
        let buffer = buffer(&layout, &[1.0, 2.0, 3.0]);
        let request = SortCullRequest::new()
            .with_mesh_index("Mesh", 42)
            .with_sort_attribute(SortMode::CustomDescending, "Age");
        let result = SortCullEngine::default().build_indices(&buffer, &layout, &request);
        assert!(result.is_empty());
        assert_eq!(result.culled_count, 3);
    }

    #[test]
    fn test_threshold_selects_path() {
        let engine = SortCullEngine::new(SortCullConfig {
            radix_sort_threshold: 4,
        });
        assert_eq!(engine.select_path(3), SortPath::Comparison);
        assert_eq!(engine.select_path(4), SortPath::Radix);

        let layout = layout();
        let buffer = buffer(&layout, &[4.0, 3.0, 2.0, 1.0, 0.0]);
        let request = SortCullRequest::new().with_sort_attribute(SortMode::CustomAscending, "Age");
        let result = engine.build_indices(&buffer, &layout, &request);
        assert_eq!(result.sort_path, Some(SortPath::Radix));
        assert_eq!(result.indices, vec![4, 3, 2, 1, 0]);
    }

    #[test]
    #[should_panic(expected = "layout has")]
    fn test_mismatched_layout_panics() {
        let layout = layout();
        let narrow = ComponentLayout::compile(&[AttributeDesc::new("Age", AttributeType::Float)])
            .unwrap();
        let buffer = buffer(&layout, &[1.0, 2.0]);
        let request = SortCullRequest::new().with_sort_attribute(SortMode::CustomAscending, "Age");
        let _ = SortCullEngine::default().build_indices(&buffer, &narrow, &request);
    }

    #[test]
    fn test_config_from_toml() {
        let config = SortCullConfig::from_toml_str("radix_sort_threshold = 1024").unwrap();
        assert_eq!(config.radix_sort_threshold, 1024);
        assert_eq!(SortCullConfig::from_toml_str("").unwrap(), SortCullConfig::default());
        assert!(matches!(
            SortCullConfig::from_toml_str("threshold = 3"),
            Err(RenderError::InvalidConfig(_))
        ));
    }
}

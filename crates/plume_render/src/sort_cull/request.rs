//! Per-view sort/cull requests.

use crate::culling::Frustum;

/// Attribute read for positions unless a request names another.
pub const DEFAULT_POSITION_ATTRIBUTE: &str = "Position";

/// How surviving instances are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortMode {
    /// Keep buffer order.
    #[default]
    None,
    /// Depth along the view direction, farthest first.
    ViewDepth,
    /// Distance to the view origin, farthest first.
    ViewDistance,
    /// Sort attribute, smallest first.
    CustomAscending,
    /// Sort attribute, largest first.
    CustomDescending,
}

/// An integer attribute that must equal a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMatch {
    /// Int attribute name.
    pub attribute: String,
    /// Required value.
    pub value: i32,
}

/// Where a distance band takes its distance from.
#[derive(Debug, Clone, PartialEq)]
pub enum DistanceSource {
    /// Euclidean distance from each position to this point.
    Point([f32; 3]),
    /// A precomputed float attribute.
    Attribute(String),
}

/// Keeps instances whose distance lies in `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceBand {
    /// Nearest kept distance.
    pub min: f32,
    /// Farthest kept distance.
    pub max: f32,
    /// Distance source.
    pub source: DistanceSource,
}

impl DistanceBand {
    /// Band around a reference point, measured from each position.
    #[must_use]
    pub fn around_point(point: [f32; 3], min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            source: DistanceSource::Point(point),
        }
    }

    /// Band over a float attribute that already holds a distance.
    #[must_use]
    pub fn from_attribute(attribute: impl Into<String>, min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            source: DistanceSource::Attribute(attribute.into()),
        }
    }

    /// Tests a squared distance against the squared band limits.
    #[inline]
    #[must_use]
    pub fn contains_squared(&self, distance_squared: f32) -> bool {
        distance_squared >= self.min * self.min && distance_squared <= self.max * self.max
    }

    /// Tests a plain distance.
    #[inline]
    #[must_use]
    pub fn contains(&self, distance: f32) -> bool {
        distance >= self.min && distance <= self.max
    }
}

/// What one view wants from the current buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct SortCullRequest {
    /// Ordering of the result.
    pub sort_mode: SortMode,
    /// Float attribute for the custom modes.
    pub sort_attribute: Option<String>,
    /// Vec3 attribute holding positions.
    pub position_attribute: String,
    /// Visibility tag predicate.
    pub visibility_tag: Option<AttributeMatch>,
    /// Mesh index predicate.
    pub mesh_index: Option<AttributeMatch>,
    /// Distance band predicate.
    pub distance_band: Option<DistanceBand>,
    /// Frustum predicate.
    pub frustum: Option<Frustum>,
    /// Distance an instance may sit outside a frustum plane and still pass.
    pub cull_radius: f32,
    /// Camera position.
    pub view_origin: [f32; 3],
    /// Camera forward vector.
    pub view_direction: [f32; 3],
}

impl Default for SortCullRequest {
    fn default() -> Self {
        Self {
            sort_mode: SortMode::None,
            sort_attribute: None,
            position_attribute: DEFAULT_POSITION_ATTRIBUTE.to_string(),
            visibility_tag: None,
            mesh_index: None,
            distance_band: None,
            frustum: None,
            cull_radius: 0.0,
            view_origin: [0.0; 3],
            view_direction: [0.0, 0.0, 1.0],
        }
    }
}

impl SortCullRequest {
    /// A request that neither sorts nor culls.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sort mode.
    #[must_use]
    pub fn with_sort(mut self, mode: SortMode) -> Self {
        self.sort_mode = mode;
        self
    }

    /// Sorts by a float attribute.
    #[must_use]
    pub fn with_sort_attribute(mut self, mode: SortMode, attribute: impl Into<String>) -> Self {
        self.sort_mode = mode;
        self.sort_attribute = Some(attribute.into());
        self
    }

    /// Reads positions from `attribute`.
    #[must_use]
    pub fn with_position_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.position_attribute = attribute.into();
        self
    }

    /// Sets the camera.
    #[must_use]
    pub fn with_view(mut self, origin: [f32; 3], direction: [f32; 3]) -> Self {
        self.view_origin = origin;
        self.view_direction = direction;
        self
    }

    /// Keeps instances whose `attribute` equals `value`.
    #[must_use]
    pub fn with_visibility_tag(mut self, attribute: impl Into<String>, value: i32) -> Self {
        self.visibility_tag = Some(AttributeMatch {
            attribute: attribute.into(),
            value,
        });
        self
    }

    /// Keeps instances whose `attribute` equals `value`.
    #[must_use]
    pub fn with_mesh_index(mut self, attribute: impl Into<String>, value: i32) -> Self {
        self.mesh_index = Some(AttributeMatch {
            attribute: attribute.into(),
            value,
        });
        self
    }

    /// Keeps instances inside the band.
    #[must_use]
    pub fn with_distance_band(mut self, band: DistanceBand) -> Self {
        self.distance_band = Some(band);
        self
    }

    /// Keeps instances inside the frustum.
    #[must_use]
    pub fn with_frustum(mut self, frustum: Frustum) -> Self {
        self.frustum = Some(frustum);
        self
    }

    /// Lets instances this far outside a frustum plane pass.
    #[must_use]
    pub fn with_cull_radius(mut self, radius: f32) -> Self {
        self.cull_radius = radius;
        self
    }

    /// Whether any cull predicate is set.
    #[must_use]
    pub fn wants_cull(&self) -> bool {
        self.visibility_tag.is_some()
            || self.mesh_index.is_some()
            || self.distance_band.is_some()
            || self.frustum.is_some_and(|f| !f.is_empty())
    }

    /// Whether a sort is requested.
    #[must_use]
    pub fn wants_sort(&self) -> bool {
        self.sort_mode != SortMode::None
    }
}

//! Abstract path descriptions: vertex sequences with optional operation tags.

use crate::error::{RenderError, RenderResult};
use std::sync::Arc;

/// Per-vertex operation tag.
///
/// The discriminant values follow the host plotting library's path codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PathCode {
    Stop = 0,
    MoveTo = 1,
    LineTo = 2,
    /// Quadratic curve: this vertex is the control point, the next one
    /// the end point.
    Curve3 = 3,
    /// Cubic curve: this vertex and the next are control points, the one
    /// after the end point.
    Curve4 = 4,
    ClosePoly = 79,
}

/// An immutable path: ordered (x, y) vertices with an optional parallel
/// code sequence. Absent codes mean an implicit connected polyline.
#[derive(Debug, Clone)]
pub struct Path {
    vertices: Vec<[f64; 2]>,
    codes: Option<Vec<PathCode>>,
}

impl Path {
    /// Create a path from vertices and an optional parallel code sequence.
    pub fn new(vertices: Vec<[f64; 2]>, codes: Option<Vec<PathCode>>) -> RenderResult<Self> {
        if let Some(codes) = &codes {
            if codes.len() != vertices.len() {
                return Err(RenderError::InvalidArgument(
                    "lengths of vertices and codes do not match".to_string(),
                ));
            }
        }
        Ok(Self { vertices, codes })
    }

    /// Create a codeless path (implicit connected polyline).
    pub fn polyline(vertices: Vec<[f64; 2]>) -> Self {
        Self {
            vertices,
            codes: None,
        }
    }

    pub fn vertices(&self) -> &[[f64; 2]] {
        &self.vertices
    }

    pub fn codes(&self) -> Option<&[PathCode]> {
        self.codes.as_deref()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Identity key for cache lookups over shared paths.
///
/// Keys compare by allocation address, never by value: the backing data
/// may be large and value hashing would be both slow and meaningless for
/// caching purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PathKey(usize);

impl PathKey {
    pub(crate) fn of(path: &Arc<Path>) -> Self {
        Self(Arc::as_ptr(path) as usize)
    }
}

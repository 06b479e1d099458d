//! Raw mesh topology and subdivision tags

use serde::{Deserialize, Serialize};

use crate::foundation::hash::ContentHasher;

/// Subdivision scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubdivScheme {
    /// Catmull-Clark (quads)
    #[default]
    CatmullClark,
    /// Loop (triangles)
    Loop,
    /// Bilinear (quads, no smoothing)
    Bilinear,
    /// Polygonal mesh, never subdivided
    None,
}

impl SubdivScheme {
    /// Parse a scheme token
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "catmullClark" => Some(Self::CatmullClark),
            "loop" => Some(Self::Loop),
            "bilinear" => Some(Self::Bilinear),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    /// Scheme token
    pub const fn token(self) -> &'static str {
        match self {
            Self::CatmullClark => "catmullClark",
            Self::Loop => "loop",
            Self::Bilinear => "bilinear",
            Self::None => "none",
        }
    }

    /// Whether refinement produces triangles
    pub const fn refines_to_triangles(self) -> bool {
        matches!(self, Self::Loop)
    }

    /// Whether the scheme can be evaluated at the limit surface
    pub const fn supports_limit_evaluation(self) -> bool {
        matches!(self, Self::CatmullClark | Self::Loop)
    }
}

/// Winding order of face vertices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Orientation {
    /// Counter-clockwise front faces
    #[default]
    RightHanded,
    /// Clockwise front faces
    LeftHanded,
}

/// Boundary interpolation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BoundaryInterpolation {
    /// Boundary edges are sharp, single-face boundary vertices are corners
    #[default]
    EdgeAndCorner,
    /// Boundary edges are sharp
    EdgeOnly,
    /// Boundary is left smooth
    None,
}

impl BoundaryInterpolation {
    const fn token(self) -> &'static str {
        match self {
            Self::EdgeAndCorner => "edgeAndCorner",
            Self::EdgeOnly => "edgeOnly",
            Self::None => "none",
        }
    }
}

/// Creases and corners that modify subdivision rules
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubdivTags {
    /// Vertex boundary rule
    pub vertex_interpolation: BoundaryInterpolation,
    /// Face-varying boundary rule
    pub face_varying_interpolation: BoundaryInterpolation,
    /// Vertex chains of every crease, concatenated
    pub crease_indices: Vec<i32>,
    /// Vertex count of each crease chain
    pub crease_lengths: Vec<i32>,
    /// One sharpness per crease, or one per crease edge
    pub crease_sharpness: Vec<f32>,
    /// Corner vertices
    pub corner_indices: Vec<i32>,
    /// One sharpness per corner
    pub corner_sharpness: Vec<f32>,
}

impl SubdivTags {
    /// Crease edges with positive sharpness as vertex pairs
    pub fn sharp_edges(&self) -> Vec<(u32, u32)> {
        let mut edges = Vec::new();
        let total_edges: usize = self.crease_lengths.iter().map(|&n| (n.max(1) - 1) as usize).sum();
        let per_edge = self.crease_sharpness.len() == total_edges && total_edges != self.crease_lengths.len();
        let mut start = 0usize;
        let mut edge_index = 0usize;
        for (crease, &length) in self.crease_lengths.iter().enumerate() {
            let length = length.max(0) as usize;
            let chain = self.crease_indices.get(start..start + length).unwrap_or(&[]);
            for pair in chain.windows(2) {
                let sharpness = if per_edge {
                    self.crease_sharpness.get(edge_index)
                } else {
                    self.crease_sharpness.get(crease)
                };
                if sharpness.copied().unwrap_or(0.0) > 0.0 && pair[0] >= 0 && pair[1] >= 0 {
                    edges.push(ordered_edge(pair[0] as u32, pair[1] as u32));
                }
                edge_index += 1;
            }
            start += length;
        }
        edges
    }

    /// Corner vertices with positive sharpness
    pub fn sharp_corners(&self) -> Vec<u32> {
        self.corner_indices
            .iter()
            .zip(self.corner_sharpness.iter())
            .filter(|(&index, &sharpness)| index >= 0 && sharpness > 0.0)
            .map(|(&index, _)| index as u32)
            .collect()
    }

    pub(crate) fn hash_into(&self, hasher: &mut ContentHasher) {
        hasher
            .write_str(self.vertex_interpolation.token())
            .write_str(self.face_varying_interpolation.token())
            .write_i32_slice(&self.crease_indices)
            .write_i32_slice(&self.crease_lengths)
            .write_f32_slice(&self.crease_sharpness)
            .write_i32_slice(&self.corner_indices)
            .write_f32_slice(&self.corner_sharpness);
    }
}

/// Edge key with the smaller vertex first
pub(crate) const fn ordered_edge(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Raw mesh topology
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshTopology {
    /// Subdivision scheme
    pub scheme: SubdivScheme,
    /// Face winding
    pub orientation: Orientation,
    /// Vertex count of each face
    pub face_vertex_counts: Vec<i32>,
    /// Point index of each face corner
    pub face_vertex_indices: Vec<i32>,
    /// Faces that are not drawn, sorted
    pub hole_indices: Vec<i32>,
    /// Creases and corners
    pub subdiv_tags: SubdivTags,
}

impl MeshTopology {
    /// Create a right-handed topology without holes or tags
    pub fn new(scheme: SubdivScheme, face_vertex_counts: Vec<i32>, face_vertex_indices: Vec<i32>) -> Self {
        Self {
            scheme,
            face_vertex_counts,
            face_vertex_indices,
            ..Self::default()
        }
    }

    /// Set the winding order
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Set hole faces
    pub fn with_holes(mut self, mut holes: Vec<i32>) -> Self {
        holes.sort_unstable();
        holes.dedup();
        self.hole_indices = holes;
        self
    }

    /// Set subdivision tags
    pub fn with_subdiv_tags(mut self, tags: SubdivTags) -> Self {
        self.subdiv_tags = tags;
        self
    }

    /// Number of faces
    pub fn num_faces(&self) -> usize {
        self.face_vertex_counts.len()
    }

    /// Number of face corners
    pub fn num_face_varyings(&self) -> usize {
        self.face_vertex_indices.len()
    }

    /// Number of points referenced (largest index plus one)
    pub fn num_points(&self) -> usize {
        self.face_vertex_indices
            .iter()
            .copied()
            .max()
            .map_or(0, |max| (max.max(-1) + 1) as usize)
    }

    /// Whether `face` is a hole
    pub fn is_hole(&self, face: usize) -> bool {
        self.hole_indices.binary_search(&(face as i32)).is_ok()
    }

    /// Whether the winding is clockwise
    pub fn is_left_handed(&self) -> bool {
        self.orientation == Orientation::LeftHanded
    }

    /// Iterate faces as `(face index, corner offset, vertex indices)`
    ///
    /// Stops at the first face whose corners run past the index array.
    pub fn faces(&self) -> impl Iterator<Item = (usize, usize, &[i32])> + '_ {
        let mut offset = 0usize;
        self.face_vertex_counts.iter().enumerate().map_while(move |(face, &count)| {
            let count = count.max(0) as usize;
            let start = offset;
            offset += count;
            self.face_vertex_indices.get(start..offset).map(|verts| (face, start, verts))
        })
    }

    /// Feed the layout (scheme, winding, faces, holes) to a hasher
    pub(crate) fn hash_layout(&self, hasher: &mut ContentHasher) {
        hasher
            .write_str(self.scheme.token())
            .write_bool(self.is_left_handed())
            .write_i32_slice(&self.face_vertex_counts)
            .write_i32_slice(&self.face_vertex_indices)
            .write_i32_slice(&self.hole_indices);
    }
}

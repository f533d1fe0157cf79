//! Canonical meshes built from decoded LOD records.
//!
//! Skeletal LODs are welded into points, wedges and faces with per-point bone
//! influences. Static LODs keep one vertex per stream entry and only have their historical
//! stream layouts normalized.

mod faces;
mod skeletal;
mod static_mesh;
mod weld;

pub use faces::{FaceSource, build_faces};
pub use skeletal::{reconstruct_skeletal_lod, reconstruct_skeletal_mesh};
pub use static_mesh::{
    StaticMeshLodModel, StaticMeshModel, StaticVertex, normalize_static_vertices,
    reconstruct_static_lod, reconstruct_static_mesh,
};
pub use weld::PointWelder;

use crate::codecs::{PackedNormal, Vector3};
use crate::models::BoxSphereBounds;

/// Mesh-level information about one LOD that its record does not carry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LodInfo {
    /// Maps section material indices to mesh material slots. Indices outside the map are
    /// used as they are.
    pub material_map: Vec<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoneInfluence {
    /// Skeleton bone index.
    pub bone: i16,
    pub weight: f32,
}

/// A deduplicated position.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    pub position: Vector3,
    /// Normal of the first vertex welded here. Later vertices are compared against it.
    pub normal: PackedNormal,
    pub influences: Vec<BoneInfluence>,
}

/// One corner use of a point.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Wedge {
    pub point: u32,
    pub uv: [f32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Face {
    /// Wedge indices for skeletal meshes, vertex indices for static meshes.
    pub wedges: [u32; 3],
    pub material: i32,
}

/// Faces of one section, as a range into the LOD's face list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshSection {
    pub material: i32,
    pub first_face: usize,
    pub num_faces: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkeletalMeshLod {
    pub points: Vec<Point>,
    pub wedges: Vec<Wedge>,
    pub faces: Vec<Face>,
    pub sections: Vec<MeshSection>,
}

/// Axis-aligned box and sphere. Records store the sphere at twice the mesh radius.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshBounds {
    pub min: Vector3,
    pub max: Vector3,
    pub radius: f32,
}

impl From<&BoxSphereBounds> for MeshBounds {
    fn from(bounds: &BoxSphereBounds) -> Self {
        MeshBounds {
            min: bounds.origin - bounds.box_extent,
            max: bounds.origin + bounds.box_extent,
            radius: bounds.sphere_radius / 2.0,
        }
    }
}

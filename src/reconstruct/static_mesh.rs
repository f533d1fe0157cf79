use std::borrow::Cow;

use tracing::debug;

use super::faces::{FaceSource, build_faces};
use super::{Face, MeshBounds, MeshSection};
use crate::codecs::{PackedNormal, Vector3};
use crate::diagnostics::DiagnosticSink;
use crate::models::check_count;
use crate::models::static_mesh::{StaticLod, StaticMesh, StaticStreamLayout, StaticUvItem};

const RECORD: &str = "StaticLod";

/// A static mesh vertex with its tangent basis unpacked.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaticVertex {
    pub position: Vector3,
    pub uv: [f32; 2],
    pub tangent: Vector3,
    pub binormal: Vector3,
    pub normal: Vector3,
}

impl StaticVertex {
    fn new(position: Vector3, item: &StaticUvItem) -> Self {
        let [tangent, binormal, normal] = item.normals;
        let t = tangent.to_vector();
        let n = normal.to_vector();
        StaticVertex {
            position,
            uv: item.uv,
            tangent: t,
            binormal: restore_binormal(binormal, t, n, normal),
            normal: n,
        }
    }
}

/// Stored binormal, or `normal x tangent` flipped by the normal's handedness when the
/// cook dropped it.
fn restore_binormal(
    stored: PackedNormal,
    tangent: Vector3,
    normal: Vector3,
    packed_normal: PackedNormal,
) -> Vector3 {
    if !stored.is_zero() {
        return stored.to_vector();
    }
    let binormal = normal.cross(tangent);
    if packed_normal.w() == -1.0 { -binormal } else { binormal }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaticMeshLodModel {
    pub vertices: Vec<StaticVertex>,
    /// Faces index `vertices` directly.
    pub faces: Vec<Face>,
    pub sections: Vec<MeshSection>,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaticMeshModel {
    pub bounds: MeshBounds,
    pub lods: Vec<StaticMeshLodModel>,
}

/// Bring every stream layout down to one position and one UV item per vertex.
fn unify_streams<'a>(
    lod: &'a StaticLod,
    sink: &mut dyn DiagnosticSink,
) -> (Cow<'a, [Vector3]>, Cow<'a, [StaticUvItem]>) {
    match lod.layout {
        StaticStreamLayout::Separate => {
            let mut items = Cow::Borrowed(lod.uv_stream.items.as_slice());
            if let Some(mk_normals) = &lod.mk_normals {
                check_count(sink, RECORD, "tangent stream length", items.len(), mk_normals.len());
                for (item, normals) in items.to_mut().iter_mut().zip(mk_normals) {
                    item.normals = *normals;
                }
            }

            let mut positions = Cow::Borrowed(lod.vertex_stream.positions.as_slice());
            if lod.may_duplicate_positions
                && !positions.is_empty()
                && positions.len() * 2 == items.len()
            {
                debug!(vertices = positions.len(), "duplicating static mesh positions");
                positions.to_mut().extend_from_within(..);
            }
            (positions, items)
        }
        StaticStreamLayout::PositionsInUvStream => {
            let items = lod.uv_stream.items.as_slice();
            let positions: Vec<Vector3> = items.iter().map(|item| item.position).collect();
            (Cow::Owned(positions), Cow::Borrowed(items))
        }
        StaticStreamLayout::Legacy => {
            let uvs = lod.legacy_uv_streams.first().map(Vec::as_slice).unwrap_or_default();
            check_count(
                sink,
                RECORD,
                "legacy UV stream length",
                lod.legacy_vertices.len(),
                uvs.len(),
            );
            let items = lod
                .legacy_vertices
                .iter()
                .enumerate()
                .map(|(i, v)| StaticUvItem {
                    position: v.position,
                    normals: v.normals,
                    color: 0,
                    uv: uvs.get(i).copied().unwrap_or_default(),
                })
                .collect();
            let positions = lod.legacy_vertices.iter().map(|v| v.position).collect();
            (Cow::Owned(positions), Cow::Owned(items))
        }
    }
}

/// Unified vertices of a static LOD, one per stream entry. When the position and UV
/// streams disagree in length the shorter one wins.
pub fn normalize_static_vertices(
    lod: &StaticLod,
    sink: &mut dyn DiagnosticSink,
) -> Vec<StaticVertex> {
    let (positions, items) = unify_streams(lod, sink);
    check_count(sink, RECORD, "UV item count", positions.len(), items.len());
    positions
        .iter()
        .zip(items.iter())
        .map(|(position, item)| StaticVertex::new(*position, item))
        .collect()
}

pub fn reconstruct_static_lod(
    lod: &StaticLod,
    sink: &mut dyn DiagnosticSink,
) -> StaticMeshLodModel {
    let vertices = normalize_static_vertices(lod, sink);
    let sources: Vec<FaceSource> = lod
        .sections
        .iter()
        .map(|section| FaceSource {
            material: section.material,
            first_index: section.first_index,
            num_triangles: section.num_faces,
        })
        .collect();
    let (faces, sections) = build_faces(&sources, &lod.indices, vertices.len(), sink);
    debug!(
        layout = ?lod.layout,
        vertices = vertices.len(),
        faces = faces.len(),
        "reconstructed static LOD"
    );
    StaticMeshLodModel {
        vertices,
        faces,
        sections,
    }
}

pub fn reconstruct_static_mesh(
    mesh: &StaticMesh,
    sink: &mut dyn DiagnosticSink,
) -> StaticMeshModel {
    StaticMeshModel {
        bounds: MeshBounds::from(&mesh.bounds),
        lods: mesh.lods.iter().map(|lod| reconstruct_static_lod(lod, sink)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ByteCursor, VersionContext};
    use crate::diagnostics::Diagnostic;
    use crate::models::static_mesh::tests::lod_700;
    use crate::models::static_mesh::{LegacyStaticVertex, STATIC_LOD, StaticMeshSection};
    use winnow::binary::Endianness;

    fn item(position: Vector3, normals: [PackedNormal; 3], u: f32) -> StaticUvItem {
        StaticUvItem {
            position,
            normals,
            color: 0,
            uv: [u, 0.0],
        }
    }

    fn one_triangle() -> StaticMeshSection {
        StaticMeshSection {
            material: 2,
            first_index: 0,
            num_faces: 1,
            ..StaticMeshSection::default()
        }
    }

    #[test]
    fn stock_lod_rebuilds_missing_binormals() {
        let data = lod_700().finish();
        let mut c = ByteCursor::new(&data, Endianness::Little);
        let ctx = VersionContext::builder().format_version(700).build();
        let lod = STATIC_LOD.decode(&mut c, &ctx).unwrap();

        let mut sink: Vec<Diagnostic> = Vec::new();
        let model = reconstruct_static_lod(&lod, &mut sink);
        assert!(sink.is_empty());
        assert_eq!(model.vertices.len(), 3);
        assert_eq!(model.vertices[1].position, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(model.vertices[2].uv, [2.0, 0.5]);

        let v = model.vertices[0];
        assert!(v.tangent.x > 0.99);
        assert!(v.normal.z > 0.99);
        assert!(v.binormal.y > 0.9);
        assert_eq!(
            model.faces,
            vec![Face {
                wedges: [0, 1, 2],
                material: 9
            }]
        );
        assert_eq!(model.sections[0].num_faces, 1);
    }

    #[test]
    fn negative_handedness_flips_the_binormal() {
        let tangent = PackedNormal::from_bytes(255, 128, 128, 0);
        let normal = PackedNormal::from_bytes(128, 128, 255, 0);
        let uv = item(Vector3::ZERO, [tangent, PackedNormal(0), normal], 0.0);
        let v = StaticVertex::new(Vector3::ZERO, &uv);
        assert!(v.binormal.y < -0.9);

        let stored = PackedNormal::from_bytes(128, 0, 128, 0);
        let uv = item(Vector3::ZERO, [tangent, stored, normal], 0.0);
        let v = StaticVertex::new(Vector3::ZERO, &uv);
        assert_eq!(v.binormal, stored.to_vector());
    }

    #[test]
    fn doubled_uv_stream_repeats_positions() {
        let normals = [PackedNormal::default(); 3];
        let mut lod = StaticLod {
            sections: vec![StaticMeshSection {
                num_faces: 2,
                ..one_triangle()
            }],
            may_duplicate_positions: true,
            indices: vec![0, 1, 2, 3, 4, 5],
            ..StaticLod::default()
        };
        lod.vertex_stream.positions = vec![
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(3.0, 0.0, 0.0),
        ];
        lod.uv_stream.items = (0..6).map(|i| item(Vector3::ZERO, normals, i as f32)).collect();

        let mut sink: Vec<Diagnostic> = Vec::new();
        let model = reconstruct_static_lod(&lod, &mut sink);
        assert!(sink.is_empty());
        assert_eq!(model.vertices.len(), 6);
        assert_eq!(model.vertices[4].position, Vector3::new(2.0, 0.0, 0.0));
        assert_eq!(model.vertices[4].uv, [4.0, 0.0]);
        assert_eq!(model.faces.len(), 2);

        // without the title flag the extra items are a count mismatch
        lod.may_duplicate_positions = false;
        let model = reconstruct_static_lod(&lod, &mut sink);
        assert_eq!(model.vertices.len(), 3);
        assert!(sink.iter().any(|d| matches!(
            d,
            Diagnostic::CountMismatch { expected: 3, actual: 6, .. }
        )));
    }

    #[test]
    fn mk_tangents_replace_uv_item_normals() {
        let tangent = PackedNormal::from_bytes(128, 255, 128, 0);
        let mut lod = StaticLod {
            sections: vec![one_triangle()],
            indices: vec![0, 1, 2],
            mk_normals: Some(vec![[tangent, PackedNormal(0), PackedNormal(0)]; 3]),
            ..StaticLod::default()
        };
        lod.vertex_stream.positions = vec![Vector3::ZERO; 3];
        lod.uv_stream.items = vec![item(Vector3::ZERO, [PackedNormal(0); 3], 0.0); 3];

        let mut sink: Vec<Diagnostic> = Vec::new();
        let vertices = normalize_static_vertices(&lod, &mut sink);
        assert!(vertices.iter().all(|v| v.tangent.y > 0.99));
        assert!(sink.is_empty());
    }

    #[test]
    fn positions_can_come_from_uv_items() {
        let mut lod = StaticLod {
            layout: StaticStreamLayout::PositionsInUvStream,
            sections: vec![one_triangle()],
            indices: vec![2, 1, 0],
            ..StaticLod::default()
        };
        lod.uv_stream.items = (0..3)
            .map(|i| item(Vector3::new(i as f32, 1.0, 0.0), [PackedNormal(0); 3], 0.0))
            .collect();

        let mut sink: Vec<Diagnostic> = Vec::new();
        let model = reconstruct_static_lod(&lod, &mut sink);
        assert_eq!(model.vertices[2].position, Vector3::new(2.0, 1.0, 0.0));
        assert_eq!(model.faces[0].wedges, [2, 1, 0]);
        assert_eq!(model.faces[0].material, 2);
    }

    #[test]
    fn legacy_vertices_take_the_first_uv_stream() {
        let normal = PackedNormal::from_bytes(128, 128, 255, 255);
        let lod = StaticLod {
            layout: StaticStreamLayout::Legacy,
            sections: vec![one_triangle()],
            indices: vec![0, 1, 2],
            legacy_vertices: (0..3)
                .map(|i| LegacyStaticVertex {
                    position: Vector3::new(0.0, 0.0, i as f32),
                    normals: [PackedNormal(0), PackedNormal(0), normal],
                })
                .collect(),
            legacy_uv_streams: vec![vec![[0.0, 0.0], [1.0, 0.0]], vec![[9.0, 9.0]; 3]],
            ..StaticLod::default()
        };

        let mut sink: Vec<Diagnostic> = Vec::new();
        let model = reconstruct_static_lod(&lod, &mut sink);
        assert_eq!(model.vertices.len(), 3);
        assert_eq!(model.vertices[1].uv, [1.0, 0.0]);
        assert_eq!(model.vertices[2].uv, [0.0, 0.0]);
        assert!(model.vertices[2].normal.z > 0.99);
        assert!(matches!(
            &sink[..],
            [Diagnostic::CountMismatch { expected: 3, actual: 2, .. }]
        ));
    }
}

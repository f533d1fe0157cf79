use tracing::debug;

use super::faces::{FaceSource, build_faces};
use super::weld::PointWelder;
use super::{BoneInfluence, LodInfo, SkeletalMeshLod, Wedge};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::models::skeletal::{SkeletalLod, SkinChunk};
use crate::models::vertex::RawVertex;

/// Where one chunk's vertices come from.
enum ChunkVertices<'a> {
    Cpu(&'a SkinChunk),
    /// Slice of the GPU skin buffer and the buffer index of its first vertex.
    Gpu(&'a [RawVertex], usize),
}

impl<'a> ChunkVertices<'a> {
    fn resolve(
        lod: &'a SkeletalLod,
        chunk_index: usize,
        chunk: &'a SkinChunk,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Self, String> {
        if !chunk.needs_gpu_vertices() {
            return Ok(ChunkVertices::Cpu(chunk));
        }
        let gpu = &lod.gpu_skin.vertices;
        let total =
            chunk.num_rigid_vertices.max(0) as usize + chunk.num_smooth_vertices.max(0) as usize;
        let first = usize::try_from(chunk.first_vertex)
            .map_err(|_| format!("negative first vertex {}", chunk.first_vertex))?;
        let Some(vertices) = first.checked_add(total).and_then(|end| gpu.get(first..end)) else {
            return Err(format!(
                "GPU vertices {first}..{} outside a skin buffer of {}",
                first.saturating_add(total),
                gpu.len()
            ));
        };
        sink.report(Diagnostic::GpuSkinFallback {
            chunk: chunk_index,
            first_vertex: chunk.first_vertex,
            num_vertices: total as i32,
        });
        Ok(ChunkVertices::Gpu(vertices, first))
    }

    /// Buffer-ordered vertices. GPU vertices that an earlier chunk already produced are
    /// left out so wedge indices stay equal to vertex buffer indices.
    fn iter(&self, wedges_so_far: usize) -> Box<dyn Iterator<Item = &'a RawVertex> + 'a> {
        match *self {
            ChunkVertices::Cpu(chunk) => {
                Box::new(chunk.rigid_vertices.iter().chain(chunk.smooth_vertices.iter()))
            }
            ChunkVertices::Gpu(vertices, first) => {
                let skip = wedges_so_far.saturating_sub(first);
                Box::new(vertices.iter().skip(skip))
            }
        }
    }
}

/// Palette slots of a vertex that carry weight.
fn weighted_slots(vertex: &RawVertex) -> impl Iterator<Item = (usize, u8)> + '_ {
    vertex
        .bone_indices
        .iter()
        .zip(vertex.bone_weights)
        .filter(|(_, weight)| *weight > 0)
        .map(|(index, weight)| (*index as usize, weight))
}

fn check_palette<'a>(
    chunk: &SkinChunk,
    mut vertices: impl Iterator<Item = &'a RawVertex>,
) -> Result<(), String> {
    let bad = vertices.find_map(|v| {
        weighted_slots(v)
            .map(|(slot, _)| slot)
            .find(|&slot| slot >= chunk.bones.len())
    });
    match bad {
        Some(slot) => Err(format!(
            "bone palette index {slot} out of range ({} bones)",
            chunk.bones.len()
        )),
        None => Ok(()),
    }
}

fn influences(chunk: &SkinChunk, vertex: &RawVertex) -> Vec<BoneInfluence> {
    weighted_slots(vertex)
        .map(|(slot, weight)| BoneInfluence {
            bone: chunk.bones[slot],
            weight: weight as f32 / 255.0,
        })
        .collect()
}

/// Weld one skeletal LOD into points, wedges and faces.
///
/// Chunks whose CPU vertex arrays were stripped are read from the GPU skin buffer. A
/// chunk with an invalid bone palette or GPU range is reported as
/// [`Diagnostic::ChunkSkipped`] and contributes nothing.
pub fn reconstruct_skeletal_lod(
    lod: &SkeletalLod,
    info: &LodInfo,
    sink: &mut dyn DiagnosticSink,
) -> SkeletalMeshLod {
    let capacity = lod.num_vertices.max(0) as usize;
    let mut welder = PointWelder::with_capacity(capacity);
    let mut wedges: Vec<Wedge> = Vec::with_capacity(capacity);

    for (chunk_index, chunk) in lod.chunks.iter().enumerate() {
        let source = ChunkVertices::resolve(lod, chunk_index, chunk, sink)
            .and_then(|source| check_palette(chunk, source.iter(wedges.len())).map(|_| source));
        let source = match source {
            Ok(source) => source,
            Err(reason) => {
                sink.report(Diagnostic::ChunkSkipped {
                    chunk: chunk_index,
                    reason,
                });
                continue;
            }
        };

        for vertex in source.iter(wedges.len()) {
            let point = welder.weld(vertex.position, vertex.normal(), || influences(chunk, vertex));
            wedges.push(Wedge {
                point,
                uv: vertex.uv,
            });
        }
    }

    let sources: Vec<FaceSource> = lod
        .sections
        .iter()
        .map(|section| FaceSource {
            material: remap_material(info, section.material_index as i32),
            first_index: section.first_index,
            num_triangles: section.num_triangles,
        })
        .collect();
    let (faces, sections) = build_faces(&sources, &lod.indices, wedges.len(), sink);

    debug!(
        points = welder.len(),
        wedges = wedges.len(),
        faces = faces.len(),
        sections = sections.len(),
        "reconstructed skeletal LOD"
    );
    SkeletalMeshLod {
        points: welder.into_points(),
        wedges,
        faces,
        sections,
    }
}

fn remap_material(info: &LodInfo, material: i32) -> i32 {
    usize::try_from(material)
        .ok()
        .and_then(|index| info.material_map.get(index))
        .copied()
        .unwrap_or(material)
}

/// Reconstruct every LOD of a mesh. LODs without an entry in `infos` use no material
/// remapping.
pub fn reconstruct_skeletal_mesh(
    lods: &[SkeletalLod],
    infos: &[LodInfo],
    sink: &mut dyn DiagnosticSink,
) -> Vec<SkeletalMeshLod> {
    let default_info = LodInfo::default();
    lods.iter()
        .enumerate()
        .map(|(index, lod)| {
            reconstruct_skeletal_lod(lod, infos.get(index).unwrap_or(&default_info), sink)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::{PackedNormal, Vector3};
    use crate::data::{ByteCursor, VersionContext};
    use crate::models::skeletal::tests::gpu_only_lod_700;
    use crate::models::skeletal::{SkelMeshSection, SkeletalLodParams, decode_skeletal_lod};
    use winnow::binary::Endianness;

    fn vertex(
        position: Vector3,
        normal: PackedNormal,
        bones: [u8; 4],
        weights: [u8; 4],
    ) -> RawVertex {
        RawVertex {
            position,
            normals: [PackedNormal::default(), PackedNormal::default(), normal],
            uv: [position.x, position.y],
            bone_indices: bones,
            bone_weights: weights,
            color: None,
        }
    }

    fn rigid(position: Vector3, bone: u8) -> RawVertex {
        vertex(position, PackedNormal::from_bytes(0, 0, 127, 0), [bone, 0, 0, 0], [255, 0, 0, 0])
    }

    fn section(material_index: i16, first_index: i32, num_triangles: i32) -> SkelMeshSection {
        SkelMeshSection {
            material_index,
            chunk_index: 0,
            first_index,
            num_triangles,
            triangle_sorting: 0,
        }
    }

    /// Chunk 0 holds three rigid vertices, chunk 1 two smooth ones, the first of which
    /// sits on rigid vertex 0.
    fn two_chunk_lod() -> SkeletalLod {
        let chunk0 = SkinChunk {
            first_vertex: 0,
            rigid_vertices: vec![
                rigid(Vector3::new(0.0, 0.0, 0.0), 0),
                rigid(Vector3::new(1.0, 0.0, 0.0), 1),
                rigid(Vector3::new(0.0, 1.0, 0.0), 0),
            ],
            bones: vec![3, 7],
            num_rigid_vertices: 3,
            ..SkinChunk::default()
        };
        let chunk1 = SkinChunk {
            first_vertex: 3,
            smooth_vertices: vec![
                vertex(
                    Vector3::new(0.0, 0.0, 0.0),
                    PackedNormal::from_bytes(2, 3, 120, 0),
                    [0, 1, 0, 0],
                    [200, 55, 0, 0],
                ),
                vertex(
                    Vector3::new(1.0, 1.0, 0.0),
                    PackedNormal::from_bytes(0, 0, 127, 0),
                    [1, 0, 0, 0],
                    [128, 127, 0, 0],
                ),
            ],
            bones: vec![9, 4],
            num_smooth_vertices: 2,
            ..SkinChunk::default()
        };
        SkeletalLod {
            sections: vec![section(0, 0, 2)],
            indices: vec![0, 1, 2, 2, 3, 4],
            chunks: vec![chunk0, chunk1],
            num_vertices: 5,
            ..SkeletalLod::default()
        }
    }

    #[test]
    fn two_chunks_weld_one_shared_position() {
        let lod = two_chunk_lod();
        let mut sink: Vec<Diagnostic> = Vec::new();
        let mesh = reconstruct_skeletal_lod(&lod, &LodInfo::default(), &mut sink);

        assert_eq!(mesh.points.len(), 4);
        assert_eq!(mesh.wedges.len(), 5);
        assert_eq!(mesh.faces.len(), lod.sections[0].num_triangles as usize);
        assert_eq!(mesh.wedges[3].point, 0);
        assert_eq!(mesh.wedges[4].point, 3);
        assert_eq!(mesh.faces[1].wedges, [2, 3, 4]);
        assert!(sink.is_empty());

        // the welded point keeps the rigid vertex's single influence
        assert_eq!(mesh.points[0].influences, vec![BoneInfluence { bone: 3, weight: 1.0 }]);
        assert_eq!(mesh.points[1].influences[0].bone, 7);
        let smooth = &mesh.points[3].influences;
        assert_eq!(smooth.len(), 2);
        assert_eq!(smooth[0].bone, 4);
        assert_eq!(smooth[1].bone, 9);
        assert!((smooth[0].weight - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn materials_go_through_the_lod_map() {
        let mut lod = two_chunk_lod();
        lod.sections = vec![section(1, 0, 1), section(5, 3, 1)];
        let info = LodInfo {
            material_map: vec![10, 11],
        };
        let mut sink: Vec<Diagnostic> = Vec::new();
        let mesh = reconstruct_skeletal_lod(&lod, &info, &mut sink);
        assert_eq!(mesh.sections[0].material, 11);
        assert_eq!(mesh.sections[1].material, 5);
        assert_eq!(mesh.faces[1].material, 5);
    }

    #[test]
    fn section_past_the_index_buffer_is_dropped() {
        let mut lod = two_chunk_lod();
        lod.sections = vec![section(0, 3, 2), section(0, 0, 1)];
        let mut sink: Vec<Diagnostic> = Vec::new();
        let mesh = reconstruct_skeletal_lod(&lod, &LodInfo::default(), &mut sink);
        assert_eq!(mesh.sections.len(), 1);
        assert_eq!(mesh.faces.len(), 1);
        assert!(matches!(
            &sink[..],
            [Diagnostic::SectionMismatch { section: 0, index_count: 6, .. }]
        ));
    }

    #[test]
    fn bad_palette_skips_the_chunk_only() {
        let mut lod = two_chunk_lod();
        lod.chunks[1].bones.truncate(1);
        let mut sink: Vec<Diagnostic> = Vec::new();
        let mesh = reconstruct_skeletal_lod(&lod, &LodInfo::default(), &mut sink);
        assert_eq!(mesh.wedges.len(), 3);
        assert_eq!(mesh.points.len(), 3);
        assert!(sink[0].is_chunk_skipped());
        // the second triangle now names wedges that do not exist
        assert_eq!(mesh.faces.len(), 1);
        assert!(sink[1].is_count_mismatch());
    }

    #[test]
    fn stripped_chunk_uses_gpu_skin() {
        let data = gpu_only_lod_700(3);
        let mut c = ByteCursor::new(&data, Endianness::Little);
        let ctx = VersionContext::builder().format_version(700).build();
        let lod = decode_skeletal_lod(&mut c, &ctx, SkeletalLodParams::default()).unwrap();

        let mut sink: Vec<Diagnostic> = Vec::new();
        let mesh = reconstruct_skeletal_lod(&lod, &LodInfo::default(), &mut sink);
        assert_eq!(mesh.points.len(), 3);
        assert_eq!(mesh.wedges.len(), 3);
        assert_eq!(mesh.faces.len(), 1);
        assert_eq!(mesh.points[2].position, Vector3::new(2.0, 0.0, 0.0));
        assert_eq!(mesh.points[1].influences, vec![BoneInfluence { bone: 5, weight: 1.0 }]);
        assert_eq!(mesh.wedges[0].uv, [0.5, 0.25]);
        assert!(matches!(
            &sink[..],
            [Diagnostic::GpuSkinFallback {
                chunk: 0,
                first_vertex: 0,
                num_vertices: 3
            }]
        ));
    }

    #[test]
    fn gpu_range_outside_the_buffer_skips_the_chunk() {
        let data = gpu_only_lod_700(3);
        let mut c = ByteCursor::new(&data, Endianness::Little);
        let ctx = VersionContext::builder().format_version(700).build();
        let mut lod = decode_skeletal_lod(&mut c, &ctx, SkeletalLodParams::default()).unwrap();
        lod.chunks[0].first_vertex = 1;

        let mut sink: Vec<Diagnostic> = Vec::new();
        let mesh = reconstruct_skeletal_lod(&lod, &LodInfo::default(), &mut sink);
        assert!(mesh.wedges.is_empty());
        assert!(sink[0].is_chunk_skipped());
    }

    #[test]
    fn missing_lod_info_means_no_remapping() {
        let lods = vec![two_chunk_lod(), two_chunk_lod()];
        let infos = vec![LodInfo {
            material_map: vec![42],
        }];
        let mut sink: Vec<Diagnostic> = Vec::new();
        let meshes = reconstruct_skeletal_mesh(&lods, &infos, &mut sink);
        assert_eq!(meshes[0].sections[0].material, 42);
        assert_eq!(meshes[1].sections[0].material, 0);
    }
}

//! Skeletal mesh LOD records.
//!
//! A LOD holds its faces as sections over one index buffer, its vertices as chunks of
//! CPU rigid/smooth vertices, and a GPU skin vertex buffer that newer cooks keep instead
//! of the CPU arrays.

use tracing::{debug, trace};

use super::vertex::{
    GpuStreamFormat, RIGID_VERTEX, RIGID_VERTEX_MIN_SIZE, RawVertex, SMOOTH_VERTEX,
    SMOOTH_VERTEX_MIN_SIZE,
};
use super::{
    EDGE, EDGE_MIN_SIZE, Edge, check_count, note_default_layout, read_i16_array,
    read_skel_index_buffer, read_u8_array,
};
use crate::data::cursor::BulkDataHeader;
use crate::data::{ByteCursor, GameTag, Platform, VersionContext};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{DecodeError, DecodeResult};
use crate::schema::{Layout, Rule, RuleTable, Step, always};

/// A run of triangles sharing one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkelMeshSection {
    pub material_index: i16,
    pub chunk_index: i16,
    pub first_index: i32,
    pub num_triangles: i32,
    pub triangle_sorting: u8,
}

const SECTION_MIN_SIZE: usize = 10;

type Sec = Step<SkelMeshSection>;

pub static SKEL_MESH_SECTION: RuleTable<Layout<SkelMeshSection>> = RuleTable {
    record: "SkelMeshSection",
    rules: &[
        Rule::new(
            "pre-215",
            |ctx| ctx.format_version < 215,
            Layout::Steps(&[&[
                Sec::read("material", |c, _, s| {
                    s.material_index = c.read_i16()?;
                    Ok(())
                }),
                Sec::read("first index", |c, _, s| {
                    s.first_index = c.read_i16()? as i32;
                    Ok(())
                }),
                Sec::read("legacy fields", |c, _, _| c.skip(12)),
                Sec::read("triangles", |c, _, s| {
                    s.num_triangles = c.read_i32()?;
                    Ok(())
                }),
                Sec::read_if(
                    "legacy index list",
                    |ctx| ctx.format_version < 202,
                    |c, _, _| read_i16_array(c).map(|_| ()),
                ),
            ]]),
        ),
        Rule::new(
            "stock",
            always,
            Layout::Steps(&[&[
                Sec::read("material and chunk", |c, _, s| {
                    s.material_index = c.read_i16()?;
                    s.chunk_index = c.read_i16()?;
                    s.first_index = c.read_i32()?;
                    Ok(())
                }),
                Sec::read("triangles", |c, ctx, s| {
                    s.num_triangles = if ctx.format_version < 806 {
                        c.read_u16()? as i32
                    } else {
                        c.read_i32()?
                    };
                    Ok(())
                }),
                Sec::read_if(
                    "MagnaCarta extra",
                    |ctx| ctx.is(GameTag::MagnaCarta) && ctx.licensee_version >= 20,
                    |c, _, _| c.skip(4),
                ),
                Sec::read_if(
                    "triangle sorting",
                    |ctx| {
                        (ctx.is(GameTag::BladeNSoul) && ctx.format_version >= 571)
                            || ctx.format_version >= 599
                    },
                    |c, _, s| {
                        s.triangle_sorting = c.read_u8()?;
                        Ok(())
                    },
                ),
            ]]),
        ),
    ],
};

/// Vertices sharing one bone palette of at most 256 bones.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkinChunk {
    /// Index of this chunk's first vertex in the GPU skin buffer.
    pub first_vertex: i32,
    pub rigid_vertices: Vec<RawVertex>,
    pub smooth_vertices: Vec<RawVertex>,
    /// Palette mapping chunk-local bone indices to skeleton bones.
    pub bones: Vec<i16>,
    /// Declared counts. They can be non-zero while the CPU arrays are empty when only the
    /// GPU skin was cooked.
    pub num_rigid_vertices: i32,
    pub num_smooth_vertices: i32,
    pub max_influences: i32,
    pub num_tex_coords: Option<i32>,
}

impl SkinChunk {
    /// The CPU arrays were stripped and the vertices live only in the GPU skin.
    pub fn needs_gpu_vertices(&self) -> bool {
        (self.num_rigid_vertices as usize != self.rigid_vertices.len()
            && self.rigid_vertices.is_empty())
            || (self.num_smooth_vertices as usize != self.smooth_vertices.len()
                && self.smooth_vertices.is_empty())
    }
}

const CHUNK_MIN_SIZE: usize = 16;

type Chunk = Step<SkinChunk>;

pub static SKIN_CHUNK: RuleTable<Layout<SkinChunk>> = RuleTable {
    record: "SkinChunk",
    rules: &[Rule::new(
        "all versions",
        always,
        Layout::Steps(&[&[
            Chunk::read("first vertex", |c, _, ch| {
                ch.first_vertex = c.read_i32()?;
                Ok(())
            }),
            Chunk::read("rigid vertices", |c, ctx, ch| {
                ch.rigid_vertices = RIGID_VERTEX.decode_array(c, ctx, RIGID_VERTEX_MIN_SIZE)?;
                Ok(())
            }),
            Chunk::read("smooth vertices", |c, ctx, ch| {
                ch.smooth_vertices = SMOOTH_VERTEX.decode_array(c, ctx, SMOOTH_VERTEX_MIN_SIZE)?;
                Ok(())
            }),
            Chunk::read_if(
                "MK extra streams",
                |ctx| ctx.is(GameTag::Mk) && ctx.format_version >= 459,
                |c, _, _| {
                    skip_mk_words(c)?;
                    skip_mk_words(c)
                },
            ),
            Chunk::read("bone palette", |c, _, ch| {
                ch.bones = read_i16_array(c)?;
                Ok(())
            }),
            Chunk::read("vertex counts", |c, ctx, ch| {
                if ctx.format_version >= 333 {
                    ch.num_rigid_vertices = c.read_i32()?;
                    ch.num_smooth_vertices = c.read_i32()?;
                } else {
                    ch.num_rigid_vertices = ch.rigid_vertices.len() as i32;
                    ch.num_smooth_vertices = ch.smooth_vertices.len() as i32;
                }
                Ok(())
            }),
            Chunk::read_if(
                "ArmyOf2 extra UVs",
                |ctx| ctx.is(GameTag::ArmyOf2) && ctx.licensee_version >= 7,
                |c, _, _| c.skip_bulk_array(),
            ),
            Chunk::read_if(
                "max influences",
                |ctx| ctx.format_version >= 362,
                |c, _, ch| {
                    ch.max_influences = c.read_i32()?;
                    Ok(())
                },
            ),
            Chunk::read_if(
                "Transformers texcoord count",
                |ctx| ctx.is(GameTag::Transformers) && ctx.licensee_version >= 55,
                |c, _, ch| {
                    ch.num_tex_coords = Some(c.read_i32()?);
                    Ok(())
                },
            ),
        ]]),
    )],
};

/// Array of four 16-bit words per item, kept by MK titles next to chunks and LODs.
fn skip_mk_words(c: &mut ByteCursor<'_>) -> DecodeResult<()> {
    let count = c.read_count(8)?;
    c.skip(count * 8)
}

/// GPU skin vertex buffer.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpuSkin {
    pub format: GpuStreamFormat,
    pub vertices: Vec<RawVertex>,
}

type Gpu = Step<GpuSkin>;

fn read_gpu_vertices(
    c: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    s: &mut GpuSkin,
) -> DecodeResult<()> {
    let format = s.format;
    s.vertices = c.read_bulk_array(|c| format.read_vertex(c, ctx))?;
    trace!(kind = ?format.kind(), count = s.vertices.len(), "GPU skin vertices");
    Ok(())
}

/// Before the GPU vertex formats existed the buffer was a bulk array of smooth vertices.
const GPU_OLD: &[Gpu] = &[Gpu::read("smooth vertices", |c, ctx, s| {
    s.vertices = SMOOTH_VERTEX.decode_bulk_array(c, ctx)?;
    s.format = GpuStreamFormat::default();
    Ok(())
})];

const GPU_ARMYOF2_CHECK: &[Gpu] = &[Gpu::read_if(
    "ArmyOf2 format switch",
    |ctx| ctx.is(GameTag::ArmyOf2) && ctx.licensee_version >= 74,
    |c, ctx, _| {
        if c.read_i32()? != 0 {
            return Err(DecodeError::unsupported(
                "GpuSkin",
                ctx,
                "ArmyOf2 alternate vertex format",
            ));
        }
        Ok(())
    },
)];

const GPU_NEW: &[Gpu] = &[
    Gpu::read_if(
        "uv set count",
        |ctx| {
            (ctx.is(GameTag::MirrorEdge) && ctx.licensee_version >= 15)
                || (ctx.is(GameTag::Transformers) && ctx.licensee_version >= 55)
                || ctx.format_version >= 709
        },
        |c, _, s| {
            s.format.num_uv_sets = c.read_u32()?;
            Ok(())
        },
    ),
    Gpu::read("uv precision", |c, _, s| {
        s.format.full_precision_uvs = c.read_i32()? != 0;
        Ok(())
    }),
    Gpu::read_if(
        "packed position header",
        |ctx| ctx.format_version >= 592,
        |c, _, s| {
            s.format.packed_position = c.read_i32()? != 0;
            s.format.mesh_extension = c.read_vector()?;
            s.format.mesh_origin = c.read_vector()?;
            Ok(())
        },
    ),
    // Only console cooks and MOH2010 honor the packed flag.
    Gpu::read("packed position gate", |_, ctx, s| {
        if !(ctx.platform.is_console() || ctx.is(GameTag::Moh2010)) {
            s.format.packed_position = false;
        }
        Ok(())
    }),
    Gpu::read_if(
        "CrimeCraft uv sets",
        |ctx| ctx.is(GameTag::CrimeCraft) && ctx.licensee_version >= 2,
        |_, _, s| {
            s.format.num_uv_sets = 4;
            Ok(())
        },
    ),
    Gpu::read("vertices", read_gpu_vertices),
];

const GPU_FRONTLINES: &[Gpu] = &[
    Gpu::read("uv precision", |c, ctx, s| {
        s.format.full_precision_uvs = ctx.format_version < 493 || c.read_i32()? != 0;
        Ok(())
    }),
    Gpu::read("stream header", |c, _, s| {
        s.format.num_uv_sets = c.read_u32()?;
        // vertex size and count repeat the bulk array header
        c.skip(8)
    }),
    Gpu::read("vertices", read_gpu_vertices),
];

pub static GPU_SKIN: RuleTable<Layout<GpuSkin>> = RuleTable {
    record: "GpuSkin",
    rules: &[
        Rule::new("Huxley", |ctx| ctx.is(GameTag::Huxley), Layout::Steps(&[GPU_OLD])),
        Rule::new(
            "AVA pre-441",
            |ctx| ctx.is(GameTag::Ava) && ctx.format_version < 441,
            Layout::Steps(&[GPU_OLD]),
        ),
        Rule::new("AVA", |ctx| ctx.is(GameTag::Ava), Layout::Steps(&[GPU_NEW])),
        Rule::new(
            "Frontlines smooth vertices",
            |ctx| ctx.is(GameTag::Frontlines) && ctx.licensee_version < 11,
            Layout::Steps(&[GPU_OLD]),
        ),
        Rule::new(
            "Frontlines",
            |ctx| ctx.is(GameTag::Frontlines),
            Layout::Steps(&[GPU_FRONTLINES]),
        ),
        Rule::new(
            "pre-493 smooth vertices",
            |ctx| ctx.format_version < 493,
            Layout::Steps(&[GPU_ARMYOF2_CHECK, GPU_OLD]),
        ),
        Rule::fallback("stock", always, Layout::Steps(&[GPU_ARMYOF2_CHECK, GPU_NEW])),
    ],
};

/// Vertex influence set used by per-instance influence swapping.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexInfluences {
    pub influences: Vec<[i32; 2]>,
    pub vertex_map: Vec<InfluenceMapEntry>,
    pub sections: Vec<SkelMeshSection>,
    pub chunks: Vec<SkinChunk>,
    pub required_bones: Vec<u8>,
    pub usage: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InfluenceMapEntry {
    pub key: [i32; 2],
    pub vertices: Vec<u32>,
}

type Inf = Step<VertexInfluences>;

pub static VERTEX_INFLUENCES: RuleTable<Layout<VertexInfluences>> = RuleTable {
    record: "VertexInfluences",
    rules: &[Rule::new(
        "all versions",
        always,
        Layout::Steps(&[&[
            Inf::read("influences", |c, _, s| {
                s.influences = c.read_array(8, |c| Ok([c.read_i32()?, c.read_i32()?]))?;
                Ok(())
            }),
            Inf::read_if(
                "vertex map",
                |ctx| ctx.format_version >= 609,
                |c, ctx, s| {
                    let wide = ctx.format_version >= 808;
                    if !wide && ctx.format_version >= 806 {
                        c.read_u8()?;
                    }
                    s.vertex_map = c.read_array(12, |c| {
                        let key = [c.read_i32()?, c.read_i32()?];
                        let vertices = if wide {
                            c.read_array(4, |c| c.read_u32())?
                        } else {
                            c.read_array(2, |c| c.read_u16().map(u32::from))?
                        };
                        Ok(InfluenceMapEntry { key, vertices })
                    })?;
                    Ok(())
                },
            ),
            Inf::read_if(
                "sections and chunks",
                |ctx| ctx.format_version >= 700,
                |c, ctx, s| {
                    s.sections = SKEL_MESH_SECTION.decode_array(c, ctx, SECTION_MIN_SIZE)?;
                    s.chunks = SKIN_CHUNK.decode_array(c, ctx, CHUNK_MIN_SIZE)?;
                    Ok(())
                },
            ),
            Inf::read_if(
                "required bones",
                |ctx| ctx.format_version >= 708,
                |c, _, s| {
                    s.required_bones = read_u8_array(c)?;
                    Ok(())
                },
            ),
            Inf::read_if(
                "usage",
                |ctx| ctx.format_version >= 715,
                |c, _, s| {
                    s.usage = c.read_u8()?;
                    Ok(())
                },
            ),
        ]]),
    )],
};

/// Mesh-level inputs the LOD layout depends on but does not store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkeletalLodParams {
    /// `bHasVertexColors` from the owning mesh's properties.
    pub has_vertex_colors: bool,
}

/// One decoded skeletal LOD record.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkeletalLod {
    pub params: SkeletalLodParams,
    pub sections: Vec<SkelMeshSection>,
    pub indices: Vec<u32>,
    /// Copy of the index buffer kept by pre-686 cooks.
    pub legacy_indices: Vec<u16>,
    pub used_bones: Vec<i16>,
    pub required_bones: Vec<u8>,
    pub chunks: Vec<SkinChunk>,
    pub size: i32,
    pub num_vertices: i32,
    pub edges: Vec<Edge>,
    pub vertex_bulk: Option<BulkDataHeader>,
    pub gpu_skin: GpuSkin,
    pub influences: Vec<VertexInfluences>,
    pub vertex_colors: Vec<u32>,
}

const INFLUENCES_MIN_SIZE: usize = 4;

type Lod = Step<SkeletalLod>;

fn read_sections(
    c: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    l: &mut SkeletalLod,
) -> DecodeResult<()> {
    l.sections = SKEL_MESH_SECTION.decode_array(c, ctx, SECTION_MIN_SIZE)?;
    Ok(())
}

fn read_used_bones(
    c: &mut ByteCursor<'_>,
    _: &VersionContext,
    l: &mut SkeletalLod,
) -> DecodeResult<()> {
    l.used_bones = read_i16_array(c)?;
    Ok(())
}

fn read_chunks(
    c: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    l: &mut SkeletalLod,
) -> DecodeResult<()> {
    l.chunks = SKIN_CHUNK.decode_array(c, ctx, CHUNK_MIN_SIZE)?;
    Ok(())
}

fn read_num_vertices(
    c: &mut ByteCursor<'_>,
    _: &VersionContext,
    l: &mut SkeletalLod,
) -> DecodeResult<()> {
    l.num_vertices = c.read_i32()?;
    Ok(())
}

fn read_size(c: &mut ByteCursor<'_>, _: &VersionContext, l: &mut SkeletalLod) -> DecodeResult<()> {
    l.size = c.read_i32()?;
    Ok(())
}

fn read_vertex_bulk(
    c: &mut ByteCursor<'_>,
    _: &VersionContext,
    l: &mut SkeletalLod,
) -> DecodeResult<()> {
    l.vertex_bulk = Some(c.skip_bulk_data()?);
    Ok(())
}

fn read_gpu_skin(
    c: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    l: &mut SkeletalLod,
) -> DecodeResult<()> {
    l.gpu_skin = GPU_SKIN.decode(c, ctx)?;
    Ok(())
}

fn read_influences(
    c: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    l: &mut SkeletalLod,
) -> DecodeResult<()> {
    l.influences = VERTEX_INFLUENCES.decode_array(c, ctx, INFLUENCES_MIN_SIZE)?;
    Ok(())
}

fn read_required_bones(
    c: &mut ByteCursor<'_>,
    _: &VersionContext,
    l: &mut SkeletalLod,
) -> DecodeResult<()> {
    l.required_bones = read_u8_array(c)?;
    Ok(())
}

const LOD_HEAD: &[Lod] = &[
    Lod::read_if(
        "Fury end offset",
        |ctx| ctx.is(GameTag::Fury) && ctx.licensee_version >= 8,
        |c, _, _| c.skip(4),
    ),
    Lod::read("sections", read_sections),
];

const LOD_INDICES: &[Lod] = &[
    Lod::read("index buffer", |c, ctx, l| {
        l.indices = read_skel_index_buffer(c, ctx)?;
        Ok(())
    }),
    Lod::read_if(
        "legacy CPU vertices",
        |ctx| ctx.format_version < 215,
        |c, ctx, _| {
            let smooth = SMOOTH_VERTEX.decode_array(c, ctx, SMOOTH_VERTEX_MIN_SIZE)?;
            let rigid = RIGID_VERTEX.decode_array(c, ctx, RIGID_VERTEX_MIN_SIZE)?;
            debug!(smooth = smooth.len(), rigid = rigid.len(), "discarding legacy LOD vertices");
            Ok(())
        },
    ),
];

const LOD_BONES_AND_CHUNKS: &[Lod] = &[
    Lod::read_if(
        "legacy index copy",
        |ctx| ctx.format_version < 686,
        |c, _, l| {
            l.legacy_indices = c.read_array(2, |c| c.read_u16())?;
            Ok(())
        },
    ),
    Lod::read("used bones", read_used_bones),
    Lod::read_if(
        "legacy triangle flags",
        |ctx| ctx.format_version < 686,
        |c, _, _| read_u8_array(c).map(|_| ()),
    ),
    Lod::read_if("chunks", |ctx| ctx.format_version >= 215, read_chunks),
    Lod::read_if("size", |ctx| ctx.format_version >= 215, read_size),
    Lod::read_if("vertex count", |ctx| ctx.format_version >= 215, read_num_vertices),
    Lod::read_if(
        "Frontlines extra",
        |ctx| ctx.is(GameTag::Frontlines) && ctx.licensee_version >= 11,
        |c, _, _| c.skip(4),
    ),
    Lod::read_if(
        "edges",
        |ctx| ctx.format_version < 686,
        |c, ctx, l| {
            l.edges = EDGE.decode_array(c, ctx, EDGE_MIN_SIZE)?;
            Ok(())
        },
    ),
];

const LOD_REFINED_BONES: &[Lod] = &[
    Lod::read("used bones", read_used_bones),
    Lod::read("chunks", read_chunks),
    Lod::read("size", read_size),
    Lod::read("vertex count", read_num_vertices),
];

const LOD_TRANSFORMERS_BONES: &[Lod] = &[
    Lod::read("byte used bones", |c, _, l| {
        l.used_bones = read_u8_array(c)?.into_iter().map(i16::from).collect();
        Ok(())
    }),
    Lod::read("chunks", read_chunks),
    Lod::read("vertex count", read_num_vertices),
];

/// Stranglehold moved the required bone list after the GPU skin.
const LOD_STRANGLE_TAIL: &[Lod] = &[
    Lod::read("vertex bulk data", read_vertex_bulk),
    Lod::read("gpu skin", read_gpu_skin),
    Lod::read("required bones", read_required_bones),
];

const LOD_BULK: &[Lod] = &[
    Lod::read("required bones", |c, ctx, l| {
        if ctx.format_version >= 207 {
            l.required_bones = read_u8_array(c)?;
        } else {
            read_i16_array(c)?;
        }
        Ok(())
    }),
    Lod::read_if("APB bulk seek", |ctx| ctx.is(GameTag::Apb), |c, _, _| c.skip(8)),
    Lod::read_if(
        "vertex bulk data",
        |ctx| !ctx.is(GameTag::Apb) && ctx.format_version >= 221,
        read_vertex_bulk,
    ),
    Lod::read_if(
        "R6 Vegas 2 extra",
        |ctx| ctx.is(GameTag::R6Vegas2) && ctx.licensee_version >= 46,
        |c, ctx, _| {
            let item = if ctx.licensee_version >= 47 { 6 } else { 5 };
            let count = c.read_count(item)?;
            c.skip(count * item)
        },
    ),
    Lod::read_if(
        "ArmyOf2 extra UVs",
        |ctx| ctx.is(GameTag::ArmyOf2) && ctx.licensee_version >= 7,
        |c, _, _| {
            c.skip(4)?;
            c.skip_bulk_array()
        },
    ),
    Lod::read_if("unknown flag", |ctx| ctx.format_version >= 709, |c, _, _| c.skip(4)),
];

const LOD_GPU: &[Lod] = &[
    Lod::read_if(
        "Fury GPU skin extra",
        |ctx| ctx.is(GameTag::Fury) && ctx.licensee_version >= 34,
        |c, _, _| c.skip(4),
    ),
    Lod::read_if("gpu skin", |ctx| ctx.format_version >= 333, read_gpu_skin),
    Lod::read_if(
        "MK extra stream",
        |ctx| ctx.is(GameTag::Mk) && ctx.format_version >= 459,
        |c, _, _| skip_mk_words(c),
    ),
];

/// MOH2010 is a partially upgraded engine whose GPU skin and influences are laid out as
/// in format 592.
const LOD_MOH2010_GPU: &[Lod] = &[
    Lod::read_if("influences", |ctx| ctx.licensee_version >= 42, read_influences)
        .with_format_version(592),
    Lod::read("gpu skin", read_gpu_skin).with_format_version(592),
    Lod::stop_if("later MOH2010 cooks end here", |ctx| ctx.licensee_version >= 42),
];

const LOD_EARLY_EXITS: &[Lod] = &[
    Lod::stop_if("BloodOnSand ends here", |ctx| ctx.is(GameTag::BloodOnSand)),
    Lod::stop_if("Mirror's Edge ends here", |ctx| {
        ctx.is(GameTag::MirrorEdge) && ctx.licensee_version >= 15
    }),
    Lod::read_if(
        "Transformers extra stream",
        |ctx| ctx.is(GameTag::Transformers) && ctx.licensee_version >= 73,
        |c, _, _| skip_transformers_stream(c),
    ),
    Lod::stop_if("Transformers ends here", |ctx| {
        ctx.is(GameTag::Transformers) && ctx.licensee_version >= 73
    }),
];

const LOD_TAIL: &[Lod] = &[
    Lod::read_if_record(
        "vertex colors",
        |ctx, l| ctx.format_version >= 710 && l.params.has_vertex_colors,
        |c, _, l| {
            l.vertex_colors = c.read_bulk_array(|c| c.read_u32())?;
            Ok(())
        },
    ),
    Lod::read_if("influences", |ctx| ctx.format_version >= 534, read_influences),
];

/// Item size and count followed by a bulk array when both are non-zero.
pub(crate) fn skip_transformers_stream(c: &mut ByteCursor<'_>) -> DecodeResult<()> {
    let item_size = c.read_i32()?;
    let count = c.read_i32()?;
    if item_size != 0 && count != 0 {
        c.skip_bulk_array()?;
    }
    Ok(())
}

pub static SKELETAL_LOD: RuleTable<Layout<SkeletalLod>> = RuleTable {
    record: "SkeletalLod",
    rules: &[
        Rule::new(
            "MK PS3 without index buffer",
            |ctx| ctx.is(GameTag::Mk) && ctx.format_version >= 472 && ctx.platform == Platform::Ps3,
            Layout::Steps(&[
                LOD_HEAD,
                LOD_BONES_AND_CHUNKS,
                LOD_BULK,
                LOD_GPU,
                LOD_EARLY_EXITS,
                LOD_TAIL,
            ]),
        ),
        Rule::new(
            "EndWar and Borderlands",
            |ctx| ctx.is(GameTag::EndWar) || ctx.is(GameTag::Borderlands),
            Layout::Steps(&[
                LOD_HEAD,
                LOD_INDICES,
                LOD_REFINED_BONES,
                LOD_BULK,
                LOD_GPU,
                LOD_EARLY_EXITS,
                LOD_TAIL,
            ]),
        ),
        Rule::new(
            "Transformers byte bones",
            |ctx| ctx.is(GameTag::Transformers) && ctx.format_version >= 536,
            Layout::Steps(&[
                LOD_HEAD,
                LOD_INDICES,
                LOD_TRANSFORMERS_BONES,
                LOD_BULK,
                LOD_GPU,
                LOD_EARLY_EXITS,
                LOD_TAIL,
            ]),
        ),
        Rule::new(
            "Stranglehold",
            |ctx| ctx.is(GameTag::Strangle),
            Layout::Steps(&[LOD_HEAD, LOD_INDICES, LOD_BONES_AND_CHUNKS, LOD_STRANGLE_TAIL]),
        ),
        Rule::new(
            "MOH2010",
            |ctx| ctx.is(GameTag::Moh2010),
            Layout::Steps(&[
                LOD_HEAD,
                LOD_INDICES,
                LOD_BONES_AND_CHUNKS,
                LOD_BULK,
                LOD_MOH2010_GPU,
                LOD_EARLY_EXITS,
                LOD_TAIL,
            ]),
        ),
        Rule::new(
            "pre-202 lazy arrays",
            |ctx| ctx.format_version < 202,
            Layout::Unsupported("LOD stores its mesh in lazy arrays"),
        ),
        Rule::fallback(
            "stock",
            always,
            Layout::Steps(&[
                LOD_HEAD,
                LOD_INDICES,
                LOD_BONES_AND_CHUNKS,
                LOD_BULK,
                LOD_GPU,
                LOD_EARLY_EXITS,
                LOD_TAIL,
            ]),
        ),
    ],
};

const LOD_MIN_SIZE: usize = 8;

/// Read the count-prefixed LOD array of a skeletal mesh.
///
/// Counts that usually agree but are known to differ in shipped data are reported as
/// [`Diagnostic::CountMismatch`] instead of failing the mesh.
pub fn decode_skeletal_lods(
    cursor: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    params: SkeletalLodParams,
    sink: &mut dyn DiagnosticSink,
) -> DecodeResult<Vec<SkeletalLod>> {
    note_default_layout(&SKELETAL_LOD, ctx, sink);
    let layout = SKELETAL_LOD.resolve_value(ctx)?;
    let count = cursor.read_count(LOD_MIN_SIZE)?;
    let mut lods = Vec::with_capacity(count);
    for index in 0..count {
        let start = cursor.tell();
        let mut lod = SkeletalLod {
            params,
            ..SkeletalLod::default()
        };
        layout.execute(SKELETAL_LOD.record, cursor, ctx, &mut lod)?;
        debug!(
            index,
            start,
            end = cursor.tell(),
            sections = lod.sections.len(),
            chunks = lod.chunks.len(),
            gpu_vertices = lod.gpu_skin.vertices.len(),
            "skeletal LOD"
        );

        if !lod.legacy_indices.is_empty() {
            check_count(
                sink,
                SKELETAL_LOD.record,
                "legacy index copy length",
                lod.indices.len(),
                lod.legacy_indices.len(),
            );
        }
        if let Some(bulk) = lod.vertex_bulk.filter(|b| b.is_inline()) {
            check_count(
                sink,
                SKELETAL_LOD.record,
                "vertex bulk element count",
                lod.num_vertices.max(0) as usize,
                bulk.element_count.max(0) as usize,
            );
        }
        if !lod.vertex_colors.is_empty() {
            sink.report(Diagnostic::ExtraData {
                record: SKELETAL_LOD.record.to_string(),
                detail: format!("{} vertex colors", lod.vertex_colors.len()),
            });
        }
        lods.push(lod);
    }
    Ok(lods)
}

/// Decode one LOD without the array prefix.
pub fn decode_skeletal_lod(
    cursor: &mut ByteCursor<'_>,
    ctx: &VersionContext,
    params: SkeletalLodParams,
) -> DecodeResult<SkeletalLod> {
    let mut lod = SkeletalLod {
        params,
        ..SkeletalLod::default()
    };
    SKELETAL_LOD.decode_into(cursor, ctx, &mut lod)?;
    Ok(lod)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::codecs::{PackedNormal, Vector3};
    use crate::test_util::ByteWriter;
    use winnow::binary::Endianness;

    fn ctx(format_version: i32) -> VersionContext {
        VersionContext::builder().format_version(format_version).build()
    }

    /// One GPU float vertex for format 592 and later: two normals, influences, position,
    /// one float UV set.
    pub(crate) fn gpu_float_vertex(w: ByteWriter, position: Vector3, bone: u8) -> ByteWriter {
        w.normal(PackedNormal(0x0080_8080))
            .normal(PackedNormal(0x00FF_8080))
            .bytes(&[bone, 0, 0, 0, 255, 0, 0, 0])
            .vec3(position)
            .f32(0.5)
            .f32(0.25)
    }

    /// A format 700 LOD with one section, one GPU-only chunk of three rigid vertices and
    /// a float GPU skin.
    pub(crate) fn gpu_only_lod_700(num_vertices: i32) -> Vec<u8> {
        let mut w = ByteWriter::new()
            // sections
            .i32(1)
            .i16(0)
            .i16(0)
            .i32(0)
            .u16(1)
            .u8(0)
            // index buffer
            .i32(2)
            .i32(3)
            .u16(0)
            .u16(1)
            .u16(2)
            // used bones
            .i32(1)
            .i16(5)
            // chunks
            .i32(1)
            .i32(0)
            .i32(0)
            .i32(0)
            .i32(1)
            .i16(5)
            .i32(3)
            .i32(0)
            .i32(4)
            // size, vertex count
            .i32(0)
            .i32(num_vertices)
            // required bones
            .i32(1)
            .u8(5)
            // vertex bulk data
            .u32(0)
            .i32(3)
            .i32(6)
            .i32(0)
            .zeros(6)
            // GPU skin: precision, packed header
            .i32(1)
            .i32(0)
            .vec3(Vector3::ZERO)
            .vec3(Vector3::ZERO)
            .i32(36)
            .i32(3);
        for x in [0.0f32, 1.0, 2.0] {
            w = gpu_float_vertex(w, Vector3::new(x, 0.0, 0.0), 0);
        }
        // influences
        w.i32(0).finish()
    }

    #[test]
    fn section_triangle_count_widens_at_806() {
        let data = ByteWriter::new().i16(1).i16(0).i32(6).u16(2).u8(1).finish();
        let mut c = ByteCursor::new(&data, Endianness::Little);
        let s = SKEL_MESH_SECTION.decode(&mut c, &ctx(600)).unwrap();
        assert_eq!(
            (s.material_index, s.first_index, s.num_triangles, s.triangle_sorting),
            (1, 6, 2, 1)
        );

        let data = ByteWriter::new().i16(1).i16(0).i32(6).i32(70000).u8(0).finish();
        let mut c = ByteCursor::new(&data, Endianness::Little);
        let s = SKEL_MESH_SECTION.decode(&mut c, &ctx(806)).unwrap();
        assert_eq!(s.num_triangles, 70000);
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn legacy_section_layout() {
        let data = ByteWriter::new()
            .i16(2)
            .i16(30)
            .zeros(12)
            .i32(10)
            .i32(0)
            .finish();
        let mut c = ByteCursor::new(&data, Endianness::Little);
        let s = SKEL_MESH_SECTION.decode(&mut c, &ctx(200)).unwrap();
        assert_eq!((s.material_index, s.first_index, s.num_triangles), (2, 30, 10));
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn chunk_counts_fall_back_to_array_lengths() {
        let data = ByteWriter::new()
            .i32(0)
            .i32(0)
            .i32(0)
            .i32(2)
            .i16(3)
            .i16(4)
            .finish();
        let mut c = ByteCursor::new(&data, Endianness::Little);
        let chunk = SKIN_CHUNK.decode(&mut c, &ctx(300)).unwrap();
        assert_eq!(chunk.bones, vec![3, 4]);
        assert_eq!((chunk.num_rigid_vertices, chunk.num_smooth_vertices), (0, 0));
        assert!(!chunk.needs_gpu_vertices());
    }

    #[test]
    fn packed_positions_are_ignored_on_pc() {
        let w = ByteWriter::new()
            .i32(1)
            .i32(1)
            .vec3(Vector3::new(1.0, 1.0, 1.0))
            .vec3(Vector3::ZERO)
            .i32(36)
            .i32(1);
        let data = gpu_float_vertex(w, Vector3::new(3.0, 0.0, 0.0), 0).finish();
        let mut c = ByteCursor::new(&data, Endianness::Little);
        let skin = GPU_SKIN.decode(&mut c, &ctx(600)).unwrap();
        assert!(!skin.format.packed_position);
        assert_eq!(skin.vertices[0].position, Vector3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn console_packed_positions() {
        let xbox = VersionContext::builder()
            .format_version(600)
            .platform(Platform::Xbox360)
            .build();
        // 36-byte float vertices shrink to 28 bytes with a packed position.
        let data = {
            let mut w = ByteWriter::new();
            for v in [1i32, 1] {
                w = w.bytes(&v.to_be_bytes());
            }
            for f in [2.0f32, 2.0, 2.0, 1.0, 1.0, 1.0] {
                w = w.bytes(&f.to_be_bytes());
            }
            w = w.bytes(&28i32.to_be_bytes()).bytes(&1i32.to_be_bytes());
            w = w.zeros(8).bytes(&[0, 0, 0, 0, 255, 0, 0, 0]);
            w = w.bytes(&0u32.to_be_bytes());
            w.bytes(&0f32.to_be_bytes()).bytes(&0f32.to_be_bytes()).finish()
        };
        let mut c = ByteCursor::for_context(&data, &xbox);
        let skin = GPU_SKIN.decode(&mut c, &xbox).unwrap();
        assert!(skin.format.packed_position);
        assert_eq!(skin.vertices[0].position, Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn old_gpu_skin_is_smooth_vertices() {
        let w = ByteWriter::new().i32(40).i32(1).vec3(Vector3::new(1.0, 0.0, 0.0));
        let data = w
            .zeros(12)
            .f32(0.0)
            .f32(1.0)
            .bytes(&[0, 0, 0, 0, 255, 0, 0, 0])
            .finish();
        let mut c = ByteCursor::new(&data, Endianness::Little);
        let skin = GPU_SKIN.decode(&mut c, &ctx(400)).unwrap();
        assert_eq!(skin.vertices.len(), 1);
        assert_eq!(skin.vertices[0].uv, [0.0, 1.0]);
        assert!(skin.format.full_precision_uvs);
    }

    #[test]
    fn stock_lod_decodes_to_the_end() {
        let data = gpu_only_lod_700(3);
        let mut c = ByteCursor::new(&data, Endianness::Little);
        let lod = decode_skeletal_lod(&mut c, &ctx(700), SkeletalLodParams::default()).unwrap();
        assert_eq!(c.remaining(), 0);
        assert_eq!(lod.indices, vec![0, 1, 2]);
        assert_eq!(lod.chunks.len(), 1);
        assert!(lod.chunks[0].needs_gpu_vertices());
        assert_eq!(lod.gpu_skin.vertices.len(), 3);
        assert_eq!(lod.gpu_skin.vertices[2].position.x, 2.0);
        assert_eq!(lod.vertex_bulk.map(|b| b.element_count), Some(3));
    }

    #[test]
    fn moh2010_gpu_skin_uses_format_592() {
        let moh = VersionContext::builder()
            .format_version(575)
            .licensee_version(10)
            .game(GameTag::Moh2010)
            .build();
        // At 575 the stock layout would read the position before the normals.
        let w = ByteWriter::new()
            .i32(1)
            .i32(0)
            .vec3(Vector3::ZERO)
            .vec3(Vector3::ZERO)
            .i32(36)
            .i32(1);
        let data = gpu_float_vertex(w, Vector3::new(7.0, 8.0, 9.0), 0).finish();
        let mut c = ByteCursor::new(&data, Endianness::Little);
        let mut lod = SkeletalLod::default();
        let gpu = Layout::Steps(&[LOD_MOH2010_GPU]);
        gpu.execute("SkeletalLod", &mut c, &moh, &mut lod).unwrap();
        assert_eq!(lod.gpu_skin.vertices[0].position, Vector3::new(7.0, 8.0, 9.0));
        assert_eq!(moh.format_version, 575);
    }

    #[test]
    fn vertex_colors_follow_the_mesh_flag() {
        let data = ByteWriter::new().i32(4).i32(1).u32(0xFFAA_BBCC).i32(0).finish();
        let tail = Layout::Steps(&[LOD_TAIL]);

        let mut c = ByteCursor::new(&data, Endianness::Little);
        let mut lod = SkeletalLod {
            params: SkeletalLodParams {
                has_vertex_colors: true,
            },
            ..SkeletalLod::default()
        };
        tail.execute("SkeletalLod", &mut c, &ctx(710), &mut lod).unwrap();
        assert_eq!(lod.vertex_colors, vec![0xFFAA_BBCC]);
        assert_eq!(c.remaining(), 0);

        let data = ByteWriter::new().i32(0).finish();
        let mut c = ByteCursor::new(&data, Endianness::Little);
        let mut lod = SkeletalLod::default();
        tail.execute("SkeletalLod", &mut c, &ctx(710), &mut lod).unwrap();
        assert!(lod.vertex_colors.is_empty());
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn ancient_lods_are_unsupported() {
        let data = [0u8; 64];
        let mut c = ByteCursor::new(&data, Endianness::Little);
        let err = decode_skeletal_lod(&mut c, &ctx(180), SkeletalLodParams::default()).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedLayout { record: "SkeletalLod", .. }));
    }

    #[test]
    fn mismatched_counts_are_warnings() {
        // the LOD declares 4 vertices while its bulk header holds 3
        let mut data = ByteWriter::new().i32(1).finish();
        data.extend(gpu_only_lod_700(4));
        let mut c = ByteCursor::new(&data, Endianness::Little);
        let mut sink: Vec<Diagnostic> = Vec::new();
        let lods = decode_skeletal_lods(&mut c, &ctx(700), SkeletalLodParams::default(), &mut sink)
            .unwrap();
        assert_eq!(lods[0].num_vertices, 4);
        assert!(sink.iter().any(|d| d.is_count_mismatch()));
    }
}

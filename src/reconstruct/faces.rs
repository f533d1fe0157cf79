use tracing::warn;

use super::{Face, MeshSection};
use crate::diagnostics::{Diagnostic, DiagnosticSink};

/// One section's slice of a LOD index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceSource {
    pub material: i32,
    pub first_index: i32,
    pub num_triangles: i32,
}

impl FaceSource {
    /// Index range of the section, or `None` when it does not fit `index_count`.
    fn range(&self, index_count: usize) -> Option<std::ops::Range<usize>> {
        let first = usize::try_from(self.first_index).ok()?;
        let count = usize::try_from(self.num_triangles).ok()?.checked_mul(3)?;
        let end = first.checked_add(count)?;
        (end <= index_count).then_some(first..end)
    }
}

/// Build faces section by section from consecutive index triples, keeping their
/// order and winding.
///
/// A section whose range leaves the index buffer is reported as
/// [`Diagnostic::SectionMismatch`] and skipped. Faces naming a vertex at or past
/// `num_vertices` are dropped, and the section is reported with a
/// [`Diagnostic::CountMismatch`] on its face count.
pub fn build_faces(
    sources: &[FaceSource],
    indices: &[u32],
    num_vertices: usize,
    sink: &mut dyn DiagnosticSink,
) -> (Vec<Face>, Vec<MeshSection>) {
    let mut faces = Vec::new();
    let mut sections = Vec::with_capacity(sources.len());

    for (section_index, source) in sources.iter().enumerate() {
        let Some(range) = source.range(indices.len()) else {
            sink.report(Diagnostic::SectionMismatch {
                section: section_index,
                first_index: source.first_index,
                num_triangles: source.num_triangles,
                index_count: indices.len(),
            });
            continue;
        };

        let first_face = faces.len();
        let mut rejected = 0usize;
        for tri in indices[range].chunks_exact(3) {
            let wedges = [tri[0], tri[1], tri[2]];
            if let Some(bad) = wedges.iter().find(|&&w| w as usize >= num_vertices) {
                if rejected == 0 {
                    warn!(
                        section = section_index,
                        index = *bad,
                        num_vertices,
                        "face references a missing vertex"
                    );
                }
                rejected += 1;
                continue;
            }
            faces.push(Face {
                wedges,
                material: source.material,
            });
        }

        let num_faces = faces.len() - first_face;
        if rejected > 0 {
            sink.report(Diagnostic::CountMismatch {
                record: format!("section {section_index}"),
                what: "faces".to_string(),
                expected: num_faces + rejected,
                actual: num_faces,
            });
        }
        sections.push(MeshSection {
            material: source.material,
            first_face,
            num_faces,
        });
    }

    (faces, sections)
}

//! Recoverable problems found while decoding.
//!
//! None of these stop the asset from decoding. Each one is handed to a
//! [`DiagnosticSink`] and logged through `tracing` when it is reported.

use std::fmt;

use tracing::{debug, warn};
use variantly::Variantly;

use crate::data::VersionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackChannel {
    Translation,
    Rotation,
}

impl fmt::Display for TrackChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackChannel::Translation => f.write_str("translation"),
            TrackChannel::Rotation => f.write_str("rotation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Variantly)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Diagnostic {
    /// The cursor did not land on a track's declared offset. Decoding continued from the
    /// declared offset.
    ReconstructionHole {
        sequence: String,
        track: usize,
        channel: TrackChannel,
        declared: usize,
        actual: usize,
    },
    /// A licensee title was decoded with the stock engine layout.
    DefaultLayout {
        record: String,
        rule: String,
        context: VersionContext,
    },
    /// A section's index range falls outside the index buffer. The section was dropped.
    SectionMismatch {
        section: usize,
        first_index: i32,
        num_triangles: i32,
        index_count: usize,
    },
    /// Two counts that normally agree do not.
    CountMismatch {
        record: String,
        what: String,
        expected: usize,
        actual: usize,
    },
    ChunkSkipped {
        chunk: usize,
        reason: String,
    },
    TrackSkipped {
        sequence: String,
        track: usize,
        reason: String,
    },
    SequenceSkipped {
        sequence: String,
        reason: String,
    },
    /// A chunk had no CPU vertices and was rebuilt from the GPU skin buffer.
    GpuSkinFallback {
        chunk: usize,
        first_vertex: i32,
        num_vertices: i32,
    },
    /// Data that was decoded but has no place in the output model.
    ExtraData {
        record: String,
        detail: String,
    },
}

impl Diagnostic {
    /// Variant name, for grouping.
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::ReconstructionHole { .. } => "ReconstructionHole",
            Diagnostic::DefaultLayout { .. } => "DefaultLayout",
            Diagnostic::SectionMismatch { .. } => "SectionMismatch",
            Diagnostic::CountMismatch { .. } => "CountMismatch",
            Diagnostic::ChunkSkipped { .. } => "ChunkSkipped",
            Diagnostic::TrackSkipped { .. } => "TrackSkipped",
            Diagnostic::SequenceSkipped { .. } => "SequenceSkipped",
            Diagnostic::GpuSkinFallback { .. } => "GpuSkinFallback",
            Diagnostic::ExtraData { .. } => "ExtraData",
        }
    }

    /// Emit through `tracing`. Informational variants go to `debug!`, the rest to `warn!`.
    pub fn log(&self) {
        match self {
            Diagnostic::ReconstructionHole {
                sequence,
                track,
                channel,
                declared,
                actual,
            } => {
                let gap = *declared as i64 - *actual as i64;
                warn!(
                    %sequence,
                    track,
                    %channel,
                    declared,
                    actual,
                    gap,
                    "hole in compressed animation stream"
                );
            }
            Diagnostic::DefaultLayout { record, rule, context } => {
                debug!(%record, %rule, %context, "decoding licensee record with default layout");
            }
            Diagnostic::SectionMismatch {
                section,
                first_index,
                num_triangles,
                index_count,
            } => {
                warn!(
                    section,
                    first_index,
                    num_triangles,
                    index_count,
                    "section index range exceeds index buffer"
                );
            }
            Diagnostic::CountMismatch {
                record,
                what,
                expected,
                actual,
            } => {
                warn!(%record, %what, expected, actual, "count mismatch");
            }
            Diagnostic::ChunkSkipped { chunk, reason } => {
                warn!(chunk, %reason, "skipping chunk");
            }
            Diagnostic::TrackSkipped {
                sequence,
                track,
                reason,
            } => {
                warn!(%sequence, track, %reason, "skipping track");
            }
            Diagnostic::SequenceSkipped { sequence, reason } => {
                warn!(%sequence, %reason, "skipping sequence");
            }
            Diagnostic::GpuSkinFallback {
                chunk,
                first_vertex,
                num_vertices,
            } => {
                debug!(chunk, first_vertex, num_vertices, "restoring chunk vertices from GPU skin");
            }
            Diagnostic::ExtraData { record, detail } => {
                debug!(%record, %detail, "extra data");
            }
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ReconstructionHole {
                sequence,
                track,
                channel,
                declared,
                actual,
            } => write!(
                f,
                "{sequence}: {channel} track {track} declared at 0x{declared:X}, cursor at 0x{actual:X}"
            ),
            Diagnostic::DefaultLayout { record, rule, context } => {
                write!(f, "{record}: {context} decoded with the {rule} layout")
            }
            Diagnostic::SectionMismatch {
                section,
                first_index,
                num_triangles,
                index_count,
            } => write!(
                f,
                "section {section}: {num_triangles} triangles from index {first_index} exceed {index_count} indices"
            ),
            Diagnostic::CountMismatch {
                record,
                what,
                expected,
                actual,
            } => write!(f, "{record}: {what} is {actual}, expected {expected}"),
            Diagnostic::ChunkSkipped { chunk, reason } => {
                write!(f, "chunk {chunk} skipped: {reason}")
            }
            Diagnostic::TrackSkipped {
                sequence,
                track,
                reason,
            } => write!(f, "{sequence}: track {track} skipped: {reason}"),
            Diagnostic::SequenceSkipped { sequence, reason } => {
                write!(f, "{sequence} skipped: {reason}")
            }
            Diagnostic::GpuSkinFallback {
                chunk,
                first_vertex,
                num_vertices,
            } => write!(
                f,
                "chunk {chunk}: {num_vertices} vertices from GPU skin starting at {first_vertex}"
            ),
            Diagnostic::ExtraData { record, detail } => write!(f, "{record}: {detail}"),
        }
    }
}

/// Receives diagnostics as they are found.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Logs and keeps every diagnostic.
impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        diagnostic.log();
        self.push(diagnostic);
    }
}

/// Logs diagnostics without keeping them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        diagnostic.log();
    }
}

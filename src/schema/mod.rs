//! Declarative layout selection.
//!
//! Every record type that changed shape across format revisions or licensee forks is
//! described by a [`RuleTable`]: an ordered list of `(predicate, value)` rows evaluated
//! top to bottom, first match wins. For byte layouts the value is a [`Layout`], a fixed
//! sequence of [`Step`]s that each may be gated on the context or on what the record has
//! decoded so far. Tables are plain `static` data, so resolution has no hidden state.

use tracing::{debug, trace};

use crate::data::{ByteCursor, VersionContext};
use crate::error::{DecodeError, DecodeResult};

pub type Predicate = fn(&VersionContext) -> bool;
pub type RecordPredicate<T> = fn(&VersionContext, &T) -> bool;
pub type ReadFn<T> = fn(&mut ByteCursor<'_>, &VersionContext, &mut T) -> DecodeResult<()>;

/// Matches every context. Used for the last row of a table.
pub fn always(_: &VersionContext) -> bool {
    true
}

pub enum Presence<T> {
    Always,
    If(Predicate),
    /// Gated on the context and the partially decoded record.
    IfRecord(RecordPredicate<T>),
}

impl<T> Presence<T> {
    fn test(&self, ctx: &VersionContext, record: &T) -> bool {
        match self {
            Presence::Always => true,
            Presence::If(pred) => pred(ctx),
            Presence::IfRecord(pred) => pred(ctx, record),
        }
    }
}

impl<T> Clone for Presence<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Presence<T> {}

pub enum Action<T> {
    Read(ReadFn<T>),
    /// Ends the layout. Remaining steps are not evaluated.
    Stop,
}

impl<T> Clone for Action<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Action<T> {}

/// One field (or group of fields) of a layout.
pub struct Step<T> {
    pub name: &'static str,
    pub presence: Presence<T>,
    pub action: Action<T>,
    /// Round the cursor up to this multiple once the step has run.
    pub align: Option<usize>,
    /// Run the step as if the record had been written by this format version.
    pub format_version: Option<i32>,
}

impl<T> Clone for Step<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Step<T> {}

impl<T> Step<T> {
    const fn new(name: &'static str, presence: Presence<T>, action: Action<T>) -> Self {
        Step {
            name,
            presence,
            action,
            align: None,
            format_version: None,
        }
    }

    pub const fn read(name: &'static str, read: ReadFn<T>) -> Self {
        Self::new(name, Presence::Always, Action::Read(read))
    }

    pub const fn read_if(name: &'static str, when: Predicate, read: ReadFn<T>) -> Self {
        Self::new(name, Presence::If(when), Action::Read(read))
    }

    pub const fn read_if_record(
        name: &'static str,
        when: RecordPredicate<T>,
        read: ReadFn<T>,
    ) -> Self {
        Self::new(name, Presence::IfRecord(when), Action::Read(read))
    }

    pub const fn stop_if(name: &'static str, when: Predicate) -> Self {
        Self::new(name, Presence::If(when), Action::Stop)
    }

    pub const fn aligned(self, n: usize) -> Self {
        Step {
            align: Some(n),
            ..self
        }
    }

    pub const fn with_format_version(self, format_version: i32) -> Self {
        Step {
            format_version: Some(format_version),
            ..self
        }
    }
}

pub enum Layout<T: 'static> {
    /// Segments are concatenated in order. Splitting a layout into segments lets rows
    /// share a common head or tail.
    Steps(&'static [&'static [Step<T>]]),
    /// The combination is known but cannot be decoded.
    Unsupported(&'static str),
}

impl<T: 'static> Layout<T> {
    /// Drive `cursor` through the layout, filling `out`.
    pub fn execute(
        &self,
        record: &'static str,
        cursor: &mut ByteCursor<'_>,
        ctx: &VersionContext,
        out: &mut T,
    ) -> DecodeResult<()> {
        let segments = match self {
            Layout::Steps(segments) => segments,
            Layout::Unsupported(reason) => {
                return Err(DecodeError::unsupported(record, ctx, *reason));
            }
        };

        let mut local = *ctx;
        for step in segments.iter().flat_map(|segment| segment.iter()) {
            if !step.presence.test(&local, out) {
                continue;
            }
            let read = match step.action {
                Action::Read(read) => read,
                Action::Stop => {
                    trace!(record, step = step.name, "layout stops");
                    return Ok(());
                }
            };

            let start = cursor.tell();
            match step.format_version {
                Some(format_version) => {
                    let guard = local.override_format_version(format_version);
                    read(cursor, &guard, out)?;
                }
                None => read(cursor, &local, out)?,
            }
            if let Some(n) = step.align {
                cursor.align(n)?;
            }
            trace!(record, step = step.name, start, end = cursor.tell());
        }
        Ok(())
    }
}

pub struct Rule<P: 'static> {
    pub name: &'static str,
    pub when: Predicate,
    pub value: P,
    /// Catch-all row for contexts no title-specific row claims.
    pub fallback: bool,
}

impl<P: 'static> Rule<P> {
    pub const fn new(name: &'static str, when: Predicate, value: P) -> Self {
        Rule {
            name,
            when,
            value,
            fallback: false,
        }
    }

    pub const fn fallback(name: &'static str, when: Predicate, value: P) -> Self {
        Rule {
            name,
            when,
            value,
            fallback: true,
        }
    }
}

pub struct RuleTable<P: 'static> {
    pub record: &'static str,
    pub rules: &'static [Rule<P>],
}

impl<P: 'static> RuleTable<P> {
    /// First row whose predicate accepts `ctx`.
    pub fn resolve(&self, ctx: &VersionContext) -> DecodeResult<&'static Rule<P>> {
        let rules: &'static [Rule<P>] = self.rules;
        let Some(rule) = rules.iter().find(|rule| (rule.when)(ctx)) else {
            return Err(DecodeError::unsupported(
                self.record,
                ctx,
                "no layout accepts this context",
            ));
        };
        if rule.fallback {
            debug!(record = self.record, rule = rule.name, %ctx, "using default layout");
        }
        Ok(rule)
    }

    pub fn resolve_value(&self, ctx: &VersionContext) -> DecodeResult<&'static P> {
        self.resolve(ctx).map(|rule| &rule.value)
    }
}

impl<T: 'static> RuleTable<Layout<T>> {
    /// Decode into an already initialized record. Fields the layout never touches keep
    /// their initial values.
    pub fn decode_into(
        &self,
        cursor: &mut ByteCursor<'_>,
        ctx: &VersionContext,
        out: &mut T,
    ) -> DecodeResult<()> {
        let layout = self.resolve_value(ctx)?;
        layout.execute(self.record, cursor, ctx, out)
    }

    pub fn decode(&self, cursor: &mut ByteCursor<'_>, ctx: &VersionContext) -> DecodeResult<T>
    where
        T: Default,
    {
        let mut out = T::default();
        self.decode_into(cursor, ctx, &mut out)?;
        Ok(out)
    }

    /// Count-prefixed array of records. The layout is resolved once for all elements.
    pub fn decode_array(
        &self,
        cursor: &mut ByteCursor<'_>,
        ctx: &VersionContext,
        min_element_size: usize,
    ) -> DecodeResult<Vec<T>>
    where
        T: Default,
    {
        let layout = self.resolve_value(ctx)?;
        cursor.read_array(min_element_size, |c| {
            let mut out = T::default();
            layout.execute(self.record, c, ctx, &mut out)?;
            Ok(out)
        })
    }

    /// Bulk-serialized array of records: element size, count, then the elements.
    pub fn decode_bulk_array(
        &self,
        cursor: &mut ByteCursor<'_>,
        ctx: &VersionContext,
    ) -> DecodeResult<Vec<T>>
    where
        T: Default,
    {
        let layout = self.resolve_value(ctx)?;
        cursor.read_bulk_array(|c| {
            let mut out = T::default();
            layout.execute(self.record, c, ctx, &mut out)?;
            Ok(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::GameTag;
    use crate::test_util::ByteWriter;

    #[derive(Debug, Default)]
    struct Sample {
        a: i32,
        b: i32,
        seen_version: i32,
        flag: u8,
    }

    type S = Step<Sample>;

    const HEAD: &[S] = &[
        S::read("a", |c, _, r| {
            r.a = c.read_i32()?;
            Ok(())
        }),
        S::read("flag", |c, _, r| {
            r.flag = c.read_u8()?;
            Ok(())
        })
        .aligned(4),
    ];

    const TAIL: &[S] = &[
        S::stop_if("old titles end here", |ctx| ctx.licensee_version < 2),
        S::read_if_record(
            "b",
            |_, r| r.flag != 0,
            |c, _, r| {
                r.b = c.read_i32()?;
                Ok(())
            },
        ),
        S::read("version check", |_, ctx, r| {
            r.seen_version = ctx.format_version;
            Ok(())
        })
        .with_format_version(592),
    ];

    static SAMPLE: RuleTable<Layout<Sample>> = RuleTable {
        record: "Sample",
        rules: &[
            Rule::new("Apb", |ctx| ctx.is(GameTag::Apb), Layout::Unsupported("encrypted")),
            Rule::fallback(
                "generic",
                |ctx| ctx.format_version >= 500,
                Layout::Steps(&[HEAD, TAIL]),
            ),
        ],
    };

    fn ctx(licensee: i32) -> VersionContext {
        VersionContext::builder()
            .format_version(600)
            .licensee_version(licensee)
            .build()
    }

    #[test]
    fn steps_run_in_order_with_alignment() {
        let data = ByteWriter::new().i32(7).u8(1).align(4).i32(9).finish();
        let mut cursor = ByteCursor::new(&data, winnow::binary::Endianness::Little);
        let sample = SAMPLE.decode(&mut cursor, &ctx(5)).unwrap();
        assert_eq!((sample.a, sample.flag, sample.b), (7, 1, 9));
        assert_eq!(cursor.tell(), 12);
    }

    #[test]
    fn record_presence_sees_earlier_fields() {
        let data = ByteWriter::new().i32(7).u8(0).align(4).i32(9).finish();
        let mut cursor = ByteCursor::new(&data, winnow::binary::Endianness::Little);
        let sample = SAMPLE.decode(&mut cursor, &ctx(5)).unwrap();
        assert_eq!(sample.b, 0);
        assert_eq!(cursor.tell(), 8);
    }

    #[test]
    fn stop_ends_the_layout() {
        let data = ByteWriter::new().i32(7).u8(1).align(4).i32(9).finish();
        let mut cursor = ByteCursor::new(&data, winnow::binary::Endianness::Little);
        let sample = SAMPLE.decode(&mut cursor, &ctx(1)).unwrap();
        assert_eq!(sample.b, 0);
        assert_eq!(sample.seen_version, 0);
        assert_eq!(cursor.tell(), 8);
    }

    #[test]
    fn format_version_override_is_scoped_to_the_step() {
        let data = ByteWriter::new().i32(7).u8(0).align(4).finish();
        let mut cursor = ByteCursor::new(&data, winnow::binary::Endianness::Little);
        let context = ctx(5);
        let sample = SAMPLE.decode(&mut cursor, &context).unwrap();
        assert_eq!(sample.seen_version, 592);
        assert_eq!(context.format_version, 600);
    }

    #[test]
    fn resolution_is_deterministic() {
        let context = ctx(3);
        let first = SAMPLE.resolve(&context).unwrap().name;
        for _ in 0..10 {
            assert_eq!(SAMPLE.resolve(&context).unwrap().name, first);
        }
        assert_eq!(first, "generic");
    }

    #[test]
    fn unsupported_rows_and_unmatched_contexts_fail_closed() {
        let data = [0u8; 16];
        let apb = VersionContext::builder()
            .format_version(600)
            .game(GameTag::Apb)
            .build();
        let mut cursor = ByteCursor::new(&data, winnow::binary::Endianness::Little);
        assert!(matches!(
            SAMPLE.decode(&mut cursor, &apb),
            Err(DecodeError::UnsupportedLayout { record: "Sample", .. })
        ));

        let ancient = VersionContext::builder().format_version(100).build();
        assert!(SAMPLE.resolve(&ancient).is_err());
        assert_eq!(cursor.tell(), 0);
    }
}

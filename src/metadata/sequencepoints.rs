//! Sequence point collection and the Portable PDB sequence points blob.
//!
//! The code generator annotates the IL stream of a method with markers; the
//! [`SequencePointCollector`] turns that stream into a compact, strictly increasing
//! [`SequencePointTable`] in a single forward pass:
//!
//! - `None` markers are ignored.
//! - Offsets must never decrease; a decreasing offset is a code generator bug and fails
//!   with [`crate::Error::Malformed`].
//! - Two markers at the same offset: if the new one starts where the previous one starts
//!   it is a double annotation and is dropped, otherwise the new marker replaces the old.
//!   Markers at later offsets are always kept, even when they repeat the previous one.
//! - If the first entry is not at offset 0, a hidden point is inserted at 0.
//! - Hidden points take the document of the preceding visible point. Before the first
//!   visible point, or in a method without one, they take the fallback document.
//! - Columns are clamped to [`MAX_COLUMN`], lines to [`MAX_LINE`]. A same-line span whose
//!   end column does not pass its start column is widened to one column.
//!
//! The collected table is exact. Format specific limits are applied afterwards through
//! [`SequencePointTable::clamped`]: the native format caps a span at 127 lines, the
//! portable format has no such limit.
//!
//! # Sequence Points Blob Format
//!
//! ```text
//! header:   LocalSignature (uint)  [InitialDocument (uint), only if Document column is nil]
//! record:   δILOffset (uint)  ΔLines (uint)  ΔColumns  δStartLine  δStartColumn
//! hidden:   δILOffset (uint)  0  0
//! document: 0  Document (uint)
//! ```
//!
//! The first record stores its IL offset as is, later records the positive delta to the
//! previous record (a zero delta introduces a document record). `ΔColumns` is unsigned when
//! `ΔLines` is zero and signed otherwise. `δStartLine` / `δStartColumn` are absolute
//! (unsigned) for the first visible record and signed deltas to the previous visible
//! record afterwards.
//!
//! # Examples
//!
//! ```rust
//! use dotpdb::metadata::{
//!     documents::DocumentId,
//!     sequencepoints::{SequenceMarker, SequencePointCollector, SourceSpan},
//! };
//!
//! let doc = DocumentId::from_raw(1);
//! let table = SequencePointCollector::collect([
//!     (0, SequenceMarker::Visible(SourceSpan::new(doc, 1, 35, 1, 36))),
//!     (1, SequenceMarker::Visible(SourceSpan::new(doc, 1, 37, 1, 62))),
//!     (7, SequenceMarker::Visible(SourceSpan::new(doc, 1, 63, 1, 64))),
//! ])?;
//! assert_eq!(table.offsets().collect::<Vec<_>>(), [0, 1, 7]);
//! # Ok::<(), dotpdb::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    file::parser::Parser,
    metadata::documents::DocumentId,
    utils::{write_compressed_int, write_compressed_uint},
    Result,
};

/// Largest column written for a visible span.
pub const MAX_COLUMN: u16 = 65534;

/// Largest line written for a visible span.
pub const MAX_LINE: u32 = 0x1FFF_FFFF - 1;

/// Line number the native format uses for hidden sequence points.
pub const HIDDEN_LINE: u32 = 0x00FE_EFEE;

/// A source range as reported by the code generator, before clamping.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SourceSpan {
    /// Document the span is in
    pub document: DocumentId,
    /// 1-based start line
    pub start_line: u32,
    /// 1-based start column, UTF-16 code units
    pub start_column: u32,
    /// 1-based end line
    pub end_line: u32,
    /// 1-based end column (exclusive), UTF-16 code units
    pub end_column: u32,
}

impl SourceSpan {
    /// Creates a span.
    #[must_use]
    pub fn new(
        document: DocumentId,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
    ) -> Self {
        SourceSpan {
            document,
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }
}

/// The annotation attached to an IL offset.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum SequenceMarker {
    /// A place the debugger may stop at, mapped to source
    Visible(SourceSpan),
    /// A boundary without source
    Hidden,
    /// No marker
    None,
}

/// Line and column range of a visible sequence point, after clamping.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct LineSpan {
    /// Start line
    pub start_line: u32,
    /// Start column
    pub start_column: u16,
    /// End line
    pub end_line: u32,
    /// End column
    pub end_column: u16,
}

/// One entry of a sequence point table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SequencePoint {
    /// IL offset
    pub il_offset: u32,
    /// Document; hidden points inherit the document of their neighbours
    pub document: DocumentId,
    /// Source range, `None` for hidden points
    pub span: Option<LineSpan>,
}

impl SequencePoint {
    /// Returns `true` for hidden points.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.span.is_none()
    }
}

/// Per-format limits applied to a collected table.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FormatLimits {
    /// Largest `end_line - start_line`, if the format has one
    pub max_line_span: Option<u32>,
    /// Largest line number
    pub max_line: u32,
    /// Largest column number
    pub max_column: u16,
}

impl FormatLimits {
    /// Portable PDB: exact.
    pub const PORTABLE: FormatLimits = FormatLimits {
        max_line_span: None,
        max_line: MAX_LINE,
        max_column: MAX_COLUMN,
    };

    /// Native PDB: 24-bit line numbers below the hidden marker, spans of at most 127 lines.
    pub const NATIVE: FormatLimits = FormatLimits {
        max_line_span: Some(127),
        max_line: HIDDEN_LINE - 1,
        max_column: MAX_COLUMN,
    };
}

/// The sequence points of one method, strictly increasing by IL offset.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct SequencePointTable {
    points: Vec<SequencePoint>,
}

impl SequencePointTable {
    /// Wraps points that are already strictly increasing.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if offsets are not strictly increasing or the
    /// first point is not at offset 0.
    pub fn from_points(points: Vec<SequencePoint>) -> Result<Self> {
        if let Some(first) = points.first() {
            if first.il_offset != 0 {
                return Err(malformed_error!(
                    "First sequence point at {:#x} instead of 0",
                    first.il_offset
                ));
            }
        }

        if let Some(pair) = points.windows(2).find(|w| w[1].il_offset <= w[0].il_offset) {
            return Err(malformed_error!(
                "Sequence point offsets not increasing: {:#x} after {:#x}",
                pair[1].il_offset,
                pair[0].il_offset
            ));
        }

        Ok(SequencePointTable { points })
    }

    /// The points.
    #[must_use]
    pub fn points(&self) -> &[SequencePoint] {
        &self.points
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the method has no sequence points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// IL offsets of all points.
    pub fn offsets(&self) -> impl Iterator<Item = u32> + '_ {
        self.points.iter().map(|p| p.il_offset)
    }

    /// Distinct documents in order of first use.
    #[must_use]
    pub fn documents(&self) -> Vec<DocumentId> {
        let mut documents: Vec<DocumentId> = Vec::new();
        for point in &self.points {
            if !documents.contains(&point.document) {
                documents.push(point.document);
            }
        }
        documents
    }

    /// The only document used, if all points are in one document.
    #[must_use]
    pub fn single_document(&self) -> Option<DocumentId> {
        match self.documents().as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }

    /// First visible point.
    #[must_use]
    pub fn first_visible(&self) -> Option<&SequencePoint> {
        self.points.iter().find(|p| !p.is_hidden())
    }

    /// Applies format limits. Portable limits leave a collected table unchanged.
    #[must_use]
    pub fn clamped(&self, limits: &FormatLimits) -> SequencePointTable {
        let points = self
            .points
            .iter()
            .map(|point| SequencePoint {
                span: point.span.map(|span| {
                    let start_line = span.start_line.min(limits.max_line);
                    let mut end_line = span.end_line.min(limits.max_line).max(start_line);
                    if let Some(max_span) = limits.max_line_span {
                        if end_line - start_line > max_span {
                            log::debug!(
                                "Clamping sequence point at {:#x}: lines {}-{} to {}",
                                point.il_offset,
                                start_line,
                                end_line,
                                start_line + max_span
                            );
                            end_line = start_line + max_span;
                        }
                    }

                    LineSpan {
                        start_line,
                        start_column: span.start_column.min(limits.max_column),
                        end_line,
                        end_column: span.end_column.min(limits.max_column.saturating_add(1)),
                    }
                }),
                ..*point
            })
            .collect();

        SequencePointTable { points }
    }

    /// Replaces document ids, e.g. registry ids by `Document` table rows.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a document has no mapping.
    pub fn remap_documents(&self, mapping: &HashMap<DocumentId, DocumentId>) -> Result<Self> {
        let points = self
            .points
            .iter()
            .map(|point| {
                let document = mapping.get(&point.document).copied().ok_or_else(|| {
                    malformed_error!("Sequence point references unknown document {}", point.document)
                })?;
                Ok(SequencePoint { document, ..*point })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SequencePointTable { points })
    }
}

#[derive(Clone, Copy)]
enum PendingSpan {
    Visible(SourceSpan),
    Hidden,
}

/// Single-pass collector turning a marker stream into a [`SequencePointTable`].
#[derive(Default)]
pub struct SequencePointCollector {
    entries: Vec<(u32, PendingSpan)>,
    last_offset: Option<u32>,
    fallback: Option<DocumentId>,
}

impl SequencePointCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the document hidden points use when the method has no visible point.
    #[must_use]
    pub fn with_fallback_document(mut self, document: Option<DocumentId>) -> Self {
        self.fallback = document;
        self
    }

    /// Collects a complete marker stream.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for decreasing offsets or a visible span on
    /// line 0.
    pub fn collect<I>(markers: I) -> Result<SequencePointTable>
    where
        I: IntoIterator<Item = (u32, SequenceMarker)>,
    {
        Self::new().collect_from(markers)
    }

    /// Collects a complete marker stream into this collector and finishes it.
    ///
    /// # Errors
    /// See [`SequencePointCollector::push`].
    pub fn collect_from<I>(mut self, markers: I) -> Result<SequencePointTable>
    where
        I: IntoIterator<Item = (u32, SequenceMarker)>,
    {
        for (offset, marker) in markers {
            self.push(offset, marker)?;
        }
        self.finish()
    }

    /// Feeds the marker found at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `offset` is lower than a previous offset or
    /// a visible span starts on line 0.
    pub fn push(&mut self, offset: u32, marker: SequenceMarker) -> Result<()> {
        if let Some(last) = self.last_offset {
            if offset < last {
                return Err(malformed_error!(
                    "Sequence point offset {:#x} is lower than previous offset {:#x}",
                    offset,
                    last
                ));
            }
        }
        self.last_offset = Some(offset);

        let pending = match marker {
            SequenceMarker::None => return Ok(()),
            SequenceMarker::Hidden => PendingSpan::Hidden,
            SequenceMarker::Visible(span) => {
                if span.start_line == 0 {
                    return Err(malformed_error!(
                        "Visible sequence point at {:#x} starts on line 0",
                        offset
                    ));
                }
                PendingSpan::Visible(normalize_span(span))
            }
        };

        if let Some(&(last_offset, last)) = self.entries.last() {
            if last_offset == offset {
                if same_start(&last, &pending) {
                    return Ok(());
                }
                self.entries.pop();
            }
        }

        self.entries.push((offset, pending));
        Ok(())
    }

    /// Completes the table, inserting a leading hidden point and resolving the document of
    /// hidden points. A method whose markers are all hidden keeps them in the fallback
    /// document; without one there is nothing to attach them to and the table is empty.
    ///
    /// # Errors
    /// Currently infallible; kept fallible for symmetry with [`SequencePointCollector::push`].
    pub fn finish(self) -> Result<SequencePointTable> {
        let mut entries = self.entries;
        if entries.is_empty() {
            return Ok(SequencePointTable::default());
        }
        let first_visible = entries.iter().find_map(|(_, e)| match e {
            PendingSpan::Visible(span) => Some(span.document),
            PendingSpan::Hidden => None,
        });
        let Some(first_document) = self.fallback.or(first_visible) else {
            log::debug!(
                "Dropping {} hidden-only sequence points without a document",
                entries.len()
            );
            return Ok(SequencePointTable::default());
        };

        if entries.first().is_some_and(|(offset, _)| *offset != 0) {
            if matches!(entries[0].1, PendingSpan::Hidden) {
                entries[0].0 = 0;
            } else {
                entries.insert(0, (0, PendingSpan::Hidden));
            }
        }

        let mut current_document = first_document;
        let points = entries
            .into_iter()
            .map(|(il_offset, entry)| match entry {
                PendingSpan::Visible(span) => {
                    current_document = span.document;
                    SequencePoint {
                        il_offset,
                        document: span.document,
                        span: Some(LineSpan {
                            start_line: span.start_line,
                            start_column: span.start_column as u16,
                            end_line: span.end_line,
                            end_column: span.end_column as u16,
                        }),
                    }
                }
                PendingSpan::Hidden => SequencePoint {
                    il_offset,
                    document: current_document,
                    span: None,
                },
            })
            .collect();

        Ok(SequencePointTable { points })
    }
}

fn normalize_span(span: SourceSpan) -> SourceSpan {
    let start_line = span.start_line.min(MAX_LINE);
    let end_line = span.end_line.min(MAX_LINE).max(start_line);
    let start_column = span.start_column.clamp(1, u32::from(MAX_COLUMN));
    let mut end_column = span.end_column.min(u32::from(MAX_COLUMN));

    if start_line != span.start_line || span.start_column > u32::from(MAX_COLUMN) {
        log::debug!(
            "Clamped sequence point start {}:{} to {}:{}",
            span.start_line,
            span.start_column,
            start_line,
            start_column
        );
    }

    if start_line == end_line && end_column <= start_column {
        end_column = start_column + 1;
    }

    SourceSpan {
        document: span.document,
        start_line,
        start_column,
        end_line,
        end_column,
    }
}

fn same_start(a: &PendingSpan, b: &PendingSpan) -> bool {
    match (a, b) {
        (PendingSpan::Hidden, PendingSpan::Hidden) => true,
        (PendingSpan::Visible(a), PendingSpan::Visible(b)) => {
            a.document == b.document
                && a.start_line == b.start_line
                && a.start_column == b.start_column
        }
        _ => false,
    }
}

/// Encodes the sequence points blob.
///
/// `document_row` maps the documents of `table` to `Document` rows. With
/// `single_document` set the `Document` column of the `MethodDebugInformation` row holds the
/// document and the blob omits `InitialDocument`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the table is empty, `single_document` is set for a
/// multi-document table, or a document has no row.
pub fn encode_sequence_points(
    table: &SequencePointTable,
    local_signature: u32,
    single_document: bool,
    document_row: &dyn Fn(DocumentId) -> Option<u32>,
) -> Result<Vec<u8>> {
    let Some(first) = table.points.first() else {
        return Err(malformed_error!("Cannot encode an empty sequence point table"));
    };

    let row_of = |document: DocumentId| {
        document_row(document)
            .ok_or_else(|| malformed_error!("No Document row for {}", document))
    };

    if single_document && table.single_document().is_none() {
        return Err(malformed_error!(
            "Sequence points span several documents but no initial document is written"
        ));
    }

    let mut blob = Vec::with_capacity(table.len() * 6);
    write_compressed_uint(local_signature, &mut blob);
    if !single_document {
        write_compressed_uint(row_of(first.document)?, &mut blob);
    }

    let mut current_document = first.document;
    let mut previous_offset: Option<u32> = None;
    let mut previous_visible: Option<LineSpan> = None;

    for point in &table.points {
        if point.document != current_document {
            write_compressed_uint(0, &mut blob);
            write_compressed_uint(row_of(point.document)?, &mut blob);
            current_document = point.document;
        }

        match previous_offset {
            None => write_compressed_uint(point.il_offset, &mut blob),
            Some(previous) => write_compressed_uint(point.il_offset - previous, &mut blob),
        }
        previous_offset = Some(point.il_offset);

        let Some(span) = point.span else {
            write_compressed_uint(0, &mut blob);
            write_compressed_uint(0, &mut blob);
            continue;
        };

        let delta_lines = span.end_line - span.start_line;
        let delta_columns = i32::from(span.end_column) - i32::from(span.start_column);
        write_compressed_uint(delta_lines, &mut blob);
        if delta_lines == 0 {
            #[allow(clippy::cast_sign_loss)]
            write_compressed_uint(delta_columns as u32, &mut blob);
        } else {
            write_compressed_int(delta_columns, &mut blob);
        }

        match previous_visible {
            None => {
                write_compressed_uint(span.start_line, &mut blob);
                write_compressed_uint(u32::from(span.start_column), &mut blob);
            }
            Some(previous) => {
                #[allow(clippy::cast_possible_wrap)]
                let line_delta = span.start_line as i32 - previous.start_line as i32;
                write_compressed_int(line_delta, &mut blob);
                write_compressed_int(
                    i32::from(span.start_column) - i32::from(previous.start_column),
                    &mut blob,
                );
            }
        }
        previous_visible = Some(span);
    }

    Ok(blob)
}

/// A decoded sequence points blob. Document ids are `Document` table rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedSequencePoints {
    /// `StandAloneSig` row of the local signature, 0 for none
    pub local_signature: u32,
    /// The sequence points
    pub table: SequencePointTable,
}

/// Decodes a sequence points blob. `document` is the `Document` column of the owning
/// `MethodDebugInformation` row (0 if the blob carries an initial document).
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for structurally invalid records and
/// [`crate::Error::OutOfBounds`] for a truncated blob.
pub fn parse_sequence_points(blob: &[u8], document: u32) -> Result<DecodedSequencePoints> {
    let mut parser = Parser::new(blob);
    let local_signature = parser.read_compressed_uint()?;
    let mut current_document = if document == 0 {
        parser.read_compressed_uint()?
    } else {
        document
    };

    let mut points = Vec::new();
    let mut il_offset = 0u32;
    let mut previous_visible: Option<(u32, u32)> = None;

    while parser.has_more_data() {
        let delta_offset = parser.read_compressed_uint()?;
        if delta_offset == 0 && !points.is_empty() {
            current_document = parser.read_compressed_uint()?;
            continue;
        }
        il_offset = if points.is_empty() {
            delta_offset
        } else {
            il_offset
                .checked_add(delta_offset)
                .ok_or_else(|| malformed_error!("IL offset overflow in sequence points"))?
        };

        let delta_lines = parser.read_compressed_uint()?;
        let delta_columns = if delta_lines == 0 {
            i64::from(parser.read_compressed_uint()?)
        } else {
            i64::from(parser.read_compressed_int()?)
        };

        let document_id = DocumentId::from_raw(current_document);
        if delta_lines == 0 && delta_columns == 0 {
            points.push(SequencePoint {
                il_offset,
                document: document_id,
                span: None,
            });
            continue;
        }

        let (start_line, start_column) = match previous_visible {
            None => (
                i64::from(parser.read_compressed_uint()?),
                i64::from(parser.read_compressed_uint()?),
            ),
            Some((line, column)) => (
                i64::from(line) + i64::from(parser.read_compressed_int()?),
                i64::from(column) + i64::from(parser.read_compressed_int()?),
            ),
        };

        let end_line = start_line + i64::from(delta_lines);
        let end_column = start_column + delta_columns;
        let in_range = |v: i64, max: i64| (0..=max).contains(&v);
        if !in_range(start_line, i64::from(MAX_LINE) + 1)
            || !in_range(end_line, i64::from(MAX_LINE) + 1)
            || !in_range(start_column, 0xFFFF)
            || !in_range(end_column, 0xFFFF)
        {
            return Err(malformed_error!(
                "Sequence point at {:#x} out of range: {}:{}-{}:{}",
                il_offset,
                start_line,
                start_column,
                end_line,
                end_column
            ));
        }

        previous_visible = Some((start_line as u32, start_column as u32));
        points.push(SequencePoint {
            il_offset,
            document: document_id,
            span: Some(LineSpan {
                start_line: start_line as u32,
                start_column: start_column as u16,
                end_line: end_line as u32,
                end_column: end_column as u16,
            }),
        });
    }

    Ok(DecodedSequencePoints {
        local_signature,
        table: SequencePointTable { points },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn doc(id: u32) -> DocumentId {
        DocumentId::from_raw(id)
    }

    fn visible(document: u32, line: u32, start: u32, end: u32) -> SequenceMarker {
        SequenceMarker::Visible(SourceSpan::new(doc(document), line, start, line, end))
    }

    fn rows(id: DocumentId) -> Option<u32> {
        Some(id.value())
    }

    #[test]
    fn basic_main() {
        let table = SequencePointCollector::collect([
            (0, visible(1, 1, 35, 36)),
            (1, visible(1, 1, 37, 62)),
            (1, SequenceMarker::None),
            (7, visible(1, 1, 63, 64)),
        ])
        .unwrap();

        assert_eq!(table.offsets().collect::<Vec<_>>(), [0, 1, 7]);
        assert_eq!(table.single_document(), Some(doc(1)));
    }

    #[test]
    fn decreasing_offset_is_malformed() {
        let result = SequencePointCollector::collect([(4, visible(1, 1, 1, 2)), (2, visible(1, 2, 1, 2))]);
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }

    #[test]
    fn same_offset_same_start_keeps_earlier() {
        let table = SequencePointCollector::collect([
            (0, visible(1, 3, 5, 10)),
            (0, visible(1, 3, 5, 20)),
        ])
        .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.points()[0].span.unwrap().end_column, 10);
    }

    #[test]
    fn same_offset_different_marker_replaces() {
        let table = SequencePointCollector::collect([
            (0, visible(1, 3, 5, 10)),
            (2, visible(1, 4, 5, 10)),
            (2, visible(1, 5, 1, 3)),
        ])
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.points()[1].span.unwrap().start_line, 5);
    }

    #[test]
    fn consecutive_hidden_points_are_kept() {
        let table = SequencePointCollector::collect([
            (0, visible(1, 3, 5, 20)),
            (4, SequenceMarker::Hidden),
            (10, SequenceMarker::Hidden),
            (14, visible(1, 4, 5, 9)),
        ])
        .unwrap();
        assert_eq!(table.offsets().collect::<Vec<_>>(), [0, 4, 10, 14]);
        assert!(table.points()[1].is_hidden());
        assert!(table.points()[2].is_hidden());
    }

    #[test]
    fn repeated_span_at_later_offset_is_kept() {
        let table = SequencePointCollector::collect([
            (0, visible(1, 3, 5, 20)),
            (14, visible(1, 4, 5, 9)),
            (20, visible(1, 4, 5, 9)),
        ])
        .unwrap();
        assert_eq!(table.offsets().collect::<Vec<_>>(), [0, 14, 20]);
        assert_eq!(table.points()[1].span, table.points()[2].span);
    }

    #[test]
    fn hidden_inserted_at_zero() {
        let table = SequencePointCollector::collect([(3, visible(2, 7, 1, 4))]).unwrap();
        assert_eq!(table.offsets().collect::<Vec<_>>(), [0, 3]);
        assert!(table.points()[0].is_hidden());
        assert_eq!(table.points()[0].document, doc(2));
    }

    #[test]
    fn hidden_only_without_document_yields_empty_table() {
        let table = SequencePointCollector::collect([(0, SequenceMarker::Hidden)]).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn hidden_only_uses_fallback_document() {
        let table = SequencePointCollector::new()
            .with_fallback_document(Some(doc(3)))
            .collect_from([(0, SequenceMarker::Hidden), (8, SequenceMarker::Hidden)])
            .unwrap();
        assert_eq!(table.offsets().collect::<Vec<_>>(), [0, 8]);
        assert!(table.points().iter().all(|p| p.is_hidden() && p.document == doc(3)));

        let blob = encode_sequence_points(&table, 0, true, &rows).unwrap();
        assert_eq!(parse_sequence_points(&blob, 3).unwrap().table, table);
    }

    #[test]
    fn leading_hidden_points_use_fallback_document() {
        let table = SequencePointCollector::new()
            .with_fallback_document(Some(doc(1)))
            .collect_from([(0, SequenceMarker::Hidden), (6, visible(2, 10, 1, 8))])
            .unwrap();
        assert_eq!(table.points()[0].document, doc(1));
        assert_eq!(table.points()[1].document, doc(2));
    }

    #[test]
    fn columns_and_lines_clamp() {
        let table = SequencePointCollector::collect([(
            0,
            SequenceMarker::Visible(SourceSpan::new(doc(1), u32::MAX, 70_000, u32::MAX, 80_000)),
        )])
        .unwrap();
        let span = table.points()[0].span.unwrap();
        assert_eq!(span.start_line, MAX_LINE);
        assert_eq!(span.start_column, MAX_COLUMN);
        assert_eq!(span.end_column, MAX_COLUMN + 1);
    }

    #[test]
    fn empty_same_line_span_is_widened() {
        let table = SequencePointCollector::collect([(0, visible(1, 9, 12, 12))]).unwrap();
        let span = table.points()[0].span.unwrap();
        assert_eq!((span.start_column, span.end_column), (12, 13));
    }

    #[test]
    fn native_clamps_long_statement() {
        let table = SequencePointCollector::collect([(
            0,
            SequenceMarker::Visible(SourceSpan::new(doc(1), 1, 9, 1001, 10)),
        )])
        .unwrap();

        let portable = table.clamped(&FormatLimits::PORTABLE);
        assert_eq!(portable, table);
        assert_eq!(portable.points()[0].span.unwrap().end_line, 1001);

        let native = table.clamped(&FormatLimits::NATIVE);
        assert_eq!(native.points()[0].span.unwrap().end_line, 128);
    }

    #[test]
    fn encode_single_document() {
        let table = SequencePointCollector::collect([
            (0, visible(1, 1, 35, 36)),
            (1, visible(1, 1, 37, 62)),
            (7, visible(1, 1, 63, 64)),
        ])
        .unwrap();

        let blob = encode_sequence_points(&table, 1, true, &rows).unwrap();
        assert_eq!(
            blob,
            [
                0x01, // local signature
                0x00, 0x00, 0x01, 0x01, 35, // offset 0, 1:35-1:36
                0x01, 0x00, 25, 0x00, 0x04, // +1, 1:37-1:62
                0x06, 0x00, 0x01, 0x00, 0x34, // +6, 1:63-1:64
            ]
        );

        let decoded = parse_sequence_points(&blob, 1).unwrap();
        assert_eq!(decoded.local_signature, 1);
        assert_eq!(decoded.table, table);
    }

    #[test]
    fn hidden_region_round_trip() {
        let table = SequencePointCollector::collect([
            (0, SequenceMarker::Hidden),
            (5, visible(1, 200, 9, 20)),
            (9, SequenceMarker::Hidden),
            (12, visible(2, 3, 1, 5)),
        ])
        .unwrap();

        let blob = encode_sequence_points(&table, 0, false, &rows).unwrap();
        let decoded = parse_sequence_points(&blob, 0).unwrap().table;
        assert_eq!(decoded, table);
        assert!(decoded.points()[0].is_hidden());
        assert_eq!(decoded.first_visible().unwrap().span.unwrap().start_line, 200);
        assert_eq!(decoded.points()[3].document, doc(2));
    }

    #[test]
    fn multi_line_span_uses_signed_column_delta() {
        let table = SequencePointCollector::collect([(
            0,
            SequenceMarker::Visible(SourceSpan::new(doc(1), 4, 20, 6, 2)),
        )])
        .unwrap();
        let blob = encode_sequence_points(&table, 0, true, &rows).unwrap();
        assert_eq!(blob, [0x00, 0x00, 0x02, 0x5D, 0x04, 0x14]);
        assert_eq!(parse_sequence_points(&blob, 1).unwrap().table, table);
    }

    #[test]
    fn single_document_mismatch() {
        let table = SequencePointCollector::collect([
            (0, visible(1, 1, 1, 2)),
            (2, visible(2, 1, 1, 2)),
        ])
        .unwrap();
        assert!(encode_sequence_points(&table, 0, true, &rows).is_err());
        assert!(encode_sequence_points(&table, 0, false, &|_| None).is_err());
    }

    #[test]
    fn from_points_validates() {
        let point = |il_offset| SequencePoint {
            il_offset,
            document: doc(1),
            span: None,
        };
        assert!(SequencePointTable::from_points(vec![point(1)]).is_err());
        assert!(SequencePointTable::from_points(vec![point(0), point(0)]).is_err());
        assert!(SequencePointTable::from_points(vec![point(0), point(3)]).is_ok());
    }

    #[test]
    fn truncated_blob() {
        assert!(parse_sequence_points(&[0x00, 0x00, 0x01], 1).is_err());
    }
}

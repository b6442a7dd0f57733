use crate::{
    metadata::tables::{TableId, TableInfoRef},
    Result,
};

/// A fixed-layout row of a metadata table.
///
/// Column widths depend on heap sizes and row counts, so both directions take the
/// [`TableInfoRef`] of the stream. Row identifiers are 1-based as in ECMA-335.
pub trait TableRow: Sized + Send {
    /// Table this row belongs to.
    const TABLE: TableId;

    /// Size of one serialized row.
    fn row_size(sizes: &TableInfoRef) -> u32;

    /// Decodes a row at `offset`, advancing it past the row.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the row exceeds `data`.
    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self>;

    /// Encodes the row at `offset`, advancing it past the row.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is too short, or
    /// [`crate::Error::Malformed`] if a column value does not fit its width.
    fn row_write(&self, data: &mut [u8], offset: &mut usize, sizes: &TableInfoRef) -> Result<()>;
}

/// Serializes a whole table.
///
/// # Errors
/// Propagates the first row that fails to serialize.
pub fn write_table<T: TableRow>(rows: &[T], sizes: &TableInfoRef) -> Result<Vec<u8>> {
    let mut data = vec![0u8; rows.len() * T::row_size(sizes) as usize];
    let mut offset = 0;
    for row in rows {
        row.row_write(&mut data, &mut offset, sizes)?;
    }

    Ok(data)
}

/// Decodes `count` consecutive rows starting at `offset`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the table is truncated.
pub fn read_table<T: TableRow>(
    data: &[u8],
    offset: &mut usize,
    count: u32,
    sizes: &TableInfoRef,
) -> Result<Vec<T>> {
    (1..=count)
        .map(|rid| T::row_read(data, offset, rid, sizes))
        .collect()
}

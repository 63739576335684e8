//! WKB geometry decoding.
//!
//! Geometry columns hold standard WKB in Arrow `Binary` or `LargeBinary`
//! arrays. Index builds only need the bounding box of each value; query reads
//! need the full geometry.

use arrow::array::{Array, ArrayRef, GenericBinaryArray, OffsetSizeTrait};
use arrow::datatypes::DataType;
use geo::{BoundingRect, Geometry};
use geozero::wkb::Wkb;
use geozero::ToGeo;

use crate::bounding_box::BoundingBox;
use crate::dataset::RowId;
use crate::errors::{SindexError, SindexResult};

/// Decodes one WKB value into a geometry.
pub fn decode_wkb(wkb: &[u8], row_id: RowId) -> SindexResult<Geometry<f64>> {
    Wkb(wkb.to_vec())
        .to_geo()
        .map_err(|e| SindexError::CorruptGeometry {
            row_id,
            reason: e.to_string(),
        })
}

/// Bounding box of a decoded geometry.
///
/// Empty geometries and geometries with NaN coordinates have no valid box and
/// are reported as corrupt.
pub fn geometry_bounds(geometry: &Geometry<f64>, row_id: RowId) -> SindexResult<BoundingBox> {
    let bbox = geometry
        .bounding_rect()
        .map(BoundingBox::from)
        .ok_or_else(|| SindexError::CorruptGeometry {
            row_id,
            reason: "empty geometry has no bounding box".into(),
        })?;

    if !bbox.is_valid() {
        return Err(SindexError::CorruptGeometry {
            row_id,
            reason: format!("invalid coordinates in {}", bbox),
        });
    }
    Ok(bbox)
}

/// Decodes a batch of encoded geometries into bounding boxes.
///
/// One box per input value, in input order. `first_row` is the row id of the
/// batch's first value and is only used for error reporting. Any null or
/// undecodable value fails the whole batch.
pub fn extract_bounds(batch: &ArrayRef, first_row: RowId) -> SindexResult<Vec<BoundingBox>> {
    match batch.data_type() {
        DataType::Binary => extract_typed::<i32>(binary_array(batch, first_row)?, first_row),
        DataType::LargeBinary => extract_typed::<i64>(binary_array(batch, first_row)?, first_row),
        other => Err(unsupported_type(other, first_row)),
    }
}

/// Decodes every value of a geometry column into geometries.
pub fn decode_geometries(column: &ArrayRef, row_ids: &[RowId]) -> SindexResult<Vec<Geometry<f64>>> {
    let first_row = row_ids.first().copied().unwrap_or_default();
    match column.data_type() {
        DataType::Binary => decode_typed::<i32>(binary_array(column, first_row)?, row_ids),
        DataType::LargeBinary => decode_typed::<i64>(binary_array(column, first_row)?, row_ids),
        other => Err(unsupported_type(other, first_row)),
    }
}

fn binary_array<O: OffsetSizeTrait>(
    array: &ArrayRef,
    first_row: RowId,
) -> SindexResult<&GenericBinaryArray<O>> {
    array
        .as_any()
        .downcast_ref::<GenericBinaryArray<O>>()
        .ok_or_else(|| unsupported_type(array.data_type(), first_row))
}

fn unsupported_type(data_type: &DataType, row_id: RowId) -> SindexError {
    SindexError::CorruptGeometry {
        row_id,
        reason: format!("geometry column must be WKB binary, found {}", data_type),
    }
}

fn wkb_value<O: OffsetSizeTrait>(
    array: &GenericBinaryArray<O>,
    index: usize,
    row_id: RowId,
) -> SindexResult<&[u8]> {
    if array.is_null(index) {
        return Err(SindexError::CorruptGeometry {
            row_id,
            reason: "null geometry".into(),
        });
    }
    Ok(array.value(index))
}

fn extract_typed<O: OffsetSizeTrait>(
    array: &GenericBinaryArray<O>,
    first_row: RowId,
) -> SindexResult<Vec<BoundingBox>> {
    (0..array.len())
        .map(|i| {
            let row_id = first_row + i as RowId;
            let geometry = decode_wkb(wkb_value(array, i, row_id)?, row_id)?;
            geometry_bounds(&geometry, row_id)
        })
        .collect()
}

fn decode_typed<O: OffsetSizeTrait>(
    array: &GenericBinaryArray<O>,
    row_ids: &[RowId],
) -> SindexResult<Vec<Geometry<f64>>> {
    (0..array.len())
        .map(|i| {
            let row_id = row_ids.get(i).copied().unwrap_or_default();
            decode_wkb(wkb_value(array, i, row_id)?, row_id)
        })
        .collect()
}

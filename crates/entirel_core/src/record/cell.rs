//! Conversion between property values and table cells.

use crate::definition::PropertyColumn;
use crate::error::{CoreError, CoreResult};
use entirel_codec::{SerializeCodec, Value as PropertyValue};
use entirel_storage::{ColumnType, Value as CellValue};

/// Converts a property value into the cell stored for `column`.
///
/// Serialized columns hold the codec's bytes; booleans are stored as 0/1.
///
/// # Errors
///
/// Returns an error if the codec fails or a structured value targets a
/// column that is not serialized.
pub(crate) fn to_cell(
    column: &PropertyColumn,
    value: &PropertyValue,
    serializer: &dyn SerializeCodec,
) -> CoreResult<CellValue> {
    if value.is_null() {
        return Ok(CellValue::Null);
    }
    if column.serialize {
        return Ok(CellValue::Bytes(serializer.encode(value)?));
    }
    let cell = match value {
        PropertyValue::Null => CellValue::Null,
        PropertyValue::Bool(b) => CellValue::from(*b),
        PropertyValue::Integer(n) => CellValue::Integer(*n),
        PropertyValue::Float(x) => CellValue::Float(*x),
        PropertyValue::Text(s) => CellValue::Text(s.clone()),
        PropertyValue::Bytes(b) => CellValue::Bytes(b.clone()),
        PropertyValue::List(_) | PropertyValue::Map(_) => {
            return Err(CoreError::invalid_value(
                &column.name,
                format!("{} value needs a serialized column", value.type_name()),
            ))
        }
    };
    Ok(cell)
}

/// Converts a stored cell back into a property value.
///
/// # Errors
///
/// Returns an error if a serialized cell cannot be decoded.
pub(crate) fn from_cell(
    column: &PropertyColumn,
    cell: &CellValue,
    serializer: &dyn SerializeCodec,
) -> CoreResult<PropertyValue> {
    let value = match cell {
        CellValue::Null => PropertyValue::Null,
        CellValue::Bytes(bytes) if column.serialize => serializer.decode(bytes)?,
        CellValue::Integer(n) if column.column_type == ColumnType::Boolean => {
            PropertyValue::Bool(*n != 0)
        }
        CellValue::Integer(n) => PropertyValue::Integer(*n),
        CellValue::Float(x) => PropertyValue::Float(*x),
        CellValue::Text(s) => PropertyValue::Text(s.clone()),
        CellValue::Bytes(b) => PropertyValue::Bytes(b.clone()),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use entirel_codec::CborCodec;

    #[test]
    fn booleans_are_stored_as_integers() {
        let column = PropertyColumn::new("value", ColumnType::Boolean);
        let cell = to_cell(&column, &PropertyValue::Bool(true), &CborCodec).unwrap();
        assert_eq!(cell, CellValue::Integer(1));
        assert_eq!(
            from_cell(&column, &cell, &CborCodec).unwrap(),
            PropertyValue::Bool(true)
        );
    }

    #[test]
    fn serialized_columns_go_through_the_codec() {
        let column = PropertyColumn::new("options", ColumnType::Blob).serialized();
        let value = PropertyValue::map([("size", 3_i64)]);
        let cell = to_cell(&column, &value, &CborCodec).unwrap();
        assert!(matches!(cell, CellValue::Bytes(_)));
        assert_eq!(from_cell(&column, &cell, &CborCodec).unwrap(), value);
    }

    #[test]
    fn structured_value_in_plain_column_is_rejected() {
        let column = PropertyColumn::new("value", ColumnType::Text);
        let value = PropertyValue::List(vec![1_i64.into()]);
        assert!(to_cell(&column, &value, &CborCodec).is_err());
    }

    #[test]
    fn null_round_trips() {
        let column = PropertyColumn::new("options", ColumnType::Blob).serialized();
        let cell = to_cell(&column, &PropertyValue::Null, &CborCodec).unwrap();
        assert_eq!(cell, CellValue::Null);
        assert_eq!(
            from_cell(&column, &cell, &CborCodec).unwrap(),
            PropertyValue::Null
        );
    }
}

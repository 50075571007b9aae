use std::collections::HashMap;
use std::ops::Range;

use crate::ccsid::ConverterTable;
use crate::col::FieldDescriptor;
use crate::error::{Error, Result, eyre};
use crate::protocol::primitive::get_u16;
use crate::protocol::result_data::{ResultData, RowShape};
use crate::value::Value;

/// Identifies a bound row: reply generation plus row index within its block
pub type RowKey = (u64, usize);

const INDICATOR_NULL: i16 = -1;
const INDICATOR_MAPPING_ERROR: i16 = -2;

#[derive(Debug, Clone)]
struct BoundRow {
    key: RowKey,
    bytes: Range<usize>,
    shape: RowShape,
}

/// Field layout and per-row decode state of a result set
///
/// Offsets come from the static descriptor lengths unless the bound row was
/// sent in the variable or array shape, where they are recomputed per row.
#[derive(Debug, Clone)]
pub struct RowFormat {
    fields: Vec<FieldDescriptor>,
    /// Position among output fields, `None` for input-only fields
    output_positions: Vec<Option<usize>>,
    static_offsets: Vec<usize>,
    offsets: Vec<usize>,
    lengths: Vec<usize>,
    live_layout: bool,
    bound: Option<BoundRow>,
    decoded: Vec<Option<Value>>,
    name_index: Option<HashMap<String, usize>>,
}

impl RowFormat {
    pub fn from_descriptor(fields: Vec<FieldDescriptor>) -> Self {
        let mut static_offsets = Vec::with_capacity(fields.len());
        let mut offset = 0;
        for field in &fields {
            static_offsets.push(offset);
            offset += field.static_length();
        }

        let mut next_output = 0;
        let output_positions = fields
            .iter()
            .map(|f| {
                f.is_output().then(|| {
                    next_output += 1;
                    next_output - 1
                })
            })
            .collect();

        let lengths = fields.iter().map(FieldDescriptor::static_length).collect();
        let count = fields.len();
        Self {
            fields,
            output_positions,
            offsets: static_offsets.clone(),
            static_offsets,
            lengths,
            live_layout: false,
            bound: None,
            decoded: vec![None; count],
            name_index: None,
        }
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Static record length
    pub fn record_length(&self) -> usize {
        self.fields.iter().map(FieldDescriptor::static_length).sum()
    }

    pub fn bound_key(&self) -> Option<RowKey> {
        self.bound.as_ref().map(|b| b.key)
    }

    /// Offset and length of `field` within the bound row
    pub fn field_span(&self, field: usize) -> Option<(usize, usize)> {
        Some((*self.offsets.get(field)?, *self.lengths.get(field)?))
    }

    /// Select the active row
    ///
    /// Rebinding the same key keeps memoized values; any other key drops them.
    pub fn bind(&mut self, key: RowKey, data: &ResultData, frame: &[u8]) -> Result<()> {
        if self.bound_key() == Some(key) {
            return Ok(());
        }
        let (_, row) = key;
        let bytes = data.row(row).ok_or_else(|| {
            Error::LibraryBug(eyre!(
                "row {} out of range for block of {}",
                row,
                data.row_count()
            ))
        })?;

        match data.shape {
            RowShape::Static => {
                if self.live_layout {
                    self.reset_layout();
                }
            }
            RowShape::VariableCompressed => {
                let row_bytes = frame.get(bytes.clone()).ok_or(Error::UnexpectedEof)?;
                self.layout_variable(row_bytes)?;
                self.live_layout = true;
            }
            RowShape::Array => {
                self.layout_array(data.element_lengths())?;
                self.live_layout = true;
            }
        }

        self.decoded.iter_mut().for_each(|v| *v = None);
        self.bound = Some(BoundRow {
            key,
            bytes,
            shape: data.shape,
        });
        Ok(())
    }

    /// Forget the bound row, e.g. when its reply is released
    pub fn unbind(&mut self) {
        self.bound = None;
        self.decoded.iter_mut().for_each(|v| *v = None);
    }

    fn reset_layout(&mut self) {
        self.offsets.copy_from_slice(&self.static_offsets);
        for (len, field) in self.lengths.iter_mut().zip(&self.fields) {
            *len = field.static_length();
        }
        self.live_layout = false;
    }

    /// Varying fields: 2-byte prefix plus actual bytes; fixed fields: static length
    fn layout_variable(&mut self, row: &[u8]) -> Result<()> {
        let mut offset = 0;
        for (index, field) in self.fields.iter().enumerate() {
            if self.output_positions[index].is_none() {
                self.offsets[index] = offset;
                self.lengths[index] = 0;
                continue;
            }
            let sql_type = field.sql_type()?;
            let len = if sql_type.is_varying() {
                2 + get_u16(row, offset)? as usize * sql_type.prefix_unit()
            } else {
                field.static_length()
            };
            self.offsets[index] = offset;
            self.lengths[index] = len;
            offset += len;
        }
        if offset > row.len() {
            return Err(Error::UnexpectedEof);
        }
        Ok(())
    }

    /// Lengths from the side array, indexed by output position
    fn layout_array(&mut self, element_lengths: &[u32]) -> Result<()> {
        let mut offset = 0;
        for index in 0..self.fields.len() {
            let len = match self.output_positions[index] {
                Some(pos) => *element_lengths.get(pos).ok_or(Error::InvalidPacket)? as usize,
                None => 0,
            };
            self.offsets[index] = offset;
            self.lengths[index] = len;
            offset += len;
        }
        Ok(())
    }

    fn bound_row(&self) -> Result<&BoundRow> {
        self.bound
            .as_ref()
            .ok_or_else(|| Error::BadUsageError("no current row".to_string()))
    }

    fn check_field(&self, field: usize) -> Result<()> {
        if field >= self.fields.len() {
            return Err(Error::BadUsageError(format!(
                "field index {} out of range ({} fields)",
                field,
                self.fields.len()
            )));
        }
        Ok(())
    }

    /// Indicator of `field` in the bound row
    ///
    /// Variable and array shapes only carry output fields, so their indicators
    /// are indexed by output position.
    pub fn indicator(&self, field: usize, data: &ResultData, frame: &[u8]) -> Result<i16> {
        self.check_field(field)?;
        let bound = self.bound_row()?;
        let column = match bound.shape {
            RowShape::Static => field,
            RowShape::VariableCompressed | RowShape::Array => match self.output_positions[field] {
                Some(pos) => pos,
                None => return Ok(INDICATOR_NULL),
            },
        };
        data.indicator(frame, bound.key.1, column)
    }

    pub fn is_null(&self, field: usize, data: &ResultData, frame: &[u8]) -> Result<bool> {
        Ok(self.indicator(field, data, frame)? == INDICATOR_NULL)
    }

    /// Decode `field` of the bound row, memoized until the next rebind
    pub fn decode(
        &mut self,
        field: usize,
        data: &ResultData,
        frame: &[u8],
        converters: &ConverterTable,
    ) -> Result<&Value> {
        self.check_field(field)?;
        if self.decoded[field].is_none() {
            let value = self.decode_uncached(field, data, frame, converters)?;
            self.decoded[field] = Some(value);
        }
        self.decoded[field]
            .as_ref()
            .ok_or_else(|| Error::LibraryBug(eyre!("decoded value vanished")))
    }

    fn decode_uncached(
        &self,
        field: usize,
        data: &ResultData,
        frame: &[u8],
        converters: &ConverterTable,
    ) -> Result<Value> {
        match self.indicator(field, data, frame)? {
            INDICATOR_NULL => return Ok(Value::Null),
            INDICATOR_MAPPING_ERROR => {
                return Err(Error::DataMapping {
                    field: self.fields[field].name.clone(),
                });
            }
            _ => {}
        }
        let bound = self.bound_row()?;
        let start = bound.bytes.start + self.offsets[field];
        let end = start + self.lengths[field];
        if end > bound.bytes.end {
            return Err(Error::UnexpectedEof);
        }
        let bytes = frame.get(start..end).ok_or(Error::UnexpectedEof)?;
        Value::decode(&self.fields[field], bytes, converters)
    }

    /// Field index by name
    ///
    /// `"Quoted"` names match exactly. Other names go through a lazily built
    /// index: exact casing first, then upper case. An upper-case hit is cached
    /// under the caller's spelling.
    pub fn find_field(&mut self, name: &str) -> Option<usize> {
        if let Some(quoted) = name
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
        {
            return self.fields.iter().position(|f| f.name == quoted);
        }

        let fields = &self.fields;
        let index = self.name_index.get_or_insert_with(|| {
            let mut index = HashMap::with_capacity(fields.len());
            for (i, f) in fields.iter().enumerate() {
                index.entry(f.name.clone()).or_insert(i);
            }
            index
        });
        if let Some(&i) = index.get(name) {
            return Some(i);
        }
        let i = *index.get(&name.to_uppercase())?;
        index.insert(name.to_string(), i);
        Some(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::{CCSID_UTF8, Direction, FieldFlags};
    use crate::protocol::primitive::{write_bytes_fix, write_int_2, write_int_4};
    use pretty_assertions::assert_eq;

    fn field(name: &str, type_code: u16, length: u32, direction: Direction) -> FieldDescriptor {
        FieldDescriptor::new(
            name.to_string(),
            type_code,
            length,
            0,
            0,
            CCSID_UTF8,
            direction,
            FieldFlags::empty(),
        )
    }

    fn header(out: &mut Vec<u8>, rows: u32, cols: u16, row_size: u32) {
        write_int_4(out, 0);
        write_int_4(out, rows);
        write_int_2(out, cols);
        write_int_2(out, 2);
        write_int_4(out, 0);
        write_int_4(out, row_size);
    }

    fn format() -> RowFormat {
        RowFormat::from_descriptor(vec![
            field("ID", 497, 4, Direction::Output),
            field("NAME", 449, 8, Direction::Output),
        ])
    }

    #[test]
    fn test_static_offsets() {
        let fmt = format();
        assert_eq!(fmt.field_span(0), Some((0, 4)));
        assert_eq!(fmt.field_span(1), Some((4, 8)));
        assert_eq!(fmt.record_length(), 12);
    }

    #[test]
    fn test_static_then_variable_then_static() {
        let converters = ConverterTable::default();
        let mut fmt = format();

        let mut stat = Vec::new();
        header(&mut stat, 1, 2, 12);
        write_bytes_fix(&mut stat, &[0, 0, 0, 0]);
        write_bytes_fix(&mut stat, &[0, 0, 0, 5, 0, 2, b'a', b'b', 0, 0, 0, 0]);
        let stat_data = ResultData::parse(&stat, 0..stat.len(), RowShape::Static).unwrap();

        let mut var = Vec::new();
        header(&mut var, 1, 2, 0);
        write_bytes_fix(&mut var, &[0, 0, 0, 0]);
        write_int_4(&mut var, 9);
        write_bytes_fix(&mut var, &[0, 0, 0, 6, 0, 3, b'x', b'y', b'z']);
        let var_data =
            ResultData::parse(&var, 0..var.len(), RowShape::VariableCompressed).unwrap();

        fmt.bind((1, 0), &stat_data, &stat).unwrap();
        assert_eq!(
            fmt.decode(1, &stat_data, &stat, &converters).unwrap(),
            &Value::Char("ab".to_string())
        );

        fmt.bind((2, 0), &var_data, &var).unwrap();
        assert_eq!(fmt.field_span(1), Some((4, 5)));
        assert_eq!(
            fmt.decode(0, &var_data, &var, &converters).unwrap(),
            &Value::Integer(6)
        );
        assert_eq!(
            fmt.decode(1, &var_data, &var, &converters).unwrap(),
            &Value::Char("xyz".to_string())
        );

        fmt.bind((3, 0), &stat_data, &stat).unwrap();
        assert_eq!(fmt.field_span(1), Some((4, 8)));
        assert_eq!(
            fmt.decode(0, &stat_data, &stat, &converters).unwrap(),
            &Value::Integer(5)
        );
    }

    #[test]
    fn test_null_indicator_wins_over_bytes() {
        let converters = ConverterTable::default();
        let mut fmt = format();
        let mut stat = Vec::new();
        header(&mut stat, 1, 2, 12);
        write_bytes_fix(&mut stat, &[0xFF, 0xFF, 0, 0]);
        write_bytes_fix(&mut stat, &[0, 0, 0, 5, 0, 0, 0, 0, 0, 0, 0, 0]);
        let data = ResultData::parse(&stat, 0..stat.len(), RowShape::Static).unwrap();

        fmt.bind((1, 0), &data, &stat).unwrap();
        assert!(fmt.is_null(0, &data, &stat).unwrap());
        assert_eq!(fmt.decode(0, &data, &stat, &converters).unwrap(), &Value::Null);
        assert!(!fmt.is_null(1, &data, &stat).unwrap());
    }

    #[test]
    fn test_mapping_error() {
        let converters = ConverterTable::default();
        let mut fmt = format();
        let mut stat = Vec::new();
        header(&mut stat, 1, 2, 12);
        write_bytes_fix(&mut stat, &[0, 0, 0xFF, 0xFE]);
        write_bytes_fix(&mut stat, &[0; 12]);
        let data = ResultData::parse(&stat, 0..stat.len(), RowShape::Static).unwrap();

        fmt.bind((1, 0), &data, &stat).unwrap();
        let err = fmt.decode(1, &data, &stat, &converters).unwrap_err();
        assert!(matches!(err, Error::DataMapping { field } if field == "NAME"));
    }

    #[test]
    fn test_array_skips_input_fields() {
        let converters = ConverterTable::default();
        let mut fmt = RowFormat::from_descriptor(vec![
            field("IN1", 496, 4, Direction::Input),
            field("OUT1", 497, 4, Direction::Output),
            field("OUT2", 449, 20, Direction::InputOutput),
        ]);

        let mut arr = Vec::new();
        header(&mut arr, 1, 2, 0);
        write_int_4(&mut arr, 4);
        write_int_4(&mut arr, 4);
        // OUT1 null by output position 0
        write_bytes_fix(&mut arr, &[0xFF, 0xFF, 0, 0]);
        write_bytes_fix(&mut arr, &[0, 0, 0, 1, 0, 2, b'o', b'k']);
        let data = ResultData::parse(&arr, 0..arr.len(), RowShape::Array).unwrap();

        fmt.bind((1, 0), &data, &arr).unwrap();
        assert_eq!(fmt.field_span(1), Some((0, 4)));
        assert_eq!(fmt.field_span(2), Some((4, 4)));
        assert!(fmt.is_null(1, &data, &arr).unwrap());
        assert_eq!(
            fmt.decode(2, &data, &arr, &converters).unwrap(),
            &Value::Char("ok".to_string())
        );
    }

    #[test]
    fn test_memo_dropped_on_rebind() {
        let converters = ConverterTable::default();
        let mut fmt = format();
        let mut stat = Vec::new();
        header(&mut stat, 2, 2, 12);
        write_bytes_fix(&mut stat, &[0; 8]);
        write_bytes_fix(&mut stat, &[0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]);
        write_bytes_fix(&mut stat, &[0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0]);
        let data = ResultData::parse(&stat, 0..stat.len(), RowShape::Static).unwrap();

        fmt.bind((1, 0), &data, &stat).unwrap();
        assert_eq!(fmt.decode(0, &data, &stat, &converters).unwrap(), &Value::Integer(1));
        fmt.bind((1, 1), &data, &stat).unwrap();
        assert_eq!(fmt.decode(0, &data, &stat, &converters).unwrap(), &Value::Integer(2));
    }

    #[test]
    fn test_no_current_row() {
        let fmt = format();
        let stat = {
            let mut out = Vec::new();
            header(&mut out, 0, 2, 12);
            out
        };
        let data = ResultData::parse(&stat, 0..stat.len(), RowShape::Static).unwrap();
        assert!(matches!(
            fmt.is_null(0, &data, &stat),
            Err(Error::BadUsageError(_))
        ));
    }

    #[test]
    fn test_find_field() {
        let mut fmt = RowFormat::from_descriptor(vec![
            field("ID", 496, 4, Direction::Output),
            field("mixed", 496, 4, Direction::Output),
        ]);
        assert_eq!(fmt.find_field("ID"), Some(0));
        assert_eq!(fmt.find_field("id"), Some(0));
        assert_eq!(fmt.find_field("mixed"), Some(1));
        assert_eq!(fmt.find_field("\"mixed\""), Some(1));
        assert_eq!(fmt.find_field("\"MIXED\""), None);
        assert_eq!(fmt.find_field("\"id\""), None);
        assert_eq!(fmt.find_field("nope"), None);
        // cached under the caller's casing
        assert_eq!(fmt.name_index.as_ref().unwrap().get("id"), Some(&0));
    }
}

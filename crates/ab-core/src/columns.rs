//! `Columns` — a schema-bound struct-of-arrays row store.
//!
//! Agent states and message buffers are both "N rows of the same named,
//! typed variables".  `Columns` owns one [`ColumnData`] per variable, in
//! schema order, plus the row count.  All row-oriented operations keep every
//! column in lock-step.

use std::sync::Arc;

use crate::types::{ColumnData, Scalar, Value, VariableSpec};
use crate::{AbError, AbResult};

/// One row detached from a [`Columns`]: a column of `array_len` elements per
/// variable, in schema order.
pub type Row = Vec<ColumnData>;

/// Schema-bound SoA store.
#[derive(Clone, Debug)]
pub struct Columns {
    schema: Arc<[VariableSpec]>,
    data:   Vec<ColumnData>,
    len:    usize,
}

impl Columns {
    /// An empty store for `schema`.
    pub fn new(schema: Arc<[VariableSpec]>) -> Self {
        let data = schema.iter().map(|v| ColumnData::new(v.ty)).collect();
        Self { schema, data, len: 0 }
    }

    /// A store of `rows` rows, each holding the declared defaults.
    pub fn with_defaults(schema: Arc<[VariableSpec]>, rows: usize) -> Self {
        let mut cols = Self::new(schema);
        cols.push_defaults(rows);
        cols
    }

    pub fn schema(&self) -> &Arc<[VariableSpec]> {
        &self.schema
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes occupied by one row across all variables.
    pub fn row_bytes(&self) -> usize {
        self.schema.iter().map(VariableSpec::row_bytes).sum()
    }

    /// Schema index of `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.schema.iter().position(|v| v.name == name)
    }

    pub fn spec(&self, name: &str) -> AbResult<&VariableSpec> {
        self.schema
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| AbError::not_found("variable", name))
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.position(name).map(|i| &self.data[i])
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut ColumnData> {
        self.position(name).map(move |i| &mut self.data[i])
    }

    #[inline]
    pub fn column_at(&self, index: usize) -> &ColumnData {
        &self.data[index]
    }

    /// Typed view of a whole column (all rows, all array elements).
    pub fn slice<T: Scalar>(&self, name: &str) -> AbResult<&[T]> {
        let col = self.column(name).ok_or_else(|| AbError::not_found("variable", name))?;
        T::slice(col).ok_or_else(|| {
            AbError::type_mismatch(name, format!("stored as {}, requested {}", col.var_type(), T::TYPE))
        })
    }

    /// Read element `element` of variable `name` in row `row`.
    pub fn get<T: Scalar>(&self, name: &str, row: usize, element: usize) -> AbResult<T> {
        let spec = self.spec(name)?;
        check_element(spec, element)?;
        if row >= self.len {
            return Err(AbError::InvalidArgument(format!("row {row} out of range ({})", self.len)));
        }
        let array_len = spec.array_len;
        let slice = self.slice::<T>(name)?;
        Ok(slice[row * array_len + element])
    }

    /// Write element `element` of variable `name` in row `row`.
    pub fn set<T: Scalar>(&mut self, name: &str, row: usize, element: usize, value: T) -> AbResult<()> {
        let spec = self.spec(name)?;
        check_element(spec, element)?;
        if spec.ty != T::TYPE {
            return Err(AbError::type_mismatch(
                name,
                format!("stored as {}, written as {}", spec.ty, T::TYPE),
            ));
        }
        if row >= self.len {
            return Err(AbError::InvalidArgument(format!("row {row} out of range ({})", self.len)));
        }
        let index = row * spec.array_len + element;
        let col = self.column_mut(name).ok_or_else(|| AbError::not_found("variable", name))?;
        col.set(index, value.into_value());
        Ok(())
    }

    /// Append `rows` default rows.
    pub fn push_defaults(&mut self, rows: usize) {
        for (col, spec) in self.data.iter_mut().zip(self.schema.iter()) {
            let row = spec.default_column();
            col.reserve(rows * spec.array_len);
            for _ in 0..rows {
                col.extend_from(&row);
            }
        }
        self.len += rows;
    }

    /// The default row for this schema.
    pub fn default_row(&self) -> Row {
        self.schema.iter().map(VariableSpec::default_column).collect()
    }

    /// Copy row `row` out of the store.
    pub fn read_row(&self, row: usize) -> Row {
        self.data
            .iter()
            .zip(self.schema.iter())
            .map(|(col, spec)| col.slice(row * spec.array_len, spec.array_len))
            .collect()
    }

    /// Overwrite row `row` with `values`.
    pub fn write_row(&mut self, row: usize, values: &Row) {
        for ((col, spec), src) in self.data.iter_mut().zip(self.schema.iter()).zip(values) {
            col.write_at(row * spec.array_len, src);
        }
    }

    /// Append one row.
    pub fn push_row(&mut self, values: &Row) {
        for (col, src) in self.data.iter_mut().zip(values) {
            col.extend_from(src);
        }
        self.len += 1;
    }

    /// Append every row of `other`.  The two stores must share a layout.
    pub fn append(&mut self, other: &Columns) -> AbResult<()> {
        if !self.same_layout(other) {
            return Err(AbError::type_mismatch(
                "columns",
                "appended rows have a different variable layout",
            ));
        }
        for (dst, src) in self.data.iter_mut().zip(&other.data) {
            dst.extend_from(src);
        }
        self.len += other.len;
        Ok(())
    }

    /// Keep only the rows whose `mask` entry is `true`.
    pub fn retain(&mut self, mask: &[bool]) {
        for (col, spec) in self.data.iter_mut().zip(self.schema.iter()) {
            col.retain_rows(mask, spec.array_len);
        }
        self.len = mask.iter().take(self.len).filter(|&&keep| keep).count();
    }

    /// A new store holding the listed rows in the listed order.
    pub fn gather(&self, rows: &[usize]) -> Columns {
        let data = self
            .data
            .iter()
            .zip(self.schema.iter())
            .map(|(col, spec)| col.gather_rows(rows, spec.array_len))
            .collect();
        Columns { schema: Arc::clone(&self.schema), data, len: rows.len() }
    }

    /// Reorder rows so that new row `i` is old row `order[i]`.
    pub fn permute(&mut self, order: &[usize]) {
        *self = self.gather(order);
    }

    pub fn clear(&mut self) {
        for col in &mut self.data {
            col.clear();
        }
        self.len = 0;
    }

    /// `true` if both stores declare the same variable names, types and
    /// array lengths in the same order.
    pub fn same_layout(&self, other: &Columns) -> bool {
        Arc::ptr_eq(&self.schema, &other.schema)
            || (self.schema.len() == other.schema.len()
                && self.schema.iter().zip(other.schema.iter()).all(|(a, b)| {
                    a.name == b.name && a.ty == b.ty && a.array_len == b.array_len
                }))
    }

    /// Row `row` of variable `name` as dynamically typed values.
    pub fn values(&self, name: &str, row: usize) -> AbResult<Vec<Value>> {
        let spec = self.spec(name)?;
        let col = self.column(name).ok_or_else(|| AbError::not_found("variable", name))?;
        Ok((0..spec.array_len)
            .filter_map(|e| col.get(row * spec.array_len + e))
            .collect())
    }
}

fn check_element(spec: &VariableSpec, element: usize) -> AbResult<()> {
    if element >= spec.array_len {
        return Err(AbError::InvalidArgument(format!(
            "element {element} out of range for '{}' (array length {})",
            spec.name, spec.array_len
        )));
    }
    Ok(())
}

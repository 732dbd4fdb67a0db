//! Byte-packed staging for host-created agents.
//!
//! Host functions create agents one at a time and set variables by name.
//! Rather than growing every column on each call, new agents are staged as
//! packed little-endian records described by a [`VarLayout`] and scattered
//! into the column store in one pass at the end of the step.

use std::sync::Arc;

use ab_core::{AbError, Columns, ColumnData, ID_VARIABLE, Scalar, Value, VarType, VariableSpec};

use crate::AgentResult;

/// Placement of one variable inside a packed record.
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutEntry {
    pub name:      String,
    pub ty:        VarType,
    pub array_len: usize,
    pub offset:    usize,
}

/// Variable name → byte offset map for one agent type.
#[derive(Clone, Debug, PartialEq)]
pub struct VarLayout {
    entries:   Vec<LayoutEntry>,
    /// Record of default values, copied into every new agent.
    defaults:  Vec<u8>,
    row_bytes: usize,
}

impl VarLayout {
    pub fn new(schema: &[VariableSpec]) -> Self {
        let mut offset = 0;
        let mut entries = Vec::with_capacity(schema.len());
        for spec in schema {
            entries.push(LayoutEntry {
                name:      spec.name.clone(),
                ty:        spec.ty,
                array_len: spec.array_len,
                offset,
            });
            offset += spec.row_bytes();
        }
        let mut defaults = vec![0u8; offset];
        for (entry, spec) in entries.iter().zip(schema) {
            for (i, v) in spec.default.iter().enumerate() {
                let at = entry.offset + i * entry.ty.size();
                v.write_le(&mut defaults[at..]);
            }
        }
        Self { entries, defaults, row_bytes: offset }
    }

    pub fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    pub fn entry(&self, name: &str) -> Option<&LayoutEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }
}

/// Pending agents for one (agent type, state) pair.
#[derive(Clone, Debug)]
pub struct NewAgentStorage {
    layout: Arc<VarLayout>,
    data:   Vec<u8>,
    count:  usize,
}

impl NewAgentStorage {
    pub fn new(layout: Arc<VarLayout>) -> Self {
        Self { layout, data: Vec::new(), count: 0 }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Stage one agent initialised to the declared defaults.
    pub fn push(&mut self) -> NewAgent<'_> {
        self.data.extend_from_slice(&self.layout.defaults);
        let row = self.count;
        self.count += 1;
        NewAgent { storage: self, row }
    }

    fn locate(&self, name: &str, element: usize, ty: VarType) -> AgentResult<usize> {
        if name == ID_VARIABLE {
            return Err(AbError::ReservedName(name.to_owned()).into());
        }
        let entry = self.layout.entry(name).ok_or_else(|| AbError::not_found("variable", name))?;
        if entry.ty != ty {
            return Err(AbError::type_mismatch(
                name,
                format!("declared {}, accessed as {}", entry.ty, ty),
            )
            .into());
        }
        if element >= entry.array_len {
            return Err(AbError::InvalidArgument(format!(
                "element {element} out of range for '{name}' (array length {})",
                entry.array_len
            ))
            .into());
        }
        Ok(entry.offset + element * ty.size())
    }

    fn write<T: Scalar>(&mut self, row: usize, name: &str, element: usize, value: T) -> AgentResult<()> {
        let at = row * self.layout.row_bytes + self.locate(name, element, T::TYPE)?;
        value.into_value().write_le(&mut self.data[at..]);
        Ok(())
    }

    fn read<T: Scalar>(&self, row: usize, name: &str, element: usize) -> AgentResult<T> {
        let at = row * self.layout.row_bytes + self.locate(name, element, T::TYPE)?;
        let value = Value::read_le(T::TYPE, &self.data[at..]);
        Ok(T::from_value(value).unwrap_or_default())
    }

    /// Unpack every staged record into columns of `schema` order.
    ///
    /// `schema` must be the schema the layout was built from.
    pub fn to_columns(&self, schema: Arc<[VariableSpec]>) -> Columns {
        let mut columns = Columns::new(Arc::clone(&schema));
        let rb = self.layout.row_bytes;
        for row in 0..self.count {
            let record = &self.data[row * rb..(row + 1) * rb];
            let values: Vec<ColumnData> = self
                .layout
                .entries
                .iter()
                .map(|e| {
                    let mut col = ColumnData::new(e.ty);
                    for i in 0..e.array_len {
                        col.push(Value::read_le(e.ty, &record[e.offset + i * e.ty.size()..]));
                    }
                    col
                })
                .collect();
            columns.push_row(&values);
        }
        columns
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.count = 0;
    }
}

/// Handle to one staged agent, returned by [`NewAgentStorage::push`].
pub struct NewAgent<'a> {
    storage: &'a mut NewAgentStorage,
    row:     usize,
}

impl NewAgent<'_> {
    pub fn set<T: Scalar>(&mut self, name: &str, value: T) -> AgentResult<&mut Self> {
        self.storage.write(self.row, name, 0, value)?;
        Ok(self)
    }

    pub fn set_element<T: Scalar>(&mut self, name: &str, element: usize, value: T) -> AgentResult<&mut Self> {
        self.storage.write(self.row, name, element, value)?;
        Ok(self)
    }

    pub fn get<T: Scalar>(&self, name: &str) -> AgentResult<T> {
        self.storage.read(self.row, name, 0)
    }

    pub fn get_element<T: Scalar>(&self, name: &str, element: usize) -> AgentResult<T> {
        self.storage.read(self.row, name, element)
    }
}

//! Double-buffered message storage.
//!
//! Agent functions read the *published* buffer and append to the *write*
//! buffer.  Publishing swaps the two, clears the new write buffer and, for
//! spatial types, rebuilds the PBM over the freshly published messages so
//! that later layers can query neighbours.

use std::sync::Arc;

use ab_core::{Columns, VariableSpec};
use ab_device::{Allocation, DeviceMemory};
use tracing::debug;

use crate::{MessageIndex, MessageKind, MessageResult, MessageType, SpatialGrid};

pub struct MessageList {
    name:         String,
    message_type: MessageType,
    read:         Columns,
    write:        Columns,
    index:        Option<MessageIndex>,
    allocation:   Option<Allocation>,
}

impl MessageList {
    /// `schema` must already include the implicit location variables.
    pub fn new(
        name:         impl Into<String>,
        message_type: MessageType,
        schema:       Arc<[VariableSpec]>,
    ) -> MessageResult<Self> {
        let name = name.into();
        let index = match message_type.bounds() {
            Some(bounds) => {
                let grid = SpatialGrid::new(bounds, message_type.dimensions())?;
                Some(MessageIndex::new(name.clone(), grid))
            }
            None => None,
        };
        Ok(Self {
            name,
            message_type,
            read: Columns::new(Arc::clone(&schema)),
            write: Columns::new(schema),
            index,
            allocation: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    pub fn kind(&self) -> MessageKind {
        self.message_type.kind()
    }

    pub fn schema(&self) -> &Arc<[VariableSpec]> {
        self.read.schema()
    }

    /// Published messages, readable by message-input functions.
    pub fn read(&self) -> &Columns {
        &self.read
    }

    /// Messages produced so far this layer.
    pub fn write(&self) -> &Columns {
        &self.write
    }

    pub fn index(&self) -> Option<&MessageIndex> {
        self.index.as_ref()
    }

    pub fn index_mut(&mut self) -> Option<&mut MessageIndex> {
        self.index.as_mut()
    }

    /// Bind to a device: initialise the spatial index.
    pub fn init(&mut self, memory: &Arc<DeviceMemory>) -> MessageResult<()> {
        if let Some(index) = &mut self.index {
            index.init(memory)?;
        }
        if self.allocation.is_none() {
            self.allocation = Some(memory.allocate(0)?);
        }
        Ok(())
    }

    /// Append the output of one launch to the write buffer.
    pub fn append_output(&mut self, rows: &Columns) -> MessageResult<()> {
        self.write.append(rows)?;
        Ok(())
    }

    /// Swap buffers, clear the write side and rebuild the index.
    pub fn publish(&mut self) -> MessageResult<()> {
        std::mem::swap(&mut self.read, &mut self.write);
        self.write.clear();
        if let Some(alloc) = &mut self.allocation {
            alloc.resize(self.read.len() * self.read.row_bytes())?;
        }
        if let Some(index) = &mut self.index {
            index.invalidate();
            index.build_index(&self.read)?;
        }
        debug!(message = %self.name, count = self.read.len(), "messages published");
        Ok(())
    }

    /// Drop all messages in both buffers.
    pub fn clear(&mut self) {
        self.read.clear();
        self.write.clear();
        if let Some(index) = &mut self.index {
            index.invalidate();
        }
        if let Some(alloc) = &mut self.allocation {
            let _ = alloc.resize(0);
        }
    }

    /// Release device resources.  `init` must be called again before use.
    pub fn free(&mut self) {
        self.clear();
        if let Some(index) = &mut self.index {
            index.free();
        }
        self.allocation = None;
    }
}

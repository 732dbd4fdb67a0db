//! Strongly typed, zero-cost identifier wrappers.
//!
//! All IDs are `Copy + Ord + Hash` so they can be used as map keys and sorted
//! collection elements without ceremony.  The inner integer is `pub`; prefer
//! the `.index()` helper when using an ID as a `Vec` index.

use std::fmt;

/// Generate a typed ID wrapper around a primitive integer.
macro_rules! typed_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident($inner:ty);) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        $vis struct $name(pub $inner);

        impl $name {
            /// Sentinel meaning "no valid ID".
            pub const INVALID: $name = $name(<$inner>::MAX);

            /// Cast to `usize` for direct use as a `Vec` index.
            #[inline(always)]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<$name> for usize {
            #[inline(always)]
            fn from(id: $name) -> usize {
                id.0 as usize
            }
        }

        impl TryFrom<usize> for $name {
            type Error = std::num::TryFromIntError;
            fn try_from(n: usize) -> Result<$name, Self::Error> {
                <$inner>::try_from(n).map($name)
            }
        }
    };
}

typed_id! {
    /// Unique identifier of an agent, stored in the reserved `_id` variable.
    ///
    /// `AgentId::UNSET` (0) marks agents imported without an identifier;
    /// they are assigned a fresh ID before the next step.
    pub struct AgentId(u32);
}

typed_id! {
    /// Ordinal of a (simulated) accelerator device.
    pub struct DeviceId(u32);
}

typed_id! {
    /// Index of an execution stream inside a simulation instance.
    pub struct StreamId(u32);
}

typed_id! {
    /// Process-unique identifier of a simulation instance.
    pub struct InstanceId(u64);
}

impl AgentId {
    /// Value of `_id` before an identifier has been assigned.
    pub const UNSET: AgentId = AgentId(0);

    /// `true` once the agent has been given an identifier.
    #[inline]
    pub fn is_set(self) -> bool {
        self != AgentId::UNSET
    }
}

impl Default for AgentId {
    fn default() -> Self {
        AgentId::UNSET
    }
}

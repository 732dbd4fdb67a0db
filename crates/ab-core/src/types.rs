//! Variable typing shared by agents, messages and environment properties.
//!
//! Every variable in a model has one of a fixed set of primitive element
//! types.  The [`var_types!`] macro generates three parallel enums from that
//! list so that adding a type is a one-line change:
//!
//! - [`VarType`]    — the type tag stored in schemas.
//! - [`Value`]      — one element of any type (host-side, dynamically typed).
//! - [`ColumnData`] — a contiguous buffer of one type (the SoA column).
//!
//! Statically typed access goes through the sealed [`Scalar`] trait, which is
//! implemented for exactly the primitive types listed below.

use crate::{AbError, AbResult};

/// Names beginning with this prefix are reserved for framework variables.
pub const RESERVED_PREFIX: &str = "_";

/// Name of the reserved per-agent identifier variable (`u32`).
pub const ID_VARIABLE: &str = "_id";

/// `true` if `name` collides with the framework's reserved namespace.
#[inline]
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

macro_rules! var_types {
    ($( $variant:ident => $t:ty ),* $(,)?) => {
        /// Element type of a variable.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub enum VarType {
            $($variant),*
        }

        impl VarType {
            /// Every supported type, in declaration order.
            pub const ALL: &'static [VarType] = &[$(VarType::$variant),*];

            /// Size of one element in bytes.
            pub const fn size(self) -> usize {
                match self {
                    $(VarType::$variant => std::mem::size_of::<$t>()),*
                }
            }

            /// Rust spelling of the type (`"f32"`, `"u64"`, …).
            pub const fn name(self) -> &'static str {
                match self {
                    $(VarType::$variant => stringify!($t)),*
                }
            }
        }

        /// A single dynamically typed element.
        #[derive(Copy, Clone, Debug, PartialEq)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub enum Value {
            $($variant($t)),*
        }

        impl Value {
            pub fn var_type(&self) -> VarType {
                match self {
                    $(Value::$variant(_) => VarType::$variant),*
                }
            }

            /// The zero value of `ty`.
            pub fn zero(ty: VarType) -> Value {
                match ty {
                    $(VarType::$variant => Value::$variant(<$t>::default())),*
                }
            }

            /// Lossy conversion used by reductions and log output.
            pub fn as_f64(&self) -> f64 {
                match *self {
                    $(Value::$variant(v) => v as f64),*
                }
            }

            /// Write the little-endian encoding into the front of `out`.
            ///
            /// `out` must be at least `self.var_type().size()` bytes long.
            pub fn write_le(&self, out: &mut [u8]) {
                match *self {
                    $(Value::$variant(v) => {
                        let bytes = v.to_le_bytes();
                        out[..bytes.len()].copy_from_slice(&bytes);
                    })*
                }
            }

            /// Decode a little-endian element of type `ty` from the front of `bytes`.
            pub fn read_le(ty: VarType, bytes: &[u8]) -> Value {
                match ty {
                    $(VarType::$variant => {
                        let mut buf = [0u8; std::mem::size_of::<$t>()];
                        let n = buf.len();
                        buf.copy_from_slice(&bytes[..n]);
                        Value::$variant(<$t>::from_le_bytes(buf))
                    })*
                }
            }
        }

        /// A contiguous, homogeneously typed buffer: one SoA column.
        ///
        /// Array variables store `array_len` consecutive elements per row;
        /// the row-oriented helpers take that length explicitly.
        #[derive(Clone, Debug, PartialEq)]
        pub enum ColumnData {
            $($variant(Vec<$t>)),*
        }

        impl ColumnData {
            /// An empty column of type `ty`.
            pub fn new(ty: VarType) -> Self {
                match ty {
                    $(VarType::$variant => ColumnData::$variant(Vec::new())),*
                }
            }

            /// A column of `len` zero elements.
            pub fn zeroed(ty: VarType, len: usize) -> Self {
                match ty {
                    $(VarType::$variant => ColumnData::$variant(vec![<$t>::default(); len])),*
                }
            }

            /// Build a column from values; `None` if any value has another type.
            pub fn from_values(ty: VarType, values: &[Value]) -> Option<Self> {
                let mut col = ColumnData::new(ty);
                for v in values {
                    if !col.push(*v) {
                        return None;
                    }
                }
                Some(col)
            }

            pub fn var_type(&self) -> VarType {
                match self {
                    $(ColumnData::$variant(_) => VarType::$variant),*
                }
            }

            /// Number of elements (not rows).
            pub fn len(&self) -> usize {
                match self {
                    $(ColumnData::$variant(v) => v.len()),*
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            pub fn clear(&mut self) {
                match self {
                    $(ColumnData::$variant(v) => v.clear()),*
                }
            }

            pub fn truncate(&mut self, len: usize) {
                match self {
                    $(ColumnData::$variant(v) => v.truncate(len)),*
                }
            }

            /// Grow or shrink to `len` elements, zero filling.
            pub fn resize(&mut self, len: usize) {
                match self {
                    $(ColumnData::$variant(v) => v.resize(len, <$t>::default())),*
                }
            }

            pub fn reserve(&mut self, additional: usize) {
                match self {
                    $(ColumnData::$variant(v) => v.reserve(additional)),*
                }
            }

            /// Element `i`, or `None` if out of range.
            pub fn get(&self, i: usize) -> Option<Value> {
                match self {
                    $(ColumnData::$variant(v) => v.get(i).map(|x| Value::$variant(*x))),*
                }
            }

            /// Overwrite element `i`.  Returns `false` on a type mismatch or
            /// an out-of-range index.
            pub fn set(&mut self, i: usize, value: Value) -> bool {
                match (self, value) {
                    $((ColumnData::$variant(v), Value::$variant(x)) => match v.get_mut(i) {
                        Some(slot) => { *slot = x; true }
                        None       => false,
                    },)*
                    _ => false,
                }
            }

            /// Append one element.  Returns `false` on a type mismatch.
            pub fn push(&mut self, value: Value) -> bool {
                match (self, value) {
                    $((ColumnData::$variant(v), Value::$variant(x)) => { v.push(x); true })*
                    _ => false,
                }
            }

            /// Append all of `other`.  Returns `false` on a type mismatch.
            pub fn extend_from(&mut self, other: &ColumnData) -> bool {
                match (self, other) {
                    $((ColumnData::$variant(a), ColumnData::$variant(b)) => {
                        a.extend_from_slice(b);
                        true
                    })*
                    _ => false,
                }
            }

            /// Copy `other` over the elements starting at `start`.
            pub fn write_at(&mut self, start: usize, other: &ColumnData) -> bool {
                match (self, other) {
                    $((ColumnData::$variant(a), ColumnData::$variant(b)) => {
                        match a.get_mut(start..start + b.len()) {
                            Some(dst) => { dst.copy_from_slice(b); true }
                            None      => false,
                        }
                    })*
                    _ => false,
                }
            }

            /// Elements `start..start + len` as a new column.
            pub fn slice(&self, start: usize, len: usize) -> ColumnData {
                match self {
                    $(ColumnData::$variant(v) => ColumnData::$variant(v[start..start + len].to_vec())),*
                }
            }

            /// Keep the rows whose `mask` entry is `true`.
            pub fn retain_rows(&mut self, mask: &[bool], array_len: usize) {
                match self {
                    $(ColumnData::$variant(v) => {
                        let mut out = Vec::with_capacity(v.len());
                        for (row, chunk) in v.chunks_exact(array_len).enumerate() {
                            if mask.get(row).copied().unwrap_or(false) {
                                out.extend_from_slice(chunk);
                            }
                        }
                        *v = out;
                    })*
                }
            }

            /// Build a new column from the listed rows, in the listed order.
            pub fn gather_rows(&self, rows: &[usize], array_len: usize) -> ColumnData {
                match self {
                    $(ColumnData::$variant(v) => {
                        let mut out = Vec::with_capacity(rows.len() * array_len);
                        for &row in rows {
                            out.extend_from_slice(&v[row * array_len..(row + 1) * array_len]);
                        }
                        ColumnData::$variant(out)
                    })*
                }
            }
        }
    };
}

var_types! {
    F32 => f32,
    F64 => f64,
    I8  => i8,
    U8  => u8,
    I16 => i16,
    U16 => u16,
    I32 => i32,
    U32 => u32,
    I64 => i64,
    U64 => u64,
}

impl std::fmt::Display for VarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Scalar ────────────────────────────────────────────────────────────────────

mod sealed {
    pub trait Sealed {}
}

/// A primitive element type with a [`VarType`] tag.
///
/// Sealed: implemented for `f32`, `f64` and the 8/16/32/64-bit integers.
/// The `to_bits`/`from_bits` pair maps every type onto a `u64` bit pattern
/// so one atomic word can hold any element (see `ab-env`'s macro storage).
pub trait Scalar:
    Copy + PartialOrd + Default + std::fmt::Debug + Send + Sync + 'static + sealed::Sealed
{
    const TYPE: VarType;

    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
    fn to_f64(self) -> f64;

    /// Addition; wrapping for integers.
    fn combine_add(self, rhs: Self) -> Self;
    /// Subtraction; wrapping for integers.
    fn combine_sub(self, rhs: Self) -> Self;

    fn into_value(self) -> Value;
    fn from_value(value: Value) -> Option<Self>;

    fn slice(column: &ColumnData) -> Option<&[Self]>;
    fn slice_mut(column: &mut ColumnData) -> Option<&mut [Self]>;
}

macro_rules! impl_scalar_int {
    ($($variant:ident => $t:ty),*) => {$(
        impl sealed::Sealed for $t {}

        impl Scalar for $t {
            const TYPE: VarType = VarType::$variant;

            #[inline] fn to_bits(self) -> u64 { self as u64 }
            #[inline] fn from_bits(bits: u64) -> Self { bits as $t }
            #[inline] fn to_f64(self) -> f64 { self as f64 }
            #[inline] fn combine_add(self, rhs: Self) -> Self { self.wrapping_add(rhs) }
            #[inline] fn combine_sub(self, rhs: Self) -> Self { self.wrapping_sub(rhs) }
            #[inline] fn into_value(self) -> Value { Value::$variant(self) }

            #[inline]
            fn from_value(value: Value) -> Option<Self> {
                match value { Value::$variant(v) => Some(v), _ => None }
            }

            #[inline]
            fn slice(column: &ColumnData) -> Option<&[Self]> {
                match column { ColumnData::$variant(v) => Some(v), _ => None }
            }

            #[inline]
            fn slice_mut(column: &mut ColumnData) -> Option<&mut [Self]> {
                match column { ColumnData::$variant(v) => Some(v), _ => None }
            }
        }
    )*};
}

macro_rules! impl_scalar_float {
    ($($variant:ident => $t:ty, $bits:ty),*) => {$(
        impl sealed::Sealed for $t {}

        impl Scalar for $t {
            const TYPE: VarType = VarType::$variant;

            #[inline] fn to_bits(self) -> u64 { <$t>::to_bits(self) as u64 }
            #[inline] fn from_bits(bits: u64) -> Self { <$t>::from_bits(bits as $bits) }
            #[inline] fn to_f64(self) -> f64 { self as f64 }
            #[inline] fn combine_add(self, rhs: Self) -> Self { self + rhs }
            #[inline] fn combine_sub(self, rhs: Self) -> Self { self - rhs }
            #[inline] fn into_value(self) -> Value { Value::$variant(self) }

            #[inline]
            fn from_value(value: Value) -> Option<Self> {
                match value { Value::$variant(v) => Some(v), _ => None }
            }

            #[inline]
            fn slice(column: &ColumnData) -> Option<&[Self]> {
                match column { ColumnData::$variant(v) => Some(v), _ => None }
            }

            #[inline]
            fn slice_mut(column: &mut ColumnData) -> Option<&mut [Self]> {
                match column { ColumnData::$variant(v) => Some(v), _ => None }
            }
        }
    )*};
}

impl_scalar_int!(I8 => i8, U8 => u8, I16 => i16, U16 => u16, I32 => i32, U32 => u32, I64 => i64, U64 => u64);
impl_scalar_float!(F32 => f32, u32, F64 => f64, u64);

// ── VariableSpec ──────────────────────────────────────────────────────────────

/// Declaration of one named variable: element type, elements per row and
/// the default row contents.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableSpec {
    pub name:      String,
    pub ty:        VarType,
    pub array_len: usize,
    /// Exactly `array_len` values of type `ty`.
    pub default:   Vec<Value>,
}

impl VariableSpec {
    /// A scalar variable defaulting to zero.
    pub fn scalar<T: Scalar>(name: impl Into<String>) -> Self {
        Self::with_default(name, T::default())
    }

    /// A scalar variable with an explicit default.
    pub fn with_default<T: Scalar>(name: impl Into<String>, default: T) -> Self {
        Self {
            name:      name.into(),
            ty:        T::TYPE,
            array_len: 1,
            default:   vec![default.into_value()],
        }
    }

    /// A fixed-length array variable defaulting to zeros.
    pub fn array<T: Scalar>(name: impl Into<String>, len: usize) -> Self {
        Self {
            name:      name.into(),
            ty:        T::TYPE,
            array_len: len,
            default:   vec![T::default().into_value(); len],
        }
    }

    /// The reserved `_id` variable carried by every agent.
    pub fn agent_id() -> Self {
        Self::scalar::<u32>(ID_VARIABLE)
    }

    /// Bytes occupied by one row of this variable.
    pub fn row_bytes(&self) -> usize {
        self.ty.size() * self.array_len
    }

    /// The default row as a one-row column.
    pub fn default_column(&self) -> ColumnData {
        ColumnData::from_values(self.ty, &self.default)
            .unwrap_or_else(|| ColumnData::zeroed(self.ty, self.array_len))
    }

    /// Check that the declaration is internally consistent.
    pub fn validate(&self) -> AbResult<()> {
        if self.array_len == 0 {
            return Err(AbError::InvalidArgument(format!(
                "variable '{}' has array length 0",
                self.name
            )));
        }
        if self.default.len() != self.array_len
            || self.default.iter().any(|v| v.var_type() != self.ty)
        {
            return Err(AbError::type_mismatch(
                &self.name,
                format!("default does not hold {} values of {}", self.array_len, self.ty),
            ));
        }
        Ok(())
    }
}

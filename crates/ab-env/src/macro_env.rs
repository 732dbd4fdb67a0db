//! The macro-environment store.
//!
//! A macro property is a named, typed 4-D array (`[I, J, K, W]`, unused
//! dimensions are 1) living in device memory and shared by every agent
//! function, host function and mapped submodel of a model.
//!
//! # Storage
//!
//! Every element is an `AtomicU64` holding the element's bit pattern (see
//! [`Scalar::to_bits`]), so device-side atomics work for every element type.
//! Each property carries one flag word: bit 0 is set by device reads, bit 1
//! by device atomic writes.  Flags are cleared at the start of every layer
//! by [`MacroEnvironmentStore::reset_race_flags`].
//!
//! A property is either [`MacroStorage::Owned`] (this store allocated it and
//! frees it) or [`MacroStorage::Aliased`] (a submodel view of a parent's
//! property, never freed from here).
//!
//! # Host accessors
//!
//! [`MacroEnvironmentStore::get_accessor`] hands out [`HostMacroProperty`]
//! handles that share one reference-counted metadata record per
//! (name, type, shape).  The cache only holds a weak reference; once every
//! handle is dropped the entry is evicted on the next lookup.

use std::collections::{BTreeMap, HashSet};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use ab_core::{AbError, Scalar, VarType, is_reserved};
use ab_device::{Allocation, DeviceError, DeviceExceptionBuffer, DeviceMemory, Stream};
use tracing::debug;

use crate::{EnvError, EnvResult};

#[cfg(feature = "fx-hash")]
type CacheMap<K, V> = rustc_hash::FxHashMap<K, V>;
#[cfg(not(feature = "fx-hash"))]
type CacheMap<K, V> = std::collections::HashMap<K, V>;

/// Flag bit set by device reads.
pub const READ_FLAG: u32 = 1 << 0;
/// Flag bit set by device atomic writes.
pub const WRITE_FLAG: u32 = 1 << 1;

// ── MacroBuffer ───────────────────────────────────────────────────────────────

/// One allocated macro property.
#[derive(Debug)]
pub struct MacroBuffer {
    name:   String,
    ty:     VarType,
    dims:   [u32; 4],
    cells:  Vec<AtomicU64>,
    flags:  AtomicU32,
    _alloc: Allocation,
}

impl MacroBuffer {
    fn new(name: &str, ty: VarType, dims: [u32; 4], memory: &Arc<DeviceMemory>) -> EnvResult<Self> {
        let (len, bytes) = buffer_size(ty, dims).ok_or_else(|| DeviceError::OutOfMemory {
            device:    memory.device(),
            requested: usize::MAX,
            available: memory.available(),
        })?;
        let alloc = memory.allocate(bytes)?;
        Ok(Self {
            name: name.to_owned(),
            ty,
            dims,
            cells: (0..len).map(|_| AtomicU64::new(0)).collect(),
            flags: AtomicU32::new(0),
            _alloc: alloc,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn var_type(&self) -> VarType {
        self.ty
    }

    pub fn dims(&self) -> [u32; 4] {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Row-major flat index of `index`, or `None` if out of bounds.
    pub fn flat_index(&self, index: [u32; 4]) -> Option<usize> {
        let d = self.dims;
        if index.iter().zip(d.iter()).any(|(i, n)| i >= n) {
            return None;
        }
        let [i, j, k, w] = index.map(|x| x as usize);
        let [_, dj, dk, dw] = d.map(|x| x as usize);
        Some(((i * dj + j) * dk + k) * dw + w)
    }

    #[inline]
    fn load_bits(&self, flat: usize) -> u64 {
        self.cells[flat].load(Ordering::Acquire)
    }

    #[inline]
    fn store_bits(&self, flat: usize, bits: u64) {
        self.cells[flat].store(bits, Ordering::Release);
    }

    pub fn flags(&self) -> u32 {
        self.flags.load(Ordering::Acquire)
    }

    pub fn read_flag(&self) -> bool {
        self.flags() & READ_FLAG != 0
    }

    pub fn write_flag(&self) -> bool {
        self.flags() & WRITE_FLAG != 0
    }

    fn mark(&self, bit: u32) -> u32 {
        self.flags.fetch_or(bit, Ordering::AcqRel)
    }

    pub fn reset_flags(&self) {
        self.flags.store(0, Ordering::Release);
    }

    /// Zero every element.
    pub fn zero(&self) {
        for c in &self.cells {
            c.store(0, Ordering::Release);
        }
    }
}

/// Element count and device bytes (elements plus the flag word), or `None`
/// if either overflows `usize`.
fn buffer_size(ty: VarType, dims: [u32; 4]) -> Option<(usize, usize)> {
    let len = dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))?;
    let bytes = len.checked_mul(ty.size())?.checked_add(size_of::<u32>())?;
    Some((len, bytes))
}

// ── Storage ───────────────────────────────────────────────────────────────────

/// Where a property's elements live.
#[derive(Debug, Default)]
pub enum MacroStorage {
    #[default]
    Unallocated,
    /// Allocated by this store; freed on release.
    Owned(Arc<MacroBuffer>),
    /// A parent model's buffer; never freed from here.
    Aliased(Weak<MacroBuffer>),
}

#[derive(Debug)]
struct MacroProperty {
    ty:      VarType,
    dims:    [u32; 4],
    storage: MacroStorage,
}

type CacheKey = (String, VarType, [u32; 4]);

/// Metadata shared by every host handle to one property.
#[derive(Debug)]
pub struct HostMacroMeta {
    buffer: Arc<MacroBuffer>,
}

// ── MacroEnvironmentStore ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MacroEnvironmentStore {
    props: BTreeMap<String, MacroProperty>,
    cache: Mutex<CacheMap<CacheKey, Weak<HostMacroMeta>>>,
}

impl MacroEnvironmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a property.  Nothing is allocated until [`allocate`](Self::allocate).
    pub fn declare(&mut self, name: &str, ty: VarType, dims: [u32; 4]) -> EnvResult<()> {
        if is_reserved(name) {
            return Err(AbError::ReservedName(name.to_owned()).into());
        }
        if self.props.contains_key(name) {
            return Err(AbError::DuplicateName { what: "macro property", name: name.to_owned() }.into());
        }
        if dims.contains(&0) {
            return Err(AbError::InvalidArgument(format!(
                "macro property '{name}' has a zero dimension {dims:?}"
            ))
            .into());
        }
        self.props.insert(name.to_owned(), MacroProperty { ty, dims, storage: MacroStorage::Unallocated });
        Ok(())
    }

    pub fn declare_typed<T: Scalar>(&mut self, name: &str, dims: [u32; 4]) -> EnvResult<()> {
        self.declare(name, T::TYPE, dims)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.props.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.props.keys().map(String::as_str)
    }

    fn prop(&self, name: &str) -> EnvResult<&MacroProperty> {
        self.props.get(name).ok_or_else(|| AbError::not_found("macro property", name).into())
    }

    /// Declared type and shape of `name`.
    pub fn shape(&self, name: &str) -> EnvResult<(VarType, [u32; 4])> {
        let p = self.prop(name)?;
        Ok((p.ty, p.dims))
    }

    /// `true` if `name` is a submodel alias of a parent property.
    pub fn is_aliased(&self, name: &str) -> EnvResult<bool> {
        Ok(matches!(self.prop(name)?.storage, MacroStorage::Aliased(_)))
    }

    /// Allocate a zeroed buffer for every unallocated, non-aliased property.
    pub fn allocate(&mut self, memory: &Arc<DeviceMemory>) -> EnvResult<()> {
        for (name, prop) in &mut self.props {
            if let MacroStorage::Unallocated = prop.storage {
                let buffer = MacroBuffer::new(name, prop.ty, prop.dims, memory)?;
                prop.storage = MacroStorage::Owned(Arc::new(buffer));
            }
        }
        debug!(properties = self.props.len(), "macro environment allocated");
        Ok(())
    }

    /// Alias `(sub_name, master_name)` pairs onto `master`'s buffers.
    ///
    /// Must run after `master.allocate()`.  Any buffer this store already
    /// owned for a mapped name is freed.
    pub fn map_for_submodel(
        &mut self,
        mapping: &[(String, String)],
        master:  &MacroEnvironmentStore,
    ) -> EnvResult<()> {
        for (sub_name, master_name) in mapping {
            let source = master.prop(master_name)?;
            let target = self
                .props
                .get_mut(sub_name)
                .ok_or_else(|| AbError::not_found("macro property", sub_name))?;
            if source.ty != target.ty || source.dims != target.dims {
                return Err(AbError::type_mismatch(
                    sub_name,
                    format!(
                        "{}{:?} cannot map onto parent '{master_name}' {}{:?}",
                        target.ty, target.dims, source.ty, source.dims
                    ),
                )
                .into());
            }
            let buffer = match &source.storage {
                MacroStorage::Owned(b) => Arc::downgrade(b),
                MacroStorage::Aliased(w) => w.clone(),
                MacroStorage::Unallocated => return Err(EnvError::NotAllocated(master_name.clone())),
            };
            target.storage = MacroStorage::Aliased(buffer);
        }
        Ok(())
    }

    /// The live buffer behind `name`.
    pub fn buffer(&self, name: &str) -> EnvResult<Arc<MacroBuffer>> {
        match &self.prop(name)?.storage {
            MacroStorage::Owned(b) => Ok(Arc::clone(b)),
            MacroStorage::Aliased(w) => w.upgrade().ok_or_else(|| EnvError::Released(name.to_owned())),
            MacroStorage::Unallocated => Err(EnvError::NotAllocated(name.to_owned())),
        }
    }

    fn live_buffers(&self) -> Vec<Arc<MacroBuffer>> {
        self.props.keys().filter_map(|name| self.buffer(name).ok()).collect()
    }

    /// Host accessor for `name`.
    ///
    /// Fails with `TypeMismatch` unless both `T` and `dims` match the
    /// declaration.  With `seatbelts`, fails with `RaceCondition` if an agent
    /// function wrote the property in the current layer.  Only the write flag
    /// is consulted; device reads in the same layer do not block host reads.
    pub fn get_accessor<T: Scalar>(&self, name: &str, dims: [u32; 4]) -> EnvResult<HostMacroProperty<T>> {
        let prop = self.prop(name)?;
        if prop.ty != T::TYPE || prop.dims != dims {
            return Err(AbError::type_mismatch(
                name,
                format!("declared {}{:?}, requested {}{:?}", prop.ty, prop.dims, T::TYPE, dims),
            )
            .into());
        }
        let buffer = self.buffer(name)?;
        #[cfg(feature = "seatbelts")]
        if buffer.write_flag() {
            return Err(EnvError::RaceCondition { name: name.to_owned() });
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|_, weak| weak.strong_count() > 0);
        let key = (name.to_owned(), T::TYPE, dims);
        let meta = match cache.get(&key).and_then(Weak::upgrade) {
            Some(meta) if Arc::ptr_eq(&meta.buffer, &buffer) => meta,
            _ => {
                let meta = Arc::new(HostMacroMeta { buffer });
                cache.insert(key, Arc::downgrade(&meta));
                meta
            }
        };
        Ok(HostMacroProperty { meta, _ty: PhantomData })
    }

    /// Live entries in the accessor cache.
    pub fn cached_accessors(&self) -> usize {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.values().filter(|w| w.strong_count() > 0).count()
    }

    /// Device-side view of `name` for one agent thread.  Lookup failures are
    /// reported to `exceptions` and yield a detached view whose operations
    /// return defaults.
    pub fn device_property<'a, T: Scalar>(
        &self,
        name:       &str,
        exceptions: &'a DeviceExceptionBuffer,
    ) -> DeviceMacroProperty<'a, T> {
        let buffer = match self.buffer(name) {
            Ok(b) if b.var_type() == T::TYPE => Some(b),
            Ok(b) => {
                exceptions.report(format!(
                    "macro property '{name}' is {}, accessed as {}",
                    b.var_type(),
                    T::TYPE
                ));
                None
            }
            Err(e) => {
                exceptions.report(e.to_string());
                None
            }
        };
        DeviceMacroProperty { buffer, exceptions, _ty: PhantomData }
    }

    /// Queue a flag clear for every property, striped across `streams`.
    pub fn reset_race_flags(&self, streams: &mut [Stream<'_>]) {
        if streams.is_empty() {
            return;
        }
        let n = streams.len();
        for (i, buffer) in self.live_buffers().into_iter().enumerate() {
            streams[i % n].enqueue(move || buffer.reset_flags());
        }
    }

    /// `(read, write)` flags of `name`.
    pub fn rw_flags(&self, name: &str) -> EnvResult<(bool, bool)> {
        let b = self.buffer(name)?;
        Ok((b.read_flag(), b.write_flag()))
    }

    pub fn read_flag(&self, name: &str) -> EnvResult<bool> {
        Ok(self.buffer(name)?.read_flag())
    }

    pub fn write_flag(&self, name: &str) -> EnvResult<bool> {
        Ok(self.buffer(name)?.write_flag())
    }

    /// Zero every owned property.  Aliased properties belong to the parent.
    pub fn zero_all(&self) {
        for prop in self.props.values() {
            if let MacroStorage::Owned(b) = &prop.storage {
                b.zero();
                b.reset_flags();
            }
        }
    }

    /// Free owned buffers and drop aliases.  Idempotent.
    ///
    /// Outstanding host handles keep their buffer alive until dropped.
    pub fn release(&mut self) {
        let mut freed = 0;
        for prop in self.props.values_mut() {
            if let MacroStorage::Owned(_) = prop.storage {
                freed += 1;
            }
            prop.storage = MacroStorage::Unallocated;
        }
        if freed > 0 {
            debug!(freed, "macro environment released");
        }
    }

    /// Forget all storage and cached accessors without touching the device.
    ///
    /// Used after the device was torn down underneath the store, when the
    /// allocations are already gone.
    pub fn purge(&mut self) {
        for prop in self.props.values_mut() {
            prop.storage = MacroStorage::Unallocated;
        }
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Names of properties aliased onto a parent.
    pub fn aliased_names(&self) -> HashSet<String> {
        self.props
            .iter()
            .filter(|(_, p)| matches!(p.storage, MacroStorage::Aliased(_)))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

// ── Host accessor ─────────────────────────────────────────────────────────────

/// Host handle to one macro property.
///
/// Host reads and writes go straight to the shared buffer and never touch
/// the race flags.
pub struct HostMacroProperty<T: Scalar> {
    meta: Arc<HostMacroMeta>,
    _ty:  PhantomData<T>,
}

impl<T: Scalar> HostMacroProperty<T> {
    pub fn dims(&self) -> [u32; 4] {
        self.meta.buffer.dims
    }

    pub fn len(&self) -> usize {
        self.meta.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.buffer.is_empty()
    }

    fn flat(&self, index: [u32; 4]) -> EnvResult<usize> {
        self.meta.buffer.flat_index(index).ok_or_else(|| {
            AbError::InvalidArgument(format!(
                "index {index:?} out of bounds for macro property '{}' {:?}",
                self.meta.buffer.name, self.meta.buffer.dims
            ))
            .into()
        })
    }

    pub fn get(&self, index: [u32; 4]) -> EnvResult<T> {
        let flat = self.flat(index)?;
        Ok(T::from_bits(self.meta.buffer.load_bits(flat)))
    }

    pub fn set(&self, index: [u32; 4], value: T) -> EnvResult<()> {
        let flat = self.flat(index)?;
        self.meta.buffer.store_bits(flat, value.to_bits());
        Ok(())
    }

    /// Every element in row-major order.
    pub fn to_vec(&self) -> Vec<T> {
        (0..self.len()).map(|i| T::from_bits(self.meta.buffer.load_bits(i))).collect()
    }

    pub fn fill(&self, value: T) {
        for i in 0..self.len() {
            self.meta.buffer.store_bits(i, value.to_bits());
        }
    }

    /// `true` if `self` and `other` share one cached metadata record.
    pub fn shares_handle(&self, other: &HostMacroProperty<T>) -> bool {
        Arc::ptr_eq(&self.meta, &other.meta)
    }
}

impl<T: Scalar> Clone for HostMacroProperty<T> {
    fn clone(&self) -> Self {
        Self { meta: Arc::clone(&self.meta), _ty: PhantomData }
    }
}

// ── Device accessor ───────────────────────────────────────────────────────────

/// Device-side view of one macro property inside an agent function.
///
/// `get` marks the read flag; `add`/`sub`/`min`/`max`/`exchange`/`cas` are
/// atomic and mark the write flag.  With `seatbelts`, mixing plain reads and
/// atomic writes on one property within a layer is reported as a device
/// exception.
pub struct DeviceMacroProperty<'a, T: Scalar> {
    buffer:     Option<Arc<MacroBuffer>>,
    exceptions: &'a DeviceExceptionBuffer,
    _ty:        PhantomData<T>,
}

impl<T: Scalar> DeviceMacroProperty<'_, T> {
    fn locate(&self, index: [u32; 4]) -> Option<(&MacroBuffer, usize)> {
        let buffer = self.buffer.as_deref()?;
        match buffer.flat_index(index) {
            Some(flat) => Some((buffer, flat)),
            None => {
                self.exceptions.report(format!(
                    "index {index:?} out of bounds for macro property '{}' {:?}",
                    buffer.name, buffer.dims
                ));
                None
            }
        }
    }

    fn on_read(&self, buffer: &MacroBuffer) {
        let _before = buffer.mark(READ_FLAG);
        #[cfg(feature = "seatbelts")]
        if _before & WRITE_FLAG != 0 {
            self.exceptions.report(format!(
                "macro property '{}' read after an atomic write in the same layer",
                buffer.name
            ));
        }
    }

    fn on_write(&self, buffer: &MacroBuffer) {
        let _before = buffer.mark(WRITE_FLAG);
        #[cfg(feature = "seatbelts")]
        if _before & READ_FLAG != 0 {
            self.exceptions.report(format!(
                "macro property '{}' written atomically after a read in the same layer",
                buffer.name
            ));
        }
    }

    pub fn get(&self, index: [u32; 4]) -> T {
        let Some((buffer, flat)) = self.locate(index) else { return T::default() };
        self.on_read(buffer);
        T::from_bits(buffer.load_bits(flat))
    }

    fn update(&self, index: [u32; 4], f: impl Fn(T) -> T) -> T {
        let Some((buffer, flat)) = self.locate(index) else { return T::default() };
        self.on_write(buffer);
        let prev = buffer.cells[flat]
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| Some(f(T::from_bits(bits)).to_bits()))
            .unwrap_or_else(|bits| bits);
        T::from_bits(prev)
    }

    /// Atomic add; returns the previous value.
    pub fn add(&self, index: [u32; 4], value: T) -> T {
        self.update(index, |old| old.combine_add(value))
    }

    /// Atomic subtract; returns the previous value.
    pub fn sub(&self, index: [u32; 4], value: T) -> T {
        self.update(index, |old| old.combine_sub(value))
    }

    /// Atomic minimum; returns the previous value.
    pub fn min(&self, index: [u32; 4], value: T) -> T {
        self.update(index, |old| if value < old { value } else { old })
    }

    /// Atomic maximum; returns the previous value.
    pub fn max(&self, index: [u32; 4], value: T) -> T {
        self.update(index, |old| if value > old { value } else { old })
    }

    /// Atomic swap; returns the previous value.
    pub fn exchange(&self, index: [u32; 4], value: T) -> T {
        self.update(index, |_| value)
    }

    /// Store `value` if the element equals `compare`; returns the previous
    /// value either way.
    pub fn cas(&self, index: [u32; 4], compare: T, value: T) -> T {
        let Some((buffer, flat)) = self.locate(index) else { return T::default() };
        self.on_write(buffer);
        let prev = buffer.cells[flat]
            .compare_exchange(compare.to_bits(), value.to_bits(), Ordering::AcqRel, Ordering::Acquire)
            .unwrap_or_else(|bits| bits);
        T::from_bits(prev)
    }
}

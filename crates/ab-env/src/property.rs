//! Environment properties.
//!
//! Small named, typed, fixed-length values shared by the whole model.
//! Host functions read and write them; agent functions read an immutable
//! snapshot taken when the launch is prepared.  A submodel can map one of
//! its properties onto a parent property, in which case both stores share
//! the same storage cell.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use ab_core::{AbError, ColumnData, Scalar, Value, VarType, is_reserved};

use crate::{EnvError, EnvResult};

struct EnvProperty {
    ty:       VarType,
    default:  ColumnData,
    is_const: bool,
    mapped:   bool,
    value:    Arc<RwLock<ColumnData>>,
}

impl EnvProperty {
    fn read(&self) -> ColumnData {
        self.value.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Named environment properties of one model instance.
#[derive(Default)]
pub struct EnvironmentStore {
    props: BTreeMap<String, EnvProperty>,
}

impl EnvironmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a property with its default value(s).
    pub fn declare(&mut self, name: &str, default: &[Value], is_const: bool) -> EnvResult<()> {
        if is_reserved(name) {
            return Err(AbError::ReservedName(name.to_owned()).into());
        }
        if self.props.contains_key(name) {
            return Err(AbError::DuplicateName { what: "environment property", name: name.to_owned() }.into());
        }
        let ty = default
            .first()
            .map(Value::var_type)
            .ok_or_else(|| AbError::InvalidArgument(format!("property '{name}' has no default value")))?;
        let default = ColumnData::from_values(ty, default)
            .ok_or_else(|| AbError::type_mismatch(name, "default values mix element types"))?;
        self.props.insert(name.to_owned(), EnvProperty {
            ty,
            value: Arc::new(RwLock::new(default.clone())),
            default,
            is_const,
            mapped: false,
        });
        Ok(())
    }

    pub fn declare_scalar<T: Scalar>(&mut self, name: &str, default: T, is_const: bool) -> EnvResult<()> {
        self.declare(name, &[default.into_value()], is_const)
    }

    fn prop(&self, name: &str) -> EnvResult<&EnvProperty> {
        self.props
            .get(name)
            .ok_or_else(|| AbError::not_found("environment property", name).into())
    }

    fn check_type<T: Scalar>(&self, name: &str, prop: &EnvProperty) -> EnvResult<()> {
        if prop.ty != T::TYPE {
            return Err(AbError::type_mismatch(
                name,
                format!("declared {}, accessed as {}", prop.ty, T::TYPE),
            )
            .into());
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.props.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.props.keys().map(String::as_str)
    }

    pub fn var_type(&self, name: &str) -> EnvResult<VarType> {
        Ok(self.prop(name)?.ty)
    }

    pub fn len(&self, name: &str) -> EnvResult<usize> {
        Ok(self.prop(name)?.default.len())
    }

    pub fn get<T: Scalar>(&self, name: &str) -> EnvResult<T> {
        self.get_element(name, 0)
    }

    pub fn get_element<T: Scalar>(&self, name: &str, element: usize) -> EnvResult<T> {
        let prop = self.prop(name)?;
        self.check_type::<T>(name, prop)?;
        let value = prop.read();
        T::slice(&value)
            .and_then(|s| s.get(element).copied())
            .ok_or_else(|| out_of_range(name, element, value.len()))
    }

    pub fn get_array<T: Scalar>(&self, name: &str) -> EnvResult<Vec<T>> {
        let prop = self.prop(name)?;
        self.check_type::<T>(name, prop)?;
        Ok(T::slice(&prop.read()).map(<[T]>::to_vec).unwrap_or_default())
    }

    /// All elements as dynamically typed values (for logging).
    pub fn values(&self, name: &str) -> EnvResult<Vec<Value>> {
        let value = self.prop(name)?.read();
        Ok((0..value.len()).filter_map(|i| value.get(i)).collect())
    }

    /// Set element 0; returns the previous value.
    pub fn set<T: Scalar>(&self, name: &str, value: T) -> EnvResult<T> {
        self.set_element(name, 0, value)
    }

    pub fn set_element<T: Scalar>(&self, name: &str, element: usize, value: T) -> EnvResult<T> {
        let prop = self.prop(name)?;
        self.check_type::<T>(name, prop)?;
        if prop.is_const {
            return Err(EnvError::ReadOnly(name.to_owned()));
        }
        let mut cell = prop.value.write().unwrap_or_else(PoisonError::into_inner);
        let len = cell.len();
        let slot = T::slice_mut(&mut cell)
            .and_then(|s| s.get_mut(element))
            .ok_or_else(|| out_of_range(name, element, len))?;
        Ok(std::mem::replace(slot, value))
    }

    /// Override a value regardless of `is_const` (run-plan overrides).
    pub fn override_values(&self, name: &str, values: &[Value]) -> EnvResult<()> {
        let prop = self.prop(name)?;
        let column = ColumnData::from_values(prop.ty, values)
            .filter(|c| c.len() == prop.default.len())
            .ok_or_else(|| {
                AbError::type_mismatch(name, format!("expected {} values of {}", prop.default.len(), prop.ty))
            })?;
        *prop.value.write().unwrap_or_else(PoisonError::into_inner) = column;
        Ok(())
    }

    /// Share `master_name`'s storage from `master` under `name`.
    pub fn map_from(&mut self, name: &str, master: &EnvironmentStore, master_name: &str) -> EnvResult<()> {
        let source = master.prop(master_name)?;
        let prop = self
            .props
            .get_mut(name)
            .ok_or_else(|| AbError::not_found("environment property", name))?;
        if prop.ty != source.ty || prop.default.len() != source.default.len() {
            return Err(AbError::type_mismatch(
                name,
                format!("cannot map onto parent property '{master_name}' of a different type or length"),
            )
            .into());
        }
        prop.value = Arc::clone(&source.value);
        prop.mapped = true;
        Ok(())
    }

    pub fn is_mapped(&self, name: &str) -> EnvResult<bool> {
        Ok(self.prop(name)?.mapped)
    }

    /// Restore declared defaults.  Mapped properties belong to the parent
    /// and are skipped when `skip_mapped` is set.
    pub fn reset_to_defaults(&self, skip_mapped: bool) {
        for prop in self.props.values() {
            if skip_mapped && prop.mapped {
                continue;
            }
            *prop.value.write().unwrap_or_else(PoisonError::into_inner) = prop.default.clone();
        }
    }

    /// Immutable copy of every property for one launch.
    pub fn snapshot(&self) -> EnvSnapshot {
        let values = self.props.iter().map(|(k, p)| (k.clone(), p.read())).collect();
        EnvSnapshot { values: Arc::new(values) }
    }
}

fn out_of_range(name: &str, element: usize, len: usize) -> EnvError {
    AbError::InvalidArgument(format!("element {element} out of range for '{name}' (length {len})")).into()
}

/// Read-only view of the environment handed to agent functions.
#[derive(Clone, Debug, Default)]
pub struct EnvSnapshot {
    values: Arc<HashMap<String, ColumnData>>,
}

impl EnvSnapshot {
    /// Element `element` of `name`, or `None` if absent or of another type.
    pub fn get<T: Scalar>(&self, name: &str, element: usize) -> Option<T> {
        self.values.get(name).and_then(T::slice).and_then(|s| s.get(element).copied())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

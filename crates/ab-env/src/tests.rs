//! Unit tests for ab-env.

#[cfg(test)]
mod properties {
    use ab_core::{AbError, Value};

    use crate::{EnvError, EnvironmentStore};

    fn store() -> EnvironmentStore {
        let mut env = EnvironmentStore::new();
        env.declare_scalar::<f32>("speed", 1.5, false).unwrap();
        env.declare("weights", &[Value::I32(1), Value::I32(2), Value::I32(3)], false).unwrap();
        env.declare_scalar::<u32>("seed", 7, true).unwrap();
        env
    }

    #[test]
    fn get_and_set_return_previous() {
        let env = store();
        assert_eq!(env.get::<f32>("speed").unwrap(), 1.5);
        assert_eq!(env.set::<f32>("speed", 2.0).unwrap(), 1.5);
        assert_eq!(env.get::<f32>("speed").unwrap(), 2.0);
        assert_eq!(env.get_array::<i32>("weights").unwrap(), vec![1, 2, 3]);
        assert_eq!(env.set_element::<i32>("weights", 2, 9).unwrap(), 3);
        assert_eq!(env.get_element::<i32>("weights", 2).unwrap(), 9);
    }

    #[test]
    fn wrong_type_is_rejected() {
        let env = store();
        assert!(matches!(
            env.get::<f64>("speed"),
            Err(EnvError::Core(AbError::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn unknown_and_out_of_range() {
        let env = store();
        assert!(matches!(env.get::<f32>("nope"), Err(EnvError::Core(AbError::NotFound { .. }))));
        assert!(matches!(
            env.get_element::<i32>("weights", 3),
            Err(EnvError::Core(AbError::InvalidArgument(_)))
        ));
    }

    #[test]
    fn const_properties_are_read_only() {
        let env = store();
        assert_eq!(env.set::<u32>("seed", 1), Err(EnvError::ReadOnly("seed".into())));
        env.override_values("seed", &[Value::U32(11)]).unwrap();
        assert_eq!(env.get::<u32>("seed").unwrap(), 11);
    }

    #[test]
    fn reserved_and_duplicate_names() {
        let mut env = store();
        assert!(matches!(
            env.declare_scalar::<f32>("_hidden", 0.0, false),
            Err(EnvError::Core(AbError::ReservedName(_)))
        ));
        assert!(matches!(
            env.declare_scalar::<f32>("speed", 0.0, false),
            Err(EnvError::Core(AbError::DuplicateName { .. }))
        ));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let env = store();
        let snap = env.snapshot();
        env.set::<f32>("speed", 4.0).unwrap();
        assert_eq!(snap.get::<f32>("speed", 0), Some(1.5));
        assert_eq!(snap.get::<f64>("speed", 0), None);
        assert_eq!(snap.get::<i32>("weights", 1), Some(2));
        assert!(!snap.contains("missing"));
    }

    #[test]
    fn mapped_property_shares_storage() {
        let parent = store();
        let mut child = EnvironmentStore::new();
        child.declare_scalar::<f32>("velocity", 0.0, false).unwrap();
        child.map_from("velocity", &parent, "speed").unwrap();
        assert!(child.is_mapped("velocity").unwrap());
        assert_eq!(child.get::<f32>("velocity").unwrap(), 1.5);
        child.set::<f32>("velocity", 3.0).unwrap();
        assert_eq!(parent.get::<f32>("speed").unwrap(), 3.0);

        child.reset_to_defaults(true);
        assert_eq!(parent.get::<f32>("speed").unwrap(), 3.0);
    }

    #[test]
    fn mapping_requires_matching_type() {
        let parent = store();
        let mut child = EnvironmentStore::new();
        child.declare_scalar::<f64>("velocity", 0.0, false).unwrap();
        assert!(matches!(
            child.map_from("velocity", &parent, "speed"),
            Err(EnvError::Core(AbError::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn reset_restores_defaults() {
        let env = store();
        env.set::<f32>("speed", 8.0).unwrap();
        env.reset_to_defaults(false);
        assert_eq!(env.get::<f32>("speed").unwrap(), 1.5);
    }
}

#[cfg(test)]
mod macro_store {
    use std::sync::Arc;

    use ab_core::{AbError, DeviceId, VarType};
    use ab_device::{DeviceExceptionBuffer, DeviceMemory, Stream};

    use crate::{EnvError, MacroEnvironmentStore};

    fn memory() -> Arc<DeviceMemory> {
        DeviceMemory::new(DeviceId(0), 1 << 20)
    }

    fn store() -> (MacroEnvironmentStore, Arc<DeviceMemory>) {
        let mem = memory();
        let mut m = MacroEnvironmentStore::new();
        m.declare_typed::<u32>("counts", [4, 3, 1, 1]).unwrap();
        m.declare_typed::<f32>("total", [1, 1, 1, 1]).unwrap();
        m.allocate(&mem).unwrap();
        (m, mem)
    }

    #[test]
    fn declare_validates() {
        let mut m = MacroEnvironmentStore::new();
        assert!(matches!(
            m.declare("_x", VarType::F32, [1, 1, 1, 1]),
            Err(EnvError::Core(AbError::ReservedName(_)))
        ));
        assert!(matches!(
            m.declare("x", VarType::F32, [1, 0, 1, 1]),
            Err(EnvError::Core(AbError::InvalidArgument(_)))
        ));
        m.declare("x", VarType::F32, [1, 1, 1, 1]).unwrap();
        assert!(matches!(
            m.declare("x", VarType::F32, [1, 1, 1, 1]),
            Err(EnvError::Core(AbError::DuplicateName { .. }))
        ));
    }

    #[test]
    fn allocation_is_charged_and_zeroed() {
        let (m, mem) = store();
        assert_eq!(mem.used(), (12 * 4 + 4) + (4 + 4));
        let h = m.get_accessor::<u32>("counts", [4, 3, 1, 1]).unwrap();
        assert!(h.to_vec().iter().all(|&v| v == 0));
        assert_eq!(h.len(), 12);
    }

    #[test]
    fn oversized_shapes_fail_to_allocate() {
        use ab_device::DeviceError;

        let mem = memory();
        // 2^64 elements overflows the byte count.
        let mut m = MacroEnvironmentStore::new();
        m.declare("huge", VarType::F64, [65536; 4]).unwrap();
        assert!(matches!(m.allocate(&mem), Err(EnvError::Allocation(DeviceError::OutOfMemory { .. }))));

        // Representable but over the pool budget.
        let mut m = MacroEnvironmentStore::new();
        m.declare("big", VarType::F64, [1024, 1024, 1, 1]).unwrap();
        assert!(matches!(m.allocate(&mem), Err(EnvError::Allocation(DeviceError::OutOfMemory { .. }))));
        assert_eq!(mem.used(), 0);
    }

    #[test]
    fn unallocated_property_has_no_accessor() {
        let mut m = MacroEnvironmentStore::new();
        m.declare_typed::<u32>("c", [2, 1, 1, 1]).unwrap();
        assert!(matches!(
            m.get_accessor::<u32>("c", [2, 1, 1, 1]),
            Err(EnvError::NotAllocated(_))
        ));
    }

    #[test]
    fn accessor_checks_type_and_shape() {
        let (m, _mem) = store();
        assert!(matches!(
            m.get_accessor::<i32>("counts", [4, 3, 1, 1]),
            Err(EnvError::Core(AbError::TypeMismatch { .. }))
        ));
        assert!(matches!(
            m.get_accessor::<u32>("counts", [3, 4, 1, 1]),
            Err(EnvError::Core(AbError::TypeMismatch { .. }))
        ));
        assert!(matches!(
            m.get_accessor::<u32>("missing", [1, 1, 1, 1]),
            Err(EnvError::Core(AbError::NotFound { .. }))
        ));
    }

    #[test]
    fn host_index_is_row_major_and_bounded() {
        let (m, _mem) = store();
        let h = m.get_accessor::<u32>("counts", [4, 3, 1, 1]).unwrap();
        h.set([1, 2, 0, 0], 5).unwrap();
        assert_eq!(h.to_vec()[5], 5);
        assert_eq!(h.get([1, 2, 0, 0]).unwrap(), 5);
        assert!(h.get([4, 0, 0, 0]).is_err());
    }

    #[test]
    fn accessors_share_cached_metadata() {
        let (m, _mem) = store();
        let a = m.get_accessor::<u32>("counts", [4, 3, 1, 1]).unwrap();
        let b = m.get_accessor::<u32>("counts", [4, 3, 1, 1]).unwrap();
        assert!(a.shares_handle(&b));
        assert_eq!(m.cached_accessors(), 1);
        drop(a);
        drop(b);
        assert_eq!(m.cached_accessors(), 0);
        let c = m.get_accessor::<u32>("counts", [4, 3, 1, 1]).unwrap();
        assert_eq!(c.get([0, 0, 0, 0]).unwrap(), 0);
    }

    #[test]
    fn device_atomics_accumulate() {
        let (m, _mem) = store();
        let ex = DeviceExceptionBuffer::new();
        let d = m.device_property::<u32>("counts", &ex);
        for _ in 0..10 {
            d.add([2, 1, 0, 0], 3);
        }
        assert_eq!(d.sub([2, 1, 0, 0], 5), 30);
        assert_eq!(d.max([0, 0, 0, 0], 7), 0);
        assert_eq!(d.min([0, 0, 0, 0], 9), 7);
        assert_eq!(d.exchange([0, 0, 0, 0], 1), 7);
        assert_eq!(d.cas([0, 0, 0, 0], 1, 4), 1);
        assert_eq!(d.cas([0, 0, 0, 0], 1, 8), 4);
        assert!(!ex.is_raised());

        let mut streams = Stream::set(1);
        m.reset_race_flags(&mut streams);
        Stream::synchronize_all(&mut streams);
        drop(streams);
        let h = m.get_accessor::<u32>("counts", [4, 3, 1, 1]).unwrap();
        assert_eq!(h.get([2, 1, 0, 0]).unwrap(), 25);
        assert_eq!(h.get([0, 0, 0, 0]).unwrap(), 4);
    }

    #[test]
    fn flag_reset_is_striped_across_streams() {
        let (m, _mem) = store();
        let ex = DeviceExceptionBuffer::new();
        m.device_property::<u32>("counts", &ex).add([0, 0, 0, 0], 1);
        m.device_property::<f32>("total", &ex).add([0, 0, 0, 0], 1.0);

        let mut streams = Stream::set(2);
        m.reset_race_flags(&mut streams);
        // One clear per property, one property per stream.
        assert_eq!(streams.iter().map(Stream::pending).collect::<Vec<_>>(), vec![1, 1]);
        assert!(m.write_flag("counts").unwrap());
        Stream::synchronize_all(&mut streams);
        drop(streams);
        assert_eq!(m.rw_flags("counts").unwrap(), (false, false));
        assert_eq!(m.rw_flags("total").unwrap(), (false, false));
    }

    #[test]
    fn device_float_add() {
        let (m, _mem) = store();
        let ex = DeviceExceptionBuffer::new();
        let d = m.device_property::<f32>("total", &ex);
        d.add([0, 0, 0, 0], 1.25);
        d.add([0, 0, 0, 0], 2.5);
        m.zero_all();
        assert_eq!(d.add([0, 0, 0, 0], 0.5), 0.0);
    }

    #[cfg(feature = "seatbelts")]
    #[test]
    fn host_read_after_device_write_races() {
        let (m, _mem) = store();
        let ex = DeviceExceptionBuffer::new();
        m.device_property::<u32>("counts", &ex).add([0, 0, 0, 0], 1);
        assert_eq!(m.rw_flags("counts").unwrap(), (false, true));
        assert_eq!(
            m.get_accessor::<u32>("counts", [4, 3, 1, 1]).err(),
            Some(EnvError::RaceCondition { name: "counts".into() })
        );

        let mut streams = Stream::set(2);
        m.reset_race_flags(&mut streams);
        Stream::synchronize_all(&mut streams);
        drop(streams);
        assert!(!m.write_flag("counts").unwrap());
        assert!(m.get_accessor::<u32>("counts", [4, 3, 1, 1]).is_ok());
    }

    #[cfg(feature = "seatbelts")]
    #[test]
    fn host_read_after_device_read_is_allowed() {
        let (m, _mem) = store();
        let ex = DeviceExceptionBuffer::new();
        m.device_property::<u32>("counts", &ex).get([0, 0, 0, 0]);
        assert!(m.read_flag("counts").unwrap());
        assert!(m.get_accessor::<u32>("counts", [4, 3, 1, 1]).is_ok());
    }

    #[cfg(feature = "seatbelts")]
    #[test]
    fn device_mixed_read_write_raises() {
        let (m, _mem) = store();
        let ex = DeviceExceptionBuffer::new();
        let d = m.device_property::<u32>("counts", &ex);
        d.get([0, 0, 0, 0]);
        assert!(!ex.is_raised());
        d.add([0, 0, 0, 0], 1);
        assert!(ex.is_raised());
    }

    #[test]
    fn device_misuse_reports_and_defaults() {
        let (m, _mem) = store();
        let ex = DeviceExceptionBuffer::new();
        let d = m.device_property::<i64>("counts", &ex);
        assert_eq!(d.get([0, 0, 0, 0]), 0);
        assert!(ex.take().is_some());

        let d = m.device_property::<u32>("counts", &ex);
        assert_eq!(d.add([9, 0, 0, 0], 1), 0);
        assert!(ex.take().unwrap().contains("out of bounds"));
    }

    #[test]
    fn submodel_alias_shares_buffer() {
        let (master, mem) = store();
        let mut sub = MacroEnvironmentStore::new();
        sub.declare_typed::<u32>("c", [4, 3, 1, 1]).unwrap();
        sub.declare_typed::<u32>("own", [1, 1, 1, 1]).unwrap();
        sub.map_for_submodel(&[("c".into(), "counts".into())], &master).unwrap();
        sub.allocate(&mem).unwrap();
        assert!(sub.is_aliased("c").unwrap());
        assert!(!sub.is_aliased("own").unwrap());

        sub.get_accessor::<u32>("c", [4, 3, 1, 1]).unwrap().set([3, 2, 0, 0], 42).unwrap();
        let h = master.get_accessor::<u32>("counts", [4, 3, 1, 1]).unwrap();
        assert_eq!(h.get([3, 2, 0, 0]).unwrap(), 42);

        sub.zero_all();
        assert_eq!(h.get([3, 2, 0, 0]).unwrap(), 42);

        let before = mem.used();
        sub.release();
        sub.release();
        assert_eq!(mem.used(), before - 8);
        assert_eq!(h.get([3, 2, 0, 0]).unwrap(), 42);
    }

    #[test]
    fn submodel_alias_checks_shape() {
        let (master, _mem) = store();
        let mut sub = MacroEnvironmentStore::new();
        sub.declare_typed::<u32>("c", [4, 1, 1, 1]).unwrap();
        assert!(matches!(
            sub.map_for_submodel(&[("c".into(), "counts".into())], &master),
            Err(EnvError::Core(AbError::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn release_frees_owned_buffers() {
        let (mut m, mem) = store();
        m.release();
        assert_eq!(mem.used(), 0);
        m.release();
        assert!(matches!(m.buffer("counts"), Err(EnvError::NotAllocated(_))));
        m.allocate(&mem).unwrap();
        assert!(mem.used() > 0);
        m.purge();
        assert_eq!(m.cached_accessors(), 0);
    }
}

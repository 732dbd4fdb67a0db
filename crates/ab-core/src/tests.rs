//! Unit tests for ab-core primitives.

#[cfg(test)]
mod ids {
    use crate::{AgentId, DeviceId};

    #[test]
    fn index_roundtrip() {
        let id = AgentId(42);
        assert_eq!(id.index(), 42);
        assert_eq!(AgentId::try_from(42usize).unwrap(), id);
    }

    #[test]
    fn unset_agent_id_is_zero() {
        assert_eq!(AgentId::default(), AgentId::UNSET);
        assert!(!AgentId(0).is_set());
        assert!(AgentId(1).is_set());
    }

    #[test]
    fn invalid_sentinels_are_max() {
        assert_eq!(AgentId::INVALID.0, u32::MAX);
        assert_eq!(DeviceId::INVALID.0, u32::MAX);
    }

    #[test]
    fn display() {
        assert_eq!(AgentId(7).to_string(), "AgentId(7)");
    }
}

#[cfg(test)]
mod types {
    use crate::{ColumnData, Scalar, Value, VarType, VariableSpec};

    #[test]
    fn sizes_match_primitives() {
        assert_eq!(VarType::F32.size(), 4);
        assert_eq!(VarType::U64.size(), 8);
        assert_eq!(VarType::I8.size(), 1);
        assert_eq!(VarType::ALL.len(), 10);
    }

    #[test]
    fn scalar_tags() {
        assert_eq!(<f32 as Scalar>::TYPE, VarType::F32);
        assert_eq!(<i16 as Scalar>::TYPE, VarType::I16);
    }

    #[test]
    fn bits_roundtrip_signed_and_float() {
        assert_eq!(<i8 as Scalar>::from_bits((-5i8).to_bits()), -5);
        assert_eq!(<f32 as Scalar>::from_bits(Scalar::to_bits(1.5f32)), 1.5);
        assert_eq!(<f64 as Scalar>::from_bits(Scalar::to_bits(-2.25f64)), -2.25);
    }

    #[test]
    fn integer_add_wraps() {
        assert_eq!(250u8.combine_add(10), 4);
        assert_eq!(0u32.combine_sub(1), u32::MAX);
    }

    #[test]
    fn column_set_rejects_wrong_type() {
        let mut col = ColumnData::zeroed(VarType::F32, 3);
        assert!(col.set(1, Value::F32(2.0)));
        assert!(!col.set(1, Value::U32(2)));
        assert!(!col.set(9, Value::F32(2.0)));
        assert_eq!(col.get(1), Some(Value::F32(2.0)));
    }

    #[test]
    fn retain_rows_respects_array_len() {
        let mut col = ColumnData::U32(vec![1, 2, 3, 4, 5, 6]);
        col.retain_rows(&[true, false, true], 2);
        assert_eq!(col, ColumnData::U32(vec![1, 2, 5, 6]));
    }

    #[test]
    fn gather_rows_reorders() {
        let col = ColumnData::I32(vec![10, 20, 30]);
        assert_eq!(col.gather_rows(&[2, 0, 1], 1), ColumnData::I32(vec![30, 10, 20]));
    }

    #[test]
    fn le_bytes_roundtrip() {
        let mut buf = [0u8; 8];
        Value::I64(-99).write_le(&mut buf);
        assert_eq!(Value::read_le(VarType::I64, &buf), Value::I64(-99));
    }

    #[test]
    fn spec_validation() {
        assert!(VariableSpec::scalar::<f32>("x").validate().is_ok());
        let mut bad = VariableSpec::array::<u8>("a", 2);
        bad.default.pop();
        assert!(bad.validate().is_err());
    }
}

#[cfg(test)]
mod columns {
    use std::sync::Arc;

    use crate::{AbError, Columns, VariableSpec};

    fn schema() -> Arc<[VariableSpec]> {
        vec![
            VariableSpec::with_default::<f32>("x", 1.0),
            VariableSpec::array::<u32>("bag", 3),
        ]
        .into()
    }

    #[test]
    fn defaults_fill_new_rows() {
        let cols = Columns::with_defaults(schema(), 2);
        assert_eq!(cols.len(), 2);
        assert_eq!(cols.get::<f32>("x", 1, 0).unwrap(), 1.0);
        assert_eq!(cols.get::<u32>("bag", 1, 2).unwrap(), 0);
    }

    #[test]
    fn typed_access_checks_type() {
        let cols = Columns::with_defaults(schema(), 1);
        assert!(matches!(cols.get::<f64>("x", 0, 0), Err(AbError::TypeMismatch { .. })));
        assert!(matches!(cols.get::<f32>("nope", 0, 0), Err(AbError::NotFound { .. })));
    }

    #[test]
    fn retain_and_permute_keep_columns_aligned() {
        let mut cols = Columns::with_defaults(schema(), 4);
        for i in 0..4 {
            cols.set::<f32>("x", i, 0, i as f32).unwrap();
            cols.set::<u32>("bag", i, 1, i as u32 * 10).unwrap();
        }
        cols.retain(&[true, false, true, true]);
        assert_eq!(cols.len(), 3);
        cols.permute(&[2, 0, 1]);
        assert_eq!(cols.slice::<f32>("x").unwrap(), &[3.0, 0.0, 2.0]);
        assert_eq!(cols.get::<u32>("bag", 0, 1).unwrap(), 30);
    }

    #[test]
    fn row_copy_roundtrip() {
        let mut cols = Columns::with_defaults(schema(), 2);
        cols.set::<f32>("x", 0, 0, 7.5).unwrap();
        let row = cols.read_row(0);
        cols.write_row(1, &row);
        cols.push_row(&row);
        assert_eq!(cols.slice::<f32>("x").unwrap(), &[7.5, 7.5, 7.5]);
    }

    #[test]
    fn append_requires_same_layout() {
        let mut a = Columns::with_defaults(schema(), 1);
        let b = Columns::with_defaults(schema(), 2);
        a.append(&b).unwrap();
        assert_eq!(a.len(), 3);

        let other: Arc<[VariableSpec]> = vec![VariableSpec::scalar::<f32>("y")].into();
        assert!(a.append(&Columns::new(other)).is_err());
    }
}

#[cfg(test)]
mod rng {
    use crate::{AgentRng, SimRng, mix_seed};

    #[test]
    fn thread_rng_is_deterministic() {
        let mut a = AgentRng::for_thread(42, 3, 0xdead, 7);
        let mut b = AgentRng::for_thread(42, 3, 0xdead, 7);
        for _ in 0..16 {
            assert_eq!(a.random::<u64>(), b.random::<u64>());
        }
    }

    #[test]
    fn neighbouring_threads_differ() {
        let mut a = AgentRng::for_thread(42, 3, 0xdead, 7);
        let mut b = AgentRng::for_thread(42, 3, 0xdead, 8);
        assert_ne!(a.random::<u64>(), b.random::<u64>());
    }

    #[test]
    fn reseed_restarts_stream() {
        let mut rng = SimRng::new(9);
        let first: u32 = rng.random();
        rng.reseed(9);
        assert_eq!(rng.random::<u32>(), first);
        assert_eq!(rng.seed(), 9);
    }

    #[test]
    fn mix_is_not_identity() {
        assert_ne!(mix_seed(0, 1), 1);
        assert_ne!(mix_seed(1, 2), mix_seed(2, 1));
    }
}

#[cfg(test)]
mod hash {
    use crate::namespace_hash;

    #[test]
    fn fnv1a_reference_values() {
        assert_eq!(namespace_hash(""), 0x811c_9dc5);
        assert_eq!(namespace_hash("a"), 0xe40c_292c);
    }

    #[test]
    fn usable_in_const_context() {
        const H: u32 = namespace_hash("agent");
        assert_eq!(H, namespace_hash("agent"));
    }
}

#[cfg(test)]
mod config {
    use crate::SimConfig;

    #[test]
    fn zero_steps_is_unlimited() {
        let cfg = SimConfig { steps: 0, ..SimConfig::default() };
        assert!(!cfg.step_limit_reached(1_000_000));
    }

    #[test]
    fn fixed_seed_is_stable() {
        let cfg = SimConfig { random_seed: Some(5), ..SimConfig::default() };
        assert_eq!(cfg.resolve_seed(), 5);
        assert_eq!(cfg.resolve_seed(), 5);
    }
}

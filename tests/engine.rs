use btreekv::{Config, Engine, Error};
use tempfile::tempdir;

fn key(n: u32) -> Vec<u8> {
    n.to_be_bytes().to_vec()
}

#[test]
fn put_get_over_many_keys_forces_splits() {
    let dir = tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        order: 32,
        cache_size: 64,
    };
    let engine = Engine::create(&config).unwrap();

    for i in 0..1000u32 {
        engine.put(&key(i), format!("value-{i}").as_bytes()).unwrap();
    }
    for i in 0..1000u32 {
        let v = engine.get(&key(i)).unwrap();
        assert_eq!(v, format!("value-{i}").into_bytes());
    }
    assert!(matches!(engine.get(&key(1000)), Err(Error::KeyNotFound)));
}

#[test]
fn delete_half_the_keys_then_reread() {
    let dir = tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        order: 16,
        cache_size: 32,
    };
    let engine = Engine::create(&config).unwrap();

    for i in 0..500u32 {
        engine.put(&key(i), &key(i)).unwrap();
    }
    for i in (0..500u32).step_by(2) {
        engine.delete(&key(i)).unwrap();
    }
    for i in 0..500u32 {
        let v = engine.get(&key(i));
        if i % 2 == 0 {
            assert!(matches!(v, Err(Error::KeyNotFound)));
        } else {
            assert_eq!(v.unwrap(), key(i));
        }
    }
}

#[test]
fn close_and_reopen_preserves_data() {
    let dir = tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        order: 32,
        cache_size: 64,
    };
    {
        let engine = Engine::create(&config).unwrap();
        for i in 0..200u32 {
            engine.put(&key(i), &key(i * 2)).unwrap();
        }
        engine.close().unwrap();
    }
    {
        let engine = Engine::open(&config).unwrap();
        for i in 0..200u32 {
            assert_eq!(engine.get(&key(i)).unwrap(), key(i * 2));
        }
    }
}

#[test]
fn range_scan_is_ordered_and_bounded() {
    let dir = tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        order: 16,
        cache_size: 32,
    };
    let engine = Engine::create(&config).unwrap();
    for i in 0..300u32 {
        engine.put(&key(i), &key(i)).unwrap();
    }

    let results = engine.range(&key(100), &key(110)).unwrap();
    let expected: Vec<_> = (100..110u32).map(|i| (key(i), key(i))).collect();
    assert_eq!(results, expected);
}

#[test]
fn range_scan_with_nil_bounds_covers_the_whole_tree() {
    let dir = tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        order: 16,
        cache_size: 32,
    };
    let engine = Engine::create(&config).unwrap();
    for i in 0..50u32 {
        engine.put(&key(i), &key(i)).unwrap();
    }

    let results = engine.range(&[], &[]).unwrap();
    let expected: Vec<_> = (0..50u32).map(|i| (key(i), key(i))).collect();
    assert_eq!(results, expected);
}

#[test]
fn rejects_empty_keys() {
    let dir = tempdir().unwrap();
    let config = Config::new(dir.path());
    let engine = Engine::create(&config).unwrap();
    assert!(engine.put(&[], b"x").is_err());
    assert!(engine.get(&[]).is_err());
    assert!(engine.delete(&[]).is_err());
}

#[test]
fn get_and_delete_on_a_missing_key_report_key_not_found() {
    let dir = tempdir().unwrap();
    let config = Config::new(dir.path());
    let engine = Engine::create(&config).unwrap();
    assert!(matches!(engine.get(b"missing"), Err(Error::KeyNotFound)));
    assert!(matches!(engine.delete(b"missing"), Err(Error::KeyNotFound)));
}

#[test]
fn operations_after_close_report_closed() {
    let dir = tempdir().unwrap();
    let config = Config::new(dir.path());
    let engine = Engine::create(&config).unwrap();
    engine.put(b"a", b"1").unwrap();
    engine.close().unwrap();
    assert!(matches!(engine.get(b"a"), Err(btreekv::Error::Closed)));
}

#[test]
fn small_order_forces_merges_on_delete() {
    let dir = tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        order: 8,
        cache_size: 16,
    };
    let engine = Engine::create(&config).unwrap();
    for i in 0..1500u32 {
        engine.put(&key(i), &key(i)).unwrap();
    }
    for i in 0..1490u32 {
        engine.delete(&key(i)).unwrap();
    }
    for i in 1490..1500u32 {
        assert_eq!(engine.get(&key(i)).unwrap(), key(i));
    }
    for i in 0..1490u32 {
        assert!(matches!(engine.get(&key(i)), Err(Error::KeyNotFound)));
    }
}

#[test]
fn put_of_a_value_too_large_for_a_page_returns_an_error_instead_of_panicking() {
    let dir = tempdir().unwrap();
    let config = Config::new(dir.path());
    let engine = Engine::create(&config).unwrap();
    let huge_value = vec![0u8; 8192];
    assert!(matches!(
        engine.put(b"k", &huge_value),
        Err(Error::ValueTooLarge)
    ));
}

#[test]
fn stats_reports_key_count_and_amplification() {
    let dir = tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        order: 32,
        cache_size: 64,
    };
    let engine = Engine::create(&config).unwrap();
    for i in 0..1000u32 {
        engine.put(&key(i), &key(i)).unwrap();
    }

    let stats = engine.stats().unwrap();
    assert_eq!(stats.num_keys, 1000);
    assert!(stats.write_amp >= 1.0);
    assert!(stats.space_amp >= 1.0);
}

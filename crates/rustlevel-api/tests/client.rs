// Handle, batch and cursor behaviour against the reference engine

mod common;

use common::{collect_range, text, FaultyEngine, StoreFixture};
use proptest::prelude::*;
use rustlevel::{Batch, CursorState, Error, Handle, ReadOptions, ScanRange, WriteOptions};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_demo_scenario() {
    let fixture = StoreFixture::new();
    let handle = fixture.open();

    handle.put("Hello", "World").unwrap();
    assert_eq!(handle.get("Hello").unwrap(), "World");

    let mut batch = handle.batch();
    batch.put("foo", "bar").put("booz", "baz");
    batch.write(&WriteOptions::default()).unwrap();
    assert_eq!(handle.get("foo").unwrap(), "bar");
    assert_eq!(handle.get("booz").unwrap(), "baz");

    handle.delete("Hello").unwrap();
    let err = handle.get("Hello").unwrap_err();
    assert!(err.is_not_found());

    let mut cursor = handle.cursor().unwrap();
    assert_eq!(
        collect_range(&mut cursor, &ScanRange::all()).unwrap(),
        pairs(&[("booz", "baz"), ("foo", "bar")])
    );

    handle.close().unwrap();
    assert!(matches!(handle.get("foo"), Err(Error::HandleClosed)));
}

#[test]
fn test_put_overwrites_and_delete_is_idempotent() {
    let handle = Handle::in_memory();
    handle.put("k", "one").unwrap();
    handle.put("k", "two").unwrap();
    assert_eq!(handle.get("k").unwrap(), "two");

    handle.delete("k").unwrap();
    handle.delete("k").unwrap();
    handle.delete("never-existed").unwrap();
    assert!(handle.get("k").unwrap_err().is_not_found());
}

#[test]
fn test_batch_applies_in_order() {
    let handle = Handle::in_memory();
    handle.put("gone", "x").unwrap();

    let mut batch = Batch::new();
    batch
        .put("k", "first")
        .delete("gone")
        .put("k", "second")
        .put("tmp", "1")
        .delete("tmp");
    handle.write(&mut batch, &WriteOptions::default()).unwrap();

    assert!(batch.is_empty());
    assert_eq!(handle.get("k").unwrap(), "second");
    assert!(handle.get("gone").unwrap_err().is_not_found());
    assert!(handle.get("tmp").unwrap_err().is_not_found());
}

#[test]
fn test_failed_write_keeps_batch_for_retry() {
    let engine = FaultyEngine::new();
    let handle = Handle::with_engine(engine.clone());

    let mut batch = handle.batch();
    batch.put("a", "1").put("b", "2");

    engine.fail_writes(true);
    assert!(matches!(
        batch.write(&WriteOptions::default()),
        Err(Error::Io(_))
    ));
    assert_eq!(batch.len(), 2);
    assert!(handle.get("a").unwrap_err().is_not_found());

    engine.fail_writes(false);
    batch.write(&WriteOptions::default()).unwrap();
    assert!(batch.is_empty());
    assert_eq!(handle.get("a").unwrap(), "1");
    assert_eq!(handle.get("b").unwrap(), "2");
}

#[test]
fn test_range_scan_bounds() {
    let handle = Handle::in_memory();
    for key in ["a", "b", "c", "d"] {
        handle.put(key, format!("v{}", key)).unwrap();
    }
    let mut cursor = handle.cursor().unwrap();

    assert_eq!(
        collect_range(&mut cursor, &ScanRange::between("b", "c")).unwrap(),
        pairs(&[("b", "vb"), ("c", "vc")])
    );
    assert!(collect_range(&mut cursor, &ScanRange::starting_at("z"))
        .unwrap()
        .is_empty());
    assert_eq!(
        collect_range(&mut cursor, &ScanRange::all().with_limit("a")).unwrap(),
        pairs(&[("a", "va")])
    );
    assert_eq!(cursor.state(), CursorState::Valid);
}

#[test]
fn test_cursor_invalidation() {
    let handle = Handle::in_memory();
    handle.put("a", "1").unwrap();

    let mut cursor = handle.cursor().unwrap();
    cursor.seek("zzz").unwrap();
    assert!(!cursor.valid());
    assert!(matches!(cursor.key(), Err(Error::InvalidPosition)));
    assert!(matches!(cursor.current(), Err(Error::InvalidPosition)));
    assert!(matches!(cursor.next(), Err(Error::Precondition(_))));

    cursor.first().unwrap();
    assert_eq!(text(cursor.key().unwrap()), "a");
}

#[test]
fn test_cursor_and_bound_batch_fail_after_close() {
    let handle = Handle::in_memory();
    handle.put("a", "1").unwrap();
    let mut cursor = handle.cursor().unwrap();
    let mut batch = handle.batch();
    batch.put("b", "2");
    let snapshot = handle.snapshot().unwrap();

    handle.close().unwrap();

    assert!(matches!(cursor.first(), Err(Error::HandleClosed)));
    assert!(matches!(
        batch.write(&WriteOptions::default()),
        Err(Error::HandleClosed)
    ));
    assert_eq!(batch.len(), 1);
    assert!(matches!(handle.snapshot(), Err(Error::HandleClosed)));
    drop(snapshot);

    // An unbound batch still reports the missing handle first
    let mut unbound = Batch::new();
    assert!(matches!(
        unbound.write(&WriteOptions::default()),
        Err(Error::NoHandle)
    ));
}

#[test]
fn test_cursor_is_isolated_from_concurrent_writes() {
    let handle = Handle::in_memory();
    for i in 0..100 {
        handle.put(format!("key{:03}", i), "old").unwrap();
    }

    let mut cursor = handle.cursor().unwrap();

    let writer = {
        let handle = handle.clone();
        thread::spawn(move || {
            for i in 0..100 {
                handle.put(format!("key{:03}", i), "new").unwrap();
                handle.put(format!("extra{:03}", i), "x").unwrap();
                if i % 25 == 0 {
                    handle.compact_range(None, None).unwrap();
                }
            }
        })
    };

    let scanned = collect_range(&mut cursor, &ScanRange::all()).unwrap();
    writer.join().unwrap();

    assert_eq!(scanned.len(), 100);
    assert!(scanned.iter().all(|(k, v)| k.starts_with("key") && v == "old"));

    let mut fresh = handle.cursor().unwrap();
    assert_eq!(collect_range(&mut fresh, &ScanRange::all()).unwrap().len(), 200);
}

#[test]
fn test_snapshot_reads_and_cursors() {
    let handle = Handle::in_memory();
    handle.put("a", "1").unwrap();
    let snapshot = handle.snapshot().unwrap();
    handle.put("a", "2").unwrap();
    handle.put("b", "3").unwrap();

    let mut cursor = handle.cursor_with(&snapshot.read_options()).unwrap();
    assert_eq!(
        collect_range(&mut cursor, &ScanRange::all()).unwrap(),
        pairs(&[("a", "1")])
    );
    assert_eq!(handle.get_with("a", &snapshot.read_options()).unwrap(), "1");
    assert_eq!(handle.get("a").unwrap(), "2");
}

#[test]
fn test_buffer_reads() {
    let handle = Handle::in_memory();
    handle.put([1u8, 2, 3], [0xffu8, 0xfe]).unwrap();

    let options = ReadOptions::default().as_buffer();
    let value = handle.get_with([1u8, 2, 3], &options).unwrap();
    assert_eq!(value.into_bytes(), vec![0xff, 0xfe]);

    let mut cursor = handle.cursor_with(&options).unwrap();
    cursor.first().unwrap();
    assert_eq!(cursor.key().unwrap(), &[1u8, 2, 3]);
}

#[test]
fn test_shared_handle_across_threads() {
    let handle = Handle::in_memory();
    let threads: Vec<_> = (0..4)
        .map(|t| {
            let handle = handle.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    handle.put(format!("t{}:{:02}", t, i), i.to_string()).unwrap();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    let mut cursor = handle.cursor().unwrap();
    let all = collect_range(&mut cursor, &ScanRange::all()).unwrap();
    assert_eq!(all.len(), 200);
    assert!(all.windows(2).all(|w| w[0].0 < w[1].0));
}

#[test]
fn test_large_contiguous_scan() {
    const KEYS: usize = 150_000;
    let handle = Handle::in_memory();
    let mut batch = handle.batch();
    for i in 0..KEYS {
        batch.put(format!("k{:07}", i), "v");
        if i % 10_000 == 9_999 {
            batch.write(&WriteOptions::default()).unwrap();
        }
    }
    batch.write(&WriteOptions::default()).unwrap();

    let mut cursor = handle.cursor_with(&ReadOptions::default().as_buffer()).unwrap();
    let mut expected = 0usize;
    cursor.for_range(&ScanRange::all(), |pair| {
        let (key, _) = pair.unwrap();
        assert_eq!(key.into_bytes(), format!("k{:07}", expected).into_bytes());
        expected += 1;
    });
    assert_eq!(expected, KEYS);

    let mut visited = 0usize;
    cursor.for_range(&ScanRange::between("k0000100", "k0120099"), |pair| {
        pair.unwrap();
        visited += 1;
    });
    assert_eq!(visited, 120_000);
}

#[test]
fn test_handle_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    fn assert_send<T: Send>() {}
    assert_send_sync::<Handle>();
    assert_send::<rustlevel::Cursor>();
    assert_send::<Batch>();
    let _: Arc<dyn rustlevel::Engine> = FaultyEngine::new();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_range_scan_matches_model(
        ops in prop::collection::vec(
            (prop::collection::vec(0u8..8, 1..4), prop::option::of(prop::collection::vec(any::<u8>(), 0..8))),
            1..200,
        ),
        start in prop::option::of(prop::collection::vec(0u8..8, 0..4)),
        limit in prop::option::of(prop::collection::vec(0u8..8, 0..4)),
    ) {
        let handle = Handle::in_memory();
        let mut model = BTreeMap::new();
        let mut batch = handle.batch();

        for (i, (key, value)) in ops.iter().enumerate() {
            match value {
                Some(value) => {
                    batch.put(key, value);
                    model.insert(key.clone(), value.clone());
                }
                None => {
                    batch.delete(key);
                    model.remove(key);
                }
            }
            if i % 7 == 0 {
                batch.write(&WriteOptions::default()).unwrap();
            }
        }
        batch.write(&WriteOptions::default()).unwrap();

        let mut range = ScanRange::all();
        if let Some(start) = &start {
            range = range.with_start(start);
        }
        if let Some(limit) = &limit {
            range = range.with_limit(limit);
        }

        // Up to and including the first key equal to the limit, else to the end
        let mut expected: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        for (k, v) in model
            .iter()
            .filter(|(k, _)| start.as_ref().map_or(true, |s| *k >= s))
        {
            expected.push((k.clone(), v.clone()));
            if limit.as_ref() == Some(k) {
                break;
            }
        }

        let mut cursor = handle.cursor_with(&ReadOptions::default().as_buffer()).unwrap();
        let mut visited = Vec::new();
        cursor.for_range(&range, |pair| {
            let (key, value) = pair.unwrap();
            visited.push((key.into_bytes(), value.into_bytes()));
        });

        prop_assert_eq!(visited, expected);
    }
}

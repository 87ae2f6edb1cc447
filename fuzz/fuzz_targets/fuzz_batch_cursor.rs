#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rustlevel::{DataFormat, Handle, ReadOptions, ScanRange, WriteOptions};
use std::collections::BTreeMap;

#[derive(Arbitrary, Debug)]
enum Op {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
    Commit,
    Scan { start: Option<Vec<u8>>, limit: Option<Vec<u8>> },
    Seek { key: Vec<u8> },
}

fuzz_target!(|ops: Vec<Op>| {
    let handle = Handle::in_memory();
    let mut batch = handle.batch();
    let mut pending: Vec<(Vec<u8>, Option<Vec<u8>>)> = Vec::new();
    let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
    let options = ReadOptions::default().as_buffer();

    for op in ops.into_iter().take(200) {
        match op {
            Op::Put { key, value } => {
                batch.put(&key, &value);
                pending.push((key, Some(value)));
            }
            Op::Delete { key } => {
                batch.delete(&key);
                pending.push((key, None));
            }
            Op::Commit => {
                batch.write(&WriteOptions::default()).unwrap();
                for (key, value) in pending.drain(..) {
                    match value {
                        Some(value) => model.insert(key, value),
                        None => model.remove(&key),
                    };
                }
            }
            Op::Scan { start, limit } => {
                let mut range = ScanRange::all();
                range.start = start.clone();
                range.limit = limit.clone();

                let mut visited = Vec::new();
                let mut cursor = handle.cursor_with(&options).unwrap();
                cursor.for_range(&range, |pair| {
                    let (key, value) = pair.unwrap();
                    visited.push((key.into_bytes(), value.into_bytes()));
                });

                let expected: Vec<(Vec<u8>, Vec<u8>)> = model
                    .iter()
                    .filter(|(k, _)| start.as_ref().map_or(true, |s| *k >= s))
                    .filter(|(k, _)| limit.as_ref().map_or(true, |l| *k <= l))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                assert_eq!(visited, expected);
            }
            Op::Seek { key } => {
                let mut cursor = handle.cursor_with(&options).unwrap();
                cursor.seek(&key).unwrap();
                match model.range(key..).next() {
                    Some((k, v)) => {
                        assert_eq!(cursor.key_as(DataFormat::Buffer).unwrap(), k.clone());
                        assert_eq!(cursor.value().unwrap(), v.clone());
                    }
                    None => assert!(!cursor.valid()),
                }
            }
        }
    }
});

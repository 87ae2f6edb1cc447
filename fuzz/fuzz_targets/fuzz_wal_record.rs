#![no_main]

use libfuzzer_sys::fuzz_target;
use rustlevel_wal::WalRecord;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1_000_000 {
        return;
    }

    // Decoding arbitrary bytes must fail cleanly, and anything that decodes
    // must survive an encode/decode cycle unchanged
    if let Ok((record, consumed)) = WalRecord::decode(data) {
        assert!(consumed <= data.len());
        let encoded = record.encode().unwrap();
        let (again, _) = WalRecord::decode(&encoded).unwrap();
        assert_eq!(again, record);
    }
});

#![no_main]

use arbitrary::Arbitrary;
use coffer_core::{Codec, Coder, Entity};
use coffer_wal::Record;
use libfuzzer_sys::fuzz_target;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Item {
    id: u64,
    name: String,
    tags: Vec<String>,
}

impl Entity for Item {
    type Key = u64;

    fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Arbitrary, Debug)]
enum Format {
    Binary,
    Json,
    MessagePack,
}

#[derive(Arbitrary, Debug)]
struct Input {
    format: Format,
    bytes: Vec<u8>,
}

fuzz_target!(|input: Input| {
    // Limit input size to prevent timeout
    if input.bytes.len() > 1_000_000 {
        return;
    }

    let codec = match input.format {
        Format::Binary => Codec::Binary,
        Format::Json => Codec::Json,
        Format::MessagePack => Codec::MessagePack,
    };

    // Decoding arbitrary bytes must end cleanly or with an error, never panic
    let mut cursor = Cursor::new(input.bytes);
    for _ in 0..10_000 {
        if !matches!(codec.next::<Record<Item>>(&mut cursor), Ok(Some(_))) {
            break;
        }
    }
});

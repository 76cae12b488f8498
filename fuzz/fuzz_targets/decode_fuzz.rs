//! Arbitrary bytes through the driver must never panic: errors are contained
//! (force mode keeps partial trees) and every tree that comes back converts
//! to a plain value.

#![no_main]

use bitprobe::{decode, formats, BitBuffer, BridgeOptions, DecodeValue, Options, Registry, Value};
use libfuzzer_sys::fuzz_target;
use std::collections::HashMap;

fuzz_target!(|data: &[u8]| {
    let mut registry = Registry::new();
    formats::register_all(&mut registry).unwrap();
    registry.seal().unwrap();

    let mut in_arg = HashMap::new();
    in_arg.insert("length_size".to_string(), Value::Int(4));

    for force in [false, true] {
        let res = decode(
            BitBuffer::from_bytes(data.to_vec()),
            "avc_au",
            &registry,
            Options {
                force,
                format_options: Value::Object(in_arg.clone()),
                ..Options::default()
            },
        );
        if let Ok(tree) = res {
            let _ = DecodeValue::root(&tree).to_plain(&BridgeOptions::default());
        }
    }
});

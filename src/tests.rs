use crate::{
    diagnose, marshal, unmarshal, Bignum, DecOptions, DupMapKey, EncOptions, Error, IndefLength,
    TimeMode, Timestamp, Utf8Mode, Value,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

pub(crate) fn hex(s: &str) -> Vec<u8> {
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

#[test]
fn integers_use_preferred_serialization() {
    assert_eq!(marshal(&23u64).unwrap().as_slice(), &[0x17]);
    // 24 takes the one-byte argument, not 19 00 18
    assert_eq!(marshal(&24u64).unwrap().as_slice(), &[0x18, 0x18]);
    assert_eq!(marshal(&255u64).unwrap().as_slice(), &[0x18, 0xff]);
    assert_eq!(marshal(&256u64).unwrap().as_slice(), &[0x19, 0x01, 0x00]);
    assert_eq!(marshal(&-1i64).unwrap().as_slice(), &[0x20]);
    assert_eq!(marshal(&-100i64).unwrap().as_slice(), &[0x38, 0x63]);
    assert_eq!(
        marshal(&u64::MAX).unwrap().as_slice(),
        hex("1bffffffffffffffff").as_slice()
    );
    assert_eq!(
        marshal(&i64::MIN).unwrap().as_slice(),
        hex("3b7fffffffffffffff").as_slice()
    );
}

#[test]
fn indefinite_map_with_indefinite_array() {
    // {"a": 1, "b": [2, 3]} in fully indefinite encoding
    let bytes = hex("bf61610161629f0203ffff");
    let value: Value = unmarshal(&bytes).unwrap();
    assert_eq!(value.get("a"), Some(&Value::Int(1)));
    assert_eq!(
        value.get("b"),
        Some(&Value::Array(vec![Value::Int(2), Value::Int(3)]))
    );
}

#[test]
fn indefinite_byte_string_joins_chunks() {
    let bytes = hex("5f42010243030405ff");
    let joined: Vec<u8> = unmarshal(&bytes).unwrap();
    assert_eq!(joined, vec![1, 2, 3, 4, 5]);

    let strict = DecOptions {
        indef_length: IndefLength::Forbidden,
        ..DecOptions::default()
    }
    .build()
    .unwrap();
    assert!(matches!(
        strict.unmarshal::<Vec<u8>>(&bytes),
        Err(Error::IndefiniteLengthForbidden { offset: 0 })
    ));
}

#[test]
fn bignum_via_tag_2() {
    let bytes = hex("c249010000000000000000");
    let big: Bignum = unmarshal(&bytes).unwrap();
    assert_eq!(big.to_i128(), 1i128 << 64);
    assert_eq!(marshal(&big).unwrap().as_slice(), bytes.as_slice());

    // values that fit 64 bits shrink to plain integers by default
    let small = Bignum::from_u64(1000);
    assert_eq!(marshal(&small).unwrap().as_slice(), &[0x19, 0x03, 0xe8]);
    let neg = Bignum::from_i64(-500);
    assert_eq!(marshal(&neg).unwrap().as_slice(), &[0x39, 0x01, 0xf3]);

    let keep_tag = EncOptions {
        bignum_convert: crate::BignumConvert::None,
        ..EncOptions::default()
    }
    .build()
    .unwrap();
    assert_eq!(
        keep_tag.marshal(&small).unwrap().as_slice(),
        hex("c24203e8").as_slice()
    );
}

#[test]
fn nan_round_trips_canonically() {
    let value: f64 = unmarshal(&hex("f97e00")).unwrap();
    assert!(value.is_nan());
    assert_eq!(marshal(&value).unwrap().as_slice(), hex("f97e00").as_slice());
}

#[test]
fn map_key_sorting() {
    let mut map = BTreeMap::new();
    map.insert("aa".to_owned(), 3u64);
    map.insert("a".to_owned(), 1u64);
    map.insert("b".to_owned(), 2u64);

    // length-first: "a", "b", "aa"
    let mode = EncOptions::canonical().build().unwrap();
    assert_eq!(
        mode.marshal(&map).unwrap().as_slice(),
        hex("a3 6161 01 6162 02 626161 03").as_slice()
    );

    // byte-wise lexical: "a", "aa", "b"
    let mode = EncOptions::ctap2_canonical().build().unwrap();
    assert_eq!(
        mode.marshal(&map).unwrap().as_slice(),
        hex("a3 6161 01 626161 03 6162 02").as_slice()
    );

    // unsorted keeps iteration order (BTreeMap: "a", "aa", "b")
    let mode = EncOptions::default().build().unwrap();
    assert_eq!(
        mode.marshal(&map).unwrap().as_slice(),
        hex("a3 6161 01 626161 03 6162 02").as_slice()
    );
}

#[test]
fn sort_is_stable_for_duplicate_keys() {
    let map = Value::Map(vec![
        (Value::Text("k".into()), Value::Int(1)),
        (Value::Text("a".into()), Value::Int(0)),
        (Value::Text("k".into()), Value::Int(2)),
    ]);
    let mode = EncOptions::ctap2_canonical().build().unwrap();
    // equal keys keep their insertion order after sorting
    assert_eq!(
        mode.marshal(&map).unwrap().as_slice(),
        hex("a3 6161 00 616b 01 616b 02").as_slice()
    );
}

#[test]
fn deterministic_modes_are_reproducible() {
    let mut map = std::collections::HashMap::new();
    for i in 0..20u64 {
        map.insert(format!("key{}", i), i);
    }
    let mode = EncOptions::core_deterministic().build().unwrap();
    let a = mode.marshal(&map).unwrap();
    let b = mode.marshal(&map).unwrap();
    assert_eq!(a, b);
}

#[test]
fn value_round_trip() {
    let value = Value::Map(vec![
        (Value::Int(1), Value::Text("x".into())),
        (
            Value::Text("list".into()),
            Value::Array(vec![
                Value::Bool(true),
                Value::Null,
                Value::Undefined,
                Value::Bytes(vec![1, 2]),
                Value::Float(1.5),
                Value::Tag(1000, Box::new(Value::Int(-4))),
                Value::Simple(99),
            ]),
        ),
    ]);
    let bytes = marshal(&value).unwrap();
    let back: Value = unmarshal(bytes.as_slice()).unwrap();
    assert_eq!(back, value);
}

#[test]
fn integer_width_on_the_dynamic_path() {
    let v: Value = unmarshal(&hex("1b7fffffffffffffff")).unwrap();
    assert_eq!(v, Value::Int(i64::MAX));
    let v: Value = unmarshal(&hex("1b8000000000000000")).unwrap();
    assert_eq!(v, Value::Uint(i64::MAX as u64 + 1));
    // -2^64 does not fit the dynamic representation
    assert!(matches!(
        unmarshal::<Value>(&hex("3bffffffffffffffff")),
        Err(Error::Overflow { .. })
    ));
    // but decodes into a Bignum
    let big: Bignum = unmarshal(&hex("3bffffffffffffffff")).unwrap();
    assert_eq!(big.to_i128(), -(1i128 << 64));
}

#[test]
fn unhashable_map_keys_are_rejected() {
    // {[1]: 2}
    let bytes = hex("a1810102");
    assert!(matches!(
        unmarshal::<Value>(&bytes),
        Err(Error::TypeMismatch { target_type: "map key", .. })
    ));
}

#[test]
fn duplicate_map_keys() {
    // {"a": 1, "a": 2}
    let bytes = hex("a2616101616102");
    let v: Value = unmarshal(&bytes).unwrap();
    assert_eq!(v, Value::Map(vec![(Value::Text("a".into()), Value::Int(2))]));

    let strict = DecOptions {
        dup_map_key: DupMapKey::Reject,
        ..DecOptions::default()
    }
    .build()
    .unwrap();
    assert!(matches!(
        strict.unmarshal::<Value>(&bytes),
        Err(Error::DuplicateMapKey { index: 1 })
    ));
    assert!(matches!(
        strict.unmarshal::<BTreeMap<String, u64>>(&bytes),
        Err(Error::DuplicateMapKey { index: 1 })
    ));
}

#[test]
fn in_place_decoding_reuses_allocations() {
    let mode = DecOptions::default().build().unwrap();

    let mut numbers: Vec<u64> = Vec::with_capacity(16);
    numbers.extend([9, 9, 9, 9, 9]);
    let capacity = numbers.capacity();
    mode.unmarshal_into(&hex("83010203"), &mut numbers).unwrap();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(numbers.capacity(), capacity);

    // map update semantics: entries for absent keys stay
    let mut map: BTreeMap<String, u64> = BTreeMap::new();
    map.insert("keep".to_owned(), 7);
    map.insert("a".to_owned(), 0);
    mode.unmarshal_into(&hex("a1616101"), &mut map).unwrap();
    assert_eq!(map.get("keep"), Some(&7));
    assert_eq!(map.get("a"), Some(&1));
}

#[test]
fn option_distinguishes_nothing_from_something() {
    assert_eq!(unmarshal::<Option<u64>>(&[0xf6]).unwrap(), None);
    assert_eq!(unmarshal::<Option<u64>>(&[0xf7]).unwrap(), None);
    assert_eq!(unmarshal::<Option<u64>>(&[0x05]).unwrap(), Some(5));
    assert_eq!(marshal(&None::<u64>).unwrap().as_slice(), &[0xf6]);
}

#[test]
fn integer_overflow_reports_value_and_target() {
    match unmarshal::<u8>(&hex("190100")) {
        Err(Error::Overflow { target_type, value }) => {
            assert_eq!(target_type, "u8");
            assert_eq!(value, 256);
        }
        other => panic!("expected overflow, got {:?}", other),
    }
    assert!(matches!(unmarshal::<i64>(&hex("1b8000000000000000")), Err(Error::Overflow { .. })));
}

#[test]
fn type_mismatch_names_both_sides() {
    match unmarshal::<u64>(&hex("6161")) {
        Err(Error::TypeMismatch {
            source_type,
            target_type,
            ..
        }) => {
            assert_eq!(source_type, "text string");
            assert_eq!(target_type, "u64");
        }
        other => panic!("expected mismatch, got {:?}", other),
    }
}

#[test]
fn trailing_bytes_are_an_error_unless_asked_for() {
    let bytes = hex("0102");
    assert!(matches!(
        unmarshal::<u64>(&bytes),
        Err(Error::Syntax { offset: 1, .. })
    ));
    let (first, rest) = crate::unmarshal_first::<u64>(&bytes).unwrap();
    assert_eq!(first, 1);
    assert_eq!(rest, &[0x02]);
}

#[test]
fn time_modes() {
    let t = Timestamp::new(1363896240, 0, 0);

    let unix = EncOptions::default().build().unwrap();
    assert_eq!(unix.marshal(&t).unwrap().as_slice(), hex("1a514b67b0").as_slice());

    let tagged = EncOptions {
        time_tag: true,
        ..EncOptions::default()
    }
    .build()
    .unwrap();
    assert_eq!(
        tagged.marshal(&t).unwrap().as_slice(),
        hex("c11a514b67b0").as_slice()
    );

    let micro = EncOptions {
        time: TimeMode::UnixMicro,
        ..EncOptions::default()
    }
    .build()
    .unwrap();
    let half = Timestamp::new(1363896240, 500_000_000, 0);
    assert_eq!(
        micro.marshal(&half).unwrap().as_slice(),
        hex("fb41d452d9ec200000").as_slice()
    );

    let dynamic = EncOptions {
        time: TimeMode::UnixDynamic,
        ..EncOptions::default()
    }
    .build()
    .unwrap();
    assert_eq!(
        dynamic.marshal(&t).unwrap().as_slice(),
        hex("1a514b67b0").as_slice()
    );
    assert_eq!(
        dynamic.marshal(&half).unwrap().as_slice(),
        hex("fb41d452d9ec200000").as_slice()
    );

    let rfc = EncOptions {
        time: TimeMode::Rfc3339,
        time_tag: true,
        ..EncOptions::default()
    }
    .build()
    .unwrap();
    assert_eq!(
        rfc.marshal(&t).unwrap().as_slice(),
        hex("c074323031332d30332d32315432303a30343a30305a").as_slice()
    );

    // decoding accepts all numeric and text forms
    assert_eq!(unmarshal::<Timestamp>(&hex("c11a514b67b0")).unwrap(), t);
    assert_eq!(unmarshal::<Timestamp>(&hex("1a514b67b0")).unwrap(), t);
    assert_eq!(
        unmarshal::<Timestamp>(&hex("c074323031332d30332d32315432303a30343a30305a")).unwrap(),
        t
    );
    assert_eq!(
        unmarshal::<Timestamp>(&hex("c1fb41d452d9ec200000")).unwrap(),
        half
    );
    // NaN and infinite numeric times decode to the zero time
    assert_eq!(
        unmarshal::<Timestamp>(&hex("c1f97e00")).unwrap(),
        Timestamp::zero()
    );
    assert_eq!(
        unmarshal::<Timestamp>(&hex("c1f97c00")).unwrap(),
        Timestamp::zero()
    );
    // tag 0 requires a text string
    assert!(matches!(
        unmarshal::<Timestamp>(&hex("c000")),
        Err(Error::Semantic { .. })
    ));
    // tag 1 requires a number
    assert!(matches!(
        unmarshal::<Timestamp>(&hex("c16161")),
        Err(Error::Semantic { .. })
    ));
}

#[test]
fn streaming_encoder() {
    let mode = EncOptions::default().build().unwrap();
    let mut out = Vec::new();
    {
        let mut enc = mode.encoder(&mut out);
        enc.begin_map().unwrap();
        enc.encode("a").unwrap();
        enc.encode(&1u64).unwrap();
        enc.encode("b").unwrap();
        enc.begin_array().unwrap();
        enc.encode(&2u64).unwrap();
        enc.encode(&3u64).unwrap();
        enc.end().unwrap();
        enc.end().unwrap();
        enc.flush().unwrap();
    }
    assert_eq!(out, hex("bf61610161629f0203ffff"));

    // chunked strings enforce the chunk type
    let mut out = Vec::new();
    {
        let mut enc = mode.encoder(&mut out);
        enc.begin_byte_string().unwrap();
        enc.encode(&[1u8, 2][..]).unwrap();
        assert!(matches!(
            enc.encode("nope"),
            Err(Error::IndefiniteChunkType { .. })
        ));
        enc.encode(&vec![3u8]).unwrap();
        enc.end().unwrap();
        enc.flush().unwrap();
    }
    assert_eq!(out, hex("5f4201024103ff"));

    // maps need an even number of items, ends need an open scope
    let mut sink = Vec::new();
    let mut enc = mode.encoder(&mut sink);
    assert!(matches!(enc.end(), Err(Error::EndOutsideIndefinite)));
    enc.begin_map().unwrap();
    enc.encode(&1u64).unwrap();
    assert!(matches!(enc.end(), Err(Error::OddIndefiniteMap)));
    enc.encode(&2u64).unwrap();
    enc.end().unwrap();

    // strict profiles refuse the streaming forms entirely
    let strict = EncOptions::canonical().build().unwrap();
    let mut sink = Vec::new();
    let mut enc = strict.encoder(&mut sink);
    assert!(matches!(
        enc.begin_array(),
        Err(Error::IndefiniteLengthForbidden { .. })
    ));
}

#[test]
fn encode_errors_leave_no_bytes() {
    let mode = EncOptions::default().build().unwrap();
    let mut out = Vec::new();
    {
        let mut enc = mode.encoder(&mut out);
        let bad = Value::Array(vec![Value::Int(1), Value::Simple(24)]);
        assert!(enc.encode(&bad).is_err());
        enc.flush().unwrap();
    }
    assert!(out.is_empty());
}

#[test]
fn utf8_policies() {
    let bytes = hex("62fffe");
    assert!(matches!(
        unmarshal::<String>(&bytes),
        Err(Error::Semantic { .. })
    ));
    let lax = DecOptions {
        utf8: Utf8Mode::KeepInvalid,
        ..DecOptions::default()
    }
    .build()
    .unwrap();
    // invalid bytes are replaced when the host type insists on UTF-8
    let s: String = lax.unmarshal(&bytes).unwrap();
    assert_eq!(s, "\u{fffd}\u{fffd}");
}

#[test]
fn caps_are_enforced_per_mode() {
    let tight = DecOptions {
        max_nested_levels: 4,
        ..DecOptions::default()
    }
    .build()
    .unwrap();
    let ok = hex("8181818100");
    assert!(tight.unmarshal::<Value>(&ok).is_ok());
    let deep = hex("818181818100");
    assert!(matches!(
        tight.unmarshal::<Value>(&deep),
        Err(Error::MaxNestedLevel { max: 4 })
    ));
}

#[test]
fn self_describe_and_expected_conversion_tags_pass_through() {
    let bytes = hex("d9d9f7820102");
    let v: Value = unmarshal(&bytes).unwrap();
    assert_eq!(
        v,
        Value::Tag(
            55799,
            Box::new(Value::Array(vec![Value::Int(1), Value::Int(2)]))
        )
    );
    assert_eq!(marshal(&v).unwrap().as_slice(), bytes.as_slice());

    let bytes = hex("d5440102aabb");
    let v: Value = unmarshal(&bytes).unwrap();
    assert_eq!(
        v,
        Value::Tag(21, Box::new(Value::Bytes(hex("0102aabb"))))
    );
    assert_eq!(marshal(&v).unwrap().as_slice(), bytes.as_slice());
}

#[test]
fn display_uses_diagnostic_notation() {
    let bytes = marshal(&Value::Map(vec![
        (Value::Text("a".into()), Value::Int(1)),
        (
            Value::Text("b".into()),
            Value::Array(vec![Value::Int(2), Value::Int(3)]),
        ),
    ]))
    .unwrap();
    assert_eq!(bytes.to_string(), r#"{"a": 1, "b": [2, 3]}"#);
    assert_eq!(diagnose(bytes.as_slice()).unwrap(), bytes.to_string());
}

#[test]
fn float_decoding_covers_all_widths() {
    assert_eq!(unmarshal::<f64>(&hex("f93c00")).unwrap(), 1.0);
    assert_eq!(unmarshal::<f64>(&hex("fa47c35000")).unwrap(), 100000.0);
    assert_eq!(unmarshal::<f64>(&hex("fb3ff199999999999a")).unwrap(), 1.1);
    assert_eq!(unmarshal::<f32>(&hex("f93c00")).unwrap(), 1.0f32);
    assert!(matches!(
        unmarshal::<f32>(&hex("fb7e37e43c8800759c")),
        Err(Error::Overflow { .. })
    ));
}

#[test]
fn canonical_round_trip_through_modes() {
    let mode_enc = EncOptions::core_deterministic().build().unwrap();
    let mode_dec = DecOptions::default().build().unwrap();
    let original = Value::Map(vec![
        (Value::Int(2), Value::Array(vec![Value::Float(1.5)])),
        (Value::Int(1), Value::Text("x".into())),
    ]);
    let bytes = mode_enc.marshal(&original).unwrap();
    let decoded: Value = mode_dec.unmarshal(bytes.as_slice()).unwrap();
    // map order is canonical after the round trip
    assert_eq!(
        decoded,
        Value::Map(vec![
            (Value::Int(1), Value::Text("x".into())),
            (Value::Int(2), Value::Array(vec![Value::Float(1.5)])),
        ])
    );
    // a second encode of the decoded value is byte-identical
    assert_eq!(mode_enc.marshal(&decoded).unwrap(), bytes);
}

//! TRE interpreter tests: loops, conditionals, variable lengths, and the
//! containment of malformed records.

use nitf_core::tre::{decode_tre, shared_registry, TreSchemaRegistry};

fn registry(doc: &str) -> TreSchemaRegistry {
    TreSchemaRegistry::from_json_str(doc).unwrap()
}

#[test]
fn counter_loop_with_nested_loop() {
    let reg = registry(
        r#"{ "tres": [ {
            "tag": "ACCPOB",
            "fields": [
                { "name": "NUMACPO", "length": 2 },
                { "loop": { "counter": "NUMACPO", "md_prefix": "ACC%d_" },
                  "fields": [
                      { "name": "NUMPTS", "length": 3 },
                      { "loop": { "counter": "NUMPTS", "md_prefix": "PT%04d_" },
                        "fields": [
                            { "name": "LON", "length": 4 },
                            { "name": "LAT", "length": 4 }
                        ] }
                  ] }
            ] } ] }"#,
    );
    let schema = reg.schema_for("ACCPOB").unwrap();
    // One outer entry with two points, then one with a single point.
    let data = b"02002-001+001+002-00200100330044";
    let decoded = decode_tre(schema, data);
    assert!(decoded.error.is_none(), "{:?}", decoded.error);
    assert_eq!(decoded.consumed, data.len());
    assert_eq!(decoded.fields.get("ACC0_NUMPTS"), Some("002"));
    assert_eq!(decoded.fields.get("ACC0_PT0000_LON"), Some("-001"));
    assert_eq!(decoded.fields.get("ACC0_PT0001_LAT"), Some("-002"));
    assert_eq!(decoded.fields.get("ACC1_NUMPTS"), Some("001"));
    assert_eq!(decoded.fields.get("ACC1_PT0000_LON"), Some("0033"));
    // The tree mirrors the loop structure.
    assert_eq!(decoded.tree.children.len(), 3); // NUMACPO + two iterations
}

#[test]
fn inner_counter_shadows_outer() {
    // Both loop levels use a counter named N; the inner loop must see the
    // most recently decoded one.
    let reg = registry(
        r#"{ "tres": [ {
            "tag": "SHADOW",
            "fields": [
                { "name": "N", "length": 1 },
                { "loop": { "counter": "N", "md_prefix": "O%d_" },
                  "fields": [
                      { "name": "N", "length": 1 },
                      { "loop": { "counter": "N", "md_prefix": "I%d_" },
                        "fields": [ { "name": "V", "length": 1 } ] }
                  ] }
            ] } ] }"#,
    );
    let schema = reg.schema_for("SHADOW").unwrap();
    // Outer count 2; first inner count 3, second inner count 1.
    let data = b"23abc1z";
    let decoded = decode_tre(schema, data);
    assert!(decoded.error.is_none(), "{:?}", decoded.error);
    assert_eq!(decoded.consumed, data.len());
    assert_eq!(decoded.fields.get("O0_I2_V"), Some("c"));
    assert_eq!(decoded.fields.get("O1_I0_V"), Some("z"));
}

#[test]
fn condition_gates_fields() {
    let reg = registry(
        r#"{ "tres": [ {
            "tag": "CONDTR",
            "fields": [
                { "name": "FLAG", "length": 2 },
                { "if": "FLAG=00",
                  "fields": [ { "name": "EXTRA", "length": 4 } ] },
                { "name": "TAIL", "length": 2 }
            ] } ] }"#,
    );
    let schema = reg.schema_for("CONDTR").unwrap();

    let on = decode_tre(schema, b"00ABCDzz");
    assert!(on.error.is_none());
    assert_eq!(on.fields.get("EXTRA"), Some("ABCD"));
    assert_eq!(on.fields.get("TAIL"), Some("zz"));

    let off = decode_tre(schema, b"01zz");
    assert!(off.error.is_none());
    assert_eq!(off.fields.get("EXTRA"), None);
    assert_eq!(off.fields.get("TAIL"), Some("zz"));
}

#[test]
fn variable_length_field() {
    let reg = registry(
        r#"{ "tres": [ {
            "tag": "VARLEN",
            "fields": [
                { "name": "LBLLEN", "length": 2 },
                { "name": "LABEL", "length_var": "LBLLEN" },
                { "name": "TAIL", "length": 1 }
            ] } ] }"#,
    );
    let schema = reg.schema_for("VARLEN").unwrap();
    let decoded = decode_tre(schema, b"05helloX");
    assert!(decoded.error.is_none());
    assert_eq!(decoded.fields.get("LABEL"), Some("hello"));
    assert_eq!(decoded.fields.get("TAIL"), Some("X"));
}

#[test]
fn overrun_keeps_partial_fields() {
    let reg = registry(
        r#"{ "tres": [ {
            "tag": "SHORTY",
            "fields": [
                { "name": "A", "length": 2 },
                { "name": "B", "length": 10 }
            ] } ] }"#,
    );
    let schema = reg.schema_for("SHORTY").unwrap();
    let decoded = decode_tre(schema, b"okxy");
    assert!(decoded.error.is_some());
    assert_eq!(decoded.fields.get("A"), Some("ok"));
    assert_eq!(decoded.fields.get("B"), None);
    assert_eq!(decoded.consumed, 2);
}

#[test]
fn runaway_counter_is_contained() {
    // A hostile count of 99 over an 8-byte payload must abort with an
    // error, not spin or read out of bounds.
    let reg = registry(
        r#"{ "tres": [ {
            "tag": "HOSTIL",
            "fields": [
                { "name": "N", "length": 2 },
                { "loop": { "counter": "N" },
                  "fields": [ { "name": "V", "length": 4 } ] }
            ] } ] }"#,
    );
    let schema = reg.schema_for("HOSTIL").unwrap();
    let decoded = decode_tre(schema, b"99abcd");
    assert!(decoded.error.is_some());
    assert_eq!(decoded.fields.get("0000_V"), Some("abcd"));
    assert_eq!(decoded.fields.get("0001_V"), None);
}

#[test]
fn trailing_fields_behind_remaining_bytes_gate() {
    let reg = registry(
        r#"{ "tres": [ {
            "tag": "TAILED",
            "fields": [
                { "name": "HEAD", "length": 3 },
                { "if_remaining_bytes": true,
                  "fields": [
                      { "name": "OPT1", "length": 3 },
                      { "name": "OPT2", "length": 3 }
                  ] }
            ] } ] }"#,
    );
    let schema = reg.schema_for("TAILED").unwrap();

    let none = decode_tre(schema, b"abc");
    assert!(none.error.is_none());
    assert_eq!(none.fields.get("OPT1"), None);

    let one = decode_tre(schema, b"abcdef");
    assert!(one.error.is_none());
    assert_eq!(one.fields.get("OPT1"), Some("def"));
    assert_eq!(one.fields.get("OPT2"), None);

    let both = decode_tre(schema, b"abcdefghi");
    assert!(both.error.is_none());
    assert_eq!(both.fields.get("OPT2"), Some("ghi"));
}

#[test]
fn declared_length_mismatch_is_a_warning() {
    let reg = registry(
        r#"{ "tres": [ {
            "tag": "MISFIT",
            "length": 10,
            "fields": [ { "name": "A", "length": 4 } ] } ] }"#,
    );
    let schema = reg.schema_for("MISFIT").unwrap();
    let decoded = decode_tre(schema, b"abcd");
    assert!(decoded.error.is_none());
    assert_eq!(decoded.warnings.len(), 1);
    assert!(decoded.warnings[0].contains("declares 10"));
}

#[test]
fn builtin_registry_decodes_rpc00b_exactly() {
    let reg = shared_registry();
    let schema = reg.schema_for("RPC00B").unwrap();
    let mut data = Vec::new();
    data.push(b'1');
    data.resize(81, b'0'); // header fields
    for _ in 0..80 {
        data.extend_from_slice(b"+0.00000E+00");
    }
    assert_eq!(data.len(), 1041);
    let decoded = decode_tre(schema, &data);
    assert!(decoded.error.is_none());
    assert!(decoded.warnings.is_empty());
    assert_eq!(decoded.consumed, 1041);
    assert_eq!(decoded.fields.get("SUCCESS"), Some("1"));
    assert_eq!(
        decoded.fields.get("LINE_NUM_COEFF_00_VAL"),
        Some("+0.00000E+00")
    );
    assert_eq!(
        decoded.fields.get("SAMP_DEN_COEFF_19_VAL"),
        Some("+0.00000E+00")
    );
}

#[test]
fn decoding_is_idempotent() {
    let reg = shared_registry();
    let schema = reg.schema_for("STDIDC").unwrap();
    let data = vec![b'x'; 89];
    let a = decode_tre(schema, &data);
    let b = decode_tre(schema, &data);
    assert_eq!(a.fields, b.fields);
    assert_eq!(a.tree, b.tree);
}

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use baml::namespaces::{PRESENTATION_URI, XAML_URI};

fn baml_bin() -> &'static str {
    env!("CARGO_BIN_EXE_baml")
}

fn test_temp_dir(tag: &str) -> PathBuf {
    let ts = SystemTime::now().duration_since(UNIX_EPOCH).expect("clock before epoch").as_nanos();
    let dir = std::env::temp_dir().join(format!("baml-cli-e2e-{tag}-{}-{ts}", std::process::id()));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn run_baml(args: &[&str]) -> Output {
    Command::new(baml_bin()).args(args).output().expect("run baml")
}

fn path(p: &Path) -> &str {
    p.to_str().unwrap()
}

fn dictionary_json() -> String {
    format!(
        r#"[
  {{"node": "DocumentStart"}},
  {{"node": "ElementStart", "namespace": "{PRESENTATION_URI}", "name": "ResourceDictionary"}},
  {{"node": "Xmlns", "prefix": "", "namespace": "{PRESENTATION_URI}"}},
  {{"node": "Xmlns", "prefix": "x", "namespace": "{XAML_URI}"}},
  {{"node": "ElementStart", "namespace": "{PRESENTATION_URI}", "name": "Button"}},
  {{"node": "DefAttribute", "name": "Key", "value": "primary"}},
  {{"node": "Property", "name": "Width", "value": "20"}},
  {{"node": "ElementEnd"}},
  {{"node": "ElementEnd"}},
  {{"node": "DocumentEnd"}}
]"#
    )
}

#[test]
fn cli_encode_then_decode_json() {
    let dir = test_temp_dir("roundtrip");
    let input = dir.join("nodes.json");
    let encoded = dir.join("out.baml");
    let decoded = dir.join("out.json");
    fs::write(&input, dictionary_json()).expect("write json");

    let enc = run_baml(&["encode", "-i", path(&input), "-o", path(&encoded)]);
    assert!(enc.status.success(), "encode failed: {}", String::from_utf8_lossy(&enc.stderr));
    assert!(fs::metadata(&encoded).expect("baml written").len() > 0);

    let dec = run_baml(&["decode", "-i", path(&encoded), "-o", path(&decoded), "--json"]);
    assert!(dec.status.success(), "decode failed: {}", String::from_utf8_lossy(&dec.stderr));

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(decoded).unwrap()).unwrap();
    let nodes = value.as_array().unwrap();
    let button = nodes.iter().find(|n| n["name"] == "Button").expect("button node");
    let props = button["properties"].as_array().unwrap();
    assert!(props.iter().any(|p| p["name"] == "x:Key" && p["value"] == "primary"));
    assert!(props.iter().any(|p| p["name"] == "Width" && p["value"] == "20"));
}

#[test]
fn cli_decode_listing_to_stdout() {
    let dir = test_temp_dir("listing");
    let input = dir.join("nodes.json");
    let encoded = dir.join("nodes.baml");
    fs::write(&input, dictionary_json()).expect("write json");

    // Ohne -o wird der Pfad aus der Eingabe abgeleitet.
    let enc = run_baml(&["encode", "-i", path(&input), "--no-defer", "--debug-info"]);
    assert!(enc.status.success(), "encode failed: {}", String::from_utf8_lossy(&enc.stderr));
    assert!(encoded.exists());

    let dec = run_baml(&["decode", "-i", path(&encoded), "-o", "-"]);
    assert!(dec.status.success(), "decode failed: {}", String::from_utf8_lossy(&dec.stderr));
    let stdout = String::from_utf8_lossy(&dec.stdout);
    assert!(stdout.contains("ResourceDictionary"), "{stdout}");
    assert!(stdout.contains("Button"), "{stdout}");
}

#[test]
fn cli_debug_info_keeps_source_lines() {
    let dir = test_temp_dir("lines");
    let input = dir.join("lines.json");
    fs::write(
        &input,
        format!(
            r#"[
  {{"node": "DocumentStart"}},
  {{"node": "ElementStart", "namespace": "{PRESENTATION_URI}", "name": "StackPanel", "line": [1, 2]}},
  {{"node": "Xmlns", "prefix": "", "namespace": "{PRESENTATION_URI}"}},
  {{"node": "ElementStart", "namespace": "{PRESENTATION_URI}", "name": "Button", "line": [2, 6]}},
  {{"node": "Property", "name": "Width", "value": "20", "line": [2, 13]}},
  {{"node": "ElementEnd"}},
  {{"node": "ElementEnd"}},
  {{"node": "DocumentEnd"}}
]"#
        ),
    )
    .expect("write json");

    for (debug, expect_lines) in [(true, true), (false, false)] {
        let encoded = dir.join(format!("lines-{debug}.baml"));
        let decoded = dir.join(format!("lines-{debug}.json"));
        let mut args = vec!["encode", "-i", path(&input), "-o", path(&encoded)];
        if debug {
            args.push("--debug-info");
        }
        let enc = run_baml(&args);
        assert!(enc.status.success(), "encode failed: {}", String::from_utf8_lossy(&enc.stderr));

        let dec = run_baml(&["decode", "-i", path(&encoded), "-o", path(&decoded), "--json"]);
        assert!(dec.status.success(), "decode failed: {}", String::from_utf8_lossy(&dec.stderr));

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&decoded).unwrap()).unwrap();
        let button = value.as_array().unwrap().iter().find(|n| n["name"] == "Button").expect("button node");
        assert_eq!(button.get("line").is_some(), expect_lines, "{button}");
        if expect_lines {
            assert_eq!(button["line"][0], 2);
        }
    }
}

#[test]
fn cli_rejects_invalid_json() {
    let dir = test_temp_dir("bad-json");
    let input = dir.join("bad.json");
    let output = dir.join("bad.baml");
    fs::write(&input, r#"[{"node": "Nope"}]"#).expect("write json");

    let enc = run_baml(&["encode", "-i", path(&input), "-o", path(&output)]);
    assert_eq!(enc.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&enc.stderr).contains("JSON"));
    assert!(!output.exists());
}

#[test]
fn cli_rejects_truncated_baml() {
    let dir = test_temp_dir("truncated");
    let input = dir.join("short.baml");
    fs::write(&input, [0x0c, 0x00, 0x00]).expect("write baml");

    let dec = run_baml(&["decode", "-i", path(&input), "-o", "-"]);
    assert_eq!(dec.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&dec.stderr).contains("Decode-Fehler"));
}

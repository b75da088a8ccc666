use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

const WORLD: &str = r#"{
  "hosts": [
    {
      "id": 1,
      "name": "srv1",
      "dns": "srv1.example.net",
      "ip": "192.0.2.10",
      "use_ip": true,
      "status": "monitored",
      "available": "available"
    },
    {
      "id": 2,
      "name": "srv2",
      "dns": "srv2.example.net",
      "ip": "192.0.2.11",
      "use_ip": true,
      "status": "monitored",
      "available": "available"
    }
  ],
  "triggers": [
    {
      "id": 1,
      "host": 1,
      "description": "high load on srv1",
      "priority": "high",
      "value": "problem",
      "last_change": 1700000000
    }
  ],
  "maps": [
    {
      "id": 1,
      "name": "core network",
      "width": 400,
      "height": 300,
      "elements": [
        {
          "id": 10,
          "target": { "kind": "host", "id": 1 },
          "x": 60,
          "y": 60,
          "label": "{HOSTNAME}"
        },
        {
          "id": 11,
          "target": { "kind": "host", "id": 2 },
          "x": 260,
          "y": 60,
          "label": "{HOSTNAME}"
        }
      ],
      "links": [
        { "id": 1, "from": 10, "to": 11, "label": "uplink" }
      ]
    }
  ]
}
"#;

fn write_world(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("world.json");
    fs::write(&path, WORLD).unwrap();
    path
}

#[test]
fn renders_svg_to_file() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let world = write_world(&tmp);
    let output = tmp.path().join("map.svg");

    let mut cmd = Command::cargo_bin("topomap")?;
    cmd.arg("--world")
        .arg(&world)
        .arg("--map")
        .arg("1")
        .arg("--output")
        .arg(&output)
        .arg("--now")
        .arg("1700000060");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Rendered map"));

    let svg = fs::read_to_string(&output)?;
    assert!(svg.contains("<svg"), "output should contain an <svg> element");
    assert!(svg.contains("srv1"), "expanded host label should appear");
    assert!(svg.contains("high load on srv1") || svg.contains("1 problem"));
    Ok(())
}

#[test]
fn map_is_selectable_by_name() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let world = write_world(&tmp);

    let mut cmd = Command::cargo_bin("topomap")?;
    cmd.arg("--world")
        .arg(&world)
        .arg("--map")
        .arg("core network")
        .arg("--now")
        .arg("1700000060");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("<svg"));
    Ok(())
}

#[test]
fn scene_output_is_structured_json() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let world = write_world(&tmp);
    let output = tmp.path().join("map.json");

    let mut cmd = Command::cargo_bin("topomap")?;
    cmd.arg("--world")
        .arg(&world)
        .arg("--map")
        .arg("1")
        .arg("--output")
        .arg(&output)
        .arg("--quiet")
        .arg("--now")
        .arg("1700000060");

    cmd.assert().success().stdout(predicate::str::is_empty());

    let scene: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output)?)?;
    assert_eq!(scene["map"], 1);
    assert_eq!(scene["elements"].as_array().map(Vec::len), Some(2));
    assert_eq!(scene["links"][0]["label"], "uplink");
    assert_eq!(scene["elements"][0]["icon_type"], "on");
    Ok(())
}

#[cfg(feature = "png")]
#[test]
fn renders_png_with_magic_header() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let world = write_world(&tmp);
    let output = tmp.path().join("map.png");

    let mut cmd = Command::cargo_bin("topomap")?;
    cmd.arg("--world")
        .arg(&world)
        .arg("--map")
        .arg("1")
        .arg("--output")
        .arg(&output)
        .arg("--scale")
        .arg("1.5")
        .arg("--now")
        .arg("1700000060");

    cmd.assert().success();

    let png = fs::read(&output)?;
    assert!(png.starts_with(b"\x89PNG\r\n\x1a\n"));
    Ok(())
}

#[test]
fn unknown_map_fails_with_a_clear_error() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let world = write_world(&tmp);

    let mut cmd = Command::cargo_bin("topomap")?;
    cmd.arg("--world").arg(&world).arg("--map").arg("99");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("no map matching"));
    Ok(())
}

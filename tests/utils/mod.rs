// Shared fixtures for the integration tests
//
// Replay files and limits documents for the competition used throughout the
// suite: type `Bar`, baseline `Slow`, competitor `Foo`.

#![allow(dead_code)]

use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

pub const BASELINE: [f64; 7] = [100.0, 102.0, 101.0, 99.0, 98.0, 103.0, 97.0];
pub const COMPETITOR: [f64; 5] = [205.0, 210.0, 198.0, 202.0, 207.0];

/// Legacy ratio pair for Bar.Foo, [1.85, 2.15]
pub const STORED_RATIO: &str = r#"{
  "competitions": [
    {
      "type": "Bar",
      "candidates": [
        {
          "method": "Foo",
          "MinRatio": "1.85",
          "MaxRatio": "2.15"
        }
      ]
    }
  ]
}
"#;

/// Write a replay file recording `runs` identical runs
pub fn write_replay(dir: &Path, name: &str, limits: Option<&str>, runs: usize) -> PathBuf {
    let run = json!({
        "Slow": { "Time": BASELINE, "Gen0Collections": [1.0, 1.0, 2.0] },
        "Foo": { "Time": COMPETITOR, "Gen0Collections": [2.0, 2.0, 3.0] },
    });
    let replay = json!({
        "competition": "Bar",
        "limits": limits,
        "baseline": "Slow",
        "competitors": ["Foo"],
        "runs": vec![run; runs],
    });

    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(&replay).unwrap()).unwrap();
    path
}

pub fn write_limits(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

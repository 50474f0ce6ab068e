//! Parsers for the printer's line-oriented status replies.
//!
//! Replies look like:
//!
//! ```text
//! CMD M119 Received.
//! Endstop: X-max:1 Y-max:0 Z-min:0
//! MachineStatus: READY
//! ```

use serde::Serialize;
use std::collections::BTreeMap;

/// A parsed `Key: value` entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    /// `name:number` pairs, e.g. `Status: S:1 L:0 J:0 F:0`
    Map(BTreeMap<String, f64>),
    Text(String),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

pub type KeyedBlock = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
    /// Percent rounded to one decimal
    pub percent: f64,
}

impl Progress {
    pub fn new(current: u64, total: u64) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            (current as f64 / total as f64 * 1000.0).round() / 10.0
        };
        Self { current, total, percent }
    }
}

/// Everything a status query collects
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrinterStatus {
    pub info: KeyedBlock,
    pub machine: KeyedBlock,
    pub progress: Progress,
    /// Sensor name -> `[current, target]`
    pub temperatures: BTreeMap<String, [f64; 2]>,
}

pub fn parse_keyed_block<S: AsRef<str>>(lines: &[S]) -> KeyedBlock {
    let mut out = BTreeMap::new();
    for line in lines {
        let line = line.as_ref();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        out.insert(key.trim().to_string(), parse_value(value));
    }
    out
}

fn parse_value(value: &str) -> Value {
    let trimmed = value.trim();
    if let Ok(n) = trimmed.parse::<f64>() {
        return Value::Number(n);
    }
    if let Some(map) = parse_pairs(trimmed) {
        return Value::Map(map);
    }
    Value::Text(value.to_string())
}

/// `a:1 b:2` -> map; `None` unless every token is `name:number`
fn parse_pairs(value: &str) -> Option<BTreeMap<String, f64>> {
    let mut map = BTreeMap::new();
    for token in value.split_whitespace() {
        let (name, number) = token.split_once(':')?;
        if name.is_empty() {
            return None;
        }
        map.insert(name.to_string(), number.parse().ok()?);
    }
    (!map.is_empty()).then_some(map)
}

/// `T0:210 /210 B:60/60` -> `{T0: [210, 210], B: [60, 60]}`
pub fn parse_temperatures<S: AsRef<str>>(lines: &[S]) -> BTreeMap<String, [f64; 2]> {
    let mut out = BTreeMap::new();
    for line in lines {
        let joined = line.as_ref().replace(" /", "/").replace("/ ", "/");
        for token in joined.split_whitespace() {
            let Some((name, reading)) = token.split_once(':') else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            let (current, target) = match reading.split_once('/') {
                Some((c, t)) => (c.parse::<f64>(), t.parse::<f64>()),
                None => (reading.parse::<f64>(), Ok(0.0)),
            };
            if let (Ok(current), Ok(target)) = (current, target) {
                out.insert(name.to_string(), [current, target]);
            }
        }
    }
    out
}

/// First `current/total` pair, e.g. from `SD printing byte 120/4000`
pub fn parse_progress<S: AsRef<str>>(lines: &[S]) -> Option<Progress> {
    lines
        .iter()
        .flat_map(|line| line.as_ref().split_whitespace())
        .find_map(|token| {
            let (current, total) = token.split_once('/')?;
            Some(Progress::new(current.parse().ok()?, total.parse().ok()?))
        })
}

//! Trace Loader.
//!
//! Parses request traces into [`RequestDescriptor`]s. One request per line:
//!
//! ```text
//! # port       kind  vaddr        [cycle]
//! dcache_port  W     0x1000
//! icache_port  F     0x400000     12
//! ```
//!
//! `kind` is a single-letter mnemonic (see [`AccessType::from_mnemonic`]).
//! Addresses are hexadecimal with a `0x` prefix or decimal. Blank lines and
//! anything after `#` are ignored.

use std::error::Error;
use std::fmt;

use crate::common::AccessType;
use crate::core::{PortId, RequestDescriptor};

/// A malformed trace line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceError {
    /// 1-based line number.
    pub line: usize,
    pub reason: String,
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trace line {}: {}", self.line, self.reason)
    }
}

impl Error for TraceError {}

fn parse_number(field: &str) -> Option<u64> {
    match field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16).ok(),
        None => field.replace('_', "").parse().ok(),
    }
}

/// Parses one trace line. Returns `Ok(None)` for blank and comment lines.
///
/// `resolve_port` maps a port name to its index.
pub fn parse_line<F>(
    text: &str,
    line: usize,
    resolve_port: F,
) -> Result<Option<RequestDescriptor>, TraceError>
where
    F: Fn(&str) -> Option<PortId>,
{
    let err = |reason: String| TraceError { line, reason };

    let body = text.split('#').next().unwrap_or("").trim();
    if body.is_empty() {
        return Ok(None);
    }

    let fields: Vec<&str> = body.split_whitespace().collect();
    if !(3..=4).contains(&fields.len()) {
        return Err(err(format!(
            "expected '<port> <kind> <vaddr> [cycle]', found {} field(s)",
            fields.len()
        )));
    }

    let port = resolve_port(fields[0]).ok_or_else(|| err(format!("unknown port '{}'", fields[0])))?;
    let kind = AccessType::from_mnemonic(fields[1])
        .ok_or_else(|| err(format!("unknown access kind '{}'", fields[1])))?;
    let vaddr =
        parse_number(fields[2]).ok_or_else(|| err(format!("bad address '{}'", fields[2])))?;

    let mut desc = RequestDescriptor::new(port, vaddr, kind);
    if let Some(cycle) = fields.get(3) {
        let at = parse_number(cycle).ok_or_else(|| err(format!("bad cycle '{}'", cycle)))?;
        desc = desc.at(at);
    }
    Ok(Some(desc))
}

/// Parses a whole trace, stopping at the first malformed line.
pub fn parse_trace<F>(text: &str, resolve_port: F) -> Result<Vec<RequestDescriptor>, TraceError>
where
    F: Fn(&str) -> Option<PortId>,
{
    let mut requests = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if let Some(desc) = parse_line(line, i + 1, &resolve_port)? {
            requests.push(desc);
        }
    }
    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports(name: &str) -> Option<PortId> {
        match name {
            "i" => Some(0),
            "d" => Some(1),
            _ => None,
        }
    }

    #[test]
    fn parses_requests_and_skips_comments() {
        let text = "# header\n\nd W 0x1000\ni F 4096 7 # trailing\n";
        let reqs = parse_trace(text, ports).unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0], RequestDescriptor::new(1, 0x1000, AccessType::Write));
        assert_eq!(reqs[1], RequestDescriptor::new(0, 4096, AccessType::Fetch).at(7));
    }

    #[test]
    fn reports_line_numbers() {
        let text = "d R 0x10\nx R 0x20\n";
        let err = parse_trace(text, ports).unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.reason.contains("unknown port"));

        let err = parse_trace("d Q 0x10", ports).unwrap_err();
        assert!(err.reason.contains("access kind"));

        let err = parse_trace("d R zz", ports).unwrap_err();
        assert!(err.reason.contains("bad address"));

        let err = parse_trace("d R", ports).unwrap_err();
        assert!(err.reason.contains("field"));
    }
}

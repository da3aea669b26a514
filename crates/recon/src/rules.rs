use serde::{Deserialize, Serialize};

/// Per-source identifier canonicalization rule.
///
/// Every rule is a pre-transform followed by the universal strip of all
/// characters outside `[A-Za-z0-9]`. Each rule is idempotent on its own
/// output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentifierRule {
    /// Alphanumeric strip only.
    #[default]
    Identity,
    /// Keep the segment before the first `delimiter` (`"123/01"` -> `"123"`).
    SegmentBeforeDelimiter { delimiter: char },
    /// Truncate to the first `length` characters. With `strip_leading_zero`,
    /// an over-long identifier first loses one leading `0`.
    FixedPrefix {
        length: usize,
        #[serde(default)]
        strip_leading_zero: bool,
    },
    /// `<...><8+ zeros><3 digits>` loses the trailing three digits.
    ZeroRunSuffixStrip,
    /// A trailing `00000` + 1-3 digit counter collapses to `00000`.
    ZeroRunCollapse,
    /// Digits only, right-truncated or zero-left-padded to `width`.
    FixedWidthDigits {
        #[serde(default = "default_width")]
        width: usize,
    },
}

fn default_width() -> usize {
    9
}

const SUFFIX_ZERO_RUN: usize = 8;
const SUFFIX_DIGITS: usize = 3;
const COLLAPSE_ZERO_RUN: usize = 5;
const COLLAPSE_MAX_COUNTER: usize = 3;

impl IdentifierRule {
    /// Structural check of rule parameters.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::SegmentBeforeDelimiter { delimiter } if delimiter.is_ascii_alphanumeric() => {
                Err(format!("segment delimiter '{delimiter}' must not be alphanumeric"))
            }
            Self::FixedPrefix { length: 0, .. } => Err("prefix length must be > 0".into()),
            Self::FixedWidthDigits { width: 0 } => Err("digit width must be > 0".into()),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for IdentifierRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identity => write!(f, "identity"),
            Self::SegmentBeforeDelimiter { delimiter } => {
                write!(f, "segment_before_delimiter('{delimiter}')")
            }
            Self::FixedPrefix {
                length,
                strip_leading_zero,
            } => {
                if *strip_leading_zero {
                    write!(f, "fixed_prefix({length}, strip_leading_zero)")
                } else {
                    write!(f, "fixed_prefix({length})")
                }
            }
            Self::ZeroRunSuffixStrip => write!(f, "zero_run_suffix_strip"),
            Self::ZeroRunCollapse => write!(f, "zero_run_collapse"),
            Self::FixedWidthDigits { width } => write!(f, "fixed_width_digits({width})"),
        }
    }
}

/// Canonicalize a raw identifier under `rule`. An empty result means the
/// record carrying it must be dropped.
pub fn canonicalize(raw: &str, rule: &IdentifierRule) -> String {
    let raw = raw.trim();
    match rule {
        IdentifierRule::Identity => alphanumeric(raw),
        IdentifierRule::SegmentBeforeDelimiter { delimiter } => {
            let segment = raw.split(*delimiter).next().unwrap_or_default();
            alphanumeric(segment.trim())
        }
        IdentifierRule::FixedPrefix {
            length,
            strip_leading_zero,
        } => {
            let mut text = raw;
            if *strip_leading_zero && text.chars().count() > *length {
                text = text.strip_prefix('0').unwrap_or(text);
            }
            let prefix: String = text.chars().take(*length).collect();
            alphanumeric(&prefix)
        }
        IdentifierRule::ZeroRunSuffixStrip => strip_zero_run_suffix(alphanumeric(raw)),
        IdentifierRule::ZeroRunCollapse => collapse_zero_run(alphanumeric(raw)),
        IdentifierRule::FixedWidthDigits { width } => fixed_width_digits(raw, *width),
    }
}

fn alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

fn strip_zero_run_suffix(id: String) -> String {
    let bytes = id.as_bytes();
    let n = bytes.len();
    if n < SUFFIX_ZERO_RUN + SUFFIX_DIGITS {
        return id;
    }
    let suffix = &bytes[n - SUFFIX_DIGITS..];
    let run = &bytes[n - SUFFIX_DIGITS - SUFFIX_ZERO_RUN..n - SUFFIX_DIGITS];
    // "000" is excluded so the rule cannot fire again on its own output.
    if suffix.iter().all(u8::is_ascii_digit)
        && suffix != b"000"
        && run.iter().all(|&b| b == b'0')
    {
        id[..n - SUFFIX_DIGITS].to_string()
    } else {
        id
    }
}

fn collapse_zero_run(id: String) -> String {
    let bytes = id.as_bytes();
    let n = bytes.len();
    for counter in 1..=COLLAPSE_MAX_COUNTER {
        if n < COLLAPSE_ZERO_RUN + counter {
            break;
        }
        let tail = &bytes[n - counter..];
        let run = &bytes[n - counter - COLLAPSE_ZERO_RUN..n - counter];
        if matches!(tail[0], b'1'..=b'9')
            && tail.iter().all(u8::is_ascii_digit)
            && run.iter().all(|&b| b == b'0')
        {
            return id[..n - counter].to_string();
        }
    }
    id
}

fn fixed_width_digits(raw: &str, width: usize) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return digits;
    }
    if digits.len() >= width {
        digits[..width].to_string()
    } else {
        format!("{digits:0>width$}")
    }
}

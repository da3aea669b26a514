//! CLI Exit Code Registry
//!
//! This is the single source of truth for all `polrec` exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | Success                                                   |
//! | 1    | Differences found (only with `--fail-on-diff`)            |
//! | 2    | Usage error (bad arguments, malformed `ID=FILE`)          |
//! | 3    | Schema mismatch: a required column is missing             |
//! | 4    | Unknown source id                                         |
//! | 5    | Invalid source registry                                   |
//! | 6    | I/O error (unreadable input, unwritable output, session)  |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `CliError`

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Differences found. Like `diff(1)`, exit 1 means "inputs differ."
/// Only returned when the caller asked for it with `--fail-on-diff`.
pub const EXIT_DIFFS: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// A statement is missing a column its source requires.
pub const EXIT_SCHEMA_MISMATCH: u8 = 3;

/// Source id not present in the registry.
pub const EXIT_UNKNOWN_SOURCE: u8 = 4;

/// Registry TOML failed to parse or validate.
pub const EXIT_INVALID_REGISTRY: u8 = 5;

/// File could not be read or written.
pub const EXIT_IO: u8 = 6;

//! Wire format constants for the engine's quiet line protocol.
//!
//! ```text
//! request:  <command text> '\n'
//! response: <UTF-8 output bytes> 0x00
//! ```
//!
//! There is no length prefix. A response ends at the first sentinel byte.

/// Byte terminating every reply.
pub const SENTINEL: u8 = 0x00;

/// Byte terminating every request.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Suffix on a command verb that asks the engine for JSON output.
pub const STRUCTURED_MARKER: char = 'j';

/// Command asking the engine to exit.
pub const QUIT_COMMAND: &str = "q";

/// Quiet single-line-protocol flag passed on the engine command line.
pub const QUIET_FLAG: &str = "-q0";

/// Default maximum reply size (256 MB).
pub const DEFAULT_MAX_REPLY_SIZE: usize = 256 * 1024 * 1024;

/// Rewrite a command so its verb carries the structured marker.
///
/// The marker belongs to the verb, so it is inserted after the first
/// whitespace-delimited token: `axf @ 0x10` becomes `axfj @ 0x10`, while
/// `pdj 8 @ 0x10` is left alone.
pub fn structured_variant(command: &str) -> String {
    let trimmed = command.trim();
    let verb_end = trimmed
        .find(char::is_whitespace)
        .unwrap_or(trimmed.len());
    let (verb, rest) = trimmed.split_at(verb_end);

    if verb.is_empty() || verb.ends_with(STRUCTURED_MARKER) {
        return trimmed.to_string();
    }

    let mut out = String::with_capacity(trimmed.len() + 1);
    out.push_str(verb);
    out.push(STRUCTURED_MARKER);
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_variant_appends_marker_to_bare_verb() {
        assert_eq!(structured_variant("iS"), "iSj");
        assert_eq!(structured_variant("ie"), "iej");
    }

    #[test]
    fn test_structured_variant_marks_verb_not_argument() {
        assert_eq!(structured_variant("axf @ 0x10"), "axfj @ 0x10");
        assert_eq!(structured_variant("pd 8 @ 0x400"), "pdj 8 @ 0x400");
    }

    #[test]
    fn test_structured_variant_is_idempotent() {
        assert_eq!(structured_variant("pdj 8 @ 0x400"), "pdj 8 @ 0x400");
        assert_eq!(structured_variant("axtj @ 0x10"), "axtj @ 0x10");
        assert_eq!(structured_variant("  iej  "), "iej");
    }

    #[test]
    fn test_structured_variant_empty() {
        assert_eq!(structured_variant(""), "");
        assert_eq!(structured_variant("   "), "");
    }
}

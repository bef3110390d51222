//! Cleaning of captured console output.
//!
//! Board shells colorize `ls` output and prompts with a handful of fixed
//! escape sequences. Those exact sequences are removed; this is not a general
//! ANSI parser. Whatever is left is reduced to ASCII, which is what survived
//! the codepage round trip the console logs were historically passed through.

/// Color sequences emitted by the board's busybox shell.
pub const KNOWN_COLOR_CODES: [&str; 8] = [
    "\x1b[1;34m",
    "\x1b[1;32m",
    "\x1b[0;0m",
    "\x1b[0m",
    "\x1b[33;22m",
    "\x1b[31;22m",
    "\x1b[35;22m",
    "\x1b[36;22m",
];

/// Decode bytes as UTF-8, dropping invalid sequences instead of replacing them.
pub fn decode_permissive(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;

    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                match e.error_len() {
                    Some(len) => rest = &after[len..],
                    // Truncated sequence at the end of the buffer.
                    None => break,
                }
            }
        }
    }

    out
}

/// Drop every non-ASCII character, then strip the known color codes.
///
/// Removal repeats until nothing changes, so a code spliced together by an
/// earlier removal is stripped as well.
pub fn sanitize(text: &str) -> String {
    let mut cleaned: String = text.chars().filter(char::is_ascii).collect();
    loop {
        let before = cleaned.len();
        for code in KNOWN_COLOR_CODES {
            if cleaned.contains(code) {
                cleaned = cleaned.replace(code, "");
            }
        }
        if cleaned.len() == before {
            return cleaned;
        }
    }
}

/// [`decode_permissive`] followed by [`sanitize`].
pub fn clean_bytes(bytes: &[u8]) -> String {
    sanitize(&decode_permissive(bytes))
}

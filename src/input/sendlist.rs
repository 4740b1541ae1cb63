//! Splitting an input line into (sendlist, body) and matching sendlists
//! against session names.
//!
//! Sendlists are byte strings, not text: an unquoted underscore is stored as
//! the 0x80 sentinel so that it can later match either an underscore or a
//! space in a name. The sentinel is mapped back to `_` for display only.

use crate::SENDLIST_LEN;

/// Unquoted `_` inside a sendlist, matching both `_` and space in names.
pub const UNQUOTED_UNDERSCORE: u8 = 0x80;

/// First tokens recognised as smileys rather than sendlists.
const SMILEYS: &[&[u8]] = &[
    b":-)", b":-(", b":-P", b";-)", b":_)", b":_(", b":)", b":(", b":P", b";)",
];

#[derive(Debug, PartialEq, Eq)]
pub struct ParsedLine<'a> {
    /// Routing target; `b"default"` when the line carried none.
    pub sendlist: Vec<u8>,
    /// True only for a `:` / `;` delimited sendlist; smileys and implicit
    /// defaults never update the last-sendlist memory.
    pub is_explicit: bool,
    /// Message body. For implicit sendlists this is the whole line.
    pub body: &'a [u8],
}

/// Split an input line into sendlist and message body.
pub fn parse_sendlist(line: &[u8]) -> ParsedLine<'_> {
    fn implicit(line: &[u8]) -> ParsedLine<'_> {
        let skip = usize::from(line.first() == Some(&b' '));
        ParsedLine { sendlist: b"default".to_vec(), is_explicit: false, body: &line[skip..] }
    }

    // A smiley in first position is never a sendlist. Only the first
    // whitespace-bounded token is considered, and only when the line starts
    // with something that is neither alphabetic nor whitespace.
    if let Some(&first) = line.first() {
        if !first.is_ascii_alphabetic() && !first.is_ascii_whitespace() {
            let token_len = line
                .iter()
                .position(|b| b.is_ascii_whitespace())
                .unwrap_or(line.len());
            if SMILEYS.iter().any(|s| *s == &line[..token_len]) {
                return ParsedLine {
                    sendlist: b"default".to_vec(),
                    is_explicit: false,
                    body: line,
                };
            }
        }
    }

    let mut sendlist = Vec::new();
    let cap = SENDLIST_LEN - 1;
    let mut i = 0;
    while i < line.len() {
        match line[i] {
            b' ' | b'\t' => return implicit(line),
            b':' | b';' => {
                let mut body = &line[i + 1..];
                if body.first() == Some(&b' ') {
                    body = &body[1..];
                }
                return ParsedLine { sendlist, is_explicit: true, body };
            }
            b'\\' => {
                i += 1;
                if i < line.len() && sendlist.len() < cap {
                    sendlist.push(line[i]);
                }
            }
            b'"' => {
                i += 1;
                while i < line.len() {
                    match line[i] {
                        b'"' => break,
                        b'\\' => {
                            i += 1;
                            if i < line.len() && sendlist.len() < cap {
                                sendlist.push(line[i]);
                            }
                        }
                        b => {
                            if sendlist.len() < cap {
                                sendlist.push(b);
                            }
                        }
                    }
                    i += 1;
                }
            }
            b'_' => {
                if sendlist.len() < cap {
                    sendlist.push(UNQUOTED_UNDERSCORE);
                }
            }
            b => {
                if sendlist.len() < cap {
                    sendlist.push(b);
                }
            }
        }
        i += 1;
    }
    implicit(line)
}

/// Case-insensitive substring match of `sendlist` in `name`, where the
/// unquoted-underscore sentinel matches a space or an underscore. Returns the
/// 1-based match position.
pub fn match_name(name: &[u8], sendlist: &[u8]) -> Option<usize> {
    if name.is_empty() || sendlist.is_empty() {
        return None;
    }
    for start in 0..name.len() {
        let mut matched = true;
        let mut n = start;
        for &q in sendlist {
            let Some(&p) = name.get(n) else {
                matched = false;
                break;
            };
            if q == UNQUOTED_UNDERSCORE && (p == b' ' || p == b'_') {
                n += 1;
                continue;
            }
            if !p.eq_ignore_ascii_case(&q) {
                matched = false;
                break;
            }
            n += 1;
        }
        if matched {
            return Some(start + 1);
        }
    }
    None
}

/// Map sentinel bytes back to underscores for error messages.
pub fn display_sendlist(sendlist: &[u8]) -> String {
    sendlist
        .iter()
        .map(|&b| if b == UNQUOTED_UNDERSCORE { '_' } else { b as char })
        .collect()
}

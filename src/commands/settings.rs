//! Per-session preferences: /blurb, /signal, /send.

use crate::NAME_LEN;
use crate::SENDLIST_LEN;
use crate::state::session::SessionRef;

/// Set, clear or report the blurb. `entry` marks the sign-on path, which
/// stays quiet and lets the caller report overflow. Returns how many
/// characters the composed name ran over.
pub fn do_blurb(sess: &SessionRef, text: &str, entry: bool) -> usize {
    let start = text.trim_start();
    let mut s = sess.write();

    if start.is_empty() {
        if entry {
            s.blurb.clear();
            s.compose_name();
        } else if s.blurb.is_empty() {
            s.output("You do not currently have a blurb set.\n");
        } else {
            let msg = format!("Your blurb is currently set to [{}].\n", s.blurb);
            s.output(&msg);
        }
        return 0;
    }

    let token = start.trim_end();
    let turns_off = !token.is_empty() && token.len() <= 3 && "off"[..token.len()].eq_ignore_ascii_case(token);

    if turns_off {
        if entry || !s.blurb.is_empty() {
            s.blurb.clear();
            s.compose_name();
            if !entry {
                s.output("Your blurb has been turned off.\n");
            }
        } else {
            s.output("Your blurb was already turned off.\n");
        }
        return 0;
    }

    // A quoted or bracketed blurb is stored without the wrapper.
    let bytes = token.as_bytes();
    let stripped = if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'[' && bytes[bytes.len() - 1] == b']'))
    {
        &token[1..token.len() - 1]
    } else {
        token
    };

    let avail = NAME_LEN as isize - s.name_only.len() as isize - 4;
    let over = (stripped.len() as isize - avail).max(0) as usize;
    let keep = stripped.len() - over;
    s.blurb = stripped[..keep].to_string();
    s.compose_name();
    if !entry {
        let verb = if over > 0 { "truncated" } else { "set" };
        let msg = format!("Your blurb has been {} to [{}].\n", verb, s.blurb);
        s.output(&msg);
    }
    over
}

pub fn signal(sess: &SessionRef, args: &str) {
    let mut s = sess.write();
    let p = args.trim_start();
    if starts_ci(p, "on") {
        s.signal_public = true;
        s.signal_private = true;
        s.output("All signals are now on.\n");
    } else if starts_ci(p, "off") {
        s.signal_public = false;
        s.signal_private = false;
        s.output("All signals are now off.\n");
    } else if starts_ci(p, "public") {
        let rest = p[6..].trim_start();
        if starts_ci(rest, "on") {
            s.signal_public = true;
            s.output("Signals for public messages are now on.\n");
        } else if starts_ci(rest, "off") {
            s.signal_public = false;
            s.output("Signals for public messages are now off.\n");
        } else {
            s.output("/signal public syntax error!\n");
        }
    } else if starts_ci(p, "private") {
        let rest = p[7..].trim_start();
        if starts_ci(rest, "on") {
            s.signal_private = true;
            s.output("Signals for private messages are now on.\n");
        } else if starts_ci(rest, "off") {
            s.signal_private = false;
            s.output("Signals for private messages are now off.\n");
        } else {
            s.output("/signal private syntax error!\n");
        }
    } else {
        s.output("/signal syntax error!\n");
    }
}

pub fn send(sess: &SessionRef, args: &str) {
    let mut s = sess.write();
    let p = args.trim_start();
    if p.is_empty() {
        if s.default_sendlist.is_empty() {
            s.output("Your default sendlist is turned off.\n");
        } else if s.default_sendlist.eq_ignore_ascii_case("everyone") {
            s.output("You are sending to everyone.\n");
        } else {
            let msg = format!("Your default sendlist is set to \"{}\".\n", s.default_sendlist);
            s.output(&msg);
        }
    } else if p.eq_ignore_ascii_case("off") {
        s.default_sendlist.clear();
        s.output("Your default sendlist has been turned off.\n");
    } else if p.eq_ignore_ascii_case("everyone") {
        s.default_sendlist = p.to_string();
        s.output("You are now sending to everyone.\n");
    } else {
        let mut list = p.to_string();
        list.truncate(SENDLIST_LEN - 1);
        s.default_sendlist = list;
        let msg = format!("Your default sendlist is now set to \"{}\".\n", s.default_sendlist);
        s.output(&msg);
    }
}

fn starts_ci(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

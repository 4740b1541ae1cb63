//! Message routing: resolve the sendlist, pick the recipients, enqueue the
//! message objects and report back to the sender.

use crate::input::sendlist::{display_sendlist, match_name, parse_sendlist};
use crate::net::conn::Conn;
use crate::net::output::{MessageKind, OutputObj};
use crate::state::registry::Registry;
use crate::state::session::SessionRef;
use chrono::Local;
use std::sync::Arc;

fn eq_ci(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignore_ascii_case(y))
}

pub fn do_message(registry: &Arc<Registry>, conn: &mut Conn, line: &str) {
    let parsed = parse_sendlist(line.as_bytes());
    let mut sendlist = parsed.sendlist;
    let body = String::from_utf8_lossy(parsed.body).into_owned();
    let sess = conn.session();

    // An empty sendlist repeats the last one.
    if sendlist.is_empty() {
        let last = sess.read().last_sendlist.clone();
        if last.is_empty() {
            sess.write()
                .output("\u{7}\u{7}You have no previous sendlist. (message not sent)\n");
            return;
        }
        sendlist = last;
    }

    if eq_ci(&sendlist, b"default") {
        let default = sess.read().default_sendlist.clone();
        if default.is_empty() {
            sess.write()
                .output("\u{7}\u{7}You have no default sendlist. (message not sent)\n");
            return;
        }
        sendlist = default.into_bytes();
    }

    if parsed.is_explicit && !sendlist.is_empty() {
        sess.write().remember_sendlist(&sendlist);
    }

    if let Some(id) = parse_conn_id(&sendlist) {
        send_by_conn_id(registry, conn, id, &body);
    } else if eq_ci(&sendlist, b"everyone") {
        send_everyone(registry, conn, &body);
    } else {
        send_private(registry, conn, &sendlist, &body);
    }
}

/// `#<digits>` addresses a connection directly.
fn parse_conn_id(sendlist: &[u8]) -> Option<u32> {
    let digits = sendlist.strip_prefix(b"#")?;
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn private_message(sender: &SessionRef, body: &str) -> Arc<OutputObj> {
    Arc::new(OutputObj::Message {
        kind: MessageKind::Private,
        sender: sender.read().name_obj.clone(),
        body: body.to_string(),
        time: Local::now(),
    })
}

pub fn send_everyone(registry: &Arc<Registry>, conn: &mut Conn, body: &str) {
    let sess = conn.session();
    let msg = Arc::new(OutputObj::Message {
        kind: MessageKind::Public,
        sender: sess.read().name_obj.clone(),
        body: body.to_string(),
        time: Local::now(),
    });

    let mut sent = 0;
    for other in registry.sessions() {
        if Arc::ptr_eq(&other, &sess) {
            continue;
        }
        other.write().enqueue(msg.clone());
        sent += 1;
    }

    let mut s = sess.write();
    if sent == 0 {
        s.output("\u{7}\u{7}There is no one else here! (message not sent)\n");
    } else {
        s.reset_idle(10);
        let msg = format!(
            "(message sent to everyone.) [{} {}]\n",
            sent,
            if sent == 1 { "person" } else { "people" }
        );
        s.output(&msg);
    }
}

fn send_by_conn_id(registry: &Arc<Registry>, conn: &mut Conn, id: u32, body: &str) {
    let sess = conn.session();
    let target = registry
        .sessions()
        .into_iter()
        .find(|s| s.read().conn_id() == Some(id));
    match target {
        Some(dest) => deliver_private(conn, &dest, body),
        None => {
            let msg =
                format!("\u{7}\u{7}There is no user on conn #{}. (message not sent)\n", id);
            sess.write().output(&msg);
        }
    }
}

pub fn send_private(registry: &Arc<Registry>, conn: &mut Conn, sendlist: &[u8], body: &str) {
    let sess = conn.session();

    if eq_ci(sendlist, b"me") {
        deliver_private(conn, &sess.clone(), body);
        return;
    }

    // An exact name wins outright; otherwise collect substring matches.
    let mut dest: Option<SessionRef> = None;
    let mut extra: Option<SessionRef> = None;
    let mut matches = 0;
    for other in registry.sessions() {
        if Arc::ptr_eq(&other, &sess) {
            continue;
        }
        let name_only = other.read().name_only.clone();
        if eq_ci(name_only.as_bytes(), sendlist) {
            dest = Some(other);
            matches = 1;
            break;
        }
        if match_name(name_only.as_bytes(), sendlist).is_some() {
            matches += 1;
            if matches == 1 {
                dest = Some(other);
            } else {
                extra = Some(other);
            }
        }
    }

    match matches {
        0 => {
            let msg = format!(
                "\u{7}\u{7}No names matched \"{}\". (message not sent)\n",
                display_sendlist(sendlist)
            );
            sess.write().output(&msg);
        }
        1 => deliver_private(conn, &dest.unwrap(), body),
        n => {
            let msg = format!(
                "\u{7}\u{7}\"{}\" matches {} names, including \"{}\" and \"{}\". (message not sent)\n",
                display_sendlist(sendlist),
                n,
                dest.unwrap().read().name_only,
                extra.unwrap().read().name_only
            );
            sess.write().output(&msg);
        }
    }
}

/// Queue a private message and the sender's receipt.
fn deliver_private(conn: &mut Conn, dest: &SessionRef, body: &str) {
    let sess = conn.session();
    let msg = private_message(&sess, body);
    let dest_name = dest.read().name.clone();
    {
        let mut s = sess.write();
        s.reset_idle(10);
        let receipt = format!("(message sent to {}.)\n", dest_name);
        s.output(&receipt);
    }
    if Arc::ptr_eq(dest, &sess) {
        sess.write().enqueue(msg);
    } else {
        dest.write().enqueue(msg);
    }
}

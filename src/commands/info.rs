//! Read-only commands: /who, /idle, /date, /why, /help.

use crate::banner;
use crate::net::conn::Conn;
use crate::state::registry::Registry;
use crate::util::{IdleSpan, clock_hhmmss, full_date, idle_column, month_day, who_idle_column};
use chrono::Local;
use std::sync::Arc;

const WHO_HEADER: &str = "\n Name                              On Since   Idle  User\n \
                          ----                              --------   ----  ----\n";

pub fn who(registry: &Arc<Registry>, conn: &mut Conn) {
    let sessions = registry.sessions();
    let sess = conn.session();
    if sessions.is_empty() {
        sess.write().output("Nobody is signed on.\n");
        return;
    }

    let now = Local::now();
    let mut out = String::from(WHO_HEADER);
    for other in &sessions {
        let s = other.read();
        let attached = s.is_attached();
        out.push(if attached { ' ' } else { '~' });
        out.push_str(&format!("{:<32}  ", s.name));
        if attached {
            if (now - s.login_time).num_seconds() < 86_400 {
                out.push_str(&clock_hhmmss(s.login_time));
            } else {
                out.push_str(&format!(" {} ", month_day(s.login_time)));
            }
        } else {
            out.push_str("detached");
        }
        let idle = IdleSpan::from_minutes((now - s.idle_since).num_minutes());
        out.push_str(&who_idle_column(idle, attached));
        out.push_str(&s.user.login);
        out.push('\n');
    }
    sess.write().output(&out);
}

const IDLE_HEADER_ONE: &str = "\n Name                              Idle\n \
                               ----                              ----\n";
const IDLE_HEADER_TWO: &str = "\n Name                              Idle  \
                               Name                              Idle\n \
                               ----                              ----  \
                               ----                              ----\n";

pub fn idle(registry: &Arc<Registry>, conn: &mut Conn) {
    let sessions = registry.sessions();
    let sess = conn.session();
    if sessions.is_empty() {
        sess.write().output("Nobody is signed on.\n");
        return;
    }

    let now = Local::now();
    let mut out =
        String::from(if sessions.len() == 1 { IDLE_HEADER_ONE } else { IDLE_HEADER_TWO });
    let mut col = false;
    for other in &sessions {
        let s = other.read();
        out.push(if s.is_attached() { ' ' } else { '~' });
        out.push_str(&format!("{:<32} ", s.name));
        let span = IdleSpan::from_minutes((now - s.idle_since).num_minutes());
        out.push_str(&idle_column(span));
        out.push(if col { '\n' } else { ' ' });
        col = !col;
    }
    if col {
        out.push('\n');
    }
    sess.write().output(&out);
}

pub fn date(conn: &mut Conn) {
    let line = format!("{}\n", full_date(Local::now()));
    conn.session().write().output(&line);
}

pub fn why(conn: &mut Conn) {
    conn.session().write().output("Why not?\n");
}

pub fn help(conn: &mut Conn) {
    conn.session().write().output(banner::HELP);
}

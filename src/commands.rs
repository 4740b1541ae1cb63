//! Line dispatch: the login state machine hand-off, the slash and bang
//! command tables, and the couple of commands small enough to live here.

use crate::net::conn::Conn;
use crate::state::registry::Registry;
use crate::state::session::InputState;
use std::sync::Arc;

pub mod admin;
pub mod info;
pub mod login;
pub mod message;
pub mod settings;

/// Deliver a completed input line to the session's current handler, or queue
/// it until one is installed.
pub fn deliver_line(registry: &Arc<Registry>, conn: &mut Conn, line: &str) {
    conn.session().write().stream.dequeue();
    let state = conn.session().read().handler;
    match state {
        None => conn.session().write().pending_lines.push_back(line.to_string()),
        Some(state) => {
            run_handler(registry, conn, state, line);
            conn.flush_session();
        }
    }
}

/// Install a new input handler and replay any lines that were typed ahead.
pub fn set_input_state(registry: &Arc<Registry>, conn: &mut Conn, state: InputState) {
    conn.session().write().handler = Some(state);
    loop {
        let (state, line) = {
            let sess = conn.session();
            let mut s = sess.write();
            let Some(state) = s.handler else { break };
            let Some(line) = s.pending_lines.pop_front() else { break };
            (state, line)
        };
        run_handler(registry, conn, state, &line);
        conn.flush_session();
    }
}

fn run_handler(registry: &Arc<Registry>, conn: &mut Conn, state: InputState, line: &str) {
    match state {
        InputState::Login => login::login(registry, conn, line),
        InputState::Password => login::password(registry, conn, line),
        InputState::Name => login::name(registry, conn, line),
        InputState::Blurb => login::blurb(registry, conn, line),
        InputState::Normal => process_input(registry, conn, line),
    }
}

fn starts_ci(line: &str, prefix: &str) -> bool {
    line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Everything after the first whitespace-delimited word, with the separating
/// whitespace dropped.
fn after_word(line: &str) -> &str {
    let rest = line.trim_start_matches(|c: char| !c.is_ascii_whitespace());
    rest.trim_start_matches(|c: char| c.is_ascii_whitespace())
}

/// The normal-state dispatcher: bang commands, slash commands, the idle
/// reset space, or a message.
pub fn process_input(registry: &Arc<Registry>, conn: &mut Conn, line: &str) {
    if line.starts_with('!') {
        if conn.session().read().user.privilege < 50 {
            conn.session().write().output("Sorry, all !commands are privileged.\n");
            return;
        }
        if starts_ci(line, "!down") {
            admin::down(registry, conn, after_word(line));
        } else if starts_ci(line, "!nuke ") {
            admin::nuke(registry, conn, after_word(line));
        } else {
            conn.session().write().output("Unknown !command.\n");
        }
    } else if line.starts_with('/') {
        if starts_ci(line, "/bye") {
            do_bye(registry, conn);
        } else if starts_ci(line, "/clear") {
            do_clear(conn);
        } else if starts_ci(line, "/unidle") {
            do_reset(conn);
        } else if starts_ci(line, "/det") {
            do_detach(conn);
        } else if starts_ci(line, "/who") {
            info::who(registry, conn);
        } else if starts_ci(line, "/id") {
            info::idle(registry, conn);
        } else if line.eq_ignore_ascii_case("/date") {
            info::date(conn);
        } else if starts_ci(line, "/signal") {
            settings::signal(&conn.session(), &line[7..]);
        } else if starts_ci(line, "/send") {
            settings::send(&conn.session(), &line[5..]);
        } else if starts_ci(line, "/why") {
            info::why(conn);
        } else if starts_ci(line, "/bl") {
            settings::do_blurb(&conn.session(), after_word(line), false);
        } else if starts_ci(line, "/help") {
            info::help(conn);
        } else {
            conn.session()
                .write()
                .output("Unknown /command.  Type /help for help.\n");
        }
    } else if line == " " {
        do_reset(conn);
    } else if !line.is_empty() {
        message::do_message(registry, conn, line);
    }
}

pub fn do_bye(registry: &Arc<Registry>, conn: &mut Conn) {
    registry.close_session(&conn.session());
    conn.request_close(true);
}

fn do_clear(conn: &mut Conn) {
    conn.session().write().output("\x1b[H\x1b[J");
}

fn do_detach(conn: &mut Conn) {
    let sess = conn.session();
    {
        let mut s = sess.write();
        s.output("You have been detached.\n");
        s.enqueue_output();
    }
    conn.request_close(true);
}

fn do_reset(conn: &mut Conn) {
    conn.session().write().reset_idle(1);
}

//! The pre-signon handler chain: login name, password, display name, blurb.

use crate::banner;
use crate::commands::{self, settings};
use crate::models::User;
use crate::net::conn::Conn;
use crate::net::output::OutputObj;
use crate::state::registry::Registry;
use crate::state::session::{InputState, SessionRef};
use crate::{NAME_LEN, commands::info};
use chrono::Local;
use std::sync::Arc;

/// Handle a line at the `login:` prompt.
pub fn login(registry: &Arc<Registry>, conn: &mut Conn, line: &str) {
    if line.eq_ignore_ascii_case("/bye") {
        commands::do_bye(registry, conn);
        return;
    }

    if line.eq_ignore_ascii_case("guest") {
        {
            let sess = conn.session();
            let mut s = sess.write();
            s.user = User::guest();
            s.name_only.clear();
            s.name.clear();
        }
        conn.output("\n");
        conn.prompt(banner::NAME_PROMPT);
        commands::set_input_state(registry, conn, InputState::Name);
        return;
    }

    let found = registry.auth.lookup(line).unwrap_or_else(|e| {
        tracing::warn!("credential lookup failed: {}", e);
        None
    });
    let Some(user) = found else {
        conn.output("Login incorrect.\n");
        conn.prompt(banner::LOGIN_PROMPT);
        return;
    };

    {
        let sess = conn.session();
        let mut s = sess.write();
        let mut name = user.reserved_name.clone();
        name.truncate(NAME_LEN - 1);
        s.name_only = name;
        s.user = user;
    }

    // Warn if echo can't be turned off.
    if conn.machine.echo.off() {
        conn.output("\n\u{7}Sorry, password WILL echo.\n\n");
    } else if !conn.machine.echo.enabled() {
        conn.output("\nWarning: password may echo.\n\n");
    }

    conn.prompt(banner::PASSWORD_PROMPT);
    conn.set_do_echo(false);
    commands::set_input_state(registry, conn, InputState::Password);
}

/// Handle the password line; echo was off while it was typed.
pub fn password(registry: &Arc<Registry>, conn: &mut Conn, line: &str) {
    conn.output("\n");
    conn.set_do_echo(true);

    let hash = conn.session().read().user.password_hash.clone();
    if !registry.auth.verify(line, &hash) {
        conn.output("Login incorrect.\n");
        conn.prompt(banner::LOGIN_PROMPT);
        commands::set_input_state(registry, conn, InputState::Login);
        return;
    }

    let default_name = conn.session().read().name_only.clone();
    conn.output(&format!("\nYour default name is \"{}\".\n\n", default_name));
    conn.prompt(banner::NAME_PROMPT);
    commands::set_input_state(registry, conn, InputState::Name);
}

/// Handle the display-name line: blank keeps the account default, a detached
/// session under the same name and account is re-attached, collisions are
/// refused.
pub fn name(registry: &Arc<Registry>, conn: &mut Conn, line: &str) {
    if line.is_empty() {
        let guest = conn.session().read().user.is_guest();
        if guest {
            conn.output("\n");
            conn.prompt(banner::NAME_PROMPT);
            return;
        }
    } else {
        let mut name = line.to_string();
        name.truncate(NAME_LEN - 1);
        conn.session().write().name_only = name;
    }

    let (login, name_only) = {
        let sess = conn.session();
        let s = sess.read();
        (s.user.login.clone(), s.name_only.clone())
    };

    if let Some(target) = registry.find_detached(&login, &name_only) {
        conn.output("Re-attaching to detached session...\n");
        attach(registry, conn, target);
        return;
    }
    if registry.name_in_use(&name_only) {
        conn.output("That name is already in use.  Choose another.\n");
        conn.prompt(banner::NAME_PROMPT);
        return;
    }

    conn.prompt(banner::BLURB_PROMPT);
    commands::set_input_state(registry, conn, InputState::Blurb);
}

/// Swap this connection over to an existing detached session, replay its
/// unacknowledged output and discard the half-built login session.
fn attach(registry: &Arc<Registry>, conn: &mut Conn, target: SessionRef) {
    let handle = conn.session().write().conn.take();
    let name_obj = {
        let mut t = target.write();
        t.conn = handle;
        t.detached_at = None;
        t.stream.rewind();
        tracing::info!("Attach: {} ({}) on conn #{}.", t.name_only, t.user.login, conn.id());
        t.name_obj.clone()
    };
    conn.set_session(target.clone());
    registry.enqueue_others(
        &target,
        Arc::new(OutputObj::Attach { who: name_obj, time: Local::now() }),
    );
    conn.drain_stream();
    {
        let mut t = target.write();
        t.output(banner::END_OF_REVIEW);
        t.enqueue_output();
    }
    conn.drain_stream();
}

/// Handle the blurb line and complete sign-on.
pub fn blurb(registry: &Arc<Registry>, conn: &mut Conn, line: &str) {
    let effective = if line.is_empty() {
        conn.session().read().user.default_blurb.clone()
    } else {
        line.to_string()
    };
    let over = settings::do_blurb(&conn.session(), &effective, true);
    if over > 0 {
        conn.output(&format!(
            "The combination of your name and blurb is {} character{} too long.\n",
            over,
            if over == 1 { "" } else { "s" }
        ));
        conn.prompt(banner::BLURB_PROMPT);
        return;
    }
    sign_on(registry, conn);
}

fn sign_on(registry: &Arc<Registry>, conn: &mut Conn) {
    let sess = conn.session();
    let name_obj = {
        let mut s = sess.write();
        s.signed_on = true;
        let now = Local::now();
        s.login_time = now;
        s.idle_since = now;
        tracing::info!("Enter: {} ({}) on conn #{}.", s.name_only, s.user.login, conn.id());
        s.name_obj.clone()
    };
    registry.enqueue_others(
        &sess,
        Arc::new(OutputObj::Entry { who: name_obj, time: Local::now() }),
    );
    registry.link(sess.clone());

    sess.write().output(banner::SIGNED_ON);
    info::who(registry, conn);
    commands::set_input_state(registry, conn, InputState::Normal);
}

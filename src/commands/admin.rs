//! Privileged bang commands: !down and !nuke.

use crate::input::sendlist::match_name;
use crate::net::conn::Conn;
use crate::state::registry::Registry;
use crate::state::session::{ConnSignal, SessionRef};
use std::sync::Arc;

/// `!down [seconds | ! | cancel]`: schedule, force or cancel a shutdown.
pub fn down(registry: &Arc<Registry>, conn: &mut Conn, args: &str) {
    let (name, name_only, login) = {
        let sess = conn.session();
        let s = sess.read();
        (s.name.clone(), s.name_only.clone(), s.user.login.clone())
    };

    if args == "!" {
        tracing::info!("Immediate shutdown requested by {} ({}).", name_only, login);
        tracing::info!("Final shutdown warning.");
        registry.announce(&format!("*** {} has shut down Parley! ***\n", name));
        registry.announce("\u{7}\u{7}>>> Server shutting down NOW!  Goodbye. <<<\n\u{7}\u{7}");
        registry.shutdown.immediate();
    } else if args.eq_ignore_ascii_case("cancel") {
        if registry.shutdown.cancel() {
            tracing::info!("Shutdown cancelled by {} ({}).", name_only, login);
            registry.announce(&format!("*** {} has cancelled the server shutdown. ***\n", name));
        } else {
            conn.session().write().output("The server was not about to shut down.\n");
        }
    } else {
        let seconds: u64 = args
            .split_whitespace()
            .next()
            .and_then(|w| w.parse().ok())
            .unwrap_or(30);
        tracing::info!("Shutdown requested by {} ({}) in {} seconds.", name_only, login, seconds);
        registry.announce(&format!("*** {} has shut down Parley! ***\n", name));
        registry.announce(&format!(
            "\u{7}\u{7}>>> This server will shutdown in {} seconds... <<<\n\u{7}\u{7}",
            seconds
        ));
        registry.shutdown.schedule(seconds);
    }
}

/// `!nuke <name>` disconnects a session after draining its output; a leading
/// `!` on the name drops pending output instead.
pub fn nuke(registry: &Arc<Registry>, conn: &mut Conn, args: &str) {
    let (drain, pattern) = match args.strip_prefix('!') {
        Some(rest) => (false, rest),
        None => (true, args),
    };
    let sess = conn.session();

    let target: SessionRef = if pattern.eq_ignore_ascii_case("me") {
        sess.clone()
    } else {
        let mut dest: Option<SessionRef> = None;
        let mut extra: Option<SessionRef> = None;
        let mut matches = 0;
        for other in registry.sessions() {
            let name_only = other.read().name_only.clone();
            if name_only.eq_ignore_ascii_case(pattern) {
                dest = Some(other);
                matches = 1;
                break;
            }
            if match_name(name_only.as_bytes(), pattern.as_bytes()).is_some() {
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
                let msg =
                    format!("\u{7}\u{7}No names matched \"{}\". (nobody nuked)\n", pattern);
                sess.write().output(&msg);
                return;
            }
            1 => dest.unwrap(),
            n => {
                let msg = format!(
                    "\u{7}\u{7}\"{}\" matches {} names, including \"{}\" and \"{}\". (nobody nuked)\n",
                    pattern,
                    n,
                    dest.unwrap().read().name_only,
                    extra.unwrap().read().name_only
                );
                sess.write().output(&msg);
                return;
            }
        }
    };

    let (target_name_only, target_login, target_conn) = {
        let t = target.read();
        (t.name_only.clone(), t.user.login.clone(), t.conn.clone())
    };
    let (nuker_name, nuker_name_only, nuker_login) = {
        let s = sess.read();
        (s.name.clone(), s.name_only.clone(), s.user.login.clone())
    };

    {
        let receipt = if drain {
            format!("\"{}\" has been nuked.\n", target_name_only)
        } else {
            format!("\"{}\" has been nuked immediately.\n", target_name_only)
        };
        sess.write().output(&receipt);
    }

    match target_conn {
        Some(handle) => {
            tracing::info!(
                "{} ({}) on conn #{} has been nuked by {} ({}).",
                target_name_only,
                target_login,
                handle.id,
                nuker_name_only,
                nuker_login
            );
            {
                let mut t = target.write();
                t.output(&format!(
                    "\u{7}\u{7}\u{7}*** You have been nuked by {}. ***\n",
                    nuker_name
                ));
                t.enqueue_output();
            }
            registry.close_session(&target);
            handle.signal(ConnSignal::Close { drain });
        }
        None => {
            tracing::info!(
                "{} ({}), detached, has been nuked by {} ({}).",
                target_name_only,
                target_login,
                nuker_name_only,
                nuker_login
            );
            registry.close_session(&target);
        }
    }
}

//! Process-wide state: the signed-on session list, connection id allocation,
//! the shutdown control block and the credential service.
//!
//! Every mutation happens under short `parking_lot` critical sections; no
//! lock is ever held across an await point.

use crate::config::Config;
use crate::net::output::OutputObj;
use crate::services::AuthService;
use crate::shutdown::ShutdownCtl;
use crate::state::session::SessionRef;
use chrono::Local;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

pub struct Registry {
    pub config: Config,
    pub auth: AuthService,
    pub shutdown: ShutdownCtl,
    sessions: RwLock<Vec<SessionRef>>,
    next_conn_id: AtomicU32,
}

impl Registry {
    pub fn new(config: Config, auth: AuthService) -> Self {
        Self {
            config,
            auth,
            shutdown: ShutdownCtl::new(),
            sessions: RwLock::new(Vec::new()),
            next_conn_id: AtomicU32::new(1),
        }
    }

    pub fn next_conn_id(&self) -> u32 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Snapshot of the signed-on sessions.
    pub fn sessions(&self) -> Vec<SessionRef> {
        self.sessions.read().clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Link a session into the signed-on list.
    pub fn link(&self, sess: SessionRef) {
        self.sessions.write().push(sess);
    }

    /// Unlink a session; harmless when it was never linked. Exits the
    /// process when a pending shutdown finds no sessions left.
    pub fn unlink(&self, sess: &SessionRef) {
        let mut list = self.sessions.write();
        list.retain(|s| !Arc::ptr_eq(s, sess));
        let empty = list.is_empty();
        drop(list);
        if empty {
            self.check_shutdown();
        }
    }

    /// Exit if a shutdown is pending and nobody is left to warn.
    pub fn check_shutdown(&self) {
        if self.shutdown.is_active() && self.sessions.read().is_empty() {
            tracing::info!("All connections closed, shutting down.");
            tracing::info!("Server down.");
            std::process::exit(0);
        }
    }

    /// A detached session signed on under the same account and name, if any.
    pub fn find_detached(&self, login: &str, name_only: &str) -> Option<SessionRef> {
        self.sessions
            .read()
            .iter()
            .find(|s| {
                let s = s.read();
                s.name_only.eq_ignore_ascii_case(name_only)
                    && s.user.login == login
                    && !s.is_attached()
            })
            .cloned()
    }

    /// Whether any signed-on session already uses this name.
    pub fn name_in_use(&self, name_only: &str) -> bool {
        self.sessions
            .read()
            .iter()
            .any(|s| s.read().name_only.eq_ignore_ascii_case(name_only))
    }

    /// Enqueue an output object on every session but one.
    pub fn enqueue_others(&self, except: &SessionRef, obj: Arc<OutputObj>) {
        for s in self.sessions.read().iter() {
            if Arc::ptr_eq(s, except) {
                continue;
            }
            s.write().enqueue(obj.clone());
        }
    }

    /// Formatted write to every signed-on session, sender included.
    pub fn announce(&self, text: &str) {
        for s in self.sessions.read().iter() {
            let mut s = s.write();
            s.output(text);
            s.enqueue_output();
        }
    }

    /// Destroy detached sessions that outlived the configured timeout. The
    /// session goes away as if its connection had been lost for good: the
    /// others see an accidental detach, never an exit.
    pub fn reap_detached(&self, timeout: Duration) -> Vec<SessionRef> {
        let now = Instant::now();
        let expired: Vec<SessionRef> = self
            .sessions
            .read()
            .iter()
            .filter(|s| {
                let s = s.read();
                !s.is_attached()
                    && s.detached_at.map(|t| now.duration_since(t) >= timeout).unwrap_or(false)
            })
            .cloned()
            .collect();
        for sess in &expired {
            let name_obj = {
                let mut s = sess.write();
                s.signed_on = false;
                tracing::info!("Detach: {} ({}), timed out. (accidental)", s.name_only, s.user.login);
                s.name_obj.clone()
            };
            self.enqueue_others(
                sess,
                Arc::new(OutputObj::Detach {
                    who: name_obj,
                    intentional: false,
                    time: Local::now(),
                }),
            );
            self.unlink(sess);
        }
        expired
    }

    /// Take a session out of the conference: unlink it, notify everyone else
    /// and log the exit. The connection, if any, is left for the caller.
    pub fn close_session(&self, sess: &SessionRef) {
        let (signed_on, name_obj, label) = {
            let mut s = sess.write();
            let was = s.signed_on;
            s.signed_on = false;
            let label = match s.conn_id() {
                Some(id) => format!("Exit: {} ({}) on conn #{}.", s.name_only, s.user.login, id),
                None => format!("Exit: {} ({}), detached.", s.name_only, s.user.login),
            };
            (was, s.name_obj.clone(), label)
        };
        if signed_on {
            tracing::info!("{}", label);
            self.enqueue_others(
                sess,
                Arc::new(OutputObj::Exit { who: name_obj, time: Local::now() }),
            );
        }
        self.unlink(sess);
    }
}

/// Broadcast a detach notification and mark the session detached.
pub fn detach_session(registry: &Registry, sess: &SessionRef, intentional: bool, conn_id: u32) {
    let name_obj = {
        let mut s = sess.write();
        s.conn = None;
        s.detached_at = Some(Instant::now());
        let how = if intentional { "intentional" } else { "accidental" };
        tracing::info!(
            "Detach: {} ({}) on conn #{}. ({})",
            s.name_only,
            s.user.login,
            conn_id,
            how
        );
        s.name_obj.clone()
    };
    registry.enqueue_others(
        sess,
        Arc::new(OutputObj::Detach { who: name_obj, intentional, time: Local::now() }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::Name;
    use crate::state::session::Session;
    use std::path::PathBuf;

    fn registry() -> Registry {
        Registry::new(Config::default(), AuthService::new(PathBuf::from("passwd")))
    }

    fn signed_on(name: &str, login: &str) -> SessionRef {
        let sess = Session::new_ref();
        {
            let mut s = sess.write();
            s.name_only = name.to_string();
            s.user.login = login.to_string();
            s.compose_name();
            s.signed_on = true;
        }
        sess
    }

    #[test]
    fn link_unlink_round_trip() {
        let reg = registry();
        let a = signed_on("Alice", "alice");
        reg.link(a.clone());
        assert_eq!(reg.session_count(), 1);
        reg.unlink(&a);
        assert_eq!(reg.session_count(), 0);
    }

    #[test]
    fn find_detached_needs_matching_account() {
        let reg = registry();
        let a = signed_on("Alice", "alice");
        reg.link(a.clone());
        assert!(reg.find_detached("alice", "ALICE").is_some());
        assert!(reg.find_detached("bob", "alice").is_none());
        assert!(reg.name_in_use("alice"));
        assert!(!reg.name_in_use("carol"));
    }

    #[test]
    fn enqueue_others_skips_sender() {
        let reg = registry();
        let a = signed_on("Alice", "alice");
        let b = signed_on("Bob", "bob");
        reg.link(a.clone());
        reg.link(b.clone());
        let who = Name::new("Alice", "Alice");
        reg.enqueue_others(&a, Arc::new(OutputObj::Entry { who, time: Local::now() }));
        assert!(a.read().stream.is_empty());
        assert_eq!(b.read().stream.len(), 1);
    }

    #[test]
    fn announce_reaches_everyone() {
        let reg = registry();
        let a = signed_on("Alice", "alice");
        let b = signed_on("Bob", "bob");
        reg.link(a.clone());
        reg.link(b.clone());
        reg.announce("*** hello ***\n");
        assert_eq!(a.read().stream.len(), 1);
        assert_eq!(b.read().stream.len(), 1);
    }

    #[test]
    fn close_session_notifies_and_unlinks() {
        let reg = registry();
        let a = signed_on("Alice", "alice");
        let b = signed_on("Bob", "bob");
        reg.link(a.clone());
        reg.link(b.clone());
        reg.close_session(&a);
        assert_eq!(reg.session_count(), 1);
        assert!(!a.read().signed_on);
        assert_eq!(b.read().stream.len(), 1);
    }

    #[test]
    fn reap_only_expired_detached() {
        let reg = registry();
        let a = signed_on("Alice", "alice");
        a.write().detached_at = Some(Instant::now() - Duration::from_secs(120));
        let b = signed_on("Bob", "bob");
        b.write().detached_at = Some(Instant::now());
        reg.link(a.clone());
        reg.link(b.clone());
        let reaped = reg.reap_detached(Duration::from_secs(60));
        assert_eq!(reaped.len(), 1);
        assert!(Arc::ptr_eq(&reaped[0], &a));
        assert_eq!(reg.session_count(), 1);
        assert!(!a.read().signed_on);
        // The survivors hear an accidental detach, never an exit.
        let notice = b.write().stream.next_unsent().unwrap();
        assert!(matches!(
            &*notice,
            OutputObj::Detach { intentional: false, .. }
        ));
    }
}

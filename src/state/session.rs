//! The durable user context: everything that survives the loss of a TCP
//! connection.
//!
//! A session always owns its output stream. A connection holds a session
//! reference and the session holds a lightweight handle back to the
//! connection's task; detach breaks the back-reference, never the session.

use crate::SENDLIST_LEN;
use crate::models::{Name, User};
use crate::net::blockbuf::BlockBuf;
use crate::net::output::{OutputObj, OutputStream};
use crate::util::{IdleSpan, idle_sentence};
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

pub type SessionRef = Arc<RwLock<Session>>;

/// Wakeups delivered to a connection task from outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnSignal {
    /// The session's output stream has new objects to push.
    OutputReady,
    /// Close the connection, draining pending output first unless told not
    /// to.
    Close { drain: bool },
}

/// Cheap handle to a connection task: its user-visible id plus a wakeup
/// channel.
#[derive(Debug, Clone)]
pub struct ConnHandle {
    pub id: u32,
    tx: mpsc::UnboundedSender<ConnSignal>,
}

impl ConnHandle {
    pub fn new(id: u32, tx: mpsc::UnboundedSender<ConnSignal>) -> Self {
        Self { id, tx }
    }

    pub fn signal(&self, signal: ConnSignal) {
        let _ = self.tx.send(signal);
    }
}

/// Which input handler the next line goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    Login,
    Password,
    Name,
    Blurb,
    Normal,
}

#[derive(Debug)]
pub struct Session {
    pub user: User,
    /// Display name without the blurb.
    pub name_only: String,
    pub blurb: String,
    /// Composed display name, `name_only [blurb]`.
    pub name: String,
    /// Current name snapshot; messages capture it at enqueue time.
    pub name_obj: Arc<Name>,
    pub default_sendlist: String,
    /// Last explicit sendlist, kept raw (may hold the underscore sentinel).
    pub last_sendlist: Vec<u8>,
    /// Sender of the last private message received.
    pub reply_sendlist: String,
    pub login_time: DateTime<Local>,
    pub idle_since: DateTime<Local>,
    pub signal_public: bool,
    pub signal_private: bool,
    pub signed_on: bool,
    /// Current input handler; `None` queues lines until one is installed.
    pub handler: Option<InputState>,
    pub pending_lines: VecDeque<String>,
    pub stream: OutputStream,
    /// Bytes accumulated by `output`, turned into one Text object on flush.
    out_buf: BlockBuf,
    pub conn: Option<ConnHandle>,
    pub detached_at: Option<Instant>,
}

impl Session {
    pub fn new() -> Self {
        let now = Local::now();
        Self {
            user: User::nobody(),
            name_only: String::new(),
            blurb: String::new(),
            name: String::new(),
            name_obj: Name::new("", ""),
            default_sendlist: "everyone".into(),
            last_sendlist: Vec::new(),
            reply_sendlist: String::new(),
            login_time: now,
            idle_since: now,
            signal_public: true,
            signal_private: true,
            signed_on: false,
            handler: None,
            pending_lines: VecDeque::new(),
            stream: OutputStream::new(),
            out_buf: BlockBuf::new(),
            conn: None,
            detached_at: None,
        }
    }

    pub fn new_ref() -> SessionRef {
        Arc::new(RwLock::new(Session::new()))
    }

    pub fn conn_id(&self) -> Option<u32> {
        self.conn.as_ref().map(|c| c.id)
    }

    pub fn is_attached(&self) -> bool {
        self.conn.is_some()
    }

    /// Refresh the composed name and capture a new snapshot for future
    /// messages.
    pub fn compose_name(&mut self) {
        self.name = if self.blurb.is_empty() {
            self.name_only.clone()
        } else {
            format!("{} [{}]", self.name_only, self.blurb)
        };
        self.name_obj = Name::new(self.name.clone(), self.name_only.clone());
    }

    /// Buffer text bound for this session's terminal.
    pub fn output(&mut self, text: &str) {
        self.out_buf.extend(text.as_bytes());
    }

    /// Flatten buffered text into a Text object on the stream. Returns true
    /// if anything was enqueued.
    pub fn enqueue_output(&mut self) -> bool {
        if self.out_buf.is_empty() {
            return false;
        }
        let text = String::from_utf8_lossy(&self.out_buf.flatten()).into_owned();
        self.stream.enqueue(Arc::new(OutputObj::Text(text)));
        self.kick();
        true
    }

    /// Enqueue an output object and wake the attached connection, if any.
    /// Buffered text goes first so interleaved output keeps its order.
    pub fn enqueue(&mut self, obj: Arc<OutputObj>) {
        self.enqueue_output();
        self.stream.enqueue(obj);
        self.kick();
    }

    pub fn kick(&self) {
        if let Some(conn) = &self.conn {
            conn.signal(ConnSignal::OutputReady);
        }
    }

    pub fn remember_sendlist(&mut self, sendlist: &[u8]) {
        let take = sendlist.len().min(SENDLIST_LEN - 1);
        self.last_sendlist = sendlist[..take].to_vec();
    }

    pub fn idle_minutes(&self) -> i64 {
        (Local::now() - self.idle_since).num_minutes()
    }

    /// Reset the idle clock, reporting the old span when it reaches
    /// `report_min` minutes. Returns the span that was reset.
    pub fn reset_idle(&mut self, report_min: i64) -> i64 {
        let idle = self.idle_minutes();
        if report_min > 0 && idle >= report_min {
            let sentence = idle_sentence(IdleSpan::from_minutes(idle));
            self.output(&format!("[{}]\n", sentence));
        }
        self.idle_since = Local::now();
        idle
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

//! Session output: an ordered queue of output objects with sent and
//! acknowledged cursors.
//!
//! Objects are rendered to bytes only when they are pushed to a connection,
//! never at enqueue time. The two cursors implement end-to-end receipts over
//! telnet TIMING-MARK: `acked <= sent <= len` always holds, acknowledged
//! objects fall off the head, and a re-attached session rewinds `sent` to
//! `acked` so the unacknowledged tail is replayed on the new connection.

use crate::models::Name;
use crate::net::machine::BELL;
use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Public,
    Private,
}

#[derive(Debug)]
pub enum OutputObj {
    /// Plain text, emitted verbatim.
    Text(String),
    /// A user message, wrapped and stamped at delivery time.
    Message {
        kind: MessageKind,
        sender: Arc<Name>,
        body: String,
        time: DateTime<Local>,
    },
    Entry { who: Arc<Name>, time: DateTime<Local> },
    Exit { who: Arc<Name>, time: DateTime<Local> },
    Attach { who: Arc<Name>, time: DateTime<Local> },
    Detach { who: Arc<Name>, intentional: bool, time: DateTime<Local> },
}

/// Receiver-side state consulted while rendering.
#[derive(Debug, Clone, Copy)]
pub struct RenderCtx {
    pub signal_public: bool,
    pub signal_private: bool,
    pub width: usize,
}

/// A rendered object plus its side effect on the receiver.
#[derive(Debug)]
pub struct Rendered {
    pub text: String,
    /// Sender of a private message, captured as the reply target.
    pub reply_to: Option<Arc<Name>>,
}

fn stamp(t: &DateTime<Local>) -> String {
    crate::util::clock_hhmm(*t)
}

/// Word-wrap a message body at `width - 4`, continuing lines with ` - `.
fn wrap_body(out: &mut String, body: &str, width: usize) {
    let limit = width.saturating_sub(4).max(1);
    let mut start = body;
    while !start.is_empty() {
        let bytes = start.as_bytes();
        let mut wrap = None;
        let mut col = 0;
        while col < bytes.len() && col < limit {
            if bytes[col] == b' ' {
                wrap = Some(col);
            }
            col += 1;
        }
        if col >= bytes.len() {
            out.push_str(start);
            break;
        }
        if let Some(w) = wrap {
            out.push_str(&start[..w]);
            start = &start[w + 1..];
            if start.as_bytes().first() == Some(&b' ') {
                start = &start[1..];
            }
        } else {
            out.push_str(&start[..col]);
            start = &start[col..];
        }
        out.push_str("\n - ");
    }
    out.push('\n');
}

impl OutputObj {
    pub fn render(&self, ctx: &RenderCtx) -> Rendered {
        match self {
            OutputObj::Text(text) => Rendered { text: text.clone(), reply_to: None },
            OutputObj::Message { kind, sender, body, time } => {
                let mut text = String::new();
                let reply_to = match kind {
                    MessageKind::Public => {
                        if ctx.signal_public {
                            text.push(BELL as char);
                        }
                        text.push_str(&format!(
                            "\n -> From {} to everyone: [{}]\n - ",
                            sender.name,
                            stamp(time)
                        ));
                        None
                    }
                    MessageKind::Private => {
                        if ctx.signal_private {
                            text.push(BELL as char);
                        }
                        text.push_str(&format!(
                            "\n >> Private message from {}: [{}]\n - ",
                            sender.name,
                            stamp(time)
                        ));
                        Some(sender.clone())
                    }
                };
                wrap_body(&mut text, body, ctx.width);
                Rendered { text, reply_to }
            }
            OutputObj::Entry { who, time } => Rendered {
                text: format!("*** {} has entered Parley! [{}] ***\n", who.name, stamp(time)),
                reply_to: None,
            },
            OutputObj::Exit { who, time } => Rendered {
                text: format!("*** {} has left Parley! [{}] ***\n", who.name, stamp(time)),
                reply_to: None,
            },
            OutputObj::Attach { who, time } => Rendered {
                text: format!("*** {} is now attached. [{}] ***\n", who.name, stamp(time)),
                reply_to: None,
            },
            OutputObj::Detach { who, intentional, time } => {
                let how = if *intentional { "intentionally" } else { "accidentally" };
                Rendered {
                    text: format!("*** {} has {} detached. [{}] ***\n", who.name, how, stamp(time)),
                    reply_to: None,
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct OutputStream {
    queue: VecDeque<Arc<OutputObj>>,
    sent: usize,
    acked: usize,
}

impl OutputStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, obj: Arc<OutputObj>) {
        self.queue.push_back(obj);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn sent_count(&self) -> usize {
        self.sent
    }

    pub fn acked_count(&self) -> usize {
        self.acked
    }

    pub fn has_unsent(&self) -> bool {
        self.sent < self.queue.len()
    }

    /// Advance the sent cursor past the next object and hand it out for
    /// rendering.
    pub fn next_unsent(&mut self) -> Option<Arc<OutputObj>> {
        let obj = self.queue.get(self.sent)?.clone();
        self.sent += 1;
        Some(obj)
    }

    /// Record one end-to-end receipt; never runs past the sent cursor.
    pub fn acknowledge(&mut self) {
        if self.acked < self.sent {
            self.acked += 1;
        }
    }

    /// Drop acknowledged objects off the head.
    pub fn dequeue(&mut self) {
        while self.acked > 0 && self.sent > 0 && !self.queue.is_empty() {
            self.queue.pop_front();
            self.acked -= 1;
            self.sent -= 1;
        }
    }

    /// Prepare for a fresh connection: anything sent but never acknowledged
    /// on the old connection is due again.
    pub fn rewind(&mut self) {
        self.dequeue();
        self.sent = self.acked;
    }
}

//! Per-connection driver: couples the telnet machine, the line editor and
//! the session's output stream to one TCP socket.
//!
//! One task owns each connection. Bytes read from the socket run through the
//! telnet machine; data bytes feed the editor; accepted lines go to the
//! session dispatcher. Output is queued in block buffers and flushed after
//! every event batch, command bytes ahead of data and data gated by the
//! GO-AHEAD `blocked` flag.

use crate::banner;
use crate::commands;
use crate::error::AppResult;
use crate::input::line_buf::LineBuf;
use crate::net::blockbuf::{self, BlockBuf};
use crate::net::machine::{
    BELL, EditFn, GO_AHEAD, IAC, TelnetIn, TelnetMachine, encode_data,
};
use crate::net::output::RenderCtx;
use crate::shutdown::DEFAULT_GRACE_SECS;
use crate::state::registry::{Registry, detach_session};
use crate::state::session::{ConnHandle, ConnSignal, Session, SessionRef};
use crate::{INPUT_SIZE, TERM_WIDTH};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;

const CTRL_A: u8 = 0x01;
const CTRL_B: u8 = 0x02;
const CTRL_D: u8 = 0x04;
const CTRL_E: u8 = 0x05;
const CTRL_F: u8 = 0x06;
const CTRL_K: u8 = 0x0B;
const CTRL_L: u8 = 0x0C;
const CTRL_N: u8 = 0x0E;
const CTRL_P: u8 = 0x10;
const CTRL_T: u8 = 0x14;
const CTRL_Y: u8 = 0x19;
const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7F;
const CR: u8 = 0x0D;
const LF: u8 = 0x0A;

pub struct Conn {
    id: u32,
    registry: Arc<Registry>,
    sess: SessionRef,
    writer: OwnedWriteHalf,
    pub machine: TelnetMachine,
    editor: LineBuf,
    data: BlockBuf,
    cmd: BlockBuf,
    blocked: bool,
    closing: bool,
    undrawn: bool,
    do_echo: bool,
    welcomed: bool,
}

impl Conn {
    fn new(id: u32, registry: Arc<Registry>, sess: SessionRef, writer: OwnedWriteHalf) -> Self {
        let mut conn = Self {
            id,
            registry,
            sess,
            writer,
            machine: TelnetMachine::new(),
            editor: LineBuf::new(TERM_WIDTH),
            data: BlockBuf::new(),
            cmd: BlockBuf::new(),
            blocked: false,
            closing: false,
            undrawn: false,
            do_echo: true,
            welcomed: false,
        };
        conn.machine.start_negotiation(&mut conn.cmd);
        conn
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn session(&self) -> SessionRef {
        self.sess.clone()
    }

    pub fn set_session(&mut self, sess: SessionRef) {
        self.sess = sess;
    }

    pub fn set_do_echo(&mut self, on: bool) {
        self.do_echo = on;
    }

    /// Queue user data, applying the telnet outbound encoding.
    pub fn output(&mut self, text: &str) {
        encode_data(&mut self.data, text.as_bytes());
    }

    pub fn bell(&mut self) {
        self.data.put(BELL);
    }

    fn echo_active(&self) -> bool {
        self.machine.echo.enabled() && self.do_echo
    }

    fn echo_bytes(&mut self, bytes: &[u8]) {
        if self.echo_active() && !self.undrawn {
            encode_data(&mut self.data, bytes);
        }
    }

    /// Flush pending session output, then print and remember a new prompt.
    pub fn prompt(&mut self, p: &str) {
        self.flush_session();
        self.editor.set_prompt(p);
        if !self.undrawn {
            self.output(p);
        }
    }

    /// Ask for this connection to be torn down once output has drained (or
    /// immediately when `drain` is false).
    pub fn request_close(&mut self, drain: bool) {
        self.closing = true;
        self.blocked = false;
        if !drain {
            self.data.clear();
        }
    }

    /// Turn buffered session text into stream objects and push everything
    /// unsent onto this connection.
    pub fn flush_session(&mut self) {
        self.sess.write().enqueue_output();
        self.drain_stream();
    }

    /// Render unsent output objects into the data queue, erasing the input
    /// line first and repainting it when caught up.
    pub fn drain_stream(&mut self) {
        loop {
            let (obj, ctx) = {
                let mut s = self.sess.write();
                let ctx = RenderCtx {
                    signal_public: s.signal_public,
                    signal_private: s.signal_private,
                    width: TERM_WIDTH,
                };
                (s.stream.next_unsent(), ctx)
            };
            let Some(obj) = obj else {
                self.redraw();
                return;
            };
            self.undraw();
            let rendered = obj.render(&ctx);
            if let Some(name) = rendered.reply_to {
                self.sess.write().reply_sendlist = name.name_only.clone();
            }
            self.output(&rendered.text);
            self.machine.timing_mark(&mut self.data);
        }
    }

    /// Erase the editable line (and prompt) so asynchronous output lands on
    /// a clean row.
    fn undraw(&mut self) {
        if self.undrawn {
            return;
        }
        self.undrawn = true;
        let lines = if self.echo_active() {
            if self.editor.start() == 0 && self.editor.end() == 0 {
                return;
            }
            self.editor.point_line()
        } else {
            if self.editor.start() == 0 {
                return;
            }
            self.editor.start_line()
        };
        if lines > 0 {
            self.output(&format!("\r\x1b[{}A\x1b[J", lines));
        } else {
            self.output("\r\x1b[J");
        }
    }

    /// Repaint the prompt and line, putting the cursor back on point.
    fn redraw(&mut self) {
        if !self.undrawn {
            return;
        }
        self.undrawn = false;
        if !self.editor.prompt().is_empty() {
            let p = self.editor.prompt().to_string();
            self.output(&p);
        }
        if self.editor.end() > 0 {
            let contents = self.editor.contents().to_vec();
            self.echo_bytes(&contents);
            if !self.editor.at_end() {
                let lines = self.editor.end_line() - self.editor.point_line();
                let columns =
                    self.editor.end_column() as isize - self.editor.point_column() as isize;
                let mut seq = Vec::new();
                if lines > 0 {
                    seq.extend_from_slice(format!("\x1b[{}A", lines).as_bytes());
                }
                if columns > 0 {
                    seq.extend_from_slice(format!("\x1b[{}D", columns).as_bytes());
                } else if columns < 0 {
                    seq.extend_from_slice(format!("\x1b[{}C", -columns).as_bytes());
                }
                self.echo_bytes(&seq);
            }
        }
    }

    fn handle_byte(&mut self, byte: u8) {
        let Some(event) = self.machine.push(byte, &mut self.cmd) else {
            return;
        };
        match event {
            TelnetIn::Data(b) => self.handle_data_byte(b),
            TelnetIn::Edit(op) => self.handle_edit(op),
            TelnetIn::ShutdownRequest => {
                if !self.registry.shutdown.is_active() {
                    tracing::info!("Shutdown requested by new server in 30 seconds.");
                    self.registry.announce(
                        "\u{7}\u{7}>>> A new server is starting.  This server will \
                         shutdown in 30 seconds... <<<\n\u{7}\u{7}",
                    );
                    self.registry.shutdown.schedule(DEFAULT_GRACE_SECS);
                }
            }
            TelnetIn::AbortOutput => self.data.clear(),
            TelnetIn::GoAhead => self.blocked = false,
            TelnetIn::OutputAck => self.sess.write().stream.acknowledge(),
            TelnetIn::Negotiated => {
                if self.machine.sga_suppressed() {
                    self.blocked = false;
                }
                self.try_welcome();
            }
            TelnetIn::Bell => self.bell(),
        }
    }

    fn edit(&mut self, op: impl FnOnce(&mut LineBuf, &mut Vec<u8>)) {
        let mut echo = Vec::new();
        op(&mut self.editor, &mut echo);
        self.echo_bytes(&echo);
    }

    fn handle_data_byte(&mut self, byte: u8) {
        match byte {
            CR | LF => self.accept_input(),
            CTRL_A => self.edit(|ed, e| ed.beginning_of_line(e)),
            CTRL_B => self.edit(|ed, e| ed.backward_char(e)),
            CTRL_D => self.edit(|ed, e| ed.delete_char(e)),
            CTRL_E => self.edit(|ed, e| ed.end_of_line(e)),
            CTRL_F => self.edit(|ed, e| ed.forward_char(e)),
            CTRL_K => self.edit(|ed, e| ed.kill_line(e)),
            CTRL_L => {
                self.undraw();
                self.redraw();
            }
            CTRL_T => {
                let mut echo = Vec::new();
                if self.editor.transpose_chars(&mut echo) {
                    self.echo_bytes(&echo);
                } else {
                    self.bell();
                }
            }
            CTRL_N | CTRL_P | CTRL_Y => self.bell(),
            BACKSPACE | DELETE => self.edit(|ed, e| ed.erase_char(e)),
            b => {
                let mut echo = Vec::new();
                if self.editor.insert_char(b, &mut echo) {
                    self.echo_bytes(&echo);
                } else {
                    self.bell();
                }
            }
        }
    }

    fn handle_edit(&mut self, op: EditFn) {
        match op {
            EditFn::EraseChar => self.edit(|ed, e| ed.erase_char(e)),
            EditFn::EraseLine => self.edit(|ed, e| ed.erase_line(e)),
            EditFn::ForwardChar => self.edit(|ed, e| ed.forward_char(e)),
            EditFn::BackwardChar => self.edit(|ed, e| ed.backward_char(e)),
            EditFn::PreviousLine | EditFn::NextLine => self.bell(),
        }
    }

    /// The line is complete: settle output bookkeeping, echo the newline and
    /// hand the text to the session dispatcher.
    fn accept_input(&mut self) {
        // A newline always cedes the half-duplex turn back to us.
        self.blocked = false;

        // Without end-to-end receipts, treat everything pushed so far as
        // delivered once it reaches the kernel.
        if !self.machine.acknowledge {
            self.drain_stream();
            let mut s = self.sess.write();
            while s.stream.acked_count() < s.stream.sent_count() {
                s.stream.acknowledge();
            }
            s.stream.dequeue();
        }

        if self.undrawn {
            // The line is not on screen; queue it as ordinary output so the
            // user still sees what they sent.
            let line = String::from_utf8_lossy(self.editor.contents()).into_owned();
            let mut s = self.sess.write();
            s.output(&line);
            s.output("\n");
        } else {
            if !self.editor.at_end() {
                self.edit(|ed, e| ed.end_of_line(e));
            }
            self.echo_bytes(b"\n");
        }

        let line = self.editor.accept();
        let registry = self.registry.clone();
        commands::deliver_line(&registry, self, &line);
    }

    /// Send the welcome banner and login prompt once all three initial
    /// option negotiations have settled.
    fn try_welcome(&mut self) {
        if self.welcomed || !self.machine.welcome_ready() {
            return;
        }
        self.welcomed = true;
        self.output(banner::WELCOME);
        if !self.machine.lsga.enabled() && !self.machine.rsga.enabled() {
            self.output(banner::HALF_DUPLEX_WARNING);
        }
        if self.registry.shutdown.is_active() {
            self.output(banner::SHUTDOWN_WARNING);
        }
        self.prompt(banner::LOGIN_PROMPT);
        let registry = self.registry.clone();
        commands::set_input_state(&registry, self, crate::state::session::InputState::Login);
    }

    async fn write_all_cmd(&mut self) -> std::io::Result<()> {
        while let Some(block) = self.cmd.pop_block() {
            self.writer.write_all(&block).await?;
            blockbuf::recycle(block);
        }
        Ok(())
    }

    async fn write_all_data(&mut self) -> std::io::Result<()> {
        while let Some(block) = self.data.pop_block() {
            self.writer.write_all(&block).await?;
            blockbuf::recycle(block);
        }
        Ok(())
    }

    /// Push queued bytes to the socket: command output first and
    /// unconditionally, data only while not blocked, then the GO-AHEAD
    /// bookkeeping and synthetic receipts.
    async fn flush(&mut self) -> std::io::Result<()> {
        self.write_all_cmd().await?;
        if self.blocked || self.data.is_empty() {
            return Ok(());
        }
        self.write_all_data().await?;
        if !self.machine.acknowledge {
            let mut s = self.sess.write();
            while s.stream.acked_count() < s.stream.sent_count() {
                s.stream.acknowledge();
            }
            s.stream.dequeue();
        }
        if !self.machine.lsga.enabled() {
            self.cmd.put2(IAC, GO_AHEAD);
            self.write_all_cmd().await?;
            if !self.machine.rsga.enabled() {
                self.blocked = true;
            }
        }
        Ok(())
    }

    fn done_draining(&self) -> bool {
        self.closing && self.cmd.is_empty() && self.data.is_empty()
    }
}

/// Drive one telnet connection from accept to close.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<Registry>,
) -> AppResult<()> {
    let (mut reader, writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let id = registry.next_conn_id();
    tracing::info!(
        "Accepted connection on conn #{} from {} port {}.",
        id,
        peer.ip(),
        peer.port()
    );

    let sess = Session::new_ref();
    sess.write().conn = Some(ConnHandle::new(id, tx));

    let mut conn = Conn::new(id, registry.clone(), sess, writer);
    conn.flush().await?;

    let mut buf = [0u8; INPUT_SIZE];
    loop {
        tokio::select! {
            res = reader.read(&mut buf) => match res {
                Ok(0) => break,
                Ok(n) => {
                    for &b in &buf[..n] {
                        conn.handle_byte(b);
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {}
                Err(e) if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::TimedOut) => {
                    break;
                }
                Err(e) => {
                    tracing::warn!("read error on conn #{}: {}", id, e);
                    break;
                }
            },
            signal = rx.recv() => match signal {
                Some(ConnSignal::OutputReady) => {}
                Some(ConnSignal::Close { drain }) => conn.request_close(drain),
                None => {}
            },
        }

        conn.drain_stream();
        if let Err(e) = conn.flush().await {
            if !conn.closing {
                tracing::warn!("write error on conn #{}: {}", id, e);
            }
            break;
        }
        if conn.done_draining() {
            break;
        }
    }

    let intentional = conn.closing;
    let sess = conn.session();
    let signed_on = sess.read().signed_on;
    if signed_on {
        detach_session(&registry, &sess, intentional, id);
    } else {
        sess.write().conn = None;
        registry.unlink(&sess);
    }
    Ok(())
}

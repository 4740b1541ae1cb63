//! Byte-level telnet state machine: command parsing, option negotiation and
//! the outbound data encoding rules.
//!
//! Options live in two-bit tri-states; an option is enabled only when both
//! the we-proposed and they-proposed bits are set. Replies the machine can
//! produce by itself (negotiation answers, refusals, the are-you-there
//! confirmation) are queued straight onto the command buffer it is handed;
//! everything needing connection or session context comes back as a
//! [`TelnetIn`] event.

use crate::net::blockbuf::BlockBuf;

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const GO_AHEAD: u8 = 249;
pub const ERASE_LINE: u8 = 248;
pub const ERASE_CHAR: u8 = 247;
pub const ARE_YOU_THERE: u8 = 246;
pub const ABORT_OUTPUT: u8 = 245;

/// Private command used only for the loopback hand-off between an old and a
/// new server instance. Not a real telnet command.
pub const SHUTDOWN_REQUEST: u8 = 24;

pub const OPT_ECHO: u8 = 1;
pub const OPT_SGA: u8 = 3;
pub const OPT_TIMING_MARK: u8 = 6;

pub const BELL: u8 = 0x07;

const CR: u8 = 0x0D;
const ESC: u8 = 0x1B;
const CSI_8BIT: u8 = 0x9B;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeState {
    #[default]
    Data,
    SawIac,
    SawWill,
    SawWont,
    SawDo,
    SawDont,
    SawCr,
    SawEsc,
    SawCsi,
}

/// Two-bit option state. `we` is the bit for the side this server speaks
/// for (WILL for local options, DO for remote ones); `they` is the peer's
/// answer or offer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptState {
    we: bool,
    they: bool,
}

impl OptState {
    pub fn enabled(self) -> bool {
        self.we && self.they
    }
    pub fn off(self) -> bool {
        !self.we && !self.they
    }
    /// Proposed by us, not yet answered: the state the welcome banner has to
    /// wait out.
    pub fn half_open(self) -> bool {
        self.we && !self.they
    }
    pub fn we(self) -> bool {
        self.we
    }
    pub fn they(self) -> bool {
        self.they
    }
}

/// Editor operations requested over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditFn {
    EraseChar,
    EraseLine,
    PreviousLine,
    NextLine,
    ForwardChar,
    BackwardChar,
}

/// Events surfaced to the connection driver.
#[derive(Debug, PartialEq, Eq)]
pub enum TelnetIn {
    /// A plain data byte for the line editor.
    Data(u8),
    Edit(EditFn),
    /// Another server instance wants this port; the echo acknowledging it is
    /// already queued.
    ShutdownRequest,
    /// Drop all pending data output.
    AbortOutput,
    /// Remote ceded the half-duplex turn; unblock output.
    GoAhead,
    /// A TIMING-MARK receipt for one output object.
    OutputAck,
    /// An option reached a definite state; re-check the welcome barrier and
    /// the blocked flag.
    Negotiated,
    /// Undecodable input; ring the bell.
    Bell,
}

#[derive(Debug, Default)]
pub struct TelnetMachine {
    state: DecodeState,
    pub echo: OptState,
    pub lsga: OptState,
    pub rsga: OptState,
    /// True once the remote has answered any TIMING-MARK; end-to-end
    /// receipts are trusted from then on.
    pub acknowledge: bool,
}

impl TelnetMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    fn set_state(&mut self, s: DecodeState) {
        self.state = s;
    }

    /// True when both ends may speak freely without GO-AHEAD turns.
    pub fn sga_suppressed(&self) -> bool {
        self.lsga.enabled() || self.rsga.enabled()
    }

    /// The welcome banner waits until none of the three initial options is
    /// still an unanswered proposal.
    pub fn welcome_ready(&self) -> bool {
        !self.lsga.half_open() && !self.rsga.half_open() && !self.echo.half_open()
    }

    /// Kick off the initial negotiations: probe TIMING-MARK, then offer
    /// WILL SGA, DO SGA and WILL ECHO, each wired to the welcome barrier.
    pub fn start_negotiation(&mut self, cmd: &mut BlockBuf) {
        cmd.put3(IAC, DO, OPT_TIMING_MARK);
        self.set_lsga(true, cmd);
        self.set_rsga(true, cmd);
        self.set_echo(true, cmd);
    }

    pub fn set_echo(&mut self, on: bool, cmd: &mut BlockBuf) {
        if on {
            cmd.put3(IAC, WILL, OPT_ECHO);
            self.echo.we = true;
        } else {
            cmd.put3(IAC, WONT, OPT_ECHO);
            self.echo.we = false;
        }
    }

    pub fn set_lsga(&mut self, on: bool, cmd: &mut BlockBuf) {
        if on {
            cmd.put3(IAC, WILL, OPT_SGA);
            self.lsga.we = true;
        } else {
            cmd.put3(IAC, WONT, OPT_SGA);
            self.lsga.we = false;
        }
    }

    pub fn set_rsga(&mut self, on: bool, cmd: &mut BlockBuf) {
        if on {
            cmd.put3(IAC, DO, OPT_SGA);
            self.rsga.we = true;
        } else {
            cmd.put3(IAC, DONT, OPT_SGA);
            self.rsga.we = false;
        }
    }

    /// Queue one TIMING-MARK probe after an output object, when receipts are
    /// enabled.
    pub fn timing_mark(&self, data: &mut BlockBuf) {
        if self.acknowledge {
            data.put3(IAC, DO, OPT_TIMING_MARK);
        }
    }

    /// A TIMING-MARK answer either proves the option works (during initial
    /// negotiation) or acknowledges one output object.
    fn timing_mark_reply(&mut self) -> Option<TelnetIn> {
        if self.acknowledge {
            Some(TelnetIn::OutputAck)
        } else if self.echo.half_open() {
            self.acknowledge = true;
            None
        } else {
            None
        }
    }

    /// Feed one input byte, queueing protocol replies onto `cmd`.
    pub fn push(&mut self, byte: u8, cmd: &mut BlockBuf) -> Option<TelnetIn> {
        match self.state() {
            DecodeState::Data => match byte {
                IAC => {
                    self.set_state(DecodeState::SawIac);
                    None
                }
                CR => {
                    // Emit the return as data; the byte that follows it
                    // (LF or NUL) is protocol padding and gets dropped.
                    self.set_state(DecodeState::SawCr);
                    Some(TelnetIn::Data(CR))
                }
                ESC => {
                    self.set_state(DecodeState::SawEsc);
                    None
                }
                CSI_8BIT => {
                    self.set_state(DecodeState::SawCsi);
                    None
                }
                b => Some(TelnetIn::Data(b)),
            },
            DecodeState::SawIac => {
                self.set_state(DecodeState::Data);
                match byte {
                    SHUTDOWN_REQUEST => {
                        cmd.put2(IAC, SHUTDOWN_REQUEST);
                        Some(TelnetIn::ShutdownRequest)
                    }
                    ABORT_OUTPUT => Some(TelnetIn::AbortOutput),
                    ARE_YOU_THERE => {
                        cmd.extend(b"\r\n[Yes]\r\n");
                        None
                    }
                    ERASE_CHAR => Some(TelnetIn::Edit(EditFn::EraseChar)),
                    ERASE_LINE => Some(TelnetIn::Edit(EditFn::EraseLine)),
                    GO_AHEAD => Some(TelnetIn::GoAhead),
                    WILL => {
                        self.set_state(DecodeState::SawWill);
                        None
                    }
                    WONT => {
                        self.set_state(DecodeState::SawWont);
                        None
                    }
                    DO => {
                        self.set_state(DecodeState::SawDo);
                        None
                    }
                    DONT => {
                        self.set_state(DecodeState::SawDont);
                        None
                    }
                    IAC => Some(TelnetIn::Data(IAC)),
                    _ => None, // any other telnet command is ignored
                }
            }
            DecodeState::SawWill | DecodeState::SawWont => {
                let will = self.state() == DecodeState::SawWill;
                self.set_state(DecodeState::Data);
                match byte {
                    OPT_SGA => {
                        if will {
                            self.rsga.they = true;
                            if !self.rsga.we {
                                self.rsga.we = true;
                                cmd.put3(IAC, DO, OPT_SGA);
                            }
                            if self.lsga.off() {
                                self.set_lsga(true, cmd);
                            }
                        } else {
                            self.rsga.they = false;
                            if self.rsga.we {
                                self.rsga.we = false;
                                cmd.put3(IAC, DONT, OPT_SGA);
                            }
                        }
                        Some(TelnetIn::Negotiated)
                    }
                    OPT_TIMING_MARK => self.timing_mark_reply(),
                    opt => {
                        if will {
                            cmd.put3(IAC, DONT, opt);
                        }
                        None
                    }
                }
            }
            DecodeState::SawDo | DecodeState::SawDont => {
                let wanted = self.state() == DecodeState::SawDo;
                self.set_state(DecodeState::Data);
                match byte {
                    OPT_ECHO => {
                        if wanted {
                            self.echo.they = true;
                            if !self.echo.we {
                                self.echo.we = true;
                                cmd.put3(IAC, WILL, OPT_ECHO);
                            }
                        } else {
                            self.echo.they = false;
                            if self.echo.we {
                                self.echo.we = false;
                                cmd.put3(IAC, WONT, OPT_ECHO);
                            }
                        }
                        Some(TelnetIn::Negotiated)
                    }
                    OPT_SGA => {
                        if wanted {
                            self.lsga.they = true;
                            if !self.lsga.we {
                                self.lsga.we = true;
                                cmd.put3(IAC, WILL, OPT_SGA);
                            }
                            if self.rsga.off() {
                                self.set_rsga(true, cmd);
                            }
                        } else {
                            self.lsga.they = false;
                            if self.lsga.we {
                                self.lsga.we = false;
                                cmd.put3(IAC, WONT, OPT_SGA);
                            }
                        }
                        Some(TelnetIn::Negotiated)
                    }
                    OPT_TIMING_MARK => self.timing_mark_reply(),
                    opt => {
                        if wanted {
                            cmd.put3(IAC, WONT, opt);
                        }
                        None
                    }
                }
            }
            DecodeState::SawCr => {
                self.set_state(DecodeState::Data);
                None
            }
            DecodeState::SawEsc => match byte {
                b'[' => {
                    self.set_state(DecodeState::SawCsi);
                    None
                }
                _ => {
                    self.set_state(DecodeState::Data);
                    Some(TelnetIn::Bell)
                }
            },
            DecodeState::SawCsi => {
                self.set_state(DecodeState::Data);
                match byte {
                    b'A' => Some(TelnetIn::Edit(EditFn::PreviousLine)),
                    b'B' => Some(TelnetIn::Edit(EditFn::NextLine)),
                    b'C' => Some(TelnetIn::Edit(EditFn::ForwardChar)),
                    b'D' => Some(TelnetIn::Edit(EditFn::BackwardChar)),
                    _ => Some(TelnetIn::Bell),
                }
            }
        }
    }
}

/// Encode user data for the wire: double IAC, send a bare CR as `CR NUL` and
/// a newline as `CR LF`.
pub fn encode_data(data: &mut BlockBuf, bytes: &[u8]) {
    for &b in bytes {
        match b {
            IAC => data.put2(IAC, IAC),
            b'\r' => data.put2(b'\r', 0),
            b'\n' => data.put2(b'\r', b'\n'),
            b => data.put(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(machine: &mut TelnetMachine, bytes: &[u8]) -> (Vec<TelnetIn>, Vec<u8>) {
        let mut cmd = BlockBuf::new();
        let mut events = Vec::new();
        for &b in bytes {
            if let Some(ev) = machine.push(b, &mut cmd) {
                events.push(ev);
            }
        }
        (events, cmd.flatten())
    }

    #[test]
    fn plain_bytes_pass_through() {
        let mut m = TelnetMachine::new();
        let (events, cmd) = drive(&mut m, b"hi");
        assert_eq!(events, vec![TelnetIn::Data(b'h'), TelnetIn::Data(b'i')]);
        assert!(cmd.is_empty());
    }

    #[test]
    fn doubled_iac_is_data() {
        let mut m = TelnetMachine::new();
        let (events, _) = drive(&mut m, &[IAC, IAC]);
        assert_eq!(events, vec![TelnetIn::Data(IAC)]);
    }

    #[test]
    fn cr_lf_and_cr_nul_collapse() {
        let mut m = TelnetMachine::new();
        let (events, _) = drive(&mut m, b"a\r\nb\r\x00c");
        assert_eq!(
            events,
            vec![
                TelnetIn::Data(b'a'),
                TelnetIn::Data(b'\r'),
                TelnetIn::Data(b'b'),
                TelnetIn::Data(b'\r'),
                TelnetIn::Data(b'c'),
            ]
        );
    }

    #[test]
    fn unknown_commands_are_swallowed() {
        let mut m = TelnetMachine::new();
        let (events, cmd) = drive(&mut m, &[IAC, 241 /* NOP */, b'x']);
        assert_eq!(events, vec![TelnetIn::Data(b'x')]);
        assert!(cmd.is_empty());
    }

    #[test]
    fn unknown_options_are_refused() {
        let mut m = TelnetMachine::new();
        let (_, cmd) = drive(&mut m, &[IAC, WILL, 31]);
        assert_eq!(cmd, vec![IAC, DONT, 31]);
        let (_, cmd) = drive(&mut m, &[IAC, DO, 34]);
        assert_eq!(cmd, vec![IAC, WONT, 34]);
        // Refusals of refusals would loop; WONT/DONT get no reply.
        let (_, cmd) = drive(&mut m, &[IAC, WONT, 31, IAC, DONT, 34]);
        assert!(cmd.is_empty());
    }

    #[test]
    fn echo_enables_when_both_bits_set() {
        let mut m = TelnetMachine::new();
        let mut cmd = BlockBuf::new();
        m.set_echo(true, &mut cmd);
        assert!(!m.echo.enabled());
        assert!(m.echo.half_open());
        let (events, _) = drive(&mut m, &[IAC, DO, OPT_ECHO]);
        assert!(m.echo.enabled());
        assert_eq!(events, vec![TelnetIn::Negotiated]);
    }

    #[test]
    fn sga_offer_is_reciprocated() {
        let mut m = TelnetMachine::new();
        // Client offers WILL SGA out of the blue: we answer DO and offer our
        // own WILL in return.
        let (_, cmd) = drive(&mut m, &[IAC, WILL, OPT_SGA]);
        assert!(m.rsga.enabled());
        assert!(m.lsga.half_open());
        assert_eq!(cmd, vec![IAC, DO, OPT_SGA, IAC, WILL, OPT_SGA]);
        assert!(m.sga_suppressed());
    }

    #[test]
    fn welcome_waits_for_all_three() {
        let mut m = TelnetMachine::new();
        let mut cmd = BlockBuf::new();
        m.start_negotiation(&mut cmd);
        assert!(!m.welcome_ready());
        drive(&mut m, &[IAC, DO, OPT_SGA]);
        assert!(!m.welcome_ready());
        drive(&mut m, &[IAC, WILL, OPT_SGA]);
        assert!(!m.welcome_ready());
        drive(&mut m, &[IAC, DO, OPT_ECHO]);
        assert!(m.welcome_ready());
        assert!(m.echo.enabled() && m.lsga.enabled() && m.rsga.enabled());
    }

    #[test]
    fn welcome_ready_after_refusals_too() {
        let mut m = TelnetMachine::new();
        let mut cmd = BlockBuf::new();
        m.start_negotiation(&mut cmd);
        drive(&mut m, &[IAC, DONT, OPT_SGA]);
        drive(&mut m, &[IAC, WONT, OPT_SGA]);
        drive(&mut m, &[IAC, DONT, OPT_ECHO]);
        assert!(m.welcome_ready());
        assert!(!m.sga_suppressed());
        assert!(!m.echo.enabled());
    }

    #[test]
    fn timing_mark_probe_then_acks() {
        let mut m = TelnetMachine::new();
        let mut cmd = BlockBuf::new();
        m.start_negotiation(&mut cmd);
        // First reply proves the option while ECHO is still half open.
        let (events, _) = drive(&mut m, &[IAC, WONT, OPT_TIMING_MARK]);
        assert!(events.is_empty());
        assert!(m.acknowledge);
        // Subsequent replies are receipts.
        let (events, _) = drive(&mut m, &[IAC, WILL, OPT_TIMING_MARK]);
        assert_eq!(events, vec![TelnetIn::OutputAck]);
    }

    #[test]
    fn shutdown_command_echoes_itself() {
        let mut m = TelnetMachine::new();
        let (events, cmd) = drive(&mut m, &[IAC, SHUTDOWN_REQUEST]);
        assert_eq!(events, vec![TelnetIn::ShutdownRequest]);
        assert_eq!(cmd, vec![IAC, SHUTDOWN_REQUEST]);
    }

    #[test]
    fn are_you_there_answers_inline() {
        let mut m = TelnetMachine::new();
        let (events, cmd) = drive(&mut m, &[IAC, ARE_YOU_THERE]);
        assert!(events.is_empty());
        assert_eq!(cmd, b"\r\n[Yes]\r\n");
    }

    #[test]
    fn escape_accepts_only_csi_introducer() {
        let mut m = TelnetMachine::new();
        // Anything after ESC that is not '[' rings the bell, 0x0C included.
        let (events, _) = drive(&mut m, &[0x1B, 0x0C, 0x1B, b'O']);
        assert_eq!(events, vec![TelnetIn::Bell, TelnetIn::Bell]);
        assert_eq!(m.state(), DecodeState::Data);
    }

    #[test]
    fn csi_arrows_map_to_editor() {
        let mut m = TelnetMachine::new();
        let (events, _) = drive(&mut m, b"\x1b[C\x1b[D");
        assert_eq!(
            events,
            vec![TelnetIn::Edit(EditFn::ForwardChar), TelnetIn::Edit(EditFn::BackwardChar)]
        );
        let (events, _) = drive(&mut m, b"\x1b[A\x1b[B\x1b[Z");
        assert_eq!(
            events,
            vec![
                TelnetIn::Edit(EditFn::PreviousLine),
                TelnetIn::Edit(EditFn::NextLine),
                TelnetIn::Bell,
            ]
        );
    }

    #[test]
    fn encode_decode_round_trip() {
        let raw = [b'a', IAC, b'b', b'\r', b'c', 0x02];
        let mut data = BlockBuf::new();
        encode_data(&mut data, &raw);
        let wire = data.flatten();
        assert_eq!(wire, vec![b'a', IAC, IAC, b'b', b'\r', 0, b'c', 0x02]);

        let mut m = TelnetMachine::new();
        let (events, _) = drive(&mut m, &wire);
        let decoded: Vec<u8> = events
            .iter()
            .map(|e| match e {
                TelnetIn::Data(b) => *b,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(decoded, raw);
    }

    #[test]
    fn newline_encodes_as_cr_lf() {
        let mut data = BlockBuf::new();
        encode_data(&mut data, b"a\nb");
        assert_eq!(data.flatten(), b"a\r\nb");
    }
}

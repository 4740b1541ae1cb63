//! End-to-end tests over a real loopback socket: option negotiation, the
//! login flow, message routing, detach/re-attach and the server hand-off.

use parley::config::Config;
use parley::net::telnet::accept_loop;
use parley::services::AuthService;
use parley::state::registry::Registry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const IAC: u8 = 255;
const WILL: u8 = 251;
const DO: u8 = 253;
const SHUTDOWN_REQUEST: u8 = 24;
const OPT_ECHO: u8 = 1;
const OPT_SGA: u8 = 3;
const OPT_TIMING_MARK: u8 = 6;

async fn start_server() -> (Arc<Registry>, u16) {
    let registry = Arc::new(Registry::new(
        Config::default(),
        AuthService::new(PathBuf::from("/nonexistent/passwd")),
    ));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let reg = registry.clone();
    tokio::spawn(async move {
        let _ = accept_loop(listener, reg).await;
    });
    (registry, port)
}

struct Client {
    stream: TcpStream,
    seen: Vec<u8>,
}

impl Client {
    async fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        Self { stream, seen: Vec::new() }
    }

    /// Answer the server's initial option offers so the welcome banner can
    /// fire: TIMING-MARK works, both SGA directions on, server echo on.
    async fn negotiate(&mut self) {
        self.stream
            .write_all(&[
                IAC, WILL, OPT_TIMING_MARK,
                IAC, DO, OPT_SGA,
                IAC, WILL, OPT_SGA,
                IAC, DO, OPT_ECHO,
            ])
            .await
            .unwrap();
    }

    async fn send(&mut self, line: &str) {
        self.stream.write_all(line.as_bytes()).await.unwrap();
        self.stream.write_all(b"\r\n").await.unwrap();
    }

    fn seen_contains(&self, needle: &[u8]) -> bool {
        self.seen.windows(needle.len().max(1)).any(|w| w == needle)
    }

    /// Read until `needle` has been seen, failing the test after 5 seconds.
    async fn expect(&mut self, needle: &str) {
        let deadline = Duration::from_secs(5);
        let mut buf = [0u8; 1024];
        let result = timeout(deadline, async {
            while !self.seen_contains(needle.as_bytes()) {
                let n = self.stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                self.seen.extend_from_slice(&buf[..n]);
            }
        })
        .await;
        assert!(
            result.is_ok() && self.seen_contains(needle.as_bytes()),
            "never saw {:?} in {:?}",
            needle,
            String::from_utf8_lossy(&self.seen)
        );
    }

    /// Read until the server closes the connection.
    async fn expect_close(&mut self) {
        let mut buf = [0u8; 1024];
        let result = timeout(Duration::from_secs(5), async {
            loop {
                match self.stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => self.seen.extend_from_slice(&buf[..n]),
                }
            }
        })
        .await;
        assert!(result.is_ok(), "server never closed the connection");
    }

    /// Run the guest sign-on flow up to the normal prompt state.
    async fn sign_on_guest(&mut self, name: &str) {
        self.negotiate().await;
        self.expect("login:").await;
        self.send("guest").await;
        self.expect("Enter name:").await;
        self.send(name).await;
        self.expect("Enter blurb:").await;
        self.send("").await;
        self.expect("Welcome to Parley.").await;
    }
}

#[tokio::test]
async fn guest_login_who_and_bye() {
    let (registry, port) = start_server().await;
    let mut alice = Client::connect(port).await;
    alice.sign_on_guest("Alice").await;

    // The sign-on /who listing shows the new session.
    alice.expect("Name").await;
    alice.expect("Alice").await;
    assert_eq!(registry.session_count(), 1);

    alice.send("/who").await;
    alice.expect("guest").await;

    alice.send("/bye").await;
    alice.expect_close().await;
    assert_eq!(registry.session_count(), 0);
}

#[tokio::test]
async fn backspace_is_honored_during_login() {
    let (_registry, port) = start_server().await;
    let mut c = Client::connect(port).await;
    c.negotiate().await;
    c.expect("login:").await;
    // Type "guestx", rub out the stray character, accept.
    c.stream.write_all(b"guestx\x7f\r\n").await.unwrap();
    c.expect("Enter name:").await;
}

#[tokio::test]
async fn entry_notify_and_private_by_partial_name() {
    let (registry, port) = start_server().await;
    let mut alice = Client::connect(port).await;
    alice.sign_on_guest("Alice").await;

    let mut bob = Client::connect(port).await;
    bob.sign_on_guest("Bob_Smith").await;

    // Alice hears Bob arrive.
    alice.expect("*** Bob_Smith has entered Parley!").await;

    alice.send("Bob; hello").await;
    alice.expect("(message sent to Bob_Smith.)").await;
    bob.expect(">> Private message from Alice:").await;
    bob.expect(" - hello").await;

    // The explicit sendlist is remembered.
    let remembered = registry
        .sessions()
        .iter()
        .find(|s| s.read().name_only == "Alice")
        .map(|s| s.read().last_sendlist.clone())
        .unwrap();
    assert_eq!(remembered, b"Bob".to_vec());
}

#[tokio::test]
async fn smiley_goes_to_everyone() {
    let (_registry, port) = start_server().await;
    let mut alice = Client::connect(port).await;
    alice.sign_on_guest("Alice").await;
    let mut bob = Client::connect(port).await;
    bob.sign_on_guest("Bob").await;
    alice.expect("has entered").await;

    alice.send(":-) everyone is happy").await;
    alice.expect("(message sent to everyone.) [1 person]").await;
    bob.expect("-> From Alice to everyone:").await;
    bob.expect(":-) everyone is happy").await;
}

#[tokio::test]
async fn no_one_else_here() {
    let (_registry, port) = start_server().await;
    let mut alice = Client::connect(port).await;
    alice.sign_on_guest("Alice").await;
    alice.send("anyone home").await;
    alice.expect("There is no one else here! (message not sent)").await;
}

#[tokio::test]
async fn bang_commands_are_privileged() {
    let (_registry, port) = start_server().await;
    let mut alice = Client::connect(port).await;
    alice.sign_on_guest("Alice").await;
    alice.send("!down").await;
    alice.expect("Sorry, all !commands are privileged.").await;
}

#[tokio::test]
async fn detach_then_reattach_replays_missed_output() {
    let (registry, port) = start_server().await;
    let mut carol = Client::connect(port).await;
    carol.sign_on_guest("Carol").await;
    let mut dave = Client::connect(port).await;
    dave.sign_on_guest("Dave").await;
    carol.expect("has entered").await;

    carol.send("/detach").await;
    carol.expect("You have been detached.").await;
    carol.expect_close().await;
    dave.expect("*** Carol has intentionally detached.").await;

    // The session survives, detached.
    assert_eq!(registry.session_count(), 2);

    dave.send("Carol; are you there").await;
    dave.expect("(message sent to Carol.)").await;

    let mut carol2 = Client::connect(port).await;
    carol2.negotiate().await;
    carol2.expect("login:").await;
    carol2.send("guest").await;
    carol2.expect("Enter name:").await;
    carol2.send("Carol").await;
    carol2.expect("Re-attaching to detached session...").await;
    carol2.expect(">> Private message from Dave:").await;
    carol2.expect(" - are you there").await;
    carol2.expect("*** End of reviewed output. ***").await;
    dave.expect("*** Carol is now attached.").await;

    assert_eq!(registry.session_count(), 2);
}

#[tokio::test]
async fn name_collision_is_refused() {
    let (_registry, port) = start_server().await;
    let mut a = Client::connect(port).await;
    a.sign_on_guest("Echo").await;

    let mut b = Client::connect(port).await;
    b.negotiate().await;
    b.expect("login:").await;
    b.send("guest").await;
    b.expect("Enter name:").await;
    b.send("Echo").await;
    b.expect("That name is already in use.  Choose another.").await;
}

#[tokio::test]
async fn handoff_request_is_echoed_and_schedules_shutdown() {
    let (registry, port) = start_server().await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(&[IAC, SHUTDOWN_REQUEST]).await.unwrap();

    // The echo comes back amid the negotiation offers.
    let mut seen = Vec::new();
    let mut buf = [0u8; 256];
    let found = timeout(Duration::from_secs(5), async {
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                return false;
            }
            seen.extend_from_slice(&buf[..n]);
            if seen.windows(2).any(|w| w == [IAC, SHUTDOWN_REQUEST]) {
                return true;
            }
        }
    })
    .await
    .unwrap_or(false);
    assert!(found, "shutdown request was not acknowledged: {:?}", seen);
    assert!(registry.shutdown.is_active());
}

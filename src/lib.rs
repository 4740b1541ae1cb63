pub mod banner;
pub mod commands;
pub mod config;
pub mod error;
pub mod input;
pub mod logging;
pub mod models;
pub mod net;
pub mod services;
pub mod shutdown;
pub mod state;
pub mod util;

// Convenient re-exports (so call sites can do `parley::Registry`, etc.)
pub use state::{
    registry::Registry,
    session::{Session, SessionRef},
};

/// Maximum length of a display name, including the trailing NUL the wire
/// format reserved for it. Names are truncated to `NAME_LEN - 1` bytes.
pub const NAME_LEN: usize = 33;

/// Maximum length of a sendlist, with the same reserved byte.
pub const SENDLIST_LEN: usize = 33;

/// Base allocation of the input line buffer; growth happens in these steps.
pub const INPUT_SIZE: usize = 256;

/// Hardcoded terminal width used for cursor arithmetic and word wrap.
pub const TERM_WIDTH: usize = 80;

/// TCP port used when neither the command line nor the config names one.
pub const DEFAULT_PORT: u16 = 6789;

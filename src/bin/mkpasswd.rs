//! Produce a passwd-file line for a new account.

use clap::Parser;
use parley::services::AuthService;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "mkpasswd", about = "Hash a password into a parley passwd entry")]
struct Cli {
    /// Account login name.
    login: String,
    /// Cleartext password to hash.
    password: String,
    /// Reserved display name; defaults to the login.
    #[arg(long)]
    name: Option<String>,
    /// Privilege level (50+ enables !commands).
    #[arg(long, default_value_t = 10)]
    privilege: u32,
    /// Default blurb.
    #[arg(long, default_value = "")]
    blurb: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let auth = AuthService::new(PathBuf::new());
    let hash = auth.hash_password(&cli.password)?;
    let name = cli.name.unwrap_or_else(|| cli.login.clone());
    println!("{}:{}:{}:{}:{}", cli.login, hash, name, cli.privilege, cli.blurb);
    Ok(())
}

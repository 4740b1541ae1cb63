//! Credential lookup against the flat passwd file, and password hashing.
//!
//! The file holds one `login:hash:name:priv:blurb` record per line, `#`
//! starting a comment. The hash is a PHC string produced by the `mkpasswd`
//! helper; it never contains a colon, so plain splitting is safe.

use crate::error::{AppResult, InfraError};
use crate::models::User;
use argon2::Argon2;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use std::path::PathBuf;

pub struct AuthService {
    path: PathBuf,
    argon: Argon2<'static>,
}

impl AuthService {
    pub fn new(path: PathBuf) -> Self {
        Self { path, argon: Argon2::default() }
    }

    /// Find an account by login, case-insensitively. The file is re-read on
    /// every call so edits take effect without a restart.
    pub fn lookup(&self, login: &str) -> AppResult<Option<User>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(InfraError::Passwd { path: self.path.clone(), source: e }.into());
            }
        };
        for line in data.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.splitn(5, ':');
            let (Some(name), Some(hash), Some(display), Some(privilege)) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            if !name.eq_ignore_ascii_case(login) {
                continue;
            }
            return Ok(Some(User {
                login: name.to_string(),
                password_hash: hash.to_string(),
                reserved_name: display.to_string(),
                default_blurb: fields.next().unwrap_or("").to_string(),
                privilege: privilege.trim().parse().unwrap_or(0),
            }));
        }
        Ok(None)
    }

    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon.verify_password(password.as_bytes(), &parsed).is_ok()
    }

    /// Hash a password into the PHC string stored in the passwd file.
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Ok(self.argon.hash_password(password.as_bytes(), &salt)?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn service_with(contents: &str) -> (AuthService, tempfile::NamedTempFile) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (AuthService::new(f.path().to_path_buf()), f)
    }

    #[test]
    fn lookup_finds_case_insensitively() {
        let (auth, _f) = service_with(
            "# accounts\n\
             deven:$argon2id$fake:Deven:100:on the boat\n\
             mark:$argon2id$other:Mark:0\n",
        );
        let u = auth.lookup("DEVEN").unwrap().unwrap();
        assert_eq!(u.login, "deven");
        assert_eq!(u.reserved_name, "Deven");
        assert_eq!(u.privilege, 100);
        assert_eq!(u.default_blurb, "on the boat");

        let m = auth.lookup("mark").unwrap().unwrap();
        assert_eq!(m.privilege, 0);
        assert_eq!(m.default_blurb, "");

        assert!(auth.lookup("nobody").unwrap().is_none());
    }

    #[test]
    fn missing_file_is_empty_store() {
        let auth = AuthService::new(PathBuf::from("/nonexistent/passwd"));
        assert!(auth.lookup("anyone").unwrap().is_none());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let (auth, _f) = service_with("broken-line\nuser:hash\n");
        assert!(auth.lookup("broken-line").unwrap().is_none());
        assert!(auth.lookup("user").unwrap().is_none());
    }

    #[test]
    fn hash_then_verify_round_trip() {
        let auth = AuthService::new(PathBuf::from("unused"));
        let hash = auth.hash_password("sekrit").unwrap();
        assert!(auth.verify("sekrit", &hash));
        assert!(!auth.verify("wrong", &hash));
        assert!(!auth.verify("sekrit", "not-a-phc-string"));
    }
}

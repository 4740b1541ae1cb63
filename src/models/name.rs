use std::sync::Arc;

/// An immutable snapshot of a session's display name, captured whenever the
/// name or blurb changes. Queued messages hold the snapshot that was current
/// at enqueue time, so a rename between enqueue and delivery still shows the
/// sender as the recipient knew them when the message was said.
#[derive(Debug)]
pub struct Name {
    /// Composed display name, `name_only [blurb]`.
    pub name: String,
    /// Bare name without the blurb, used for matching and reply capture.
    pub name_only: String,
}

impl Name {
    pub fn new(name: impl Into<String>, name_only: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { name: name.into(), name_only: name_only.into() })
    }
}

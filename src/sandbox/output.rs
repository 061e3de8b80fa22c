use std::sync::{Arc, Mutex};

/// Append-only text buffer shared between a running script and readers.
///
/// Writers always append whole `&str` values under the lock, so a snapshot
/// taken at any moment is valid UTF-8 and never splits a character.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    inner: Arc<Mutex<String>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, text: &str) {
        self.inner.lock().unwrap().push_str(text);
    }

    pub fn append_line(&self, line: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.push_str(line);
        inner.push('\n');
    }

    pub fn snapshot(&self) -> String {
        self.inner.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

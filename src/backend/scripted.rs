//! Scripted backend for testing.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use reqwest::StatusCode;

use crate::prelude::*;

use super::{BackendError, PageBackend, TaskType};

/// One canned response.
#[derive(Clone, Debug)]
pub enum Scripted {
    /// Return this text.
    Text(&'static str),
    /// Fail with HTTP 429.
    RateLimited,
    /// Fail with Poppler's page range error.
    EndOfDocument,
    /// Fail with some other error.
    Error(&'static str),
    /// Fail as if the file could not be opened at all.
    Unreadable,
}

impl Scripted {
    fn to_response(&self, page: u32) -> Result<String, BackendError> {
        match self {
            Scripted::Text(text) => Ok((*text).to_owned()),
            Scripted::RateLimited => Err(BackendError::with_status(
                StatusCode::TOO_MANY_REQUESTS,
                anyhow!("OCR server returned 429 Too Many Requests"),
            )),
            Scripted::EndOfDocument => Err(BackendError::new(anyhow!(
                "pdftocairo failed with exit code 99 and error output:\nWrong page range given: the first page ({page}) can not be after the last page ({}).",
                page.saturating_sub(1)
            ))),
            Scripted::Error(message) => Err(BackendError::new(anyhow!("{message}"))),
            Scripted::Unreadable => Err(BackendError::document(anyhow!(
                "pdftocairo failed with exit code 1 and error output:\nSyntax Warning: May not be a PDF file (continuing anyway)\nI/O Error: Couldn't open file"
            ))),
        }
    }
}

/// A backend that replays a script of responses per document, keyed by file
/// name. Once a script runs out, every call reports end-of-document, unless
/// the document has a repeating response.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    repeating: HashMap<String, Scripted>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl ScriptedBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a script for the document with this file name.
    pub fn with_script(self, file_name: &str, script: Vec<Scripted>) -> Self {
        self.scripts
            .lock()
            .expect("lock poisoned")
            .insert(file_name.to_owned(), script.into());
        self
    }

    /// Return `response` for every call on this document once its script
    /// (if any) runs out.
    pub fn with_repeating(mut self, file_name: &str, response: Scripted) -> Self {
        self.repeating.insert(file_name.to_owned(), response);
        self
    }

    /// Every call made so far, as `(file name, page)`.
    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().expect("lock poisoned").clone()
    }

    /// The pages requested for one document, in order.
    pub fn pages_requested(&self, file_name: &str) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter(|(name, _)| name == file_name)
            .map(|(_, page)| page)
            .collect()
    }
}

#[async_trait]
impl PageBackend for ScriptedBackend {
    async fn ocr_page(
        &self,
        document: &Path,
        _task_type: TaskType,
        page: u32,
    ) -> Result<String, BackendError> {
        let file_name = document
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.calls
            .lock()
            .expect("lock poisoned")
            .push((file_name.clone(), page));
        let next = self
            .scripts
            .lock()
            .expect("lock poisoned")
            .get_mut(&file_name)
            .and_then(|script| script.pop_front())
            .or_else(|| self.repeating.get(&file_name).cloned())
            .unwrap_or(Scripted::EndOfDocument);
        next.to_response(page)
    }
}

//! Paragraph segmentation for streamed backend output.
//!
//! Chunks arrive with arbitrary boundaries. A single newline is a soft break
//! inside the current bubble; a run of two or more starts a new bubble. Only
//! the open paragraph is ever mutable.

use crate::session::output::OutputLog;
use crate::session::state::OutputItem;

/// Incremental newline-run segmenter writing into an [`OutputLog`].
#[derive(Debug, Default)]
pub struct StreamingChunkSegmenter {
    pending_newlines: usize,
    open: Option<usize>,
}

impl StreamingChunkSegmenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the open bubble, if any.
    #[must_use]
    pub fn open_index(&self) -> Option<usize> {
        self.open
    }

    /// Start a stream by opening an empty placeholder bubble.
    pub fn begin(&mut self, log: &mut OutputLog) {
        self.seal(log);
        self.open = Some(log.push(OutputItem::StreamingText(String::new())));
    }

    /// Feed one chunk of stdout text.
    pub fn push(&mut self, log: &mut OutputLog, chunk: &str) {
        for ch in chunk.chars() {
            match ch {
                '\n' => self.pending_newlines += 1,
                '\r' => {}
                _ => self.push_char(log, ch),
            }
        }
    }

    /// End the stream. On failure an error bubble follows the last paragraph.
    pub fn finish(&mut self, log: &mut OutputLog, result: Result<(), String>) {
        self.seal(log);
        if let Err(message) = result {
            log.push(OutputItem::Text(message));
        }
    }

    /// Close the open bubble without ending the stream.
    ///
    /// An empty bubble is removed, a non-empty one becomes [`OutputItem::Text`].
    pub fn seal(&mut self, log: &mut OutputLog) {
        self.pending_newlines = 0;
        let Some(index) = self.open.take() else {
            return;
        };
        let finalized = match log.get(index) {
            Some(OutputItem::StreamingText(text)) if text.is_empty() => None,
            Some(OutputItem::StreamingText(text)) => Some(text.clone()),
            _ => return,
        };
        match finalized {
            Some(text) => {
                if let Some(item) = log.get_mut(index) {
                    *item = OutputItem::Text(text);
                }
            }
            None => {
                log.remove(index);
            }
        }
    }

    /// Forget the open bubble after the log was cleared externally.
    pub fn reset(&mut self) {
        self.pending_newlines = 0;
        self.open = None;
    }

    fn push_char(&mut self, log: &mut OutputLog, ch: char) {
        let pending = std::mem::take(&mut self.pending_newlines);
        if pending >= 2 && self.open_text(log).is_some_and(|text| !text.is_empty()) {
            self.seal(log);
        }

        let index = self.ensure_open(log);
        if let Some(OutputItem::StreamingText(text)) = log.get_mut(index) {
            if pending == 1 && !text.is_empty() {
                text.push('\n');
            }
            text.push(ch);
        }
    }

    fn open_text<'a>(&self, log: &'a OutputLog) -> Option<&'a str> {
        match log.get(self.open?) {
            Some(OutputItem::StreamingText(text)) => Some(text),
            _ => None,
        }
    }

    /// Index of the open bubble, opening a fresh one when needed.
    fn ensure_open(&mut self, log: &mut OutputLog) -> usize {
        match self.open {
            Some(index) if log.get(index).is_some_and(OutputItem::is_streaming) => index,
            _ => {
                let index = log.push(OutputItem::StreamingText(String::new()));
                self.open = Some(index);
                index
            }
        }
    }
}

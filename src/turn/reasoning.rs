//! Streaming removal of reasoning markup
//!
//! Some models wrap internal reasoning in `<think>...</think>`. The filter
//! sees the model output in arbitrary chunks and must never let any part of
//! a reasoning block through, even when a tag is split across chunks.

use thiserror::Error;

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// Longest reasoning block tolerated before the response is abandoned
pub const MAX_REASONING_BYTES: usize = 64 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("reasoning block exceeded {limit} bytes without closing")]
pub struct ReasoningOverflow {
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterState {
    Outside,
    InsideMarkup,
    /// Just closed a block; whitespace separating it from the reply is dropped
    AfterMarkup,
}

/// Incremental reasoning-markup filter.
///
/// Text outside markup passes through as soon as it cannot be the start of
/// an opening tag. Text inside markup is discarded as it arrives; only a
/// tail that might be the start of the closing tag is kept.
#[derive(Debug)]
pub struct ReasoningFilter {
    state: FilterState,
    pending: String,
    reasoning_bytes: usize,
    limit: usize,
}

impl Default for ReasoningFilter {
    fn default() -> Self {
        Self::with_limit(MAX_REASONING_BYTES)
    }
}

impl ReasoningFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            state: FilterState::Outside,
            pending: String::new(),
            reasoning_bytes: 0,
            limit,
        }
    }

    /// Feed a chunk, returning the text that is now safe to show
    pub fn push(&mut self, chunk: &str) -> Result<String, ReasoningOverflow> {
        self.pending.push_str(chunk);
        let mut visible = String::new();

        loop {
            match self.state {
                FilterState::Outside => {
                    if let Some(pos) = self.pending.find(OPEN_TAG) {
                        visible.extend(self.pending.drain(..pos));
                        self.pending.drain(..OPEN_TAG.len());
                        self.state = FilterState::InsideMarkup;
                        continue;
                    }
                    let emit = self.pending.len() - partial_tag_len(&self.pending, OPEN_TAG);
                    visible.extend(self.pending.drain(..emit));
                    break;
                }
                FilterState::InsideMarkup => {
                    if let Some(pos) = self.pending.find(CLOSE_TAG) {
                        self.reasoning_bytes += pos;
                        self.check_limit()?;
                        self.pending.drain(..pos + CLOSE_TAG.len());
                        self.state = FilterState::AfterMarkup;
                        // the limit applies per block
                        self.reasoning_bytes = 0;
                        continue;
                    }
                    let discard = self.pending.len() - partial_tag_len(&self.pending, CLOSE_TAG);
                    self.pending.drain(..discard);
                    self.reasoning_bytes += discard;
                    self.check_limit()?;
                    break;
                }
                FilterState::AfterMarkup => {
                    let kept = self.pending.trim_start().len();
                    if kept == 0 {
                        self.pending.clear();
                        break;
                    }
                    self.pending.drain(..self.pending.len() - kept);
                    self.state = FilterState::Outside;
                }
            }
        }

        Ok(visible)
    }

    /// End of input. A held-back tag prefix outside markup is ordinary text;
    /// anything inside an unterminated block is dropped.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        match self.state {
            FilterState::Outside => rest,
            FilterState::InsideMarkup | FilterState::AfterMarkup => String::new(),
        }
    }

    fn check_limit(&self) -> Result<(), ReasoningOverflow> {
        if self.reasoning_bytes > self.limit {
            Err(ReasoningOverflow { limit: self.limit })
        } else {
            Ok(())
        }
    }
}

/// Length of the longest proper prefix of `tag` that `text` ends with
fn partial_tag_len(text: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&n| tag.get(..n).is_some_and(|prefix| text.ends_with(prefix)))
        .unwrap_or(0)
}

/// Remove reasoning markup from a complete response
pub fn strip_reasoning(text: &str) -> String {
    let mut filter = ReasoningFilter::with_limit(usize::MAX);
    let mut out = filter.push(text).unwrap_or_default();
    out.push_str(&filter.finish());
    out
}

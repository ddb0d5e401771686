//! Lazy cross-page element stream for paginated operations.

use std::collections::VecDeque;

use futures::stream::Stream;
use serde_json::Value;

use crate::catalog::PaginationRule;
use crate::command::Command;
use crate::error::Result;
use crate::executor::Executor;
use crate::result::ServiceResult;

/// Repeatedly executes a command, feeding each page's output token into
/// the next request. Non-restartable; pages are fetched strictly in order
/// because page N+1's token comes from page N's result.
pub struct Paginator<'a> {
    executor: &'a Executor,
    rule: PaginationRule,
    command: Command,
    exhausted: bool,
}

impl<'a> Paginator<'a> {
    pub(crate) fn new(executor: &'a Executor, rule: PaginationRule, command: Command) -> Self {
        Self {
            executor,
            rule,
            command,
            exhausted: false,
        }
    }

    /// Fetches the next page, or `None` once the service stops signalling
    /// more results.
    pub async fn next_page(&mut self) -> Result<Option<ServiceResult>> {
        if self.exhausted {
            return Ok(None);
        }
        let result = self.executor.execute(&mut self.command).await?;

        let more = self
            .rule
            .more_results
            .as_deref()
            .and_then(|path| result.get_path(path))
            .map(value_truthy);
        let token = result.get_path(&self.rule.output_token).cloned();

        match (more, token) {
            // An explicit "no more results" flag ends the stream even if a
            // stale token is present.
            (Some(false), _) => self.exhausted = true,
            (_, Some(token)) if !token_empty(&token) => {
                self.command.force_set(&self.rule.input_token, token);
            }
            _ => self.exhausted = true,
        }

        Ok(Some(result))
    }

    /// Flattens every page's `result_key` collection into one lazy element
    /// stream, in page order, with no element repeated or skipped.
    pub fn items(self) -> impl Stream<Item = Result<Value>> + 'a {
        futures::stream::unfold(
            (self, VecDeque::new(), false),
            |(mut pager, mut buffer, done): (Self, VecDeque<Value>, bool)| async move {
                loop {
                    if let Some(item) = buffer.pop_front() {
                        return Some((Ok(item), (pager, buffer, done)));
                    }
                    if done {
                        return None;
                    }
                    match pager.next_page().await {
                        Ok(None) => return None,
                        Ok(Some(result)) => {
                            let finished = pager.exhausted;
                            match result.get_path(&pager.rule.result_key) {
                                Some(Value::Array(items)) => buffer.extend(items.iter().cloned()),
                                Some(other) => buffer.push_back(other.clone()),
                                None => {}
                            }
                            if finished && buffer.is_empty() {
                                return None;
                            }
                            if finished {
                                // Drain the buffered tail, then stop.
                                return buffer
                                    .pop_front()
                                    .map(|item| (Ok(item), (pager, buffer, true)));
                            }
                        }
                        Err(err) => return Some((Err(err), (pager, buffer, true))),
                    }
                }
            },
        )
    }
}

fn value_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true",
        _ => false,
    }
}

fn token_empty(token: &Value) -> bool {
    match token {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

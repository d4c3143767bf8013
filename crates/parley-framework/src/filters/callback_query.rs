//! Filters over [`CallbackQuery`] payloads.

use parley_core::CallbackQuery;
use regex::Regex;

use super::capture_into;
use crate::filter::Filter;

/// Matches every callback query.
pub fn any() -> Filter<CallbackQuery> {
    Filter::new(|_: &CallbackQuery| true)
}

/// Matches queries that carry button data.
pub fn data() -> Filter<CallbackQuery> {
    Filter::new(|q: &CallbackQuery| q.data.is_some())
}

/// Matches queries whose data equals `value`.
pub fn data_equals(value: impl Into<String>) -> Filter<CallbackQuery> {
    let value = value.into();
    Filter::new(move |q: &CallbackQuery| q.data.as_deref() == Some(value.as_str()))
}

/// Matches queries whose data starts with `prefix`.
///
/// The remainder after the prefix is recorded under `rest`.
pub fn data_prefix(prefix: impl Into<String>) -> Filter<CallbackQuery> {
    let prefix = prefix.into();
    Filter::capture(move |q: &CallbackQuery, meta| {
        match q.data.as_deref().and_then(|d| d.strip_prefix(prefix.as_str())) {
            Some(rest) => {
                meta.insert("rest", rest);
                true
            }
            None => false,
        }
    })
}

/// Matches queries whose data matches `pattern`.
pub fn regex(pattern: &str) -> Result<Filter<CallbackQuery>, regex::Error> {
    Ok(matches(Regex::new(pattern)?))
}

/// Like [`regex`], with an already compiled expression.
pub fn matches(re: Regex) -> Filter<CallbackQuery> {
    Filter::capture(move |q: &CallbackQuery, meta| {
        q.data
            .as_deref()
            .is_some_and(|data| capture_into(&re, data, meta))
    })
}

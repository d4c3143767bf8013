//! Ready-made filters for the common payload types.
//!
//! ```rust,ignore
//! use parley_framework::filters::{callback_query, message};
//!
//! let start = message::private() & message::command("start");
//! let vote = callback_query::regex(r"^vote:(?<choice>\w+)$")?;
//! ```
//!
//! Regex filters record what they matched in the handler's metadata: the
//! whole match under `match`, positional groups under `group_1`, `group_2`,
//! ... and named groups under their own name.

pub mod callback_query;
pub mod message;

use regex::Regex;

use crate::filter::Metadata;

fn capture_into(re: &Regex, haystack: &str, metadata: &mut Metadata) -> bool {
    let Some(caps) = re.captures(haystack) else {
        return false;
    };

    if let Some(whole) = caps.get(0) {
        metadata.insert("match", whole.as_str());
    }
    for (i, group) in caps.iter().enumerate().skip(1) {
        if let Some(group) = group {
            metadata.insert(format!("group_{i}"), group.as_str());
        }
    }
    for name in re.capture_names().flatten() {
        if let Some(group) = caps.name(name) {
            metadata.insert(name, group.as_str());
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_records_positional_and_named_groups() {
        let re = Regex::new(r"(\d+)-(?<word>[a-z]+)").unwrap();
        let mut meta = Metadata::new();

        assert!(capture_into(&re, "id 12-abc", &mut meta));
        assert_eq!(meta.get_str("match"), Some("12-abc"));
        assert_eq!(meta.get_str("group_1"), Some("12"));
        assert_eq!(meta.get_str("group_2"), Some("abc"));
        assert_eq!(meta.get_str("word"), Some("abc"));
    }

    #[test]
    fn test_capture_leaves_metadata_untouched_on_miss() {
        let re = Regex::new(r"^\d+$").unwrap();
        let mut meta = Metadata::new();

        assert!(!capture_into(&re, "abc", &mut meta));
        assert!(meta.is_empty());
    }
}

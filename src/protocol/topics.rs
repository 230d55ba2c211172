//! MQTT topic filter validation and matching
//!
//! Filters follow MQTT 3.1.1 section 4.7: `+` matches exactly one level,
//! `#` matches any number of trailing levels (including the parent level),
//! and topics starting with `$` are not matched by a leading wildcard.

use thiserror::Error;

pub fn validate_topic_filter(filter: &str) -> Result<(), TopicError> {
    if filter.is_empty() {
        return Err(TopicError::Empty);
    }

    if filter.contains('\0') {
        return Err(TopicError::NulCharacter);
    }

    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;

    for (index, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || index != last) {
            return Err(TopicError::MisplacedMultiLevelWildcard);
        }
        if level.contains('+') && *level != "+" {
            return Err(TopicError::MisplacedSingleLevelWildcard);
        }
    }

    Ok(())
}

/// Whether a concrete topic name is matched by a (valid) filter
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Topic filter validation errors
#[derive(Debug, Error, PartialEq)]
pub enum TopicError {
    #[error("topic filter cannot be empty")]
    Empty,
    #[error("topic filter cannot contain NUL")]
    NulCharacter,
    #[error("'#' must occupy the whole last level")]
    MisplacedMultiLevelWildcard,
    #[error("'+' must occupy a whole level")]
    MisplacedSingleLevelWildcard,
}

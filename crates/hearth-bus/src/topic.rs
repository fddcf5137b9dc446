//! Topic structure following the mqtt-smarthome convention.
//!
//! `<toplevel>/set/<item>`, `<toplevel>/get/<item>`,
//! `<toplevel>/status/<item>`, `<toplevel>/command`, `<toplevel>/connected`.

const STATUS_INFIX: &str = "/status/";

pub fn set_topic(toplevel: &str, item: &str) -> String {
    format!("{toplevel}/set/{item}")
}

pub fn get_topic(toplevel: &str, item: &str) -> String {
    format!("{toplevel}/get/{item}")
}

pub fn status_topic(toplevel: &str, item: &str) -> String {
    format!("{toplevel}/status/{item}")
}

pub fn command_topic(toplevel: &str) -> String {
    format!("{toplevel}/command")
}

pub fn connected_topic(toplevel: &str) -> String {
    format!("{toplevel}/connected")
}

/// Split a concrete status topic into `(toplevel, item)`.
pub fn split_status(topic: &str) -> Option<(&str, &str)> {
    let i = topic.find(STATUS_INFIX)?;
    let toplevel = &topic[..i];
    let item = &topic[i + STATUS_INFIX.len()..];
    if toplevel.is_empty() || item.is_empty() {
        return None;
    }
    Some((toplevel, item))
}

/// MQTT filter matching: `+` matches a single segment, a trailing `#`
/// matches the remainder of the topic.
pub fn filter_matches(filter: &str, topic: &str) -> bool {
    let mut filter_segments = filter.split('/');
    let mut topic_segments = topic.split('/');
    loop {
        match (filter_segments.next(), topic_segments.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_builders() {
        assert_eq!(set_topic("house", "room1/light"), "house/set/room1/light");
        assert_eq!(get_topic("house", "room1/light"), "house/get/room1/light");
        assert_eq!(
            status_topic("house", "room1/light"),
            "house/status/room1/light"
        );
        assert_eq!(command_topic("house"), "house/command");
        assert_eq!(connected_topic("house"), "house/connected");
    }

    #[test]
    fn test_split_status() {
        assert_eq!(
            split_status("house/status/room1/light"),
            Some(("house", "room1/light"))
        );
        assert_eq!(split_status("house/set/room1/light"), None);
        assert_eq!(split_status("house/status/"), None);
    }

    #[test]
    fn test_filter_matches_exact() {
        assert!(filter_matches("a/status/b", "a/status/b"));
        assert!(!filter_matches("a/status/b", "a/status/c"));
        assert!(!filter_matches("a/status/b", "a/status/b/c"));
    }

    #[test]
    fn test_filter_matches_plus() {
        assert!(filter_matches("+/status/b", "house/status/b"));
        assert!(!filter_matches("+/status/b", "house/garage/status/b"));
    }

    #[test]
    fn test_filter_matches_hash() {
        assert!(filter_matches("+/status/#", "house/status/room1/light"));
        assert!(filter_matches("house/#", "house/status/anything/at/all"));
        assert!(!filter_matches("barn/#", "house/status/light"));
    }
}

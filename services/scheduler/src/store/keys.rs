//! Compound key layout.
//!
//! ```text
//! shipyard::application::<name>
//! shipyard::containers::<application>::<container_id>
//! shipyard::variables::<name>
//! ```

pub const DELIMITER: &str = "::";

const NAMESPACE: &str = "shipyard";
const APPLICATION: &str = "application";
const CONTAINERS: &str = "containers";
const VARIABLES: &str = "variables";

fn join(parts: &[&str]) -> String {
    parts.join(DELIMITER)
}

pub fn application(name: &str) -> String {
    join(&[NAMESPACE, APPLICATION, name])
}

/// Pattern matching every application key.
pub fn applications() -> String {
    join(&[NAMESPACE, APPLICATION, "*"])
}

pub fn container(application: &str, container_id: &str) -> String {
    join(&[NAMESPACE, CONTAINERS, application, container_id])
}

/// Pattern matching every container key of one application.
pub fn containers(application: &str) -> String {
    join(&[NAMESPACE, CONTAINERS, application, "*"])
}

/// Pattern matching every container key in the cluster.
pub fn all_containers() -> String {
    join(&[NAMESPACE, CONTAINERS, "*", "*"])
}

pub fn variable(name: &str) -> String {
    join(&[NAMESPACE, VARIABLES, name])
}

pub fn variables() -> String {
    join(&[NAMESPACE, VARIABLES, "*"])
}

/// Whether `name` fits in one key segment without acting as a pattern.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('*') && !name.contains(DELIMITER)
}

/// Final segment of a key, e.g. the application name.
pub fn last_segment(key: &str) -> &str {
    key.rsplit(DELIMITER).next().unwrap_or(key)
}

/// Match a key against a pattern segment by segment.
///
/// `*` matches any run of characters inside a single segment, so
/// `containers::web::*` never matches keys of an application named `web2`.
pub fn matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split(DELIMITER).collect();
    let key: Vec<&str> = key.split(DELIMITER).collect();

    pattern.len() == key.len()
        && pattern
            .iter()
            .zip(&key)
            .all(|(p, k)| segment_matches(p.as_bytes(), k.as_bytes()))
}

fn segment_matches(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|i| segment_matches(rest, &text[i..])),
        Some((c, rest)) => text.first() == Some(c) && segment_matches(rest, &text[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_key_layout() {
        assert_eq!(application("web"), "shipyard::application::web");
        assert_eq!(
            container("web", "ctr_1"),
            "shipyard::containers::web::ctr_1"
        );
        assert_eq!(last_segment(&application("web")), "web");
        assert_eq!(last_segment(&container("web", "")), "");
    }

    #[rstest]
    #[case("web", true)]
    #[case("web-2.prod", true)]
    #[case("", false)]
    #[case("w*", false)]
    #[case("web::db", false)]
    fn test_name_validation(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_valid_name(name), expected);
    }

    #[rstest]
    #[case("shipyard::containers::web::*", "shipyard::containers::web::ctr_1", true)]
    #[case("shipyard::containers::web::*", "shipyard::containers::web::", true)]
    #[case("shipyard::containers::web::*", "shipyard::containers::web2::ctr_1", false)]
    #[case("shipyard::containers::*::*", "shipyard::containers::db::ctr_9", true)]
    #[case("shipyard::containers::*::*", "shipyard::application::db", false)]
    #[case("shipyard::application::*", "shipyard::application::db", true)]
    #[case("shipyard::application::w*", "shipyard::application::web", true)]
    #[case("shipyard::application::w*", "shipyard::application::db", false)]
    fn test_pattern_matching(#[case] pattern: &str, #[case] key: &str, #[case] expected: bool) {
        assert_eq!(matches(pattern, key), expected);
    }
}

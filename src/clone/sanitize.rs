use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

// Starts and ends with an alphanumeric character, dots are allowed in between but never twice in
// a row.
static COMPONENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:(?:\.?[A-Za-z0-9_-])*\.?[A-Za-z0-9])?$").unwrap()
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidPathComponent {
    #[error("path component is empty")]
    Empty,
    #[error("path component `{0}` contains a traversal sequence")]
    Traversal(String),
    #[error("path component `{0}` contains disallowed characters")]
    Disallowed(String),
}

/// Checks that an untrusted owner or repository name can be used as a single directory name.
///
/// The component is returned unchanged when it passes.
pub fn sanitize(component: &str) -> Result<String, InvalidPathComponent> {
    if component.trim().is_empty() {
        return Err(InvalidPathComponent::Empty);
    }

    if component.contains("..") || component.contains('/') || component.contains('\\') {
        return Err(InvalidPathComponent::Traversal(component.to_owned()));
    }

    if !COMPONENT_REGEX.is_match(component) {
        return Err(InvalidPathComponent::Disallowed(component.to_owned()));
    }

    Ok(component.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_github_names() {
        for name in ["octocat", "Hello-World", "a", "my_repo", "repo.rs", "v1.2.3", "a-.b"] {
            assert_eq!(sanitize(name).as_deref(), Ok(name), "{name} should be accepted");
        }
    }

    #[test]
    fn rejects_traversal() {
        for name in ["../../etc/passwd", "..", "a/b", "a\\b", "a..b", "../../../etc"] {
            assert!(
                matches!(sanitize(name), Err(InvalidPathComponent::Traversal(_))),
                "{name} should be rejected as traversal"
            );
        }
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(sanitize(""), Err(InvalidPathComponent::Empty));
        assert_eq!(sanitize("   "), Err(InvalidPathComponent::Empty));
    }

    #[test]
    fn rejects_bad_edges_and_characters() {
        for name in [".hidden", "trailing.", "-dash", "dash-", "_under", "under_", "sp ace", "é", " octocat"] {
            assert!(
                matches!(sanitize(name), Err(InvalidPathComponent::Disallowed(_))),
                "{name} should be rejected"
            );
        }
    }
}

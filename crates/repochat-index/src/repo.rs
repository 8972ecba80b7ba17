//! Repository identifiers.

use std::fmt;
use std::str::FromStr;

use crate::error::IndexError;

/// `owner/name` pair identifying a hosted repository.
///
/// The `Display` form (`owner/name`) is the tag stored on every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    /// # Errors
    ///
    /// Returns `IndexError::Validation` if either part is empty or contains
    /// characters not allowed in repository names.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, IndexError> {
        let owner = owner.into();
        let name = name.into();
        validate_part("owner", &owner)?;
        validate_part("repository name", &name)?;
        Ok(Self { owner, name })
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parse a repository URL or `owner/name` shorthand.
    ///
    /// Accepts `https://github.com/owner/name`, `http://…`, `github.com/owner/name`,
    /// and `owner/name`, each optionally followed by `.git` or a trailing slash.
    /// URLs copied from the browser (`…/tree/main`, `…/blob/main/README.md`,
    /// `…?tab=readme-ov-file`) resolve to the repository they point into.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Validation` for anything else.
    pub fn parse(input: &str) -> Result<Self, IndexError> {
        let trimmed = input.trim();
        let without_scheme = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);
        let host_path = without_scheme
            .strip_prefix("www.github.com/")
            .or_else(|| without_scheme.strip_prefix("github.com/"));
        let is_url = host_path.is_some();
        let path = host_path.unwrap_or(without_scheme);
        let path = if is_url {
            path.split(['?', '#']).next().unwrap_or_default()
        } else {
            path
        };

        let mut parts = path.trim_end_matches('/').split('/');
        let (owner, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) => (owner, name),
            (Some(owner), Some(name), Some(_)) if is_url => (owner, name),
            _ => {
                return Err(IndexError::Validation(format!(
                    "expected a GitHub repository URL or owner/name, got {input:?}"
                )));
            }
        };
        Self::new(owner, name.strip_suffix(".git").unwrap_or(name))
    }
}

fn validate_part(what: &str, value: &str) -> Result<(), IndexError> {
    if value.is_empty() {
        return Err(IndexError::Validation(format!("{what} must not be empty")));
    }
    if value == "." || value == ".." {
        return Err(IndexError::Validation(format!("invalid {what}: {value}")));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(IndexError::Validation(format!(
            "invalid character in {what}: {value}"
        )));
    }
    Ok(())
}

impl FromStr for RepoId {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_url() {
        let id = RepoId::parse("https://github.com/rust-lang/rustlings").unwrap();
        assert_eq!(id.owner(), "rust-lang");
        assert_eq!(id.name(), "rustlings");
    }

    #[test]
    fn strips_git_suffix_and_trailing_slash() {
        assert_eq!(
            RepoId::parse("https://github.com/octo/widgets.git")
                .unwrap()
                .to_string(),
            "octo/widgets"
        );
        assert_eq!(
            RepoId::parse("github.com/octo/widgets/").unwrap().to_string(),
            "octo/widgets"
        );
    }

    #[test]
    fn parses_shorthand() {
        let id: RepoId = "octo/my.repo".parse().unwrap();
        assert_eq!(id.to_string(), "octo/my.repo");
    }

    #[test]
    fn rejects_missing_name() {
        assert!(RepoId::parse("https://github.com/octo").is_err());
        assert!(RepoId::parse("octo/").is_err());
        assert!(RepoId::parse("").is_err());
    }

    #[test]
    fn browser_urls_resolve_to_repository() {
        for url in [
            "https://github.com/octo/widgets/tree/main",
            "https://github.com/octo/widgets/blob/main/README.md",
            "https://github.com/octo/widgets?tab=readme-ov-file",
            "github.com/octo/widgets.git#readme",
        ] {
            assert_eq!(RepoId::parse(url).unwrap().to_string(), "octo/widgets", "{url}");
        }
    }

    #[test]
    fn shorthand_rejects_extra_segments() {
        let err = RepoId::parse("octo/widgets/tree").unwrap_err();
        assert!(matches!(err, IndexError::Validation(_)));
        assert!(RepoId::parse("https://github.com/octo?tab=repositories").is_err());
    }

    #[test]
    fn rejects_bad_characters() {
        assert!(RepoId::parse("octo/wid gets").is_err());
        assert!(RepoId::parse("octo/..").is_err());
    }
}

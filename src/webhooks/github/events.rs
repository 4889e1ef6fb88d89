//! Payload of the GitHub `issues` event.
//!
//! Only the fields koozie cares about are modelled. Everything defaults to empty/false when GitHub
//! (or anyone else holding the secret) leaves it out or sends `null`. The `action` is checked by
//! the router before this gets parsed.

use std::fmt::Display;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IssuesEvent {
    #[serde(deserialize_with = "null_as_default")]
    pub issue: Issue,
    #[serde(deserialize_with = "null_as_default")]
    pub repository: Repository,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitHubUser {
    #[serde(deserialize_with = "null_as_default")]
    pub login: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Issue {
    pub number: Option<u64>,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    pub body: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub html_url: String,
    // deleted accounts show up as `null`
    #[serde(deserialize_with = "null_as_default")]
    pub user: GitHubUser,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: String,
}

impl Issue {
    pub fn body_or_placeholder(&self) -> &str {
        self.body
            .as_deref()
            .unwrap_or("No description provided")
    }
}

impl Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.number {
            Some(number) => write!(f, "#{} ({})", number, self.title),
            None => write!(f, "#? ({})", self.title),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Repository {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub full_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub owner: GitHubUser,
    #[serde(deserialize_with = "null_as_default")]
    pub html_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub private: bool,
}

/// What the webhook response echoes back about the repository.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct RepositorySummary {
    pub full_name: String,
    pub owner: String,
    pub private: bool,
    pub url: String,
}

impl From<&Repository> for RepositorySummary {
    fn from(repository: &Repository) -> Self {
        Self {
            full_name: repository.full_name.clone(),
            owner: repository.owner.login.clone(),
            private: repository.private,
            url: repository.html_url.clone(),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

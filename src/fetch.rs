//! Retrieving documents referenced by certificates and tokens.
//!
//! Tokens point to the certificate chain of their signer through an x5u
//! URL. How that URL is retrieved is up to an implementation of the
//! [`Fetch`] trait. The module provides an in-memory fetcher useful for
//! tests and closed deployments, a wrapper that rewrites URLs before
//! fetching, and, with the `http` feature, a fetcher using HTTPS.

use std::{error, fmt};
use std::sync::Arc;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use log::debug;
use regex::Regex;


//------------ Fetch ---------------------------------------------------------

/// Something that can retrieve the document behind a URL.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

#[async_trait]
impl<F: Fetch + ?Sized> Fetch for Arc<F> {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.as_ref().fetch(url).await
    }
}


//------------ MemoryFetcher -------------------------------------------------

/// A fetcher serving documents from memory.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    documents: DashMap<String, Bytes>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document for a URL, replacing any previous document.
    pub fn insert(&self, url: impl Into<String>, content: impl Into<Bytes>) {
        self.documents.insert(url.into(), content.into());
    }

    pub fn remove(&self, url: &str) -> Option<Bytes> {
        self.documents.remove(url).map(|(_, content)| content)
    }
}

#[async_trait]
impl Fetch for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.documents.get(url).map(|content| {
            content.value().clone()
        }).ok_or_else(|| FetchError::NotFound(url.into()))
    }
}


//------------ RewriteRules --------------------------------------------------

/// Rules for rewriting URLs before fetching them.
///
/// Each rule consists of a regular expression and a replacement. The first
/// rule whose expression matches a URL replaces the matching part of the
/// URL.
#[derive(Clone, Debug, Default)]
pub struct RewriteRules {
    rules: Vec<Rule>,
}

#[derive(Clone, Debug)]
struct Rule {
    /// The pattern the rule was added with.
    pattern: String,
    regex: Regex,
    replacement: String,
}

impl RewriteRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule for URLs starting with `pattern`.
    ///
    /// The pattern is a regular expression anchored at the start of the
    /// URL. A rule with the same pattern is replaced.
    pub fn add_rule(
        &mut self, pattern: &str, replacement: impl Into<String>
    ) -> Result<(), regex::Error> {
        let regex = Regex::new(&format!("^{}", pattern))?;
        self.add(pattern.into(), regex, replacement.into());
        Ok(())
    }

    /// Adds a rule with an arbitrary regular expression.
    pub fn add_regex(&mut self, regex: Regex, replacement: impl Into<String>) {
        self.add(regex.as_str().into(), regex, replacement.into())
    }

    fn add(&mut self, pattern: String, regex: Regex, replacement: String) {
        let rule = Rule { pattern, regex, replacement };
        match self.rules.iter_mut().find(|item| item.pattern == rule.pattern) {
            Some(item) => *item = rule,
            None => self.rules.push(rule),
        }
    }

    /// Removes all rules that would rewrite `url`.
    pub fn remove_rules(&mut self, url: &str) {
        self.rules.retain(|rule| !rule.regex.is_match(url))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the rewritten URL.
    ///
    /// If no rule matches, returns the URL unchanged.
    pub fn rewrite(&self, url: &str) -> String {
        for rule in &self.rules {
            if rule.regex.is_match(url) {
                return rule.regex.replace(url, rule.replacement.as_str()).into()
            }
        }
        url.into()
    }
}


//------------ Rewriting -----------------------------------------------------

/// A fetcher that rewrites URLs before passing them on.
#[derive(Debug)]
pub struct Rewriting<F> {
    inner: F,
    rules: RewriteRules,
}

impl<F> Rewriting<F> {
    pub fn new(inner: F, rules: RewriteRules) -> Self {
        Rewriting { inner, rules }
    }

    pub fn rules(&self) -> &RewriteRules {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut RewriteRules {
        &mut self.rules
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

#[async_trait]
impl<F: Fetch> Fetch for Rewriting<F> {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let rewritten = self.rules.rewrite(url);
        if rewritten != url {
            debug!("Fetching {} instead of {}.", rewritten, url);
        }
        self.inner.fetch(&rewritten).await
    }
}


//------------ HttpFetcher ---------------------------------------------------

/// A fetcher using HTTP and HTTPS.
#[cfg(feature = "http")]
#[derive(Clone, Debug, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        HttpFetcher { client }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self.client.get(url).send().await.map_err(|err| {
            FetchError::Transport(format!("{}: {}", url, err))
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.into(), status: status.as_u16()
            })
        }
        response.bytes().await.map_err(|err| {
            FetchError::Transport(format!("{}: {}", url, err))
        })
    }
}


//------------ FetchError ----------------------------------------------------

/// Retrieving a document failed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FetchError {
    /// There is no document at the URL.
    NotFound(String),

    /// The server answered with an unsuccessful status code.
    Status { url: String, status: u16 },

    /// The document could not be transferred.
    Transport(String),

    /// Retrieving took too long.
    Timeout(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FetchError::NotFound(ref url) => write!(f, "{}: not found", url),
            FetchError::Status { ref url, status } => {
                write!(f, "{}: status {}", url, status)
            }
            FetchError::Transport(ref err) => f.write_str(err),
            FetchError::Timeout(ref url) => write!(f, "{}: timed out", url),
        }
    }
}

impl error::Error for FetchError { }


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    const GOOD: &str = "https://mir.example.org/certificates/";
    const MOVED: &str = "https://old.example.org/certificates/";

    #[test]
    fn rewrite_rules() {
        let mut rules = RewriteRules::new();
        rules.add_rule(MOVED, GOOD).unwrap();
        assert_eq!(
            rules.rewrite("https://old.example.org/certificates/a.pem"),
            "https://mir.example.org/certificates/a.pem"
        );
        assert_eq!(
            rules.rewrite("https://mir.example.org/certificates/a.pem"),
            "https://mir.example.org/certificates/a.pem"
        );

        // The pattern is anchored.
        assert_eq!(
            rules.rewrite("https://x.net/?https://old.example.org/certificates/"),
            "https://x.net/?https://old.example.org/certificates/"
        );

        rules.add_rule(MOVED, "https://other.example.org/").unwrap();
        assert_eq!(rules.len(), 1);

        rules.remove_rules(GOOD);
        assert_eq!(rules.len(), 1);
        rules.remove_rules(MOVED);
        assert!(rules.is_empty());
    }

    #[test]
    fn regex_rule() {
        let mut rules = RewriteRules::new();
        rules.add_regex(
            Regex::new(r"^http://(\w+)\.test/").unwrap(),
            "https://$1.example.org/"
        );
        assert_eq!(
            rules.rewrite("http://mir.test/chain.pem"),
            "https://mir.example.org/chain.pem"
        );
    }

    #[tokio::test]
    async fn memory_and_rewriting() {
        let memory = MemoryFetcher::new();
        memory.insert(format!("{}a.pem", GOOD), "content");
        assert_eq!(
            memory.fetch(&format!("{}a.pem", GOOD)).await.unwrap(),
            Bytes::from("content")
        );
        assert_eq!(
            memory.fetch(&format!("{}a.pem", MOVED)).await,
            Err(FetchError::NotFound(format!("{}a.pem", MOVED)))
        );

        let mut fetcher = Rewriting::new(memory, RewriteRules::new());
        fetcher.rules_mut().add_rule(MOVED, GOOD).unwrap();
        assert_eq!(
            fetcher.fetch(&format!("{}a.pem", MOVED)).await.unwrap(),
            Bytes::from("content")
        );
    }
}

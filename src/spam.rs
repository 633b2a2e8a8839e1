//! Heuristic spam detection
//!
//! A message is spam when any of a fixed set of heuristics fires. Heuristics are
//! evaluated in a fixed order and evaluation stops at the first hit, so the
//! reported [`SpamHeuristic`] is deterministic for logging.

use crate::models::NormalizedMessage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Runs of `!` or `?` in a subject
static PUNCTUATION_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"!{2,}|\?{2,}").unwrap());

/// Spam detection settings, edited through settings save only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpamConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    #[serde(default)]
    pub suspicious_domains: BTreeSet<String>,
}

/// The heuristic that flagged a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpamHeuristic {
    /// A configured keyword appears in the subject
    SubjectKeyword(String),
    /// The sender domain ends with a configured suspicious domain
    SuspiciousDomain(String),
    /// The subject contains `!!` or `??`
    ExcessivePunctuation,
    /// The sender domain has no dot and is not `localhost`
    DotlessDomain(String),
}

impl fmt::Display for SpamHeuristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpamHeuristic::SubjectKeyword(k) => write!(f, "subject keyword '{}'", k),
            SpamHeuristic::SuspiciousDomain(d) => write!(f, "suspicious domain '{}'", d),
            SpamHeuristic::ExcessivePunctuation => f.write_str("excessive punctuation in subject"),
            SpamHeuristic::DotlessDomain(d) => write!(f, "dotless sender domain '{}'", d),
        }
    }
}

/// Domain part of a sender header: text after the last `@`, trailing `>`
/// removed, lowercased. Empty when the header has no `@`.
pub fn sender_domain(sender_header: &str) -> String {
    match sender_header.rfind('@') {
        Some(at) => sender_header[at + 1..]
            .trim()
            .trim_end_matches('>')
            .trim()
            .to_lowercase(),
        None => String::new(),
    }
}

pub fn keyword_in_subject(message: &NormalizedMessage, config: &SpamConfig) -> Option<String> {
    let subject = message.subject_header.to_lowercase();
    config
        .keywords
        .iter()
        .filter(|k| !k.is_empty())
        .find(|k| subject.contains(&k.to_lowercase()))
        .cloned()
}

pub fn suspicious_domain(message: &NormalizedMessage, config: &SpamConfig) -> Option<String> {
    let domain = sender_domain(&message.sender_header);
    if domain.is_empty() {
        return None;
    }
    config
        .suspicious_domains
        .iter()
        .filter(|d| !d.is_empty())
        .find(|d| domain.ends_with(&d.to_lowercase()))
        .cloned()
}

pub fn excessive_punctuation(message: &NormalizedMessage) -> bool {
    PUNCTUATION_RUN.is_match(&message.subject_header)
}

pub fn dotless_domain(message: &NormalizedMessage) -> Option<String> {
    let domain = sender_domain(&message.sender_header);
    if !domain.is_empty() && !domain.contains('.') && domain != "localhost" {
        Some(domain)
    } else {
        None
    }
}

/// Run the heuristics in order and report the first that fires
pub fn detect(message: &NormalizedMessage, config: &SpamConfig) -> Option<SpamHeuristic> {
    if !config.enabled {
        return None;
    }

    if let Some(keyword) = keyword_in_subject(message, config) {
        return Some(SpamHeuristic::SubjectKeyword(keyword));
    }
    if let Some(domain) = suspicious_domain(message, config) {
        return Some(SpamHeuristic::SuspiciousDomain(domain));
    }
    if excessive_punctuation(message) {
        return Some(SpamHeuristic::ExcessivePunctuation);
    }
    dotless_domain(message).map(SpamHeuristic::DotlessDomain)
}

pub fn is_spam(message: &NormalizedMessage, config: &SpamConfig) -> bool {
    detect(message, config).is_some()
}

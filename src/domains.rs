//! # Domain Sets
//!
//! Two disjoint sets of fully-qualified hostnames:
//! - **trusted** hosts add weight to a record's relevance score,
//! - **social** hosts cause the record to be skipped outright.
//!
//! Matching is exact and case-sensitive on the host component of a link.
//! A link that does not parse as an absolute URL has an empty host and
//! matches neither set.
//!
//! Sets load from TOML or JSON (`trusted` / `social` arrays); when no file is
//! configured the built-in seed is used.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_DOMAINS_CONFIG_PATH: &str = "config/domains.toml";
pub const ENV_DOMAINS_CONFIG_PATH: &str = "DOMAINS_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainSets {
    trusted: HashSet<String>,
    social: HashSet<String>,
}

#[derive(Debug, Deserialize)]
struct DomainsFile {
    #[serde(default)]
    trusted: Vec<String>,
    #[serde(default)]
    social: Vec<String>,
}

impl DomainSets {
    /// Build from explicit lists. Entries are trimmed, blanks dropped; a host in
    /// both lists is a configuration error.
    pub fn new<I, J, S, T>(trusted: I, social: J) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let trusted = clean_set(trusted);
        let social = clean_set(social);
        let overlap: BTreeSet<&String> = trusted.intersection(&social).collect();
        if !overlap.is_empty() {
            bail!("domains listed as both trusted and social: {:?}", overlap);
        }
        Ok(Self { trusted, social })
    }

    pub fn is_trusted(&self, host: &str) -> bool {
        !host.is_empty() && self.trusted.contains(host)
    }

    pub fn is_social(&self, host: &str) -> bool {
        !host.is_empty() && self.social.contains(host)
    }

    pub fn trusted_len(&self) -> usize {
        self.trusted.len()
    }

    pub fn social_len(&self) -> usize {
        self.social.len()
    }

    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading domain sets from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::parse(&content, &ext)
    }

    /// Load using env var + fallbacks:
    /// 1) $DOMAINS_CONFIG_PATH (must exist)
    /// 2) config/domains.toml
    /// 3) built-in seed
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_DOMAINS_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!(
                    "{ENV_DOMAINS_CONFIG_PATH} points to non-existent path {}",
                    pb.display()
                ));
            }
            return Self::load_from(&pb);
        }
        let toml_p = PathBuf::from(DEFAULT_DOMAINS_CONFIG_PATH);
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        Ok(Self::default_seed())
    }

    fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        let file: DomainsFile = if hint_ext == "json" {
            serde_json::from_str(s).context("parsing domain sets JSON")?
        } else {
            match toml::from_str(s) {
                Ok(v) => v,
                Err(toml_err) => serde_json::from_str(s)
                    .map_err(|_| anyhow!("unsupported domain sets format: {toml_err}"))?,
            }
        };
        Self::new(file.trusted, file.social)
    }

    /// Built-in lists: Brazilian and international news outlets as trusted,
    /// video/photo social networks as social.
    pub fn default_seed() -> Self {
        let trusted = [
            "g1.globo.com",
            "www.uol.com.br",
            "www.folha.uol.com.br",
            "www.estadao.com.br",
            "veja.abril.com.br",
            "www.cnnbrasil.com.br",
            "www.cartacapital.com.br",
            "www.poder360.com.br",
            "www.metropoles.com",
            "www.oantagonista.com.br",
            "www.bbc.com",
            "www.nytimes.com",
            "www.theguardian.com",
            "www.reuters.com",
            "www.wsj.com",
            "www.bloomberg.com",
            "apnews.com",
        ];
        let social = [
            "www.youtube.com",
            "youtube.com",
            "www.instagram.com",
            "instagram.com",
            "www.facebook.com",
            "facebook.com",
        ];
        Self {
            trusted: trusted.iter().map(|s| s.to_string()).collect(),
            social: social.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn clean_set<I, S>(items: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Host component of `link`, with its original case preserved.
///
/// The link must parse as an absolute URL with an authority; otherwise the
/// host is empty. Userinfo and port are not part of the host.
pub fn host_of(link: &str) -> String {
    let link = link.trim();
    let parsed = match url::Url::parse(link) {
        Ok(u) => u,
        Err(_) => return String::new(),
    };
    if parsed.host().is_none() {
        return String::new();
    }
    // `Url` lowercases hosts; matching is case-sensitive, so slice the raw text.
    let Some((_, rest)) = link.split_once("://") else {
        return String::new();
    };
    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or_default();
    let host = if host_port.starts_with('[') {
        // IPv6 literal keeps its brackets
        host_port
            .find(']')
            .map(|end| &host_port[..=end])
            .unwrap_or(host_port)
    } else {
        host_port.split(':').next().unwrap_or_default()
    };
    host.to_string()
}

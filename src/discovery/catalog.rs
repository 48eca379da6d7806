//! Discovery query catalog.

use serde::{Deserialize, Serialize};

use crate::config::QueriesConfig;
use crate::error::{Result, ScoutrError};

/// A search query the discovery phase can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryQuery {
    /// Stable id, used for attribution
    pub id: String,
    pub label: String,
    /// Platform search expression
    pub query: String,
}

impl DiscoveryQuery {
    pub fn new(id: impl Into<String>, label: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            query: query.into(),
        }
    }
}

/// Which pool a query is picked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryPool {
    General,
    Niche,
}

/// Two non-empty query pools. One query is picked from each per run.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCatalog {
    general: Vec<DiscoveryQuery>,
    niche: Vec<DiscoveryQuery>,
}

impl QueryCatalog {
    pub fn new(general: Vec<DiscoveryQuery>, niche: Vec<DiscoveryQuery>) -> Result<Self> {
        if general.is_empty() || niche.is_empty() {
            return Err(ScoutrError::Config("query pools must not be empty".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for query in general.iter().chain(niche.iter()) {
            if !seen.insert(query.id.as_str()) {
                return Err(ScoutrError::Config(format!("duplicate query id: {}", query.id)));
            }
        }
        Ok(Self { general, niche })
    }

    /// Catalog from config, or the built-in one.
    pub fn from_config(queries: Option<&QueriesConfig>) -> Result<Self> {
        match queries {
            Some(q) => Self::new(q.general.clone(), q.niche.clone()),
            None => Ok(Self::builtin()),
        }
    }

    pub fn builtin() -> Self {
        let general = vec![
            DiscoveryQuery::new(
                "gen-sponsor",
                "Looking for sponsors",
                "(athlete OR \"pro athlete\") (\"looking for sponsors\" OR \"open to sponsorship\") -is:retweet lang:en",
            ),
            DiscoveryQuery::new(
                "gen-collab",
                "Open to collabs",
                "(athlete OR training) (\"dm for collabs\" OR \"open to collabs\") -is:retweet lang:en",
            ),
            DiscoveryQuery::new(
                "gen-race-day",
                "Race and match day",
                "(\"race day\" OR \"match day\" OR \"game day\") (sponsor OR partner) -is:retweet lang:en",
            ),
        ];
        let niche = vec![
            DiscoveryQuery::new(
                "niche-climbing",
                "Climbers",
                "(climbing OR bouldering) (sponsor OR ambassador) -is:retweet lang:en",
            ),
            DiscoveryQuery::new(
                "niche-trail",
                "Trail runners",
                "(\"trail running\" OR ultramarathon) (sponsor OR ambassador) -is:retweet lang:en",
            ),
            DiscoveryQuery::new(
                "niche-esports",
                "Esports",
                "(esports OR \"competitive gaming\") (sponsor OR partnership) -is:retweet lang:en",
            ),
            DiscoveryQuery::new(
                "niche-swim",
                "Swimmers",
                "(swimming OR triathlon) (sponsor OR ambassador) -is:retweet lang:en",
            ),
        ];
        Self { general, niche }
    }

    pub fn pool(&self, pool: QueryPool) -> &[DiscoveryQuery] {
        match pool {
            QueryPool::General => &self.general,
            QueryPool::Niche => &self.niche,
        }
    }

    pub fn general(&self) -> &[DiscoveryQuery] {
        &self.general
    }

    pub fn niche(&self) -> &[DiscoveryQuery] {
        &self.niche
    }
}

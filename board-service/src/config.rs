/// Configuration management for board-service
///
/// Everything is read from environment variables with parse-or-default
/// fallbacks; only an inconsistent combination is an error.
use serde::{Deserialize, Serialize};

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Cache (Redis) configuration
    pub cache: CacheConfig,
    /// Page-size defaults and clamp
    pub paging: PagingConfig,
    /// View-count deduplication window
    pub view_dedup: ViewDedupConfig,
    /// Per-entity sort-key allow-lists
    pub sorting: SortConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,
    /// Max connections in pool
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis URL
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagingConfig {
    /// Page size used when the caller passes zero
    pub default_size: u32,
    /// Hard upper bound applied to caller-supplied sizes
    pub max_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewDedupConfig {
    /// Seconds a (post, visitor) view fingerprint suppresses re-counting
    pub ttl_secs: u64,
}

/// Sort keys recognized per entity. Keys outside the composer's known set
/// are dropped at composer construction, so a typo here cannot widen the
/// ORDER BY surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortConfig {
    pub post_keys: Vec<String>,
    pub comment_keys: Vec<String>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/corkboard".to_string(),
                max_connections: 10,
            },
            cache: CacheConfig {
                url: "redis://localhost:6379".to_string(),
            },
            paging: PagingConfig {
                default_size: 20,
                max_size: 100,
            },
            view_dedup: ViewDedupConfig { ttl_secs: 60 },
            sorting: SortConfig {
                post_keys: default_post_sort_keys(),
                comment_keys: default_comment_sort_keys(),
            },
        }
    }
}

impl BoardConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let config = BoardConfig {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgresql://localhost/corkboard".to_string()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            },
            cache: CacheConfig {
                url: std::env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            },
            paging: PagingConfig {
                default_size: std::env::var("DEFAULT_PAGE_SIZE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(20),
                max_size: std::env::var("MAX_PAGE_SIZE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(100),
            },
            view_dedup: ViewDedupConfig {
                ttl_secs: std::env::var("VIEW_DEDUP_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            },
            sorting: SortConfig {
                post_keys: std::env::var("POST_SORT_KEYS")
                    .ok()
                    .map(|raw| parse_key_list(&raw))
                    .unwrap_or_else(default_post_sort_keys),
                comment_keys: std::env::var("COMMENT_SORT_KEYS")
                    .ok()
                    .map(|raw| parse_key_list(&raw))
                    .unwrap_or_else(default_comment_sort_keys),
            },
        };

        if config.paging.default_size == 0 {
            return Err("DEFAULT_PAGE_SIZE must be at least 1".to_string());
        }
        if config.paging.default_size > config.paging.max_size {
            return Err(format!(
                "DEFAULT_PAGE_SIZE ({}) cannot exceed MAX_PAGE_SIZE ({})",
                config.paging.default_size, config.paging.max_size
            ));
        }

        Ok(config)
    }
}

/// Split a comma separated key list, trimming whitespace and dropping empties.
fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

pub(crate) fn default_post_sort_keys() -> Vec<String> {
    vec![
        "created_at".to_string(),
        "updated_at".to_string(),
        "view_count".to_string(),
        "title".to_string(),
    ]
}

pub(crate) fn default_comment_sort_keys() -> Vec<String> {
    vec!["created_at".to_string(), "updated_at".to_string()]
}

use thiserror::Error;

/// Failure to obtain a page. The crawl driver degrades these to an empty
/// document; they never abort a pass.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

/// Errors that abort a whole invocation
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("unknown site: {0}")]
    UnknownSite(String),

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid base url for {site}: {source}")]
    BaseUrl {
        site: String,
        #[source]
        source: url::ParseError,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("could not read config {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Why a single extracted record was not persisted
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SkipReason {
    MissingSite,
    MissingLink,
    MissingCode,
    InvalidCategory(Option<String>),
    Persistence(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingSite => write!(f, "missing site"),
            SkipReason::MissingLink => write!(f, "missing link"),
            SkipReason::MissingCode => write!(f, "missing code"),
            SkipReason::InvalidCategory(Some(raw)) => write!(f, "invalid category {:?}", raw),
            SkipReason::InvalidCategory(None) => write!(f, "missing category"),
            SkipReason::Persistence(msg) => write!(f, "persistence failure: {}", msg),
        }
    }
}

//! Common API utilities and shared types

use serde::Deserialize;

use crate::services::blog::ListQuery;

/// `?genre=` query on the latest endpoint
#[derive(Debug, Default, Deserialize)]
pub struct GenreQuery {
    pub genre: Option<String>,
}

/// Listing query parameters
///
/// Kept as raw strings so that malformed numbers fall back to defaults
/// instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct ListBlogsQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub genre: Option<String>,
    pub search: Option<String>,
    pub since: Option<String>,
}

impl From<ListBlogsQuery> for ListQuery {
    fn from(q: ListBlogsQuery) -> Self {
        ListQuery {
            page: q.page,
            limit: q.limit,
            genre: q.genre,
            search: q.search,
            since: q.since,
        }
    }
}

/// Optional JSON body of the generate endpoint
#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    pub genre: Option<String>,
}

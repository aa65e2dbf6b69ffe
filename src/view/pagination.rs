/// Page/limit normalization and list-query planning
use crate::{
    db::{Filter, ObjectId, SortDirection, SortSpec},
    error::{ApiError, ApiResult},
};
use serde::Deserialize;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

/// Fields a video listing may be sorted by
pub const VIDEO_SORT_FIELDS: &[&str] = &["createdAt", "updatedAt", "views", "duration", "title"];

/// Bounded page window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePlan {
    pub page: u64,
    pub limit: u64,
    pub offset: u64,
}

fn positive(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n > 0)
        .map(|n| n as u64)
}

/// Coerce raw page/limit inputs into a usable window.
///
/// Anything non-numeric or non-positive falls back to the page and limit
/// defaults independently; the limit is capped at `MAX_LIMIT`.
pub fn normalize(raw_page: Option<&str>, raw_limit: Option<&str>) -> PagePlan {
    let page = positive(raw_page).unwrap_or(DEFAULT_PAGE);
    let limit = positive(raw_limit).unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

    PagePlan {
        page,
        limit,
        offset: (page - 1).saturating_mul(limit),
    }
}

/// Raw paging parameters as they arrive on the query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageParams {
    pub fn plan(&self) -> PagePlan {
        normalize(self.page.as_deref(), self.limit.as_deref())
    }
}

/// Raw video listing parameters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub query: Option<String>,
    pub sort_by: Option<String>,
    pub sort_type: Option<String>,
    pub user_id: Option<String>,
}

/// Filter, order and window for a video listing
#[derive(Debug, Clone, PartialEq)]
pub struct ListPlan {
    pub filter: Filter,
    pub sort: Vec<SortSpec>,
    pub page: PagePlan,
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

impl VideoListParams {
    /// Owner filter AND free-text filter, either optional; newest first unless
    /// the caller names a sort field
    pub fn plan(&self) -> ApiResult<ListPlan> {
        let mut filters = Vec::new();

        if let Some(user_id) = non_blank(self.user_id.as_deref()) {
            let owner = ObjectId::parse_param(user_id, "user")?;
            filters.push(Filter::eq("owner", owner));
        }

        if let Some(term) = non_blank(self.query.as_deref()) {
            filters.push(Filter::text(&["title", "description"], term));
        }

        let sort = match non_blank(self.sort_by.as_deref()) {
            None => SortSpec::newest_first(),
            Some(field) if VIDEO_SORT_FIELDS.contains(&field) => {
                let direction = match self.sort_type.as_deref().map(str::trim) {
                    Some(t) if t.eq_ignore_ascii_case("asc") => SortDirection::Ascending,
                    _ => SortDirection::Descending,
                };
                SortSpec::new(field, direction)
            }
            Some(field) => {
                return Err(ApiError::InvalidInput(format!("Cannot sort videos by '{}'", field)));
            }
        };

        Ok(ListPlan {
            filter: Filter::all_of(filters),
            sort: vec![sort],
            page: normalize(self.page.as_deref(), self.limit.as_deref()),
        })
    }
}

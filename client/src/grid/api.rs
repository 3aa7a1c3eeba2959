//! Content API client: fetches the items for a rectangle of grid cells

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::GridIndex;
use super::loader::HttpLoader;
use super::range::{FetchId, IndexRange};
use super::scheduler::{FetchError, FetchOutcome, FetchRequest, RangeFetcher};

/// One piece of content placed on the grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub row: i32,
    pub col: i32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl ContentItem {
    pub fn grid_index(&self) -> GridIndex {
        GridIndex::new(self.row, self.col)
    }
}

#[derive(Debug, Deserialize)]
struct GridResponse {
    items: Vec<ContentItem>,
}

/// URL of the grid endpoint for a rectangle of cells
pub fn grid_url(api_base: &str, range: &IndexRange) -> String {
    format!(
        "{}/api/grid?rowMin={}&rowMax={}&colMin={}&colMax={}",
        api_base.trim_end_matches('/'),
        range.rows.min,
        range.rows.max,
        range.cols.min,
        range.cols.max
    )
}

/// Decode a grid endpoint response body
pub fn parse_grid_response(body: &[u8]) -> Result<Vec<ContentItem>, FetchError> {
    serde_json::from_slice::<GridResponse>(body)
        .map(|response| response.items)
        .map_err(|e| FetchError::Decode(e.to_string()))
}

/// [`RangeFetcher`] backed by the content API
pub struct GridApiFetcher {
    loader: HttpLoader<FetchId>,
    api_base: String,
    /// Dispatches that never reached the network, reported on the next poll
    rejected: VecDeque<FetchOutcome<Vec<ContentItem>>>,
}

impl GridApiFetcher {
    pub fn new(api_base: &str, user_agent: &str) -> Self {
        Self {
            loader: HttpLoader::new(user_agent, 2),
            api_base: api_base.to_string(),
            rejected: VecDeque::new(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.loader.pending_count()
    }
}

impl RangeFetcher for GridApiFetcher {
    type Output = Vec<ContentItem>;

    fn dispatch(&mut self, id: FetchId, request: FetchRequest) {
        let Some(range) = request.bounds() else {
            self.rejected.push_back(FetchOutcome {
                id,
                result: Ok(Vec::new()),
            });
            return;
        };

        let url = grid_url(&self.api_base, &range);
        if !self.loader.request(id, url) {
            self.rejected.push_back(FetchOutcome {
                id,
                result: Err(FetchError::Disconnected),
            });
        }
    }

    fn poll(&mut self) -> Option<FetchOutcome<Vec<ContentItem>>> {
        if let Some(outcome) = self.rejected.pop_front() {
            return Some(outcome);
        }
        let (id, result) = self.loader.poll()?;
        Some(FetchOutcome {
            id,
            result: result.and_then(|body| parse_grid_response(&body)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::range::AxisRange;

    #[test]
    fn test_grid_url() {
        let range = IndexRange::new(AxisRange::new(-2, 10), AxisRange::new(3, 7));
        assert_eq!(
            grid_url("http://api.test/", &range),
            "http://api.test/api/grid?rowMin=-2&rowMax=10&colMin=3&colMax=7"
        );
    }

    #[test]
    fn test_parse_grid_response() {
        let body = br#"{"items":[
            {"id":"a1","row":0,"col":-1,"title":"Lamp","imageUrl":"https://localhost/lamp.jpg"},
            {"id":"b2","row":4,"col":2}
        ]}"#;
        let items = parse_grid_response(body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].grid_index(), GridIndex::new(0, -1));
        assert_eq!(items[0].image_url.as_deref(), Some("https://localhost/lamp.jpg"));
        assert_eq!(items[1].title, "");
        assert_eq!(items[1].image_url, None);
    }

    #[test]
    fn test_parse_rejects_malformed_body() {
        assert!(matches!(
            parse_grid_response(b"<html>"),
            Err(FetchError::Decode(_))
        ));
    }
}

use kb_storage::{models::ChunkRow, query::Page};

use crate::search::{SearchResponse, SearchResult};

/// `ceil(total / page_size)`, and 1 for an empty result set.
pub fn total_pages(total_results: u64, page_size: u32) -> u64 {
	if total_results == 0 {
		return 1;
	}

	total_results.div_ceil(u64::from(page_size.max(1)))
}

pub(crate) fn assemble(rows: Vec<ChunkRow>, page: Page, total_results: u64) -> SearchResponse {
	SearchResponse {
		success: true,
		results: Some(rows.into_iter().map(SearchResult::from).collect()),
		page: Some(page.number()),
		total_pages: Some(total_pages(total_results, page.size())),
		total_results: Some(total_results),
		error: None,
	}
}

/// Fallback page without a count statement: the page length stands in for the total and the
/// response reports a single page.
pub(crate) fn assemble_uncounted(rows: Vec<ChunkRow>, page: Page) -> SearchResponse {
	let total_results = rows.len() as u64;

	SearchResponse {
		success: true,
		results: Some(rows.into_iter().map(SearchResult::from).collect()),
		page: Some(page.number()),
		total_pages: Some(1),
		total_results: Some(total_results),
		error: None,
	}
}

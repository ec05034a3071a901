const SHEET_NAME_FORBIDDEN: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];
const SHEET_NAME_MAX_CHARS: usize = 30;

pub const MIN_COLUMN_WIDTH: usize = 7;
pub const MAX_COLUMN_WIDTH: usize = 70;

pub fn collection_url(ui_base_url: &str, collection_id: i64) -> String {
	format!("{ui_base_url}/collections/{collection_id}")
}

pub fn entity_url(ui_base_url: &str, entity_id: &str) -> String {
	format!("{ui_base_url}/entities/{entity_id}")
}

/// Worksheet name for a matched collection: `"{id}. {label}"` with characters the spreadsheet
/// format rejects replaced by spaces, trimmed, and cut to 30 characters.
pub fn sheet_name(collection_id: i64, label: &str) -> String {
	let raw = format!("{collection_id}. {label}");
	let replaced = raw
		.chars()
		.map(|ch| if SHEET_NAME_FORBIDDEN.contains(&ch) { ' ' } else { ch })
		.collect::<String>();
	let truncated = replaced.trim().chars().take(SHEET_NAME_MAX_CHARS).collect::<String>();

	// Names may not end with an apostrophe; truncation can expose one.
	truncated.trim_end_matches([' ', '\'']).to_string()
}

/// Internal hyperlink target pointing at the first data row of a detail sheet.
pub fn sheet_link(sheet_name: &str) -> String {
	format!("internal:'{}'!B3", sheet_name.replace('\'', "''"))
}

pub fn column_width(longest: usize) -> f64 {
	(longest + 1).clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH) as f64
}

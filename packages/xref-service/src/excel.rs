use rust_xlsxwriter::{ColNum, Format, FormatAlign, RowNum, Workbook, Worksheet};

use crate::{DetailSheet, RecordCells, Result, XrefReport};
use xref_domain::links;

pub const SUMMARY_SHEET: &str = "Summary";

const SUMMARY_HEADERS: [&str; 3] = ["Collection", "Matches", "Details"];
const DETAIL_HEADERS: [&str; 8] =
	["Score", "Name", "Type", "Country", "Source URL", "Name", "Type", "Country"];
const SEE_MATCHES: &str = "See matches";
const SCORE_FORMAT: &str = "0.00";
const FIRST_DATA_ROW: RowNum = 2;
const SOURCE_NAME_COL: ColNum = 1;
const SOURCE_URL_COL: ColNum = 4;
const MATCH_NAME_COL: ColNum = 5;
const LAST_DETAIL_COL: ColNum = 7;
// Longer links are rejected by the spreadsheet format; they are written as text instead.
const MAX_URL_CHARS: usize = 2_079;

struct Styles {
	header: Format,
	group: Format,
	score: Format,
}
impl Styles {
	fn new() -> Self {
		Self {
			header: Format::new().set_bold(),
			group: Format::new().set_bold().set_align(FormatAlign::Center),
			score: Format::new().set_num_format(SCORE_FORMAT),
		}
	}
}

/// Renders a resolved report into xlsx bytes: the summary sheet first, then one sheet per matched
/// collection in summary order.
pub fn render(report: &XrefReport) -> Result<Vec<u8>> {
	let styles = Styles::new();
	let mut workbook = Workbook::new();

	workbook.push_worksheet(summary_sheet(report, &styles)?);

	for sheet in &report.sheets {
		workbook.push_worksheet(detail_sheet(sheet, &styles)?);
	}

	Ok(workbook.save_to_buffer()?)
}

fn summary_sheet(report: &XrefReport, styles: &Styles) -> Result<Worksheet> {
	let mut worksheet = Worksheet::new();
	let mut longest = SUMMARY_HEADERS[0].chars().count();

	worksheet.set_name(SUMMARY_SHEET)?;

	for (col, title) in (0..).zip(SUMMARY_HEADERS) {
		worksheet.write_with_format(0, col, title, &styles.header)?;
	}

	worksheet.set_freeze_panes(1, 0)?;

	for (row, summary) in (1..).zip(&report.summary) {
		worksheet.write_url_with_text(row, 0, summary.url.as_str(), summary.label.as_str())?;
		worksheet.write_number(row, 1, summary.matches as f64)?;
		worksheet.write_url_with_text(
			row,
			2,
			links::sheet_link(&summary.sheet_name).as_str(),
			SEE_MATCHES,
		)?;

		longest = longest.max(summary.label.chars().count());
	}

	worksheet.set_column_width(0, links::column_width(longest))?;

	Ok(worksheet)
}

fn detail_sheet(sheet: &DetailSheet, styles: &Styles) -> Result<Worksheet> {
	let mut worksheet = Worksheet::new();
	let mut longest_source = DETAIL_HEADERS[SOURCE_NAME_COL as usize].chars().count();
	let mut longest_match = DETAIL_HEADERS[MATCH_NAME_COL as usize].chars().count();
	let mut last_row = FIRST_DATA_ROW - 1;

	worksheet.set_name(sheet.name.as_str())?;
	worksheet.merge_range(0, 0, 0, SOURCE_URL_COL, &sheet.source_label, &styles.group)?;
	worksheet.merge_range(
		0,
		MATCH_NAME_COL,
		0,
		LAST_DETAIL_COL,
		&sheet.match_label,
		&styles.group,
	)?;

	for (col, title) in (0..).zip(DETAIL_HEADERS) {
		worksheet.write_with_format(1, col, title, &styles.header)?;
	}

	worksheet.set_freeze_panes(FIRST_DATA_ROW, 0)?;

	for (row, detail) in (FIRST_DATA_ROW..).zip(&sheet.rows) {
		if let Some(score) = detail.score {
			worksheet.write_number_with_format(row, 0, score, &styles.score)?;
		}

		write_record(&mut worksheet, row, SOURCE_NAME_COL, &detail.source)?;

		if let Some(source_url) = detail.source.source_url.as_deref() {
			write_link(&mut worksheet, row, SOURCE_URL_COL, source_url)?;
		}

		write_record(&mut worksheet, row, MATCH_NAME_COL, &detail.matched)?;

		longest_source = longest_source.max(detail.source.name.chars().count());
		longest_match = longest_match.max(detail.matched.name.chars().count());
		last_row = row;
	}

	worksheet.autofilter(1, 0, last_row, LAST_DETAIL_COL)?;
	worksheet.set_column_width(SOURCE_NAME_COL, links::column_width(longest_source))?;
	worksheet.set_column_width(MATCH_NAME_COL, links::column_width(longest_match))?;

	Ok(worksheet)
}

fn write_record(
	worksheet: &mut Worksheet,
	row: RowNum,
	col: ColNum,
	cells: &RecordCells,
) -> Result<()> {
	worksheet.write_url_with_text(row, col, cells.url.as_str(), cells.name.as_str())?;
	worksheet.write_string(row, col + 1, cells.schema_label.as_str())?;
	worksheet.write_string(row, col + 2, cells.countries.as_str())?;

	Ok(())
}

fn write_link(worksheet: &mut Worksheet, row: RowNum, col: ColNum, url: &str) -> Result<()> {
	if is_linkable(url) {
		worksheet.write_url_with_text(row, col, url, url)?;
	} else {
		worksheet.write_string(row, col, url)?;
	}

	Ok(())
}

/// A single http(s) URL short enough for a spreadsheet hyperlink.
fn is_linkable(url: &str) -> bool {
	(url.starts_with("http://") || url.starts_with("https://"))
		&& !url.contains(char::is_whitespace)
		&& url.chars().count() <= MAX_URL_CHARS
}

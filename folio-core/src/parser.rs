//! Conversion between the flat text format and [`Document`].
//!
//! Pages are separated by a line consisting of exactly [`PAGE_SEPARATOR`]. Parsing trims every
//! line and drops blank ones, so it is lossy with respect to indentation and empty lines inside
//! a page. There is no escape for a literal `---` line.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const PAGE_SEPARATOR: &str = "---";

static FILE_NAME_UNSAFE: Lazy<Regex> =
    Lazy::new(|| Regex::new("[^A-Za-z0-9]").expect("valid file name pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    /// 1-based.
    pub page_number: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Document {
    pub title: String,
    pub pages: Vec<String>,
    pub table_of_contents: Vec<TocEntry>,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

pub fn parse(raw: &str, title: &str) -> Document {
    let mut pages = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if line == PAGE_SEPARATOR {
            if !current.is_empty() {
                pages.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        pages.push(current.join("\n"));
    }

    let table_of_contents = table_of_contents(pages.len());
    Document {
        title: title.to_string(),
        pages,
        table_of_contents,
    }
}

pub fn serialize<S: AsRef<str>>(pages: &[S]) -> String {
    let separator = format!("\n{PAGE_SEPARATOR}\n");
    pages
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(&separator)
}

pub fn table_of_contents(page_count: usize) -> Vec<TocEntry> {
    (1..=page_count)
        .map(|page_number| TocEntry {
            title: format!("Page {page_number}"),
            page_number,
        })
        .collect()
}

pub fn export_file_name(title: &str) -> String {
    if title.is_empty() {
        return "untitled.txt".to_string();
    }
    format!("{}.txt", FILE_NAME_UNSAFE.replace_all(title, "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_pages_on_separator_lines() {
        let doc = parse("Intro line\n---\nBody line", "Notes");
        assert_eq!(doc.title, "Notes");
        assert_eq!(doc.pages, vec!["Intro line", "Body line"]);
        assert_eq!(
            doc.table_of_contents,
            vec![
                TocEntry {
                    title: "Page 1".into(),
                    page_number: 1
                },
                TocEntry {
                    title: "Page 2".into(),
                    page_number: 2
                },
            ]
        );
    }

    #[test]
    fn parse_trims_lines_and_drops_blank_ones() {
        let doc = parse("  first  \n\n\tsecond\n   \n---\n\n third\r\n", "t");
        assert_eq!(doc.pages, vec!["first\nsecond", "third"]);
    }

    #[test]
    fn parse_empty_input_has_no_pages() {
        let doc = parse("", "empty");
        assert!(doc.pages.is_empty());
        assert!(doc.table_of_contents.is_empty());

        let blank = parse("\n   \n\n", "blank");
        assert_eq!(blank.page_count(), 0);
    }

    #[test]
    fn parse_without_separator_is_single_page() {
        let doc = parse("one\ntwo", "t");
        assert_eq!(doc.pages, vec!["one\ntwo"]);
        assert_eq!(doc.table_of_contents.len(), 1);
    }

    #[test]
    fn parse_ignores_separators_without_content() {
        let doc = parse("---\n---\nonly\n---\n", "t");
        assert_eq!(doc.pages, vec!["only"]);
    }

    #[test]
    fn parse_treats_indented_separator_as_separator() {
        let doc = parse("a\n   ---   \nb", "t");
        assert_eq!(doc.pages, vec!["a", "b"]);
    }

    #[test]
    fn serialize_round_trips_well_formed_pages() {
        let pages = vec![
            "Chapter one\nstarts here".to_string(),
            "middle".to_string(),
            "a line with --- inside".to_string(),
        ];
        let raw = serialize(&pages);
        assert_eq!(
            raw,
            "Chapter one\nstarts here\n---\nmiddle\n---\na line with --- inside"
        );
        assert_eq!(parse(&raw, "t").pages, pages);
    }

    #[test]
    fn round_trip_holds_across_page_shapes() {
        let cases: Vec<Vec<&str>> = vec![
            vec!["single page"],
            vec!["multi\nline\nsingle page"],
            (1..=12).map(|_| "repeated page").collect(),
            vec!["one", "two", "three", "four", "five"],
            vec!["-- two dashes", "--", "----", "---- four dashes"],
            vec!["a ---", "--- b", "x---y"],
            vec!["first\n--\nsecond line", "----\nafter dashes"],
        ];
        for pages in cases {
            let raw = serialize(&pages);
            let doc = parse(&raw, "t");
            assert_eq!(doc.pages, pages, "round trip failed for {raw:?}");
            assert_eq!(doc.table_of_contents.len(), pages.len());
        }
    }

    #[test]
    fn serialize_of_no_pages_is_empty() {
        let pages: Vec<String> = Vec::new();
        assert_eq!(serialize(&pages), "");
    }

    #[test]
    fn export_file_name_replaces_non_alphanumerics() {
        assert_eq!(export_file_name("My Notes (v2).md"), "My_Notes__v2__md.txt");
        assert_eq!(export_file_name("plain"), "plain.txt");
        assert_eq!(export_file_name("été"), "_t_.txt");
        assert_eq!(export_file_name(""), "untitled.txt");
    }
}

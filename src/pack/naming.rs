//! Archive display names.
//!
//! Files are packed into one flat archive, so two sources called `report.pdf`
//! from different folders must not overwrite each other. Every distinct source
//! with a repeated name gets a `(N)` suffix, and the OCR files produced from it
//! carry the same suffix so the pair stays recognisable:
//!
//! ```text
//! /A/report.pdf -> report.pdf      report.txt
//! /B/report.pdf -> report(1).pdf   report(1).txt
//! ```

use std::collections::HashMap;

use crate::model::FileRecord;

/// Marker inserted into OCR names whose source file no longer exists.
pub const DEFAULT_MISSING_SOURCE_MARKER: &str = "source_missing";

/// Split a file name into stem and extension (`.ext`, possibly empty).
///
/// Leading dots belong to the stem, so `.profile` has no extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    let leading_dots = name.len() - name.trim_start_matches('.').len();
    match name.rfind('.') {
        Some(idx) if idx > leading_dots => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Longest file name, in bytes, most filesystems accept (`NAME_MAX`).
pub const MAX_NAME_BYTES: usize = 255;

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Insert `tag` between stem and extension, shortening the stem so the
/// result stays within [`MAX_NAME_BYTES`]. The extension is dropped only when
/// it leaves no room for the tag.
fn decorate(name: &str, tag: &str) -> String {
    let (mut stem, mut ext) = split_extension(name);
    if tag.len() + ext.len() >= MAX_NAME_BYTES {
        stem = name;
        ext = "";
    }
    let budget = MAX_NAME_BYTES.saturating_sub(tag.len() + ext.len());
    let tag = truncate_on_char_boundary(tag, MAX_NAME_BYTES);
    format!("{}{}{}", truncate_on_char_boundary(stem, budget), tag, ext)
}

/// Shorten an over-long name to [`MAX_NAME_BYTES`], keeping its extension.
pub fn fit_name(name: &str) -> String {
    if name.len() <= MAX_NAME_BYTES {
        return name.to_string();
    }
    decorate(name, "")
}

/// `name.ext` -> `name(N).ext`; unchanged for `N == 0`.
pub fn with_sequence(name: &str, number: usize) -> String {
    if number == 0 {
        return name.to_string();
    }
    decorate(name, &format!("({})", number))
}

/// Apply the sequence number to an OCR name by rewriting the embedded source
/// name, so `report.pdf.txt` becomes `report(1).pdf.txt`. OCR names that do
/// not embed the source name are suffixed directly.
pub fn ocr_with_sequence(ocr_name: &str, source_name: &str, number: usize) -> String {
    if number == 0 {
        return ocr_name.to_string();
    }
    if !source_name.is_empty() && ocr_name.contains(source_name) {
        ocr_name.replace(source_name, &with_sequence(source_name, number))
    } else {
        with_sequence(ocr_name, number)
    }
}

/// `name.ext` -> `name_<marker>.ext`.
pub fn with_missing_marker(name: &str, marker: &str) -> String {
    decorate(name, &format!("_{}", marker))
}

/// Identity of a source for numbering: its physical path, or the logical
/// path when it did not resolve.
fn source_key(record: &FileRecord) -> String {
    match &record.source_real_path {
        Some(path) => format!("p:{}", path.display()),
        None => format!("l:{}", record.source_path),
    }
}

/// Rewrite `ocr_name` and `source_name` of every record in place.
///
/// Numbering follows input order: the first source with a given name keeps
/// it, each further *distinct* source with that name takes the next number.
/// A source referenced by several records is numbered once and all its OCR
/// files share that number. `source_exists` decides whether an OCR name also
/// gets the missing-source marker.
pub fn assign_names<F>(records: &mut [FileRecord], missing_marker: &str, source_exists: F)
where
    F: Fn(&FileRecord) -> bool,
{
    // source name -> number of distinct sources seen with that name
    let mut name_counts: HashMap<String, usize> = HashMap::new();
    // source identity -> sequence number it was given
    let mut assigned: HashMap<String, usize> = HashMap::new();

    for record in records.iter_mut() {
        let number = *assigned.entry(source_key(record)).or_insert_with(|| {
            let count = name_counts.entry(record.source_name.clone()).or_insert(0);
            let number = *count;
            *count += 1;
            number
        });

        let missing = !source_exists(record);

        record.ocr_name = ocr_with_sequence(&record.ocr_name, &record.source_name, number);
        record.source_name = with_sequence(&record.source_name, number);

        if missing {
            record.ocr_name = with_missing_marker(&record.ocr_name, missing_marker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn record(folder: &str, ocr_name: &str, source_name: &str) -> FileRecord {
        let mut r = FileRecord::new(
            format!("/{}/ocr/{}", folder, ocr_name),
            ocr_name,
            format!("/{}/{}", folder, source_name),
            source_name,
        );
        r.ocr_real_path = Some(PathBuf::from(format!("/phys{}", r.ocr_path)));
        r.source_real_path = Some(PathBuf::from(format!("/phys{}", r.source_path)));
        r
    }

    fn names(records: &[FileRecord]) -> Vec<(&str, &str)> {
        records
            .iter()
            .map(|r| (r.ocr_name.as_str(), r.source_name.as_str()))
            .collect()
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("report.pdf"), ("report", ".pdf"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".profile"), (".profile", ""));
        assert_eq!(split_extension("..a.b"), ("..a", ".b"));
        assert_eq!(split_extension("a."), ("a", "."));
    }

    #[test]
    fn test_with_sequence() {
        assert_eq!(with_sequence("report.pdf", 0), "report.pdf");
        assert_eq!(with_sequence("report.pdf", 2), "report(2).pdf");
        assert_eq!(with_sequence("README", 1), "README(1)");
    }

    #[test]
    fn test_ocr_with_sequence_rewrites_embedded_source() {
        assert_eq!(
            ocr_with_sequence("report.pdf.txt", "report.pdf", 1),
            "report(1).pdf.txt"
        );
        assert_eq!(ocr_with_sequence("scan.txt", "report.pdf", 1), "scan(1).txt");
        assert_eq!(ocr_with_sequence("scan.txt", "", 1), "scan(1).txt");
    }

    #[test]
    fn test_with_missing_marker() {
        assert_eq!(
            with_missing_marker("report(1).txt", "source_missing"),
            "report(1)_source_missing.txt"
        );
    }

    #[test]
    fn test_decorated_names_fit_name_max() {
        let long = format!("{}.txt", "a".repeat(240));

        let marked = with_missing_marker(&long, DEFAULT_MISSING_SOURCE_MARKER);
        assert_eq!(marked.len(), MAX_NAME_BYTES);
        assert_eq!(marked, format!("{}_source_missing.txt", "a".repeat(236)));

        let numbered = with_sequence(&format!("{}.txt", "b".repeat(251)), 12);
        assert_eq!(numbered.len(), MAX_NAME_BYTES);
        assert!(numbered.ends_with("b(12).txt"));
    }

    #[test]
    fn test_decorate_truncates_on_char_boundary() {
        // Two-byte chars: the budget of 247 bytes lands inside one
        let name = format!("{}.txt", "é".repeat(125));
        let numbered = with_sequence(&name, 12);

        assert!(numbered.len() <= MAX_NAME_BYTES);
        assert!(numbered.ends_with("é(12).txt"));
        assert_eq!(numbered.len(), 246 + "(12).txt".len());
    }

    #[test]
    fn test_fit_name() {
        assert_eq!(fit_name("short.txt"), "short.txt");

        let fitted = fit_name(&format!("{}.pdf", "x".repeat(300)));
        assert_eq!(fitted.len(), MAX_NAME_BYTES);
        assert!(fitted.ends_with("x.pdf"));

        // An absurd extension is sacrificed rather than the whole stem
        let fitted = fit_name(&format!("stem.{}", "e".repeat(300)));
        assert_eq!(fitted.len(), MAX_NAME_BYTES);
        assert!(fitted.starts_with("stem.eee"));
    }

    #[test]
    fn test_same_name_different_folders() {
        let mut records = vec![
            record("A", "report.pdf.txt", "report.pdf"),
            record("B", "report.pdf.txt", "report.pdf"),
            record("C", "report.pdf.txt", "report.pdf"),
        ];
        assign_names(&mut records, DEFAULT_MISSING_SOURCE_MARKER, |_| true);

        assert_eq!(
            names(&records),
            vec![
                ("report.pdf.txt", "report.pdf"),
                ("report(1).pdf.txt", "report(1).pdf"),
                ("report(2).pdf.txt", "report(2).pdf"),
            ]
        );
    }

    #[test]
    fn test_shared_source_numbered_once() {
        // Two OCR outputs of /B/a.jpg, interleaved with another a.jpg
        let mut records = vec![
            record("A", "a.jpg.txt", "a.jpg"),
            record("B", "a.jpg.txt", "a.jpg"),
            record("C", "a.jpg.txt", "a.jpg"),
            record("B", "a.jpg.pdf", "a.jpg"),
        ];
        assign_names(&mut records, DEFAULT_MISSING_SOURCE_MARKER, |_| true);

        assert_eq!(
            names(&records),
            vec![
                ("a.jpg.txt", "a.jpg"),
                ("a(1).jpg.txt", "a(1).jpg"),
                ("a(2).jpg.txt", "a(2).jpg"),
                ("a(1).jpg.pdf", "a(1).jpg"),
            ]
        );
    }

    #[test]
    fn test_missing_source_marker_composes_with_sequence() {
        let mut records = vec![
            record("A", "report.pdf.txt", "report.pdf"),
            record("B", "report.pdf.txt", "report.pdf"),
        ];
        assign_names(&mut records, "gone", |r| !r.source_path.starts_with("/B/"));

        assert_eq!(records[0].ocr_name, "report.pdf.txt");
        assert_eq!(records[1].ocr_name, "report(1).pdf_gone.txt");
        assert_eq!(records[1].source_name, "report(1).pdf");
    }

    #[test]
    fn test_unresolved_sources_keyed_by_logical_path() {
        let mut a = record("A", "x.txt", "x.jpg");
        let mut b = record("B", "x.txt", "x.jpg");
        a.source_real_path = None;
        b.source_real_path = None;
        let mut records = vec![a, b];
        assign_names(&mut records, DEFAULT_MISSING_SOURCE_MARKER, |_| false);

        assert_eq!(
            names(&records),
            vec![
                ("x_source_missing.txt", "x.jpg"),
                ("x(1)_source_missing.txt", "x(1).jpg"),
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_naming_is_deterministic(
            picks in prop::collection::vec((0usize..4, 0usize..3), 0..24)
        ) {
            let build = || -> Vec<FileRecord> {
                picks
                    .iter()
                    .map(|(folder, name)| {
                        let source = format!("n{}.pdf", name);
                        record(&format!("F{}", folder), &format!("{}.txt", source), &source)
                    })
                    .collect()
            };

            let mut first = build();
            let mut second = build();
            assign_names(&mut first, DEFAULT_MISSING_SOURCE_MARKER, |_| true);
            assign_names(&mut second, DEFAULT_MISSING_SOURCE_MARKER, |_| true);
            prop_assert_eq!(&first, &second);

            // Distinct sources never share a final source name
            let mut by_name: HashMap<&str, &str> = HashMap::new();
            for r in &first {
                let prev = by_name.insert(r.source_name.as_str(), r.source_path.as_str());
                prop_assert!(prev.map_or(true, |p| p == r.source_path));
            }
        }
    }
}

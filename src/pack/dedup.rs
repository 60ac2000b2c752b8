//! Drop records that point at an OCR file already selected by another task.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::model::{FileRecord, Identity};
use crate::share::{PathResolver, ShareConfigError};

fn resolve(
    resolver: &dyn PathResolver,
    logical: &str,
    identity: &Identity,
) -> Result<Option<PathBuf>, ShareConfigError> {
    Ok(resolver
        .to_physical_path(logical, identity)?
        .filter(|path| !path.as_os_str().is_empty()))
}

/// Keep the first record for each distinct physical OCR path, in input order.
///
/// Kept records get `ocr_real_path` and `source_real_path` filled in. Records
/// whose OCR path does not resolve are dropped. A share configuration error
/// aborts the whole pass.
pub fn dedup_records(
    records: Vec<FileRecord>,
    resolver: &dyn PathResolver,
    identity: &Identity,
) -> Result<Vec<FileRecord>, ShareConfigError> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut kept = Vec::with_capacity(records.len());

    for mut record in records {
        let Some(ocr_real) = resolve(resolver, &record.ocr_path, identity)? else {
            tracing::debug!(ocr_path = %record.ocr_path, "OCR path did not resolve, dropping");
            continue;
        };
        if !seen.insert(ocr_real.clone()) {
            continue;
        }

        // Source is only resolved for records that survive
        record.source_real_path = resolve(resolver, &record.source_path, identity)?;
        record.ocr_real_path = Some(ocr_real);
        kept.push(record);
    }

    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserType;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// `/S/x` -> `/phys/x`, with `/Alias` as a second name for `/S`.
    /// `/Gone/...` does not resolve; `/Broken/...` is a config error.
    struct FakeResolver {
        calls: AtomicUsize,
    }

    impl FakeResolver {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl PathResolver for FakeResolver {
        fn to_physical_path(
            &self,
            logical: &str,
            _identity: &Identity,
        ) -> Result<Option<PathBuf>, ShareConfigError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if logical.starts_with("/Broken/") {
                return Err(ShareConfigError::new("smb.conf", 7, "bad"));
            }
            if logical.starts_with("/Empty/") {
                return Ok(Some(PathBuf::new()));
            }
            let rest = logical
                .strip_prefix("/S/")
                .or_else(|| logical.strip_prefix("/Alias/"));
            Ok(rest.map(|r| PathBuf::from("/phys").join(r)))
        }
    }

    fn identity() -> Identity {
        Identity::new(0, "admin", UserType::Local)
    }

    fn record(ocr_path: &str, source_path: &str) -> FileRecord {
        FileRecord::new(ocr_path, "o.txt", source_path, "s.pdf")
    }

    #[test]
    fn test_same_physical_ocr_kept_once() {
        let records = vec![
            record("/S/a.txt", "/S/a.pdf"),
            record("/Alias/a.txt", "/Alias/a.pdf"),
            record("/S/b.txt", "/S/b.pdf"),
        ];

        let kept = dedup_records(records, &FakeResolver::new(), &identity()).unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].ocr_path, "/S/a.txt");
        assert_eq!(kept[0].ocr_real_path, Some(PathBuf::from("/phys/a.txt")));
        assert_eq!(kept[0].source_real_path, Some(PathBuf::from("/phys/a.pdf")));
        assert_eq!(kept[1].ocr_path, "/S/b.txt");
    }

    #[test]
    fn test_unresolved_ocr_dropped_silently() {
        let records = vec![
            record("/Gone/a.txt", "/S/a.pdf"),
            record("/Empty/a.txt", "/S/a.pdf"),
            record("/S/b.txt", "/Gone/b.pdf"),
        ];

        let kept = dedup_records(records, &FakeResolver::new(), &identity()).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].ocr_path, "/S/b.txt");
        assert_eq!(kept[0].source_real_path, None);
    }

    #[test]
    fn test_config_error_propagates() {
        let records = vec![record("/S/a.txt", "/S/a.pdf"), record("/S/b.txt", "/Broken/b.pdf")];

        let err = dedup_records(records, &FakeResolver::new(), &identity()).unwrap_err();
        assert_eq!(err.line, 7);
    }

    #[test]
    fn test_source_not_resolved_for_dropped_records() {
        let resolver = FakeResolver::new();
        let records = vec![record("/S/a.txt", "/S/a.pdf"), record("/S/a.txt", "/Broken/a.pdf")];

        // The duplicate's broken source path is never looked at
        let kept = dedup_records(records, &resolver, &identity()).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 3);
    }

    fn arb_records() -> impl Strategy<Value = Vec<FileRecord>> {
        let path = prop_oneof![
            "[a-c]".prop_map(|n| format!("/S/{}.txt", n)),
            "[a-c]".prop_map(|n| format!("/Alias/{}.txt", n)),
            "[a-c]".prop_map(|n| format!("/Gone/{}.txt", n)),
        ];
        prop::collection::vec(path.prop_map(|p| record(&p, "/S/src.pdf")), 0..16)
    }

    proptest! {
        #[test]
        fn prop_dedup_is_idempotent(records in arb_records()) {
            let resolver = FakeResolver::new();
            let once = dedup_records(records, &resolver, &identity()).unwrap();
            let twice = dedup_records(once.clone(), &resolver, &identity()).unwrap();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_dedup_output_has_unique_physical_paths(records in arb_records()) {
            let kept = dedup_records(records, &FakeResolver::new(), &identity()).unwrap();
            let unique: HashSet<_> = kept.iter().map(|r| r.ocr_real_path.clone()).collect();
            prop_assert_eq!(unique.len(), kept.len());
        }
    }
}

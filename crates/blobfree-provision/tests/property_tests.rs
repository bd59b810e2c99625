//! Property-based tests for manifest and fstab parsing.

#[cfg(test)]
mod property_tests {
    use blobfree_provision::fstab::parse_fstab;
    use blobfree_provision::manifest::BlobMapping;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn segment() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,7}"
    }

    fn rel_path() -> impl Strategy<Value = String> {
        prop::collection::vec(segment(), 1..4).prop_map(|parts| parts.join("/"))
    }

    fn manifest_line() -> impl Strategy<Value = String> {
        prop_oneof![
            (rel_path(), rel_path(), any::<bool>())
                .prop_map(|(s, t, rooted)| if rooted { format!("/{s}:{t}") } else { format!("{s}:{t}") }),
            rel_path(),
            rel_path().prop_map(|s| format!("{s}:")),
            rel_path().prop_map(|t| format!(":{t}")),
            Just(String::new()),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        // --- Manifest: sources are unique, relative and in first-seen order ---

        #[test]
        fn manifest_sources_unique_in_order(lines in prop::collection::vec(manifest_line(), 0..24)) {
            let text = lines.join("\n");
            let mapping = BlobMapping::parse(&text);

            let mut expected = Vec::new();
            let mut seen = HashSet::new();
            for line in &lines {
                let mut parts = line.split(':');
                let source = parts.next().unwrap_or_default().trim_start_matches('/');
                let target = parts.next().unwrap_or_default();
                if !source.is_empty() && !target.is_empty() && seen.insert(source.to_string()) {
                    expected.push(source.to_string());
                }
            }

            let sources: Vec<String> = mapping.entries().iter().map(|e| e.source.clone()).collect();
            prop_assert_eq!(sources, expected);
            for entry in mapping.entries() {
                prop_assert!(!entry.source.starts_with('/'));
                prop_assert!(!entry.target.is_empty());
                prop_assert_eq!(entry.remote_path(), format!("/{}", entry.source));
            }
        }

        // --- Manifest: every non-blank line is either kept or counted ---

        #[test]
        fn manifest_accounts_for_every_line(lines in prop::collection::vec(manifest_line(), 0..24)) {
            let mapping = BlobMapping::parse(&lines.join("\n"));
            let non_blank = lines.iter().filter(|l| !l.trim().is_empty()).count();
            prop_assert_eq!(mapping.len() + mapping.discarded(), non_blank);
        }

        // --- Fstab: lines without a /dev prefix never produce entries ---

        #[test]
        fn fstab_ignores_non_device_lines(lines in prop::collection::vec("[a-z#][a-z0-9 /._-]{0,30}", 0..12)) {
            prop_assert!(parse_fstab(&lines.join("\n")).is_empty());
        }

        // --- Fstab: well-formed lines map to image and partition names ---

        #[test]
        fn fstab_names_follow_fields(
            partition in "[a-z][a-z0-9]{0,10}",
            mount in segment(),
            indent in " {0,3}",
        ) {
            let line = format!("{indent}/dev/block/by-name/{partition}   /{mount} ext4 ro wait");
            let entries = parse_fstab(&line);
            prop_assert_eq!(entries.len(), 1);
            let entry = &entries[0];
            prop_assert_eq!(entry.partition(), partition.as_str());
            prop_assert_eq!(entry.image_name(), format!("{mount}.img"));
        }
    }
}

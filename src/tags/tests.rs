use super::*;
use proptest::prelude::*;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use tempfile::{tempdir, TempDir};

/// A source tree with `a.c` (30 lines, `int main(){` on 10, `void foo(){` on 20)
/// and `b.c` (5 lines).
fn source_tree() -> TempDir {
    let dir = tempdir().unwrap();
    let mut a = String::new();
    for n in 1..=30 {
        match n {
            10 => a.push_str("int main(){\n"),
            20 => a.push_str("void foo(){\n"),
            _ => a.push_str(&format!("/* a line {} */\r\n", n)),
        }
    }
    fs::write(dir.path().join("a.c"), a).unwrap();
    let b: String = (1..=5).map(|n| format!("b line {}\n", n)).collect();
    fs::write(dir.path().join("b.c"), b).unwrap();
    dir
}

fn records(store: &mut TagStore, pattern: Option<&str>, flags: SearchFlags) -> Vec<TagRecord> {
    store
        .iter(pattern, flags)
        .map(|e| e.unwrap().into_record().unwrap())
        .collect()
}

fn no_source() -> SearchFlags {
    SearchFlags {
        no_source: true,
        ..SearchFlags::default()
    }
}

fn put_all(store: &mut TagStore, lines: &[&str]) {
    for line in lines {
        let tag = line.split_whitespace().next().unwrap();
        store.put(tag, line).unwrap();
    }
}

#[test]
fn test_compact_scenario() {
    let tree = source_tree();
    let root = tree.path();
    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Create).unwrap();
    assert!(store.format().compact);
    put_all(&mut store, &["main 10 a.c int main(){", "foo 20 a.c void foo(){"]);
    store.close().unwrap();

    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Read).unwrap();
    let found = records(&mut store, Some("main"), SearchFlags::default());
    assert_eq!(
        found,
        vec![TagRecord {
            tag: "main".to_string(),
            line: 10,
            path: "a.c".to_string(),
            text: "int main(){".to_string(),
        }]
    );

    let all = records(&mut store, Some(".*"), SearchFlags::default());
    let summary: Vec<_> = all.iter().map(|r| (r.tag.as_str(), r.line)).collect();
    assert_eq!(summary, vec![("foo", 20), ("main", 10)]);
    assert_eq!(all[0].text, "void foo(){");
    assert_eq!(all[0].to_string(), "foo                20 a.c              void foo(){");
}

#[test]
fn test_standard_round_trip_with_abbreviation() {
    let tree = source_tree();
    let root = tree.path();
    let mut store = TagStore::open(root, None, DbKind::Definitions, OpenMode::Create).unwrap();
    assert_eq!(
        store.format(),
        Format {
            compact: false,
            compressed: true
        }
    );
    put_all(
        &mut store,
        &[
            "MAX 3 a.c #define MAX   (a@b)  /* MAX */",
            "main 10 a.c int main(){",
            "helper 4 b.c static void helper(void) { return; }",
        ],
    );
    store.close().unwrap();

    let mut store = TagStore::open(root, None, DbKind::Definitions, OpenMode::Read).unwrap();
    let found = records(&mut store, Some("MAX"), SearchFlags::default());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].line, 3);
    assert_eq!(found[0].path, "a.c");
    assert_eq!(found[0].text, "#define MAX   (a@b)  /* MAX */");

    let found = records(&mut store, Some("helper"), SearchFlags::default());
    assert_eq!(found[0].text, "static void helper(void) { return; }");
    assert_eq!(found[0].path, "b.c");

    // stored text is abbreviated
    let raw = store.db.first(Scan::exact("MAX")).unwrap().unwrap();
    assert!(raw.contains("@d @n"));
}

#[test]
fn test_compact_lines_ascending_once_each() {
    let tree = source_tree();
    let root = tree.path();
    let mut store = TagStore::open(root, Some(root), DbKind::References, OpenMode::Create).unwrap();
    put_all(
        &mut store,
        &[
            "x 9 a.c t",
            "y 2 a.c t",
            "x 3 a.c t",
            "x 27 a.c t",
            "y 1 a.c t",
            "x 12 a.c t",
        ],
    );
    store.close().unwrap();

    let mut store = TagStore::open(root, Some(root), DbKind::References, OpenMode::Read).unwrap();
    let lines: Vec<u32> = records(&mut store, Some("x"), no_source())
        .iter()
        .map(|r| r.line)
        .collect();
    assert_eq!(lines, vec![3, 9, 12, 27]);

    // one stored record per (file, tag)
    assert_eq!(store.count().unwrap(), 2);
}

#[test]
fn test_duplicate_line_shares_one_read() {
    let tree = source_tree();
    let root = tree.path();
    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Create).unwrap();
    put_all(&mut store, &["alpha 20 a.c t", "beta 20 a.c t"]);
    store.close().unwrap();

    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Read).unwrap();
    let found = records(&mut store, None, SearchFlags::default());
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].text, "void foo(){");
    assert_eq!(found[0].text, found[1].text);
    assert_eq!(store.source_lines_read(), 20);
}

#[test]
fn test_unique_write_flag() {
    let tree = source_tree();
    let root = tree.path();
    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Create).unwrap();
    store.set_write_flags(WriteFlags {
        unique: true,
        extract_method: false,
    });
    put_all(&mut store, &["v 4 b.c t", "v 4 b.c t", "v 2 b.c t"]);
    store.close().unwrap();

    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Read).unwrap();
    let found = records(&mut store, Some("v"), SearchFlags::default());
    let lines: Vec<_> = found.iter().map(|r| r.line).collect();
    assert_eq!(lines, vec![2, 4]);
    assert_eq!(found[1].text, "b line 4");
}

#[test]
fn test_repeated_line_without_unique() {
    let tree = source_tree();
    let root = tree.path();
    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Create).unwrap();
    put_all(&mut store, &["v 4 b.c t", "v 4 b.c t"]);
    store.close().unwrap();

    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Read).unwrap();
    let found = records(&mut store, Some("v"), SearchFlags::default());
    assert_eq!(found.len(), 2);
    assert_eq!(found[0], found[1]);
    assert_eq!(store.source_lines_read(), 4);
}

#[test]
fn test_extract_method_key() {
    let tree = source_tree();
    let root = tree.path();
    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Create).unwrap();
    store.set_write_flags(WriteFlags {
        unique: false,
        extract_method: true,
    });
    store.put("Shape::area", "Shape::area 3 b.c t").unwrap();
    store.close().unwrap();

    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Read).unwrap();
    let found = records(&mut store, Some("area"), SearchFlags::default());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].tag, "Shape::area");
    assert_eq!(found[0].text, "b line 3");
}

#[test]
fn test_long_list_is_split_and_recovered() {
    let tree = source_tree();
    let root = tree.path();
    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Create).unwrap();
    for n in (1..=4000).rev() {
        store.put("big", &format!("big {} a.c t", n)).unwrap();
    }
    store.close().unwrap();

    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Read).unwrap();
    assert!(store.count().unwrap() > 1);
    let lines: Vec<u32> = records(&mut store, Some("big"), no_source())
        .iter()
        .map(|r| r.line)
        .collect();
    assert_eq!(lines, (1..=4000).collect::<Vec<_>>());
}

#[test]
fn test_interleaved_paths_are_not_merged() {
    let tree = source_tree();
    let root = tree.path();
    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Create).unwrap();
    put_all(&mut store, &["x 5 a.c t", "x 1 b.c t", "x 2 a.c t"]);
    store.close().unwrap();

    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Read).unwrap();
    assert_eq!(store.count().unwrap(), 3);
    let found: Vec<_> = records(&mut store, Some("x"), no_source())
        .into_iter()
        .map(|r| (r.path, r.line))
        .collect();
    assert_eq!(
        found,
        vec![
            ("a.c".to_string(), 5),
            ("b.c".to_string(), 1),
            ("a.c".to_string(), 2)
        ]
    );
}

#[test]
fn test_version_gate() {
    let tree = source_tree();
    let root = tree.path();
    let store = TagStore::open(root, None, DbKind::Definitions, OpenMode::Create).unwrap();
    assert_eq!(store.version(), FORMAT_VERSION);
    store.close().unwrap();

    let set_version = |value: Option<&str>| {
        let conn = rusqlite::Connection::open(root.join("GTAGS")).unwrap();
        match value {
            Some(v) => conn
                .execute(
                    "INSERT OR REPLACE INTO meta (name, value) VALUES ('version', ?1)",
                    [v],
                )
                .unwrap(),
            None => conn
                .execute("DELETE FROM meta WHERE name = 'version'", [])
                .unwrap(),
        };
    };

    set_version(Some("5"));
    let err = TagStore::open(root, None, DbKind::Definitions, OpenMode::Read).err().unwrap();
    assert!(matches!(err, TagError::VersionTooNew { found: 5, .. }));

    set_version(Some("3"));
    let err = TagStore::open(root, None, DbKind::Definitions, OpenMode::Modify).err().unwrap();
    assert!(matches!(err, TagError::VersionTooOld { found: 3, .. }));

    set_version(None);
    let err = TagStore::open(root, None, DbKind::Definitions, OpenMode::Read).err().unwrap();
    assert!(matches!(err, TagError::VersionTooOld { found: 1, .. }));

    set_version(Some("4"));
    let store = TagStore::open(root, None, DbKind::Definitions, OpenMode::Read).unwrap();
    assert_eq!(store.version(), FORMAT_VERSION);
}

#[test]
fn test_missing_source_root() {
    let tree = source_tree();
    let root = tree.path();
    assert!(matches!(
        TagStore::open(root, None, DbKind::Symbols, OpenMode::Create),
        Err(TagError::MissingSourceRoot)
    ));

    TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Create)
        .unwrap()
        .close()
        .unwrap();
    assert!(matches!(
        TagStore::open(root, None, DbKind::Symbols, OpenMode::Read),
        Err(TagError::MissingSourceRoot)
    ));
}

#[test]
fn test_read_only_and_bad_input() {
    let tree = source_tree();
    let root = tree.path();
    let mut store = TagStore::open(root, None, DbKind::Definitions, OpenMode::Create).unwrap();
    assert!(matches!(
        store.put("main", "main 10 a.c"),
        Err(TagError::IllegalTagFormat(_))
    ));
    store.close().unwrap();

    let mut store = TagStore::open(root, None, DbKind::Definitions, OpenMode::Read).unwrap();
    assert!(matches!(
        store.put("main", "main 10 a.c int main(){"),
        Err(TagError::ReadOnly("GTAGS"))
    ));
    assert!(matches!(
        store.delete(&IdSet::new()),
        Err(TagError::ReadOnly("GTAGS"))
    ));
}

#[test]
fn test_missing_database() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        TagStore::open(dir.path(), None, DbKind::Definitions, OpenMode::Read),
        Err(TagError::NotFound(_))
    ));
}

#[test]
fn test_delete_by_file_id() {
    let tree = source_tree();
    let root = tree.path();
    for kind in [DbKind::Definitions, DbKind::Symbols] {
        let mut store = TagStore::open(root, Some(root), kind, OpenMode::Create).unwrap();
        put_all(
            &mut store,
            &["main 10 a.c int main(){", "foo 20 a.c void foo(){", "bar 1 b.c b line 1"],
        );
        store.close().unwrap();

        let mut store = TagStore::open(root, Some(root), kind, OpenMode::Modify).unwrap();
        let a = store.paths().path_to_id("a.c").unwrap().unwrap();
        let removed = store.delete(&IdSet::from([a])).unwrap();
        assert_eq!(removed, 2);
        store.close().unwrap();

        let mut store = TagStore::open(root, Some(root), kind, OpenMode::Read).unwrap();
        let left: Vec<_> = records(&mut store, None, no_source())
            .into_iter()
            .map(|r| (r.tag, r.path))
            .collect();
        assert_eq!(left, vec![("bar".to_string(), "b.c".to_string())]);
        assert!(records(&mut store, Some("main"), no_source()).is_empty());
    }
}

#[test]
fn test_key_only_and_prefix() {
    let tree = source_tree();
    let root = tree.path();
    let mut store = TagStore::open(root, None, DbKind::Definitions, OpenMode::Create).unwrap();
    put_all(
        &mut store,
        &[
            "get_a 1 a.c x",
            "get_a 2 b.c x",
            "get_b 3 a.c x",
            "set_a 4 a.c x",
        ],
    );
    store.close().unwrap();

    let mut store = TagStore::open(root, None, DbKind::Definitions, OpenMode::Read).unwrap();
    let flags = SearchFlags {
        key_only: true,
        ..SearchFlags::default()
    };
    let keys: Vec<String> = store
        .iter(None, flags)
        .map(|e| e.unwrap().key().to_string())
        .collect();
    assert_eq!(keys, vec!["get_a", "get_b", "set_a"]);

    let flags = SearchFlags {
        prefix: true,
        ..SearchFlags::default()
    };
    let found = records(&mut store, Some("get"), flags);
    assert_eq!(found.len(), 3);

    let flags = SearchFlags {
        no_regex: true,
        ..SearchFlags::default()
    };
    assert!(records(&mut store, Some("get_."), flags).is_empty());
    assert_eq!(records(&mut store, Some("get_."), SearchFlags::default()).len(), 3);
}

#[test]
fn test_regex_plan_matches_filtered_full_scan() {
    let tree = source_tree();
    let root = tree.path();
    let mut store = TagStore::open(root, None, DbKind::Definitions, OpenMode::Create).unwrap();
    let tags = [
        "get", "get_a", "getter", "ge", "g", "set_get", "get9", "GET_A", "get_", "other",
    ];
    for (i, tag) in tags.iter().enumerate() {
        store.put(tag, &format!("{} {} a.c text", tag, i + 1)).unwrap();
    }
    store.close().unwrap();

    let mut store = TagStore::open(root, None, DbKind::Definitions, OpenMode::Read).unwrap();
    let everything = records(&mut store, None, SearchFlags::default());
    for pattern in ["^get_[a-z]", "^get*", "^gett?er", "^get[0-9]+$", "^get|_a$", "^ge.*"] {
        let re = Regex::new(pattern).unwrap();
        let expected: Vec<_> = everything.iter().filter(|r| re.is_match(&r.tag)).cloned().collect();
        let found = records(&mut store, Some(pattern), SearchFlags::default());
        assert_eq!(found, expected, "pattern {}", pattern);
    }

    let flags = SearchFlags {
        ignore_case: true,
        ..SearchFlags::default()
    };
    let found = records(&mut store, Some("^get_a$"), flags);
    let tags: BTreeSet<_> = found.iter().map(|r| r.tag.as_str()).collect();
    assert_eq!(tags, BTreeSet::from(["GET_A", "get_a"]));
}

#[test]
fn test_unavailable_source_keeps_iterating() {
    let tree = source_tree();
    let root = tree.path();
    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Create).unwrap();
    put_all(&mut store, &["gone 2 missing.c t", "here 3 b.c t"]);
    store.close().unwrap();

    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Read).unwrap();
    let found = records(&mut store, None, SearchFlags::default());
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].tag, "gone");
    assert_eq!(found[0].text, "");
    assert_eq!(found[1].text, "b line 3");
}

#[test]
fn test_short_source_ends_iteration() {
    let tree = source_tree();
    let root = tree.path();
    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Create).unwrap();
    put_all(&mut store, &["a 2 b.c t", "a 50 b.c t", "z 1 b.c t"]);
    store.close().unwrap();

    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Read).unwrap();
    let first = store.first(Some("^[az]$"), SearchFlags::default()).unwrap().unwrap();
    assert_eq!(first.into_record().unwrap().text, "b line 2");
    assert!(matches!(
        store.next(),
        Err(TagError::UnexpectedEof { line: 50, .. })
    ));
    assert!(store.next().unwrap().is_none());

    // the same records read fine without source recovery
    assert_eq!(records(&mut store, Some("^[az]$"), no_source()).len(), 3);
    assert_eq!(store.source_lines_read(), 5);
}

#[test]
fn test_no_source_skips_reads() {
    let tree = source_tree();
    let root = tree.path();
    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Create).unwrap();
    put_all(&mut store, &["main 10 a.c int main(){"]);
    store.close().unwrap();

    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Read).unwrap();
    let found = records(&mut store, Some("main"), no_source());
    assert_eq!(found[0].text, "");
    assert_eq!(store.source_lines_read(), 0);
}

#[test]
fn test_missing_path_is_corruption() {
    let tree = source_tree();
    let root = tree.path();
    let mut store = TagStore::open(root, None, DbKind::Definitions, OpenMode::Create).unwrap();
    store.db.put("ghost", "99 ghost 1 text").unwrap();
    store.close().unwrap();

    let mut store = TagStore::open(root, None, DbKind::Definitions, OpenMode::Read).unwrap();
    assert!(matches!(
        store.first(Some("ghost"), SearchFlags::default()),
        Err(TagError::MissingPath(99))
    ));
}

#[test]
fn test_drop_flushes_pool() {
    let tree = source_tree();
    let root = tree.path();
    {
        let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Create).unwrap();
        put_all(&mut store, &["kept 1 b.c t"]);
    }

    let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Read).unwrap();
    let found = records(&mut store, Some("kept"), SearchFlags::default());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].text, "b line 1");
}

#[test]
fn test_handles_share_path_map() {
    let tree = source_tree();
    let root = tree.path();
    let mut defs = TagStore::open(root, None, DbKind::Definitions, OpenMode::Create).unwrap();
    let mut syms = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Create).unwrap();
    put_all(&mut defs, &["main 10 a.c int main(){"]);
    put_all(&mut syms, &["foo 20 a.c void foo(){", "x 1 b.c t"]);
    put_all(&mut defs, &["bar 2 b.c b line 2"]);
    defs.close().unwrap();
    syms.close().unwrap();

    let mut paths = PathMap::open(root, OpenMode::Read).unwrap();
    assert_eq!(
        paths.paths().unwrap(),
        vec![(1, "a.c".to_string()), (2, "b.c".to_string())]
    );
    assert_eq!(paths.id_to_path(2).unwrap(), Some("b.c".to_string()));
}

#[test]
fn test_path_index_store_round_trip() {
    let tree = source_tree();
    let root = tree.path();
    let mut store = TagStore::open(root, Some(root), DbKind::PathIndex, OpenMode::Create).unwrap();
    assert!(store.format().compact);
    put_all(&mut store, &["main 10 a.c int main(){", "x 3 b.c t"]);
    store.close().unwrap();

    let mut store = TagStore::open(root, Some(root), DbKind::PathIndex, OpenMode::Modify).unwrap();
    put_all(&mut store, &["foo 20 a.c void foo(){"]);
    store.close().unwrap();

    let mut store = TagStore::open(root, Some(root), DbKind::PathIndex, OpenMode::Read).unwrap();
    let found: Vec<_> = records(&mut store, None, SearchFlags::default())
        .into_iter()
        .map(|r| (r.tag, r.line, r.path, r.text))
        .collect();
    assert_eq!(
        found,
        vec![
            ("foo".to_string(), 20, "a.c".to_string(), "void foo(){".to_string()),
            ("main".to_string(), 10, "a.c".to_string(), "int main(){".to_string()),
            ("x".to_string(), 3, "b.c".to_string(), "b line 3".to_string()),
        ]
    );
    store.close().unwrap();

    let paths = PathMap::open(root, OpenMode::Read).unwrap();
    assert_eq!(
        paths.paths().unwrap(),
        vec![(1, "a.c".to_string()), (2, "b.c".to_string())]
    );
}

#[test]
fn test_path_index_create_failure_keeps_gpath() {
    let tree = source_tree();
    let root = tree.path();
    let mut map = PathMap::open(root, OpenMode::Create).unwrap();
    map.get_or_insert("a.c").unwrap();
    map.close().unwrap();

    assert!(matches!(
        TagStore::open(root, None, DbKind::PathIndex, OpenMode::Create),
        Err(TagError::MissingSourceRoot)
    ));
    let map = PathMap::open(root, OpenMode::Read).unwrap();
    assert_eq!(map.path_to_id("a.c").unwrap(), Some(1));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn compact_round_trip(pairs in proptest::collection::btree_set(("[a-d]{1,3}", 1u32..400), 1..60)) {
        let tree = source_tree();
        let root = tree.path();
        let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Create).unwrap();
        // reverse order so the pool has something to sort
        for (tag, line) in pairs.iter().rev() {
            store.put(tag, &format!("{} {} a.c t", tag, line)).unwrap();
        }
        store.close().unwrap();

        let mut store = TagStore::open(root, Some(root), DbKind::Symbols, OpenMode::Read).unwrap();
        let found = records(&mut store, None, no_source());

        let mut per_tag: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for record in &found {
            per_tag.entry(record.tag.clone()).or_default().push(record.line);
        }
        for lines in per_tag.values() {
            prop_assert!(lines.windows(2).all(|w| w[0] < w[1]));
        }
        let recovered: BTreeSet<(String, u32)> =
            found.into_iter().map(|r| (r.tag, r.line)).collect();
        prop_assert_eq!(recovered.len(), pairs.len());
        prop_assert_eq!(recovered, pairs);
    }
}

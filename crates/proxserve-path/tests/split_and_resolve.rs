use proxserve_path::{format_path, resolve, split_path, PathError, PathStep};
use serde_json::json;

#[test]
fn split_path_matrix() {
    let cases: Vec<(&str, Vec<PathStep>)> = vec![
        ("", vec![]),
        (".a", vec!["a".into()]),
        ("a", vec!["a".into()]),
        (".a.b.c", vec!["a".into(), "b".into(), "c".into()]),
        ("[0]", vec![PathStep::Index(0)]),
        (".arr[12]", vec!["arr".into(), PathStep::Index(12)]),
        (".arr[12].x", vec!["arr".into(), PathStep::Index(12), "x".into()]),
        ("[3][4]", vec![PathStep::Index(3), PathStep::Index(4)]),
        (".m[key]", vec!["m".into(), "key".into()]),
        (".m[-1]", vec!["m".into(), "-1".into()]),
    ];
    for (path, expected) in cases {
        assert_eq!(split_path(path), expected, "path {path:?}");
    }
}

#[test]
fn format_round_trips_canonical_paths() {
    for path in [".a", ".a.b", ".arr[0]", ".arr[0].x[2]", "[1].y"] {
        assert_eq!(format_path(&split_path(path)), path);
    }
}

#[test]
fn resolve_walks_arrays_and_objects() {
    let doc = json!({"users": [{"name": "ann"}, {"name": "bob"}]});
    let found = resolve(&doc, ".users[1].name").unwrap();
    assert_eq!(found.container, json!({"name": "bob"}));
    assert_eq!(found.key, PathStep::from("name"));
    assert_eq!(found.value, Some(json!("bob")));
}

#[test]
fn resolve_rejects_missing_intermediate() {
    let doc = json!({"users": []});
    assert_eq!(
        resolve(&doc, ".users[0].name"),
        Err(PathError::InvalidPath(".users[0].name".into()))
    );
}

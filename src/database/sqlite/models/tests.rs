use super::*;
use serde_json::json;

#[test]
fn filter_accepts_scalar_values() {
    let filter = MetadataFilter::from_value(&json!({
        "source": "notes.md",
        "chunk_index": 0,
        "draft": false
    }))
    .expect("valid filter");
    assert_eq!(filter.conditions().len(), 3);
    assert!(!filter.is_empty());
}

#[test]
fn filter_rejects_injection_keys() {
    let err = MetadataFilter::from_value(&json!({"a') OR 1=1 --": "x"})).expect_err("bad key");
    assert!(matches!(err, FilterError::InvalidKey(_)));
    assert!(MetadataFilter::new().with("file.name", "x").is_err());
    assert!(MetadataFilter::new().with("", "x").is_err());
}

#[test]
fn filter_rejects_nested_values() {
    assert_eq!(
        MetadataFilter::from_value(&json!({"tags": ["a"]})),
        Err(FilterError::UnsupportedValue("tags".to_string()))
    );
    assert_eq!(
        MetadataFilter::from_value(&json!(["source"])),
        Err(FilterError::NotAnObject)
    );
}

#[test]
fn push_where_builds_bound_clauses() {
    let filter = MetadataFilter::new()
        .with("source", "a.txt")
        .and_then(|f| f.with("chunk_index", 2))
        .expect("valid filter");

    let mut builder = QueryBuilder::<Sqlite>::new("SELECT id FROM chunks");
    filter.push_where(&mut builder);
    let sql = builder.sql();
    assert!(sql.starts_with("SELECT id FROM chunks WHERE json_extract(metadata, '$."));
    assert!(sql.contains("json_extract(metadata, '$.chunk_index') = ?"));
    assert!(sql.contains("json_extract(metadata, '$.source') = ?"));
    assert_eq!(sql.matches(" AND ").count(), 1);
}

#[test]
fn single_condition_sql() {
    let filter = MetadataFilter::new().with("source", "a.txt").expect("valid filter");
    let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM chunks");
    filter.push_where(&mut builder);
    assert_eq!(
        builder.sql(),
        "DELETE FROM chunks WHERE json_extract(metadata, '$.source') = ?"
    );
}

#[test]
fn empty_filter_adds_nothing() {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT id FROM chunks");
    MetadataFilter::new().push_where(&mut builder);
    assert_eq!(builder.sql(), "SELECT id FROM chunks");
}

#[test]
fn chunk_metadata_helpers() {
    let chunk = Chunk {
        id: "c".to_string(),
        document_id: "d".to_string(),
        chunk_index: 0,
        total_chunks: 1,
        content: "text".to_string(),
        metadata: r#"{"source":"guide.md","chunk_size":4}"#.to_string(),
        created_date: chrono::Utc::now().naive_utc(),
    };
    assert_eq!(chunk.source(), "guide.md");
    assert_eq!(chunk.metadata_map()["chunk_size"], 4);

    let broken = Chunk {
        metadata: "not json".to_string(),
        ..chunk
    };
    assert_eq!(broken.source(), "unknown");
}

use std::path::PathBuf;

use sorrel::{
    build_index, evaluate, open_index, BuildOptions, DocumentRegistry, ReduceConfig, SorrelError,
};

fn write_corpus(dir: &std::path::Path) -> Vec<PathBuf> {
    let texts = [
        ("ships.txt", "the old ship sailed the cold sea\nthe captain slept"),
        ("whales.txt", "a white whale broke the cold water"),
        ("harbor.txt", "ship and whale alike rest in the harbor"),
        ("desert.txt", "sand dunes and a merciless sun"),
    ];
    texts
        .iter()
        .map(|(name, text)| {
            let path = dir.join(name);
            std::fs::write(&path, text).unwrap();
            path
        })
        .collect()
}

fn names(
    result: sorrel::KeySet<sorrel::DocumentEntry>,
    registry: &DocumentRegistry,
) -> Vec<String> {
    let mut names: Vec<String> = result
        .map(|entry| {
            let path = registry.path(entry.doc).unwrap();
            std::path::Path::new(&path)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

#[test]
fn test_build_then_query_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path());
    let out = dir.path().join("index");
    let registry = DocumentRegistry::new();

    let options = BuildOptions {
        threads: 2,
        partitions: 3,
        mapper_capacity: 8, // force mid-document spills
        ..Default::default()
    };
    build_index(&corpus, &out, &registry, &options, &sorrel::progress::NullSink).unwrap();

    let index = open_index(&out).unwrap();

    assert_eq!(
        names(evaluate("ship", &index).unwrap(), &registry),
        ["harbor.txt", "ships.txt"]
    );
    assert_eq!(
        names(evaluate("ship & whale", &index).unwrap(), &registry),
        ["harbor.txt"]
    );
    assert_eq!(
        names(evaluate("cold | sun", &index).unwrap(), &registry),
        ["desert.txt", "ships.txt", "whales.txt"]
    );
    assert_eq!(
        names(evaluate("cold & !whale", &index).unwrap(), &registry),
        ["ships.txt"]
    );
    assert_eq!(
        names(
            evaluate("(ship | whale) & !harbor", &index).unwrap(),
            &registry
        ),
        ["ships.txt", "whales.txt"]
    );
    assert!(evaluate("kraken", &index).unwrap().next().is_none());
}

#[test]
fn test_negated_query_against_registry_universe() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path());
    let out = dir.path().join("index");
    let registry = DocumentRegistry::new();
    build_index(
        &corpus,
        &out,
        &registry,
        &BuildOptions {
            threads: 1,
            ..Default::default()
        },
        &sorrel::progress::NullSink,
    )
    .unwrap();
    let index = open_index(&out).unwrap();

    let result = evaluate("!the", &index).unwrap();
    assert!(result.is_negated());
    // Intersecting with the registered universe materializes the complement.
    let universe = sorrel::keyset::KeySet::from_sorted(
        registry
            .ids()
            .into_iter()
            .map(|doc| sorrel::DocumentEntry::new(doc, sorrel::analysis::Zone::default()))
            .collect(),
    );
    let matches = sorrel::keyset::cross(result, universe);
    assert!(!matches.is_negated());
    assert_eq!(names(matches, &registry), ["desert.txt"]);
}

#[test]
fn test_compressed_build_matches_plain() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path());
    let registry_plain = DocumentRegistry::new();
    let registry_packed = DocumentRegistry::new();

    let plain_out = dir.path().join("plain");
    build_index(
        &corpus,
        &plain_out,
        &registry_plain,
        &BuildOptions {
            threads: 1,
            ..Default::default()
        },
        &sorrel::progress::NullSink,
    )
    .unwrap();

    let packed_out = dir.path().join("packed");
    build_index(
        &corpus,
        &packed_out,
        &registry_packed,
        &BuildOptions {
            threads: 1,
            reduce: ReduceConfig {
                interval_coding: true,
                varbyte_coding: true,
                external_documents: true,
                ..Default::default()
            },
            ..Default::default()
        },
        &sorrel::progress::NullSink,
    )
    .unwrap();

    let plain = open_index(&plain_out).unwrap();
    let packed = open_index(&packed_out).unwrap();
    for query in ["the", "ship & whale", "cold | sun", "sand & dunes"] {
        assert_eq!(
            names(evaluate(query, &plain).unwrap(), &registry_plain),
            names(evaluate(query, &packed).unwrap(), &registry_packed),
            "results diverge for {query:?}"
        );
    }
}

#[test]
fn test_syntax_errors_do_not_disturb_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path());
    let out = dir.path().join("index");
    let registry = DocumentRegistry::new();
    build_index(
        &corpus,
        &out,
        &registry,
        &BuildOptions {
            threads: 1,
            ..Default::default()
        },
        &sorrel::progress::NullSink,
    )
    .unwrap();
    let index = open_index(&out).unwrap();

    match evaluate("ship & & whale", &index) {
        Err(SorrelError::Syntax { token, position }) => {
            assert_eq!(token, "&");
            assert_eq!(position, 7);
        }
        other => panic!("expected a syntax error, got {other:?}"),
    }
    assert_eq!(
        names(evaluate("ship & whale", &index).unwrap(), &registry),
        ["harbor.txt"]
    );
}

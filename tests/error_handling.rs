use std::io::Write;
use std::sync::Arc;

use bytesig::{
    ConfigLoadError, Frame, FrameError, MatchError, Matcher, MemoryBuffer, Quit, ScanOutcome,
    Seq, SequenceError, SignatureFile, SignatureSet, Table,
};
use tempfile::NamedTempFile;

#[test]
fn missing_signature_file_is_a_read_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = SignatureFile::from_file(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, ConfigLoadError::FileRead(_)));
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(b"version: [unterminated\n").expect("write");
    let err = SignatureFile::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigLoadError::YamlParse(_)));
}

#[test]
fn sequence_without_choices_fails_validation() {
    let yaml = r#"
version: "1"
bof_sequences:
  - node: 0
    subsequences:
      - max_offset: 0
        choices: []
"#;
    let err = SignatureFile::from_yaml(yaml).unwrap_err();
    assert!(matches!(err, ConfigLoadError::Validation(_)));
    assert!(err.to_string().contains("bof_sequences[0].subsequences[0]"));
}

#[test]
fn test_tree_mismatch_is_reported_per_table() {
    let mut set = SignatureSet::default();
    set.bof_sequences.seqs.push(Seq::literal(0, b"MZ".to_vec()));
    let err = Matcher::new(set).unwrap_err();
    assert_eq!(
        err,
        MatchError::TestTreeMismatch {
            table: Table::BofSequence,
            entries: 0,
            patterns: 1,
        }
    );
    assert_eq!(err.to_string(), "bof_sequences has 0 test-tree entries for 1 patterns");
}

#[test]
fn pattern_shape_errors_surface_from_construction() {
    let mut set = SignatureSet::default();
    set.eof_sequences.push(
        0,
        Seq {
            max_offsets: vec![-1, 4],
            choices: vec![vec![b"%%EOF".to_vec()]],
        },
    );
    assert!(matches!(
        Matcher::new(set),
        Err(MatchError::Sequence(SequenceError::OffsetArity { seq: 0, .. }))
    ));

    let mut set = SignatureSet::default();
    set.bof_frames.push(0, Frame::window(0, 0, vec![]));
    assert!(matches!(
        Matcher::new(set),
        Err(MatchError::Frame(FrameError::EmptyPattern { frame: 0 }))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_input_truncates_eof_scans() {
    let mut set = SignatureSet {
        max_bof: -1,
        max_eof: -1,
        ..Default::default()
    };
    set.eof_frames.push(0, Frame::fixed(0, b"%%EOF"));
    let matcher = Arc::new(Matcher::new(set).expect("matcher"));

    let ident = matcher.identify(Arc::new(MemoryBuffer::new(Vec::new())), Quit::new());
    let (strikes, outcome) = ident.collect().await;
    assert!(strikes.is_empty());
    assert!(matches!(outcome, ScanOutcome::Truncated(_)), "{outcome:?}");
}

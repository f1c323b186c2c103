//! End-to-end identification from YAML signature files

use std::io::Write;
use std::sync::Arc;

use bytesig::{
    Buffer, FileBuffer, MemoryBuffer, Quit, ScanOutcome, SignatureFile, Strike, Table,
};
use tempfile::NamedTempFile;

const SIGNATURES: &str = r#"
version: "1.0"
name: "integration"
max_bof: 8192
max_eof: 8192
bof_sequences:
  - node: 0
    subsequences:
      - max_offset: 0
        choices: ["50 4B 03 04"]
  - node: 1
    subsequences:
      - max_offset: 0
        choices: ["25 50 44 46 2D"]
      - max_offset: 16
        choices: ["31 2E 34", "31 2E 37"]
eof_sequences:
  - node: 2
    subsequences:
      - max_offset: 64
        choices: ["25 25 45 4F 46"]
bof_frames:
  - node: 3
    min_offset: 0
    max_offset: 0
    pattern: "47 49 46 38 ?? 61"
eof_frames:
  - node: 4
    min_offset: 0
    max_offset: 4
    pattern: "50 4B 05 06"
"#;

fn matcher() -> Arc<bytesig::Matcher> {
    let file = SignatureFile::from_yaml(SIGNATURES).expect("signature file");
    Arc::new(file.into_matcher().expect("matcher"))
}

fn pdf() -> Vec<u8> {
    let mut data = b"%PDF-1.7\n".to_vec();
    data.extend(std::iter::repeat(b' ').take(30_000));
    data.extend_from_slice(b"\n%%EOF\n");
    data
}

async fn identify(buf: Arc<dyn Buffer>) -> (Vec<Strike>, ScanOutcome) {
    matcher().identify(buf, Quit::new()).collect().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pdf_reports_chained_header_and_trailer() {
    let (strikes, outcome) = identify(Arc::new(MemoryBuffer::new(pdf()))).await;
    assert_eq!(outcome, ScanOutcome::Exhausted);

    let header: Vec<_> = strikes.iter().filter(|s| s.node == 1).collect();
    assert_eq!(header.len(), 2, "strikes: {strikes:?}");
    assert!(!header[0].is_final);
    assert_eq!((header[0].sub_key, header[0].offset), (0, 0));
    assert!(header[1].is_final);
    assert_eq!((header[1].sub_key, header[1].offset, header[1].length), (1, 5, 3));

    let trailer = strikes
        .iter()
        .find(|s| s.table() == Table::EofSequence)
        .expect("trailer strike");
    assert_eq!((trailer.node, trailer.offset, trailer.length), (2, 1, 5));
    assert!(strikes.iter().all(|s| s.node != 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_backed_zip_matches_both_ends() {
    let mut data = b"PK\x03\x04".to_vec();
    data.extend(std::iter::repeat(0xAA).take(100_000));
    data.extend_from_slice(b"PK\x05\x06\0\0");

    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(&data).expect("write");
    let buf = Arc::new(FileBuffer::open(file.path()).expect("open"));

    let (strikes, outcome) = identify(buf).await;
    assert_eq!(outcome, ScanOutcome::Exhausted);
    let nodes: Vec<_> = strikes.iter().map(|s| (s.node, s.table())).collect();
    assert!(nodes.contains(&(0, Table::BofSequence)), "{nodes:?}");
    assert!(nodes.contains(&(4, Table::EofFrame)), "{nodes:?}");

    let eocd = strikes.iter().find(|s| s.node == 4).expect("eocd");
    assert_eq!((eocd.offset, eocd.length, eocd.reverse), (2, 4, true));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn gif_frame_uses_wildcard() {
    let (strikes, outcome) =
        identify(Arc::new(MemoryBuffer::new(&b"GIF89a\x01\x00\x01\x00"[..]))).await;
    assert_eq!(outcome, ScanOutcome::Exhausted);
    assert_eq!(strikes.len(), 1, "strikes: {strikes:?}");
    assert_eq!(strikes[0].table(), Table::BofFrame);
    assert_eq!((strikes[0].node, strikes[0].offset), (3, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_content_yields_no_strikes() {
    let (strikes, outcome) = identify(Arc::new(MemoryBuffer::new(vec![0x42; 50_000]))).await;
    assert!(strikes.is_empty());
    assert_eq!(outcome, ScanOutcome::Exhausted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn strikes_serialize_as_json_lines() {
    let (strikes, _) = identify(Arc::new(MemoryBuffer::new(pdf()))).await;
    let lines: Vec<String> = strikes
        .iter()
        .map(|s| serde_json::to_string(s).expect("json"))
        .collect();
    let first: serde_json::Value = serde_json::from_str(&lines[0]).expect("parse");
    assert_eq!(first["node"], 1);
    assert_eq!(first["final"], false);
    assert_eq!(first["reverse"], false);
}

//! Concurrency and cancellation tests for bytesig

use std::sync::Arc;
use std::time::Duration;

use bytesig::{
    EngineBuilds, Frame, Matcher, MemoryBuffer, Quit, ScanOutcome, Seq, SignatureSet, Table,
};
use tokio::task::JoinSet;

fn signature_set() -> SignatureSet {
    let mut set = SignatureSet {
        max_bof: -1,
        max_eof: -1,
        ..Default::default()
    };
    for i in 0..32u8 {
        set.bof_sequences
            .push(i as usize, Seq::literal(-1, vec![b'#', i, b'#', 0xFE]));
    }
    set.eof_sequences
        .push(100, Seq::literal(-1, b"TRAILER".to_vec()));
    set.bof_frames.push(200, Frame::fixed(0, b"#\x00#"));
    set.eof_frames.push(300, Frame::fixed(0, b"TRAILER"));
    set
}

fn sample(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size + 256);
    for i in 0..32u8 {
        data.extend_from_slice(&[b'#', i, b'#', 0xFE]);
    }
    data.resize(size, 0);
    data.extend_from_slice(b"TRAILER");
    data
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identify_same_matcher() {
    let matcher = Arc::new(Matcher::new(signature_set()).expect("matcher"));
    let data = bytes::Bytes::from(sample(200_000));

    let mut scans = JoinSet::new();
    for _ in 0..16 {
        let matcher = Arc::clone(&matcher);
        let data = data.clone();
        scans.spawn(async move {
            matcher
                .identify(Arc::new(MemoryBuffer::new(data)), Quit::new())
                .collect()
                .await
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = scans.join_next().await {
        let (mut strikes, outcome) = joined.expect("scan task");
        assert_eq!(outcome, ScanOutcome::Exhausted);
        // Merge order between producers is not fixed.
        strikes.sort_by_key(|s| (s.table() as u8, s.node, s.offset));
        results.push(strikes);
    }

    let first = &results[0];
    assert_eq!(first.len(), 32 + 3);
    for (i, result) in results.iter().enumerate().skip(1) {
        assert_eq!(first, result, "scan {i} produced different strikes");
    }
    assert_eq!(matcher.engine_builds(), EngineBuilds { bof: 1, eof: 1 });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parent_quit_stops_every_scan() {
    // An absent unbounded sequence keeps the BOF scan reading to the end.
    let mut set = signature_set();
    set.bof_sequences
        .push(999, Seq::literal(-1, b"NEVER-PRESENT".to_vec()));
    let matcher = Arc::new(Matcher::new(set).expect("matcher"));
    let data = bytes::Bytes::from(sample(4_000_000));
    let root = Quit::new();

    let mut idents = Vec::new();
    for _ in 0..4 {
        let buf = Arc::new(MemoryBuffer::new(data.clone()));
        idents.push(matcher.identify(buf, root.child()));
    }
    root.cancel();

    for ident in idents {
        let (_, outcome) = tokio::time::timeout(Duration::from_secs(10), ident.collect())
            .await
            .expect("scan stopped promptly");
        assert_eq!(outcome, ScanOutcome::Cancelled);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_consumer_sees_every_strike() {
    let matcher = Arc::new(Matcher::new(signature_set()).expect("matcher"));
    let mut ident = matcher.identify(Arc::new(MemoryBuffer::new(sample(10_000))), Quit::new());

    let mut seen = Vec::new();
    while let Some(strike) = ident.next().await {
        tokio::time::sleep(Duration::from_millis(2)).await;
        seen.push(strike);
    }
    assert_eq!(ident.finish().await, ScanOutcome::Exhausted);
    assert_eq!(seen.len(), 35);
    assert_eq!(
        seen.iter().filter(|s| s.table() == Table::BofSequence).count(),
        32
    );
}

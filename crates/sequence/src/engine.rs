use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use aho_corasick::automaton::Automaton;
use aho_corasick::dfa::DFA;
use aho_corasick::{Anchored, MatchKind};
use buffer::{BufferError, ChunkReader, Quit};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::SequenceError;
use crate::seq::{Direction, Seq, SeqHit};

/// Compiled sequence set.
///
/// Building is the expensive step; an engine is meant to be built once per
/// signature set and then shared (`Arc`) across every stream it scans.
pub struct SequenceEngine {
    dfa: DFA,
    direction: Direction,
    /// Pattern id -> (sequence, subsequence).
    patterns: Vec<(usize, usize)>,
    shapes: Vec<Shape>,
}

struct Shape {
    max_offsets: Vec<i64>,
    /// Longest alternative of each subsequence.
    max_lens: Vec<u64>,
}

/// A running scan: hits in reading order, and the producer task.
///
/// The task resolves to the number of bytes consumed. Dropping `hits` makes
/// the producer stop at its next send.
pub struct SeqScan {
    pub hits: mpsc::Receiver<SeqHit>,
    pub task: JoinHandle<Result<u64, BufferError>>,
}

impl SequenceEngine {
    pub fn build(seqs: &[Seq], direction: Direction) -> Result<Self, SequenceError> {
        let start = Instant::now();
        let mut patterns = Vec::new();
        let mut alternatives: Vec<Vec<u8>> = Vec::new();
        let mut shapes = Vec::with_capacity(seqs.len());

        for (idx, seq) in seqs.iter().enumerate() {
            seq.validate(idx)?;
            for (sub, choice) in seq.choices.iter().enumerate() {
                for alt in choice {
                    let mut bytes = alt.clone();
                    if direction == Direction::Reverse {
                        bytes.reverse();
                    }
                    alternatives.push(bytes);
                    patterns.push((idx, sub));
                }
            }
            let max_lens = seq
                .choices
                .iter()
                .map(|choice| choice.iter().map(Vec::len).max().unwrap_or(0) as u64)
                .collect();
            shapes.push(Shape {
                max_offsets: seq.max_offsets.clone(),
                max_lens,
            });
        }

        let dfa = DFA::builder()
            .match_kind(MatchKind::Standard)
            .build(&alternatives)
            .map_err(|err| SequenceError::Build(err.to_string()))?;

        debug!(
            ?direction,
            sequences = seqs.len(),
            patterns = patterns.len(),
            elapsed_micros = start.elapsed().as_micros(),
            "sequence_engine_built"
        );

        Ok(Self {
            dfa,
            direction,
            patterns,
            shapes,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn sequence_count(&self) -> usize {
        self.shapes.len()
    }

    /// Start scanning `reader` on a blocking task.
    ///
    /// Hits are delivered through a channel of `capacity` slots; a full
    /// channel stalls the scan. `progress` receives the running byte count
    /// after every chunk. The scan ends when the reader is exhausted, every
    /// sequence is settled, `quit` fires, or the receiver is dropped.
    pub fn index<R>(
        self: &Arc<Self>,
        reader: R,
        progress: watch::Sender<u64>,
        quit: Quit,
        capacity: usize,
    ) -> SeqScan
    where
        R: ChunkReader + 'static,
    {
        let (tx, hits) = mpsc::channel(capacity.max(1));
        let engine = Arc::clone(self);
        let task = tokio::task::spawn_blocking(move || {
            let result = engine.run(reader, &tx, &progress, &quit);
            match &result {
                Ok(consumed) => debug!(direction = ?engine.direction, consumed, "sequence_scan_done"),
                Err(BufferError::Cancelled) => {
                    debug!(direction = ?engine.direction, "sequence_scan_cancelled")
                }
                Err(err) => warn!(direction = ?engine.direction, error = %err, "sequence_scan_failed"),
            }
            result
        });
        SeqScan { hits, task }
    }

    fn run(
        &self,
        mut reader: impl ChunkReader,
        tx: &mpsc::Sender<SeqHit>,
        progress: &watch::Sender<u64>,
        quit: &Quit,
    ) -> Result<u64, BufferError> {
        let mut sid = self
            .dfa
            .start_state(Anchored::No)
            .map_err(|err| BufferError::Io(err.to_string()))?;
        let mut tracker = Tracker::new(&self.shapes);
        let mut pos: u64 = 0;

        loop {
            quit.check()?;
            let Some(chunk) = reader.next_chunk()? else {
                break;
            };
            for &byte in chunk.iter() {
                sid = self.dfa.next_state(Anchored::No, sid, byte);
                pos += 1;
                if !self.dfa.is_match(sid) {
                    continue;
                }
                for i in 0..self.dfa.match_len(sid) {
                    let pid = self.dfa.match_pattern(sid, i);
                    let (seq, sub) = self.patterns[pid.as_usize()];
                    let len = self.dfa.pattern_len(pid) as u64;
                    if let Some(hit) = tracker.advance(&self.shapes[seq], seq, sub, pos - len, len)
                    {
                        if tx.blocking_send(hit).is_err() {
                            return Ok(pos);
                        }
                    }
                }
            }
            progress.send_replace(pos);
            if tracker.settled(&self.shapes, pos) {
                break;
            }
        }
        Ok(pos)
    }
}

impl std::fmt::Debug for SequenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceEngine")
            .field("direction", &self.direction)
            .field("sequences", &self.shapes.len())
            .field("patterns", &self.patterns.len())
            .finish()
    }
}

/// Ends of one subsequence's matches that the next subsequence may still
/// chain onto, ascending.
///
/// Ends arrive in reading order. With an unbounded gap the earliest end
/// chains to anything a later one would, so only that one is kept. With a
/// bounded gap every end stays until the reading position is too far past it
/// for any match of the next subsequence to start within the gap.
#[derive(Clone, Default)]
struct Ends(VecDeque<u64>);

impl Ends {
    /// Record `end`, the current reading position. `gap` and `next_len`
    /// describe the following subsequence.
    fn push(&mut self, end: u64, gap: i64, next_len: u64) {
        if gap < 0 {
            if self.0.is_empty() {
                self.0.push_back(end);
            }
            return;
        }
        if self.0.back() != Some(&end) {
            self.0.push_back(end);
        }
        let reach = gap as u64 + next_len;
        while self.0.front().is_some_and(|&oldest| oldest + reach < end) {
            self.0.pop_front();
        }
    }

    fn chains_to(&self, start: u64, max_gap: i64) -> bool {
        self.0
            .iter()
            .any(|&end| end <= start && (max_gap < 0 || start - end <= max_gap as u64))
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-scan progress through every sequence.
struct Tracker {
    ends: Vec<Vec<Ends>>,
    complete: Vec<bool>,
}

impl Tracker {
    fn new(shapes: &[Shape]) -> Self {
        Self {
            ends: shapes
                .iter()
                .map(|shape| vec![Ends::default(); shape.max_offsets.len()])
                .collect(),
            complete: vec![false; shapes.len()],
        }
    }

    fn advance(
        &mut self,
        shape: &Shape,
        seq: usize,
        sub: usize,
        start: u64,
        len: u64,
    ) -> Option<SeqHit> {
        if self.complete[seq] {
            return None;
        }
        let bound = shape.max_offsets[sub];
        let chained = if sub == 0 {
            bound < 0 || start <= bound as u64
        } else {
            self.ends[seq][sub - 1].chains_to(start, bound)
        };
        if !chained {
            return None;
        }
        let is_final = sub + 1 == shape.max_offsets.len();
        if is_final {
            self.complete[seq] = true;
        } else {
            self.ends[seq][sub].push(
                start + len,
                shape.max_offsets[sub + 1],
                shape.max_lens[sub + 1],
            );
        }
        Some(SeqHit {
            seq,
            sub,
            offset: start,
            length: len,
            is_final,
        })
    }

    /// True when no further input can change the outcome: every sequence is
    /// complete, or never started and is past its first window.
    fn settled(&self, shapes: &[Shape], pos: u64) -> bool {
        shapes.iter().enumerate().all(|(seq, shape)| {
            if self.complete[seq] {
                return true;
            }
            let bound = shape.max_offsets[0];
            let untouched = self.ends[seq].iter().all(Ends::is_empty);
            untouched && bound >= 0 && pos >= bound as u64 + shape.max_lens[0]
        })
    }
}

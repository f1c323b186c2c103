use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use buffer::{Buffer, BufferError, ForwardReader, Quit, ReverseReader};
use frames::{FrameHit, FrameSet};
use sequence::{Direction, Seq, SeqHit, SequenceEngine};
use tokio::sync::{mpsc, oneshot, watch, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument, Level};

use crate::metrics::metrics_recorder;
use crate::types::{
    Extent, FramePatterns, MatchError, ScanConfig, ScanOutcome, SequencePatterns, SignatureSet,
    Strike, Table,
};


/// Long-lived matcher for one signature set.
///
/// Sequence engines are compiled on first use and then shared by every
/// identification, including concurrent ones. Everything else an
/// identification needs is created per call.
pub struct Matcher {
    bof: SequenceSide,
    eof: SequenceSide,
    bof_frames: FrameSide,
    eof_frames: FrameSide,
    max_bof: Extent,
    max_eof: Extent,
    config: ScanConfig,
    scans: AtomicU64,
}

struct SequenceSide {
    seqs: Arc<[Seq]>,
    test_tree: Vec<usize>,
    direction: Direction,
    engine: OnceCell<Arc<SequenceEngine>>,
    builds: AtomicUsize,
}

struct FrameSide {
    set: FrameSet,
    test_tree: Vec<usize>,
}

/// Number of times each sequence engine has been compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineBuilds {
    pub bof: usize,
    pub eof: usize,
}

impl SequenceSide {
    fn new(patterns: SequencePatterns, direction: Direction) -> Result<Self, MatchError> {
        let table = match direction {
            Direction::Forward => Table::BofSequence,
            Direction::Reverse => Table::EofSequence,
        };
        if patterns.test_tree.len() != patterns.seqs.len() {
            return Err(MatchError::TestTreeMismatch {
                table,
                entries: patterns.test_tree.len(),
                patterns: patterns.seqs.len(),
            });
        }
        for (idx, seq) in patterns.seqs.iter().enumerate() {
            seq.validate(idx)?;
        }
        Ok(Self {
            seqs: patterns.seqs.into(),
            test_tree: patterns.test_tree,
            direction,
            engine: OnceCell::new(),
            builds: AtomicUsize::new(0),
        })
    }

    /// Build-or-reuse. Concurrent first callers wait on a single build.
    async fn engine(&self) -> Result<Arc<SequenceEngine>, MatchError> {
        let engine = self
            .engine
            .get_or_try_init(|| async {
                let start = Instant::now();
                let seqs = Arc::clone(&self.seqs);
                let direction = self.direction;
                let result = tokio::task::spawn_blocking(move || {
                    SequenceEngine::build(&seqs, direction)
                })
                .await
                .map_err(|err| MatchError::Runtime(err.to_string()))
                .and_then(|built| built.map_err(MatchError::from));

                if result.is_ok() {
                    self.builds.fetch_add(1, Ordering::SeqCst);
                }
                if let Some(recorder) = metrics_recorder() {
                    recorder.record_engine_build(
                        direction,
                        start.elapsed(),
                        result.as_ref().map(|_| ()),
                    );
                }
                result.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(engine))
    }

    fn strike(&self, hit: SeqHit) -> Strike {
        Strike {
            node: self.test_tree[hit.seq],
            sub_key: hit.sub,
            offset: hit.offset,
            length: hit.length,
            reverse: self.direction == Direction::Reverse,
            frame: false,
            is_final: hit.is_final,
        }
    }
}

impl FrameSide {
    fn new(patterns: FramePatterns, table: Table) -> Result<Self, MatchError> {
        if patterns.test_tree.len() != patterns.frames.len() {
            return Err(MatchError::TestTreeMismatch {
                table,
                entries: patterns.test_tree.len(),
                patterns: patterns.frames.len(),
            });
        }
        Ok(Self {
            set: FrameSet::new(patterns.frames)?,
            test_tree: patterns.test_tree,
        })
    }

    fn strike(&self, hit: FrameHit, reverse: bool) -> Strike {
        Strike {
            node: self.test_tree[hit.frame],
            sub_key: 0,
            offset: hit.offset,
            length: hit.length,
            reverse,
            frame: true,
            is_final: true,
        }
    }
}

impl Matcher {
    /// Validate a signature set and wrap it with default tuning.
    pub fn new(set: SignatureSet) -> Result<Self, MatchError> {
        Self::with_config(set, ScanConfig::default())
    }

    pub fn with_config(set: SignatureSet, config: ScanConfig) -> Result<Self, MatchError> {
        config.validate()?;
        let SignatureSet {
            bof_sequences,
            eof_sequences,
            bof_frames,
            eof_frames,
            max_bof,
            max_eof,
        } = set;
        Ok(Self {
            bof: SequenceSide::new(bof_sequences, Direction::Forward)?,
            eof: SequenceSide::new(eof_sequences, Direction::Reverse)?,
            bof_frames: FrameSide::new(bof_frames, Table::BofFrame)?,
            eof_frames: FrameSide::new(eof_frames, Table::EofFrame)?,
            max_bof: Extent::from(max_bof),
            max_eof: Extent::from(max_eof),
            config,
            scans: AtomicU64::new(0),
        })
    }

    pub fn max_bof(&self) -> Extent {
        self.max_bof
    }

    pub fn max_eof(&self) -> Extent {
        self.max_eof
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn engine_builds(&self) -> EngineBuilds {
        EngineBuilds {
            bof: self.bof.builds.load(Ordering::SeqCst),
            eof: self.eof.builds.load(Ordering::SeqCst),
        }
    }

    /// Compile whichever sequence engines the scan limits will need, ahead of
    /// the first identification. Surfaces automaton build failures early.
    pub async fn prepare(&self) -> Result<(), MatchError> {
        if self.max_bof != Extent::Skip {
            self.bof.engine().await?;
        }
        if self.max_eof != Extent::Skip {
            self.eof.engine().await?;
        }
        Ok(())
    }

    /// Start identifying one input.
    ///
    /// Must be called from within a tokio runtime. The returned
    /// [`Identification`] yields strikes until every producer has finished,
    /// `quit` fires, or the scan is truncated; the strike channel then closes.
    pub fn identify(self: &Arc<Self>, buf: Arc<dyn Buffer>, quit: Quit) -> Identification {
        let scan_id = self.scans.fetch_add(1, Ordering::Relaxed);
        let (tx, strikes) = mpsc::channel(self.config.channel_capacity);
        let (gate_tx, gate_rx) = oneshot::channel();
        let (senders, progress) = progress_channels();

        let span = tracing::span!(Level::INFO, "matcher.identify", scan_id);
        let task = tokio::spawn(
            Arc::clone(self)
                .scan(buf, quit, tx, gate_rx, senders)
                .instrument(span),
        );

        Identification {
            strikes,
            gate: Some(Gate(gate_tx)),
            progress,
            task,
        }
    }

    async fn scan(
        self: Arc<Self>,
        buf: Arc<dyn Buffer>,
        quit: Quit,
        tx: mpsc::Sender<Strike>,
        gate: oneshot::Receiver<()>,
        progress: ProgressSenders,
    ) -> ScanOutcome {
        let start = Instant::now();
        // Fires on caller cancellation, or when this scan stops its own producers.
        let stop = quit.child();
        buf.set_quit(stop.clone());

        let mut scan = Scan {
            matcher: self,
            buf,
            quit,
            stop,
            tx,
            phase: Phase::Init,
            emitted: 0,
            producers: Vec::new(),
        };
        let outcome = scan.drive(gate, progress).await;
        let emitted = scan.shutdown(&outcome).await;

        let elapsed_micros = start.elapsed().as_micros();
        match &outcome {
            ScanOutcome::Truncated(err) => {
                info!(strikes = emitted, error = %err, elapsed_micros, "identify_truncated")
            }
            ScanOutcome::Failed(err) => {
                warn!(strikes = emitted, error = %err, elapsed_micros, "identify_failed")
            }
            other => info!(
                strikes = emitted,
                outcome = other.label(),
                elapsed_micros,
                "identify_done"
            ),
        }
        if let Some(recorder) = metrics_recorder() {
            recorder.record_identify(start.elapsed(), emitted, &outcome);
        }
        outcome
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("bof_sequences", &self.bof.seqs.len())
            .field("eof_sequences", &self.eof.seqs.len())
            .field("bof_frames", &self.bof_frames.set.len())
            .field("eof_frames", &self.eof_frames.set.len())
            .field("max_bof", &self.max_bof)
            .field("max_eof", &self.max_eof)
            .field("builds", &self.engine_builds())
            .finish()
    }
}

/// One-shot request to stop the BOF-only phase and start every producer.
///
/// Only meaningful while the BOF sequence scan is running alone. Dropping the
/// gate without escalating leaves the scan to proceed on its own.
#[derive(Debug)]
pub struct Gate(oneshot::Sender<()>);

impl Gate {
    /// Returns false once the scan has left the BOF-only phase. A signal
    /// that lands while the BOF scan is running dry is accepted and changes
    /// nothing, since every producer starts next anyway.
    pub fn escalate(self) -> bool {
        self.0.send(()).is_ok()
    }
}

/// Bytes consumed so far by each producer.
#[derive(Debug, Clone)]
pub struct Progress {
    pub bof: watch::Receiver<u64>,
    pub eof: watch::Receiver<u64>,
    pub bof_frames: watch::Receiver<u64>,
    pub eof_frames: watch::Receiver<u64>,
}

struct ProgressSenders {
    bof: watch::Sender<u64>,
    eof: watch::Sender<u64>,
    bof_frames: watch::Sender<u64>,
    eof_frames: watch::Sender<u64>,
}

fn progress_channels() -> (ProgressSenders, Progress) {
    let (bof, bof_rx) = watch::channel(0);
    let (eof, eof_rx) = watch::channel(0);
    let (bof_frames, bof_frames_rx) = watch::channel(0);
    let (eof_frames, eof_frames_rx) = watch::channel(0);
    (
        ProgressSenders {
            bof,
            eof,
            bof_frames,
            eof_frames,
        },
        Progress {
            bof: bof_rx,
            eof: eof_rx,
            bof_frames: bof_frames_rx,
            eof_frames: eof_frames_rx,
        },
    )
}

/// Consumer side of one identification.
pub struct Identification {
    strikes: mpsc::Receiver<Strike>,
    gate: Option<Gate>,
    progress: Progress,
    task: JoinHandle<ScanOutcome>,
}

impl Identification {
    /// Next strike, or `None` once the scan has closed the channel.
    pub async fn next(&mut self) -> Option<Strike> {
        self.strikes.recv().await
    }

    /// Take the escalation gate to fire it from elsewhere.
    pub fn take_gate(&mut self) -> Option<Gate> {
        self.gate.take()
    }

    /// Fire the escalation gate if it has not been taken or fired yet.
    pub fn escalate(&mut self) -> bool {
        self.gate.take().is_some_and(Gate::escalate)
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Stop listening and wait for the scan to wind down.
    ///
    /// Strikes not yet received are discarded; a scan still producing
    /// finishes as [`ScanOutcome::Abandoned`].
    pub async fn finish(self) -> ScanOutcome {
        let Identification {
            strikes, gate, task, ..
        } = self;
        drop(strikes);
        drop(gate);
        match task.await {
            Ok(outcome) => outcome,
            Err(err) => ScanOutcome::Failed(MatchError::Runtime(err.to_string())),
        }
    }

    /// Drain every strike, then report how the scan ended.
    pub async fn collect(mut self) -> (Vec<Strike>, ScanOutcome) {
        let mut strikes = Vec::new();
        while let Some(strike) = self.next().await {
            strikes.push(strike);
        }
        (strikes, self.finish().await)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    SeqOnly,
    Merge,
    Done,
    Cancelled,
    Truncated,
}

/// Why emitting stopped early.
enum Halt {
    Cancelled,
    Abandoned,
}

impl From<Halt> for ScanOutcome {
    fn from(value: Halt) -> Self {
        match value {
            Halt::Cancelled => ScanOutcome::Cancelled,
            Halt::Abandoned => ScanOutcome::Abandoned,
        }
    }
}

/// Per-identification state; owns the strike sender, so dropping it closes
/// the channel.
struct Scan {
    matcher: Arc<Matcher>,
    buf: Arc<dyn Buffer>,
    quit: Quit,
    stop: Quit,
    tx: mpsc::Sender<Strike>,
    phase: Phase,
    emitted: usize,
    producers: Vec<JoinHandle<Result<u64, BufferError>>>,
}

impl Scan {
    fn enter(&mut self, next: Phase) {
        debug!(from = ?self.phase, to = ?next, "phase");
        self.phase = next;
    }

    /// Send with backpressure; never sends once `quit` has fired.
    async fn emit(&mut self, strike: Strike) -> Result<(), Halt> {
        let sent = tokio::select! {
            biased;
            _ = self.quit.cancelled() => return Err(Halt::Cancelled),
            sent = self.tx.send(strike) => sent,
        };
        match sent {
            Ok(()) => {
                self.emitted += 1;
                Ok(())
            }
            Err(_) => Err(Halt::Abandoned),
        }
    }

    async fn drive(
        &mut self,
        mut gate: oneshot::Receiver<()>,
        progress: ProgressSenders,
    ) -> ScanOutcome {
        if self.quit.is_cancelled() {
            return ScanOutcome::Cancelled;
        }
        let capacity = self.matcher.config.channel_capacity;

        let reader = match self.matcher.max_bof {
            Extent::Skip => None,
            Extent::Limited(limit) => Some(ForwardReader::limited(Arc::clone(&self.buf), limit)),
            Extent::Whole => Some(ForwardReader::new(Arc::clone(&self.buf))),
        };

        let mut bof_hits = None;
        if let Some(reader) = reader {
            let engine = match self.matcher.bof.engine().await {
                Ok(engine) => engine,
                Err(err) => return ScanOutcome::Failed(err),
            };
            let scan = engine.index(reader, progress.bof, self.stop.clone(), capacity);
            self.producers.push(scan.task);
            let mut hits = scan.hits;

            self.enter(Phase::SeqOnly);
            let mut gate_open = true;
            let escalated = loop {
                tokio::select! {
                    hit = hits.recv() => match hit {
                        Some(hit) => {
                            let strike = self.matcher.bof.strike(hit);
                            if let Err(halt) = self.emit(strike).await {
                                return halt.into();
                            }
                        }
                        None if self.quit.is_cancelled() => return ScanOutcome::Cancelled,
                        None => break false,
                    },
                    signal = &mut gate, if gate_open => match signal {
                        Ok(()) => break true,
                        Err(_) => gate_open = false,
                    },
                }
            };
            gate.close();
            if escalated {
                debug!("escalated");
                bof_hits = Some(hits);
            }
        }
        drop(gate);

        self.enter(Phase::Merge);
        let buf = Arc::clone(&self.buf);
        let extent = self.matcher.max_eof;
        // Sizing a sequential stream buffer reads it to the end.
        let opened = tokio::task::spawn_blocking(move || open_reverse(buf, extent)).await;
        let reverse = match opened {
            Ok(Ok(reader)) => reader,
            Ok(Err(_)) if self.quit.is_cancelled() => return ScanOutcome::Cancelled,
            Ok(Err(err)) => return ScanOutcome::Truncated(err),
            Err(err) => return ScanOutcome::Failed(MatchError::Runtime(err.to_string())),
        };

        let mut bof_frame_hits = Some(self.start_frames(false, progress.bof_frames, capacity));
        let mut eof_frame_hits = Some(self.start_frames(true, progress.eof_frames, capacity));
        let mut eof_hits = None;
        if let Some(reader) = reverse {
            let engine = match self.matcher.eof.engine().await {
                Ok(engine) => engine,
                Err(err) => return ScanOutcome::Failed(err),
            };
            let scan = engine.index(reader, progress.eof, self.stop.clone(), capacity);
            self.producers.push(scan.task);
            eof_hits = Some(scan.hits);
        }

        while bof_hits.is_some()
            || eof_hits.is_some()
            || bof_frame_hits.is_some()
            || eof_frame_hits.is_some()
        {
            let strike = tokio::select! {
                hit = next(&mut bof_hits), if bof_hits.is_some() => match hit {
                    Some(hit) => self.matcher.bof.strike(hit),
                    None => {
                        bof_hits = None;
                        continue;
                    }
                },
                hit = next(&mut eof_hits), if eof_hits.is_some() => match hit {
                    Some(hit) => self.matcher.eof.strike(hit),
                    None => {
                        eof_hits = None;
                        continue;
                    }
                },
                hit = next(&mut bof_frame_hits), if bof_frame_hits.is_some() => match hit {
                    Some(hit) => self.matcher.bof_frames.strike(hit, false),
                    None => {
                        bof_frame_hits = None;
                        continue;
                    }
                },
                hit = next(&mut eof_frame_hits), if eof_frame_hits.is_some() => match hit {
                    Some(hit) => self.matcher.eof_frames.strike(hit, true),
                    None => {
                        eof_frame_hits = None;
                        continue;
                    }
                },
            };
            if let Err(halt) = self.emit(strike).await {
                return halt.into();
            }
        }

        if self.quit.is_cancelled() {
            return ScanOutcome::Cancelled;
        }
        ScanOutcome::Exhausted
    }

    fn start_frames(
        &mut self,
        reverse: bool,
        progress: watch::Sender<u64>,
        capacity: usize,
    ) -> mpsc::Receiver<FrameHit> {
        let side = if reverse {
            &self.matcher.eof_frames
        } else {
            &self.matcher.bof_frames
        };
        let scan = side.set.index(
            Arc::clone(&self.buf),
            reverse,
            self.stop.clone(),
            progress,
            capacity,
        );
        self.producers.push(scan.task);
        scan.hits
    }

    /// Stop and join every producer, then close the strike channel.
    async fn shutdown(mut self, outcome: &ScanOutcome) -> usize {
        let terminal = match outcome {
            ScanOutcome::Cancelled | ScanOutcome::Abandoned => Phase::Cancelled,
            ScanOutcome::Truncated(_) => Phase::Truncated,
            ScanOutcome::Exhausted | ScanOutcome::Failed(_) => Phase::Done,
        };
        self.enter(terminal);
        self.stop.cancel();
        for producer in self.producers.drain(..) {
            if let Err(err) = producer.await {
                warn!(error = %err, "producer_panicked");
            }
        }
        self.emitted
    }
}

fn open_reverse(buf: Arc<dyn Buffer>, extent: Extent) -> Result<Option<ReverseReader>, BufferError> {
    match extent {
        Extent::Skip => Ok(None),
        Extent::Limited(limit) => ReverseReader::limited(buf, limit).map(Some),
        Extent::Whole => ReverseReader::new(buf).map(Some),
    }
}

/// Receive from an optional channel; a missing channel never yields.
async fn next<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

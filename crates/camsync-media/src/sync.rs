//! Multi-stream alignment on a shared synthetic timeline.
//!
//! Streams are sampled at evenly spaced synthetic times. At every tick each
//! stream contributes the frame whose `systime` is nearest the tick, never
//! moving backwards. The tick interval is paced to the slowest stream so no
//! stream has to supply frames faster than it recorded them.
//!
//! Input `systime`s must increase within each stream. This is not checked;
//! results for non-monotonic input are unspecified.

use std::cell::OnceCell;

use tracing::debug;

use camsync_common::{Error, ErrorKind, Frame, Result};

use crate::sequence::{
    check_index, stop_after_error, FrameSequence, IndexRange, Property, PropertyValue, SeqIter,
    Slice,
};
use crate::view::{LazyView, Overrides};

/// Anything positioned on the wall-clock timeline.
pub trait Timed {
    fn systime(&self) -> f64;
}

impl Timed for Frame {
    fn systime(&self) -> f64 {
        self.systime
    }
}

/// A stream position and its wall-clock time, used when aligning without
/// decoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub index: usize,
    pub systime: f64,
}

impl Timed for Sample {
    fn systime(&self) -> f64 {
        self.systime
    }
}

/// Forward-only nearest-neighbour lookup over one stream.
pub struct Aligner<I, T> {
    source: I,
    cursor: T,
    lookahead: Option<T>,
}

impl<I, T> Aligner<I, T>
where
    I: Iterator<Item = Result<T>>,
    T: Timed + Clone,
{
    /// Start at the first item of `source`. Returns `None` for an empty
    /// source.
    pub fn new(mut source: I) -> Result<Option<Self>> {
        Ok(source.next().transpose()?.map(|cursor| Self {
            source,
            cursor,
            lookahead: None,
        }))
    }

    /// The most recently returned item.
    pub fn cursor(&self) -> &T {
        &self.cursor
    }

    fn pull(&mut self) -> Result<Option<T>> {
        match self.lookahead.take() {
            Some(item) => Ok(Some(item)),
            None => self.source.next().transpose(),
        }
    }

    /// The item nearest to `t`, or `None` once the stream cannot bracket `t`.
    ///
    /// If the cursor is already past `t` it is returned unchanged. Otherwise
    /// the stream advances until two consecutive items bracket `t` and the
    /// closer one is returned; a tie goes to the later item.
    pub fn step(&mut self, t: f64) -> Result<Option<T>> {
        if self.cursor.systime() > t {
            return Ok(Some(self.cursor.clone()));
        }

        let Some(mut next) = self.pull()? else {
            return Ok(None);
        };
        while !(self.cursor.systime() <= t && t <= next.systime()) {
            self.cursor = next;
            next = match self.pull()? {
                Some(item) => item,
                None => return Ok(None),
            };
        }

        if t - self.cursor.systime() < next.systime() - t {
            self.lookahead = Some(next);
        } else {
            self.cursor = next;
        }
        Ok(Some(self.cursor.clone()))
    }
}

/// Alignment of every tick, computed from bulk systimes.
#[derive(Debug, Clone, Default)]
struct Table {
    systimes: Vec<Vec<f64>>,
    indexes: Vec<Vec<usize>>,
}

/// N streams sampled onto one synthetic timeline.
///
/// Iteration yields one `Vec<Frame>` per tick, one frame per stream, until
/// any stream runs out.
pub struct SyncedStreamSet<S> {
    streams: Vec<S>,
    stream_systimes: Vec<Vec<f64>>,
    interval: f64,
    start_systime: f64,
    start_indexes: Vec<usize>,
    table: OnceCell<Table>,
}

impl<S: FrameSequence<Item = Frame>> SyncedStreamSet<S> {
    /// Align `streams`.
    ///
    /// Reads each stream's systimes in bulk; streams that cannot provide
    /// them are decoded once to collect them.
    ///
    /// Every stream needs two consecutive frames bracketing the common
    /// start, so a stream whose only frame sits exactly at the start is
    /// rejected as ending before all streams have begun.
    pub fn new(mut streams: Vec<S>) -> Result<Self> {
        if streams.is_empty() {
            return Err(Error::invalid_input("no streams to synchronise"));
        }

        let mut stream_systimes = Vec::with_capacity(streams.len());
        for (k, stream) in streams.iter_mut().enumerate() {
            if stream.is_empty() {
                return Err(Error::invalid_input(format!("stream {k} is empty")));
            }
            stream_systimes.push(read_systimes(k, stream)?);
        }

        let interval = stream_systimes
            .iter()
            .map(|t| (t[t.len() - 1] - t[0]) / t.len() as f64)
            .fold(f64::MIN, f64::max);
        if !(interval > 0.0) {
            return Err(Error::invalid_input("streams do not span any time"));
        }

        let start = stream_systimes
            .iter()
            .map(|t| t[0])
            .fold(f64::MIN, f64::max);

        let mut start_samples = Vec::with_capacity(streams.len());
        for (k, times) in stream_systimes.iter().enumerate() {
            let sample = aligner(times, 0)
                .map(|mut a| a.step(start))
                .transpose()?
                .flatten()
                .ok_or_else(|| {
                    Error::invalid_input(format!("stream {k} ends before all streams have begun"))
                })?;
            start_samples.push(sample);
        }
        let start_systime =
            start_samples.iter().map(|s| s.systime).sum::<f64>() / start_samples.len() as f64;
        let start_indexes = start_samples.iter().map(|s| s.index).collect();

        debug!(
            streams = streams.len(),
            interval,
            start_systime,
            "Synchronised streams"
        );

        Ok(Self {
            streams,
            stream_systimes,
            interval,
            start_systime,
            start_indexes,
            table: OnceCell::new(),
        })
    }

    /// Synthetic seconds between ticks.
    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Synthetic time of the first tick.
    pub fn start_systime(&self) -> f64 {
        self.start_systime
    }

    /// Position in each stream of the frame used at the first tick.
    pub fn start_indexes(&self) -> &[usize] {
        &self.start_indexes
    }

    pub fn streams(&self) -> &[S] {
        &self.streams
    }

    pub fn streams_mut(&mut self) -> &mut [S] {
        &mut self.streams
    }

    pub fn into_streams(self) -> Vec<S> {
        self.streams
    }

    fn table(&self) -> &Table {
        self.table.get_or_init(|| {
            build_table(
                &self.stream_systimes,
                &self.start_indexes,
                self.start_systime,
                self.interval,
            )
        })
    }

    /// Per tick, the systime of the frame chosen from each stream.
    pub fn systimes(&self) -> Vec<Vec<f64>> {
        self.table().systimes.clone()
    }

    /// Per tick, the position of the frame chosen from each stream.
    pub fn indexes(&self) -> Vec<Vec<usize>> {
        self.table().indexes.clone()
    }

    /// A lazy slice of the synthetic timeline sharing these streams.
    pub fn view(&mut self, slice: impl Into<Slice>) -> Result<LazyView<&mut SyncedStreamSet<S>>> {
        let overrides = Overrides::<&mut SyncedStreamSet<S>>::new()
            .with(Property::Systimes, sliced_systimes::<S>)
            .with(Property::Indexes, sliced_indexes::<S>);
        LazyView::with_overrides(self, slice, overrides)
    }
}

fn sliced_systimes<S: FrameSequence<Item = Frame>>(
    set: &mut &mut SyncedStreamSet<S>,
    range: &IndexRange,
) -> Result<PropertyValue> {
    Ok(PropertyValue::TimeTuples(set.table().systimes.clone()).select(range))
}

fn sliced_indexes<S: FrameSequence<Item = Frame>>(
    set: &mut &mut SyncedStreamSet<S>,
    range: &IndexRange,
) -> Result<PropertyValue> {
    Ok(PropertyValue::IndexTuples(set.table().indexes.clone()).select(range))
}

fn read_systimes<S: FrameSequence<Item = Frame>>(k: usize, stream: &mut S) -> Result<Vec<f64>> {
    let systimes = match stream.property(Property::Systimes) {
        Ok(value) => value.into_times()?,
        Err(e) if e.kind() == ErrorKind::Capability => {
            debug!(stream = k, "Decoding stream to collect systimes");
            stream
                .iter()?
                .map(|frame| frame.map(|f| f.systime))
                .collect::<Result<Vec<f64>>>()?
        }
        Err(e) => return Err(e),
    };
    if systimes.len() != stream.len() {
        return Err(Error::inconsistency(format!(
            "stream {k} has {} frames but {} systimes",
            stream.len(),
            systimes.len()
        )));
    }
    Ok(systimes)
}

/// Aligner over bulk systimes, starting at position `from`.
fn aligner(
    times: &[f64],
    from: usize,
) -> Option<Aligner<impl Iterator<Item = Result<Sample>> + '_, Sample>> {
    let samples = times
        .iter()
        .enumerate()
        .skip(from)
        .map(|(index, &systime)| Ok(Sample { index, systime }));
    Aligner::new(samples).ok().flatten()
}

fn build_table(
    stream_systimes: &[Vec<f64>],
    start_indexes: &[usize],
    start_systime: f64,
    interval: f64,
) -> Table {
    let mut table = Table::default();
    let mut aligners = Vec::with_capacity(stream_systimes.len());
    for (times, &from) in stream_systimes.iter().zip(start_indexes) {
        match aligner(times, from) {
            Some(a) => aligners.push(a),
            None => return table,
        }
    }

    let mut t = start_systime;
    loop {
        let mut systimes = Vec::with_capacity(aligners.len());
        let mut indexes = Vec::with_capacity(aligners.len());
        for a in &mut aligners {
            match a.step(t) {
                Ok(Some(sample)) => {
                    systimes.push(sample.systime);
                    indexes.push(sample.index);
                }
                _ => return table,
            }
        }
        table.systimes.push(systimes);
        table.indexes.push(indexes);
        t += interval;
    }
}

/// Iterator over the ticks of a [`SyncedStreamSet`].
pub struct SyncIter<'a> {
    aligners: Vec<Aligner<SeqIter<'a, Frame>, Frame>>,
    systime: f64,
    interval: f64,
    done: bool,
}

impl Iterator for SyncIter<'_> {
    type Item = Result<Vec<Frame>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut tuple = Vec::with_capacity(self.aligners.len());
        for aligner in &mut self.aligners {
            match aligner.step(self.systime) {
                Ok(Some(frame)) => tuple.push(frame),
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        self.systime += self.interval;
        Some(Ok(tuple))
    }
}

impl<S: FrameSequence<Item = Frame>> FrameSequence for SyncedStreamSet<S> {
    type Item = Vec<Frame>;

    fn len(&self) -> usize {
        self.table().indexes.len()
    }

    fn get(&mut self, i: usize) -> Result<Vec<Frame>> {
        check_index(i, self.len())?;
        let indexes = self.table().indexes[i].clone();
        self.streams
            .iter_mut()
            .zip(indexes)
            .map(|(stream, index)| stream.get(index))
            .collect()
    }

    fn iter(&mut self) -> Result<SeqIter<'_, Vec<Frame>>> {
        let mut aligners = Vec::with_capacity(self.streams.len());
        let mut exhausted = false;
        for (stream, &from) in self.streams.iter_mut().zip(&self.start_indexes) {
            match Aligner::new(stream.iter_from(from)?)? {
                Some(a) => aligners.push(a),
                None => exhausted = true,
            }
        }
        Ok(Box::new(SyncIter {
            aligners,
            systime: self.start_systime,
            interval: self.interval,
            done: exhausted,
        }))
    }

    fn iter_from(&mut self, start: usize) -> Result<SeqIter<'_, Vec<Frame>>> {
        if start == 0 {
            return self.iter();
        }
        let len = self.len();
        Ok(stop_after_error((start..len).map(move |i| self.get(i))))
    }

    fn property(&mut self, property: Property) -> Result<PropertyValue> {
        match property {
            Property::Systimes => Ok(PropertyValue::TimeTuples(self.systimes())),
            Property::Indexes => Ok(PropertyValue::IndexTuples(self.indexes())),
        }
    }
}

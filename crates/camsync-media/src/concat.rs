//! Several sources stitched into one flat sequence.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob_match::glob_match;
use tracing::debug;
use walkdir::WalkDir;

use camsync_common::{Error, Frame, Result};

use crate::decoder::Backend;
use crate::sequence::{
    check_index, stop_after_error, FrameSequence, IndexRange, Property, PropertyValue, SeqIter,
    Slice,
};
use crate::source::{OpenOptions, VideoSource};
use crate::view::{LazyView, Overrides};

/// A member of a [`ConcatenatedSource`] with optional time offsets.
///
/// Offsets are added to the member's native `timestamp` and `systime`.
pub struct Block {
    source: Box<dyn FrameSequence<Item = Frame>>,
    timestamp_offset: Option<f64>,
    systime_offset: Option<f64>,
}

impl Block {
    /// A member whose clocks are used unchanged.
    pub fn plain(source: impl FrameSequence<Item = Frame> + 'static) -> Self {
        Self {
            source: Box::new(source),
            timestamp_offset: None,
            systime_offset: None,
        }
    }

    /// A member whose frames are shifted by the given offsets, in seconds.
    pub fn with_offsets(
        source: impl FrameSequence<Item = Frame> + 'static,
        timestamp_offset: Option<f64>,
        systime_offset: Option<f64>,
    ) -> Self {
        Self {
            source: Box::new(source),
            timestamp_offset,
            systime_offset,
        }
    }

    /// A boxed member used unchanged.
    pub fn boxed(source: Box<dyn FrameSequence<Item = Frame>>) -> Self {
        Self {
            source,
            timestamp_offset: None,
            systime_offset: None,
        }
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn timestamp_offset(&self) -> Option<f64> {
        self.timestamp_offset
    }

    pub fn systime_offset(&self) -> Option<f64> {
        self.systime_offset
    }

    fn has_offsets(&self) -> bool {
        self.timestamp_offset.is_some() || self.systime_offset.is_some()
    }

    fn shift(&self) -> Shift {
        Shift {
            timestamp: self.timestamp_offset.unwrap_or(0.0),
            systime: self.systime_offset.unwrap_or(0.0),
        }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("frames", &self.source.len())
            .field("timestamp_offset", &self.timestamp_offset)
            .field("systime_offset", &self.systime_offset)
            .finish()
    }
}

#[derive(Clone, Copy)]
struct Shift {
    timestamp: f64,
    systime: f64,
}

impl Shift {
    fn apply(self, mut frame: Frame, index: usize) -> Frame {
        frame.timestamp += self.timestamp;
        frame.systime += self.systime;
        frame.index = index;
        frame
    }
}

/// Ordered blocks addressed as one sequence.
///
/// Frame `i` of the concatenation is frame `i - B` of the block whose
/// global base `B` is the sum of the lengths of all preceding blocks.
#[derive(Debug)]
pub struct ConcatenatedSource {
    blocks: Vec<Block>,
    systimes: Option<Vec<f64>>,
}

impl ConcatenatedSource {
    /// Concatenate `blocks`.
    ///
    /// Fails on an empty list, and on offsets given for a member that has no
    /// native timestamps.
    pub fn new(blocks: Vec<Block>) -> Result<Self> {
        if blocks.is_empty() {
            return Err(Error::invalid_input("cannot concatenate an empty list"));
        }
        if let Some(n) = blocks
            .iter()
            .position(|b| b.has_offsets() && !b.source.has_native_timestamps())
        {
            return Err(Error::capability(format!(
                "block {n} has time offsets but no native timestamps"
            )));
        }
        Ok(Self {
            blocks,
            systimes: None,
        })
    }

    /// Concatenate sources without offsets.
    pub fn from_sources<S>(sources: impl IntoIterator<Item = S>) -> Result<Self>
    where
        S: FrameSequence<Item = Frame> + 'static,
    {
        Self::new(sources.into_iter().map(Block::plain).collect())
    }

    /// Open every path as a [`VideoSource`] and concatenate them in order.
    pub fn from_paths<P: AsRef<Path>>(
        paths: impl IntoIterator<Item = P>,
        backend: Arc<dyn Backend>,
        options: &OpenOptions,
    ) -> Result<Self> {
        let blocks = paths
            .into_iter()
            .map(|p| VideoSource::open(p, Arc::clone(&backend), options).map(Block::plain))
            .collect::<Result<Vec<_>>>()?;
        Self::new(blocks)
    }

    /// Concatenate every file matching `pattern`, in sorted path order.
    ///
    /// `*` and `?` stay within one path component, `**` crosses directories.
    pub fn from_glob(
        pattern: &str,
        backend: Arc<dyn Backend>,
        options: &OpenOptions,
    ) -> Result<Self> {
        let paths = glob_paths(pattern)?;
        if paths.is_empty() {
            return Err(Error::invalid_input(format!("no videos match {pattern}")));
        }
        debug!(pattern, videos = paths.len(), "Expanded video pattern");
        Self::from_paths(paths, backend, options)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Block number and local position of global position `i`.
    fn locate(&self, mut i: usize) -> Option<(usize, usize)> {
        for (n, block) in self.blocks.iter().enumerate() {
            if i < block.len() {
                return Some((n, i));
            }
            i -= block.len();
        }
        None
    }

    /// Wall-clock seconds of every frame, computed once.
    pub fn systimes(&mut self) -> Result<Vec<f64>> {
        if let Some(systimes) = &self.systimes {
            return Ok(systimes.clone());
        }
        let mut all = Vec::with_capacity(self.len());
        for block in &mut self.blocks {
            let shift = block.shift().systime;
            let native = block.source.property(Property::Systimes)?.into_times()?;
            all.extend(native.into_iter().map(|t| t + shift));
        }
        self.systimes = Some(all.clone());
        Ok(all)
    }

    /// A lazy slice of the concatenation.
    pub fn view(&mut self, slice: impl Into<Slice>) -> Result<LazyView<&mut ConcatenatedSource>> {
        let overrides =
            Overrides::<&mut ConcatenatedSource>::new().with(Property::Systimes, sliced_systimes);
        LazyView::with_overrides(self, slice, overrides)
    }
}

fn has_wildcard(component: &str) -> bool {
    component.contains(|c: char| matches!(c, '*' | '?' | '[' | '{'))
}

/// Files matching `pattern`, sorted.
///
/// Walks from the longest leading directory without wildcards.
fn glob_paths(pattern: &str) -> Result<Vec<PathBuf>> {
    let pattern_path = Path::new(pattern);
    let root: PathBuf = pattern_path
        .components()
        .take_while(|c| !has_wildcard(&c.as_os_str().to_string_lossy()))
        .collect();
    if root == pattern_path {
        return Ok(if root.is_file() { vec![root] } else { Vec::new() });
    }
    let rest = pattern_path
        .strip_prefix(&root)
        .map_err(|e| Error::invalid_input(format!("{pattern}: {e}")))?
        .to_string_lossy()
        .replace('\\', "/");
    let walk_root = if root.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        root.clone()
    };

    let mut walker = WalkDir::new(&walk_root).min_depth(1);
    if !rest.contains("**") {
        walker = walker.max_depth(rest.split('/').count());
    }
    let mut paths = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(&walk_root) else {
            continue;
        };
        let candidate = relative.to_string_lossy().replace('\\', "/");
        if glob_match(&rest, &candidate) {
            paths.push(root.join(relative));
        }
    }
    paths.sort();
    Ok(paths)
}

fn sliced_systimes(
    source: &mut &mut ConcatenatedSource,
    range: &IndexRange,
) -> Result<PropertyValue> {
    Ok(PropertyValue::Times(source.systimes()?).select(range))
}

impl FrameSequence for ConcatenatedSource {
    type Item = Frame;

    fn len(&self) -> usize {
        self.blocks.iter().map(Block::len).sum()
    }

    fn get(&mut self, i: usize) -> Result<Frame> {
        let len = self.len();
        check_index(i, len)?;
        let (n, local) = self.locate(i).ok_or(Error::IndexOutOfRange {
            index: i as isize,
            len,
        })?;
        let block = &mut self.blocks[n];
        let shift = block.shift();
        Ok(shift.apply(block.source.get(local)?, i))
    }

    fn iter(&mut self) -> Result<SeqIter<'_, Frame>> {
        self.iter_from(0)
    }

    fn iter_from(&mut self, start: usize) -> Result<SeqIter<'_, Frame>> {
        let mut base = 0;
        let mut members = Vec::with_capacity(self.blocks.len());
        for block in &mut self.blocks {
            let len = block.len();
            if base + len > start {
                members.push((base, start.saturating_sub(base), block));
            }
            base += len;
        }

        // Member iterators are opened only once the previous one is exhausted.
        let frames = members.into_iter().flat_map(|(base, skip, block)| {
            let shift = block.shift();
            let opened = if skip == 0 {
                block.source.iter()
            } else {
                block.source.iter_from(skip)
            };
            let inner: SeqIter<'_, Frame> = match opened {
                Ok(frames) => Box::new(frames.enumerate().map(move |(n, frame)| {
                    frame.map(|f| shift.apply(f, base + skip + n))
                })),
                Err(e) => Box::new(std::iter::once(Err(e))),
            };
            inner
        });
        Ok(stop_after_error(frames))
    }

    fn property(&mut self, property: Property) -> Result<PropertyValue> {
        match property {
            Property::Systimes => Ok(PropertyValue::Times(self.systimes()?)),
            Property::Indexes => Err(Error::capability("a concatenation has no stream indexes")),
        }
    }

    fn has_native_timestamps(&self) -> bool {
        self.blocks.iter().all(|b| b.source.has_native_timestamps())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FrameList;
    use crate::sequence::TimeSeries;
    use assert_matches::assert_matches;

    const LENGTHS: [usize; 3] = [5, 7, 3];
    const BASE_OFFSET: f64 = 15.0;

    /// Blocks whose frames have timestamp and systime equal to their local
    /// index, shifted so the concatenation counts up from `BASE_OFFSET`.
    fn offset_blocks() -> Vec<Block> {
        let mut base = 0.0;
        LENGTHS
            .iter()
            .map(|&len| {
                let block = Block::with_offsets(
                    FrameList::uniform(len, 1.0, 0.0),
                    Some(base),
                    Some(BASE_OFFSET + base),
                );
                base += len as f64;
                block
            })
            .collect()
    }

    fn expected_systimes() -> Vec<f64> {
        (0..15).map(|i| BASE_OFFSET + i as f64).collect()
    }

    #[test]
    fn test_length_is_sum_of_blocks() {
        let cat = ConcatenatedSource::new(offset_blocks()).unwrap();
        assert_eq!(cat.len(), LENGTHS.iter().sum::<usize>());
    }

    #[test]
    fn test_iteration_renumbers_and_shifts() {
        let mut cat = ConcatenatedSource::new(offset_blocks()).unwrap();
        let frames: Vec<Frame> = cat.iter().unwrap().map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 15);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index, i);
            assert_eq!(frame.timestamp, i as f64);
        }
        let systimes: Vec<f64> = frames.iter().map(|f| f.systime).collect();
        assert_eq!(systimes, expected_systimes());
    }

    #[test]
    fn test_get_matches_iteration() {
        let mut cat = ConcatenatedSource::new(offset_blocks()).unwrap();
        let reference: Vec<Frame> = cat.iter().unwrap().map(|f| f.unwrap()).collect();
        for (i, expected) in reference.iter().enumerate() {
            let frame = cat.get(i).unwrap();
            assert_eq!(frame.meta(), expected.meta());
        }
        let tail: Vec<f64> = (1..=3).map(|k| cat.at(-k).unwrap().systime).collect();
        assert_eq!(tail, vec![29.0, 28.0, 27.0]);
    }

    #[test]
    fn test_offset_law() {
        let mut cat = ConcatenatedSource::new(offset_blocks()).unwrap();
        let mut member = FrameList::uniform(7, 1.0, 0.0);
        for j in 0..7 {
            let shifted = cat.get(5 + j).unwrap();
            assert_eq!(shifted.systime, member.get(j).unwrap().systime + BASE_OFFSET + 5.0);
        }
    }

    #[test]
    fn test_backward_access_across_blocks() {
        let mut cat = ConcatenatedSource::new(offset_blocks()).unwrap();
        assert_eq!(cat.get(12).unwrap().systime, 27.0);
        let first = cat.get(0).unwrap();
        assert_eq!(first.systime, BASE_OFFSET);
        assert_eq!(first.timestamp, 0.0);
    }

    #[test]
    fn test_out_of_range() {
        let mut cat = ConcatenatedSource::new(offset_blocks()).unwrap();
        assert_matches!(cat.get(15), Err(Error::IndexOutOfRange { .. }));
        assert_matches!(cat.at(-16), Err(Error::IndexOutOfRange { .. }));
    }

    #[test]
    fn test_systimes_and_sliced_systimes() {
        let mut cat = ConcatenatedSource::new(offset_blocks()).unwrap();
        assert_eq!(cat.systimes().unwrap(), expected_systimes());

        let mut cut = cat.view(3..7).unwrap();
        assert_eq!(cut.len(), 4);
        assert_eq!(cut.systimes().unwrap(), vec![18.0, 19.0, 20.0, 21.0]);
        assert_eq!(cut.get(3).unwrap().systime, 21.0);
    }

    #[test]
    fn test_iter_from_middle_block() {
        let mut cat = ConcatenatedSource::new(offset_blocks()).unwrap();
        let indexes: Vec<usize> = cat.iter_from(10).unwrap().map(|f| f.unwrap().index).collect();
        assert_eq!(indexes, (10..15).collect::<Vec<_>>());
    }

    #[test]
    fn test_rejects_empty_list() {
        assert_matches!(ConcatenatedSource::new(Vec::new()), Err(Error::InvalidInput(_)));
    }

    #[test]
    fn test_offsets_need_native_timestamps() {
        let blocks = vec![
            Block::plain(FrameList::uniform(2, 1.0, 0.0)),
            Block::with_offsets(
                FrameList::uniform(2, 1.0, 0.0).without_native_timestamps(),
                Some(2.0),
                None,
            ),
        ];
        assert_matches!(ConcatenatedSource::new(blocks), Err(Error::Capability(_)));
    }

    #[test]
    fn test_systimes_capability_propagates() {
        let mut cat = ConcatenatedSource::from_sources(vec![
            FrameList::uniform(2, 1.0, 0.0),
            FrameList::uniform(2, 1.0, 0.0).without_native_timestamps(),
        ])
        .unwrap();
        assert_matches!(cat.systimes(), Err(Error::Capability(_)));
        assert!(!cat.has_native_timestamps());
        assert_eq!(cat.iter().unwrap().count(), 4);
    }
}

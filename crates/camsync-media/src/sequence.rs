//! The indexed-sequence protocol shared by sources, views, and sets.

use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

use camsync_common::{Error, Result};

/// Boxed fallible iterator returned by [`FrameSequence::iter`].
pub type SeqIter<'a, T> = Box<dyn Iterator<Item = Result<T>> + 'a>;

/// Bulk properties readable without decoding pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    /// Wall-clock seconds per item.
    Systimes,
    /// Chosen source index per stream, per item.
    Indexes,
}

/// Value of a [`Property`].
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// One time per item.
    Times(Vec<f64>),
    /// One time per stream, per item.
    TimeTuples(Vec<Vec<f64>>),
    /// One source index per stream, per item.
    IndexTuples(Vec<Vec<usize>>),
}

impl PropertyValue {
    /// Number of items covered.
    pub fn len(&self) -> usize {
        match self {
            PropertyValue::Times(v) => v.len(),
            PropertyValue::TimeTuples(v) => v.len(),
            PropertyValue::IndexTuples(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The items selected by `range`, in range order.
    pub fn select(&self, range: &IndexRange) -> PropertyValue {
        fn pick<T: Clone>(items: &[T], range: &IndexRange) -> Vec<T> {
            range.iter().filter_map(|i| items.get(i).cloned()).collect()
        }
        match self {
            PropertyValue::Times(v) => PropertyValue::Times(pick(v, range)),
            PropertyValue::TimeTuples(v) => PropertyValue::TimeTuples(pick(v, range)),
            PropertyValue::IndexTuples(v) => PropertyValue::IndexTuples(pick(v, range)),
        }
    }

    pub fn into_times(self) -> Result<Vec<f64>> {
        match self {
            PropertyValue::Times(v) => Ok(v),
            other => Err(Error::inconsistency(format!(
                "expected per-item times, got {}",
                other.shape()
            ))),
        }
    }

    pub fn into_time_tuples(self) -> Result<Vec<Vec<f64>>> {
        match self {
            PropertyValue::TimeTuples(v) => Ok(v),
            other => Err(Error::inconsistency(format!(
                "expected per-stream times, got {}",
                other.shape()
            ))),
        }
    }

    pub fn into_index_tuples(self) -> Result<Vec<Vec<usize>>> {
        match self {
            PropertyValue::IndexTuples(v) => Ok(v),
            other => Err(Error::inconsistency(format!(
                "expected per-stream indexes, got {}",
                other.shape()
            ))),
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            PropertyValue::Times(_) => "per-item times",
            PropertyValue::TimeTuples(_) => "per-stream times",
            PropertyValue::IndexTuples(_) => "per-stream indexes",
        }
    }
}

/// A finite sequence addressable by position.
///
/// Access takes `&mut self` since sources keep decoder state between calls.
pub trait FrameSequence {
    type Item;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item at position `i`, `0 <= i < len()`.
    fn get(&mut self, i: usize) -> Result<Self::Item>;

    /// Item at a possibly negative position; `-1` is the last item.
    fn at(&mut self, i: isize) -> Result<Self::Item> {
        let i = resolve_index(i, self.len())?;
        self.get(i)
    }

    /// Iterate from the first item. An `Err` item ends the iteration.
    fn iter(&mut self) -> Result<SeqIter<'_, Self::Item>>;

    /// Iterate from position `start`.
    fn iter_from(&mut self, start: usize) -> Result<SeqIter<'_, Self::Item>> {
        Ok(Box::new(self.iter()?.skip(start)))
    }

    /// Read a bulk property.
    fn property(&mut self, property: Property) -> Result<PropertyValue> {
        Err(Error::capability(format!("{property:?} is not available")))
    }

    /// Whether items carry native timestamps that can be rebased.
    fn has_native_timestamps(&self) -> bool {
        false
    }
}

impl<S: FrameSequence + ?Sized> FrameSequence for &mut S {
    type Item = S::Item;

    fn len(&self) -> usize {
        (**self).len()
    }

    fn get(&mut self, i: usize) -> Result<Self::Item> {
        (**self).get(i)
    }

    fn at(&mut self, i: isize) -> Result<Self::Item> {
        (**self).at(i)
    }

    fn iter(&mut self) -> Result<SeqIter<'_, Self::Item>> {
        (**self).iter()
    }

    fn iter_from(&mut self, start: usize) -> Result<SeqIter<'_, Self::Item>> {
        (**self).iter_from(start)
    }

    fn property(&mut self, property: Property) -> Result<PropertyValue> {
        (**self).property(property)
    }

    fn has_native_timestamps(&self) -> bool {
        (**self).has_native_timestamps()
    }
}

impl<S: FrameSequence + ?Sized> FrameSequence for Box<S> {
    type Item = S::Item;

    fn len(&self) -> usize {
        (**self).len()
    }

    fn get(&mut self, i: usize) -> Result<Self::Item> {
        (**self).get(i)
    }

    fn at(&mut self, i: isize) -> Result<Self::Item> {
        (**self).at(i)
    }

    fn iter(&mut self) -> Result<SeqIter<'_, Self::Item>> {
        (**self).iter()
    }

    fn iter_from(&mut self, start: usize) -> Result<SeqIter<'_, Self::Item>> {
        (**self).iter_from(start)
    }

    fn property(&mut self, property: Property) -> Result<PropertyValue> {
        (**self).property(property)
    }

    fn has_native_timestamps(&self) -> bool {
        (**self).has_native_timestamps()
    }
}

/// Per-item wall-clock times of a single-stream sequence.
pub trait TimeSeries {
    fn systimes(&mut self) -> Result<Vec<f64>>;
}

impl<S: FrameSequence + ?Sized> TimeSeries for S {
    fn systimes(&mut self) -> Result<Vec<f64>> {
        self.property(Property::Systimes)?.into_times()
    }
}

/// Resolve a possibly negative position against `len`.
pub fn resolve_index(i: isize, len: usize) -> Result<usize> {
    let resolved = if i < 0 { i + len as isize } else { i };
    if resolved < 0 || resolved as usize >= len {
        return Err(Error::IndexOutOfRange { index: i, len });
    }
    Ok(resolved as usize)
}

/// Check `i` against `len`.
pub fn check_index(i: usize, len: usize) -> Result<()> {
    if i >= len {
        return Err(Error::IndexOutOfRange {
            index: i as isize,
            len,
        });
    }
    Ok(())
}

/// Stop an iterator after the first error it yields.
pub(crate) fn stop_after_error<'a, T: 'a>(
    iter: impl Iterator<Item = Result<T>> + 'a,
) -> SeqIter<'a, T> {
    Box::new(iter.scan(false, |failed, item| {
        if *failed {
            return None;
        }
        *failed = item.is_err();
        Some(item)
    }))
}

/// Unresolved slice bounds, like `a:b:c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slice {
    pub start: Option<isize>,
    pub stop: Option<isize>,
    pub step: Option<isize>,
}

impl Slice {
    pub fn new(start: Option<isize>, stop: Option<isize>, step: Option<isize>) -> Self {
        Self { start, stop, step }
    }

    /// The whole sequence.
    pub fn full() -> Self {
        Self::default()
    }

    /// Set the step.
    pub fn step(mut self, step: isize) -> Self {
        self.step = Some(step);
        self
    }

    /// Resolve against a sequence of length `len`.
    ///
    /// Negative bounds count from the end; out-of-range bounds are clamped.
    pub fn indices(&self, len: usize) -> Result<IndexRange> {
        let len = len as isize;
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(Error::invalid_input("slice step cannot be zero"));
        }

        let (lower, upper) = if step < 0 { (-1, len - 1) } else { (0, len) };
        let clamp = |bound: isize| {
            if bound < 0 {
                (bound + len).max(lower)
            } else {
                bound.min(upper)
            }
        };

        let start = match self.start {
            Some(s) => clamp(s),
            None if step < 0 => upper,
            None => lower,
        };
        let stop = match self.stop {
            Some(s) => clamp(s),
            None if step < 0 => lower,
            None => upper,
        };
        Ok(IndexRange { start, stop, step })
    }
}

impl From<Range<isize>> for Slice {
    fn from(r: Range<isize>) -> Self {
        Slice::new(Some(r.start), Some(r.end), None)
    }
}

impl From<RangeFrom<isize>> for Slice {
    fn from(r: RangeFrom<isize>) -> Self {
        Slice::new(Some(r.start), None, None)
    }
}

impl From<RangeTo<isize>> for Slice {
    fn from(r: RangeTo<isize>) -> Self {
        Slice::new(None, Some(r.end), None)
    }
}

impl From<RangeFull> for Slice {
    fn from(_: RangeFull) -> Self {
        Slice::full()
    }
}

/// A resolved arithmetic range of positions, possibly descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    start: isize,
    stop: isize,
    step: isize,
}

impl IndexRange {
    /// `0..len` with step 1.
    pub fn full(len: usize) -> Self {
        Self {
            start: 0,
            stop: len as isize,
            step: 1,
        }
    }

    pub fn start(&self) -> isize {
        self.start
    }

    pub fn stop(&self) -> isize {
        self.stop
    }

    pub fn step(&self) -> isize {
        self.step
    }

    pub fn len(&self) -> usize {
        let (lo, hi, step) = if self.step > 0 {
            (self.start, self.stop, self.step)
        } else {
            (self.stop, self.start, -self.step)
        };
        if hi <= lo {
            0
        } else {
            ((hi - lo + step - 1) / step) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parent position of the `i`:th element.
    pub fn get(&self, i: usize) -> Option<usize> {
        if i >= self.len() {
            return None;
        }
        Some((self.start + i as isize * self.step) as usize)
    }

    /// Parent position of a possibly negative element.
    pub fn at(&self, i: isize) -> Result<usize> {
        let i = resolve_index(i, self.len())?;
        Ok((self.start + i as isize * self.step) as usize)
    }

    /// Parent positions in order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).map(move |i| (self.start + i as isize * self.step) as usize)
    }

    /// Slice this range; the result maps straight into the parent.
    pub fn slice(&self, slice: impl Into<Slice>) -> Result<IndexRange> {
        let inner = slice.into().indices(self.len())?;
        Ok(IndexRange {
            start: self.start + inner.start * self.step,
            stop: self.start + inner.stop * self.step,
            step: self.step * inner.step,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn positions(range: IndexRange) -> Vec<usize> {
        range.iter().collect()
    }

    #[test]
    fn test_slice_defaults() {
        assert_eq!(positions(Slice::full().indices(4).unwrap()), vec![0, 1, 2, 3]);
        assert_eq!(
            positions(Slice::full().step(-1).indices(4).unwrap()),
            vec![3, 2, 1, 0]
        );
        assert_eq!(positions(Slice::full().step(2).indices(5).unwrap()), vec![0, 2, 4]);
    }

    #[test]
    fn test_slice_negative_bounds() {
        assert_eq!(positions(Slice::from(-3..).indices(10).unwrap()), vec![7, 8, 9]);
        assert_eq!(positions(Slice::from(..-8).indices(10).unwrap()), vec![0, 1]);
        assert_eq!(
            positions(Slice::new(Some(-2), Some(-6), Some(-2)).indices(10).unwrap()),
            vec![8, 6]
        );
    }

    #[test]
    fn test_slice_clamps() {
        assert_eq!(positions(Slice::from(5..100).indices(7).unwrap()), vec![5, 6]);
        assert!(Slice::from(8..2).indices(10).unwrap().is_empty());
        assert!(Slice::from(-100..-50).indices(10).unwrap().is_empty());
        assert_eq!(
            positions(Slice::new(Some(100), None, Some(-3)).indices(7).unwrap()),
            vec![6, 3, 0]
        );
    }

    #[test]
    fn test_zero_step_is_rejected() {
        assert_matches!(Slice::full().step(0).indices(3), Err(Error::InvalidInput(_)));
    }

    #[test]
    fn test_range_of_range() {
        let outer = Slice::from(2..18).indices(20).unwrap().slice(Slice::full().step(-3)).unwrap();
        assert_eq!(positions(outer), vec![17, 14, 11, 8, 5, 2]);

        let inner = outer.slice(1..-1).unwrap();
        assert_eq!(positions(inner), vec![14, 11, 8, 5]);
        assert_eq!(inner.at(-1).unwrap(), 5);
        assert_eq!(inner.get(4), None);
    }

    #[test]
    fn test_resolve_index() {
        assert_eq!(resolve_index(-1, 3).unwrap(), 2);
        assert_eq!(resolve_index(0, 3).unwrap(), 0);
        assert_matches!(
            resolve_index(3, 3),
            Err(Error::IndexOutOfRange { index: 3, len: 3 })
        );
        assert_matches!(resolve_index(-4, 3), Err(Error::IndexOutOfRange { .. }));
        assert_matches!(resolve_index(0, 0), Err(Error::IndexOutOfRange { .. }));
    }

    #[test]
    fn test_property_select() {
        let times = PropertyValue::Times(vec![0.0, 1.0, 2.0, 3.0]);
        let range = Slice::full().step(-2).indices(4).unwrap();
        assert_eq!(times.select(&range), PropertyValue::Times(vec![3.0, 1.0]));
        assert_matches!(times.into_index_tuples(), Err(Error::Inconsistency(_)));
    }
}

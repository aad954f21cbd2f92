//! Windowed views over any [`FrameSequence`].

use std::collections::HashMap;
use std::fmt;

use camsync_common::Result;

use crate::sequence::{FrameSequence, IndexRange, Property, PropertyValue, SeqIter, Slice};

/// Computes a property of a view directly from its parent.
pub type Resolver<P> = fn(&mut P, &IndexRange) -> Result<PropertyValue>;

/// Property resolvers registered by the component that created a view.
pub struct Overrides<P> {
    resolvers: HashMap<Property, Resolver<P>>,
}

impl<P> Overrides<P> {
    pub fn new() -> Self {
        Self {
            resolvers: HashMap::new(),
        }
    }

    /// Register `resolver` for `property`.
    pub fn with(mut self, property: Property, resolver: Resolver<P>) -> Self {
        self.resolvers.insert(property, resolver);
        self
    }

    pub fn get(&self, property: Property) -> Option<Resolver<P>> {
        self.resolvers.get(&property).copied()
    }
}

impl<P> Default for Overrides<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Clone for Overrides<P> {
    fn clone(&self) -> Self {
        Self {
            resolvers: self.resolvers.clone(),
        }
    }
}

impl<P> fmt::Debug for Overrides<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.resolvers.keys()).finish()
    }
}

/// A read-only slice of a parent sequence.
///
/// The view stores no items. Every access maps through the range into the
/// parent, so `view.get(i)` is `parent.get(range[i])`.
pub struct LazyView<P> {
    parent: P,
    range: IndexRange,
    overrides: Overrides<P>,
}

impl<P: FrameSequence> LazyView<P> {
    /// View `slice` of `parent`.
    pub fn new(parent: P, slice: impl Into<Slice>) -> Result<Self> {
        Self::with_overrides(parent, slice, Overrides::new())
    }

    /// View `slice` of `parent`, resolving the given properties through
    /// `overrides` instead of the parent's own property.
    pub fn with_overrides(
        parent: P,
        slice: impl Into<Slice>,
        overrides: Overrides<P>,
    ) -> Result<Self> {
        let range = slice.into().indices(parent.len())?;
        Ok(Self {
            parent,
            range,
            overrides,
        })
    }

    /// Narrow this view further. The result still reads the same parent.
    pub fn slice(self, slice: impl Into<Slice>) -> Result<Self> {
        let range = self.range.slice(slice)?;
        Ok(Self {
            parent: self.parent,
            range,
            overrides: self.overrides,
        })
    }

    /// Parent positions covered by this view.
    pub fn range(&self) -> &IndexRange {
        &self.range
    }

    pub fn parent(&self) -> &P {
        &self.parent
    }

    pub fn into_parent(self) -> P {
        self.parent
    }
}

impl<P: FrameSequence> FrameSequence for LazyView<P> {
    type Item = P::Item;

    fn len(&self) -> usize {
        self.range.len()
    }

    fn get(&mut self, i: usize) -> Result<Self::Item> {
        let parent_index = self.range.at(i as isize)?;
        self.parent.get(parent_index)
    }

    fn iter(&mut self) -> Result<SeqIter<'_, Self::Item>> {
        self.iter_from(0)
    }

    fn iter_from(&mut self, start: usize) -> Result<SeqIter<'_, Self::Item>> {
        let range = self.range;
        let parent = &mut self.parent;
        let items = (start..range.len())
            .filter_map(move |i| range.get(i))
            .map(move |i| parent.get(i));
        Ok(crate::sequence::stop_after_error(items))
    }

    fn property(&mut self, property: Property) -> Result<PropertyValue> {
        match self.overrides.get(property) {
            Some(resolve) => resolve(&mut self.parent, &self.range),
            None => Ok(self.parent.property(property)?.select(&self.range)),
        }
    }

    fn has_native_timestamps(&self) -> bool {
        self.parent.has_native_timestamps()
    }
}

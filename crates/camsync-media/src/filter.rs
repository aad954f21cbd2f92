//! Lazy per-frame transforms.

use camsync_common::{Filtered, Frame, Result};

use crate::sequence::{FrameSequence, Property, PropertyValue, SeqIter};

/// Applies `transform` to every frame read from `source`.
///
/// Metadata the transform does not set on its output is copied from the
/// input frame, so pixel-only filters keep `index`, `pts`, `timestamp` and
/// `systime` intact.
pub struct FilterView<S, F> {
    source: S,
    transform: F,
}

impl<S, F, T> FilterView<S, F>
where
    S: FrameSequence<Item = Frame>,
    F: FnMut(Frame) -> T,
    T: Into<Filtered>,
{
    pub fn new(source: S, transform: F) -> Self {
        Self { source, transform }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

fn apply<F, T>(transform: &mut F, frame: Frame) -> Frame
where
    F: FnMut(Frame) -> T,
    T: Into<Filtered>,
{
    let meta = frame.meta();
    transform(frame).into().restore(meta)
}

impl<S, F, T> FrameSequence for FilterView<S, F>
where
    S: FrameSequence<Item = Frame>,
    F: FnMut(Frame) -> T,
    T: Into<Filtered>,
{
    type Item = Frame;

    fn len(&self) -> usize {
        self.source.len()
    }

    fn get(&mut self, i: usize) -> Result<Frame> {
        let frame = self.source.get(i)?;
        Ok(apply(&mut self.transform, frame))
    }

    fn iter(&mut self) -> Result<SeqIter<'_, Frame>> {
        let transform = &mut self.transform;
        let frames = self.source.iter()?;
        Ok(Box::new(
            frames.map(move |frame| frame.map(|f| apply(transform, f))),
        ))
    }

    fn iter_from(&mut self, start: usize) -> Result<SeqIter<'_, Frame>> {
        let transform = &mut self.transform;
        let frames = self.source.iter_from(start)?;
        Ok(Box::new(
            frames.map(move |frame| frame.map(|f| apply(transform, f))),
        ))
    }

    fn property(&mut self, property: Property) -> Result<PropertyValue> {
        self.source.property(property)
    }

    fn has_native_timestamps(&self) -> bool {
        self.source.has_native_timestamps()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FrameList;
    use crate::sequence::TimeSeries;
    use image::{DynamicImage, GrayImage, Luma};

    fn invert(frame: Frame) -> DynamicImage {
        let mut image = frame.image;
        image.invert();
        image
    }

    #[test]
    fn test_pixel_filter_keeps_metadata() {
        let mut source = FrameList::uniform(4, 0.5, 100.0);
        let expected = source.get(2).unwrap();

        let mut view = FilterView::new(&mut source, invert);
        let frame = view.get(2).unwrap();
        assert_eq!(frame.meta(), expected.meta());
        assert_eq!(frame.image.to_luma8().get_pixel(0, 0), &Luma([255 - 2]));
    }

    #[test]
    fn test_filter_may_set_metadata() {
        let mut view = FilterView::new(FrameList::uniform(3, 1.0, 0.0), |frame: Frame| {
            let systime = frame.systime + 1000.0;
            Filtered::from(frame).with_systime(systime)
        });
        let systimes: Vec<f64> = view.iter().unwrap().map(|f| f.unwrap().systime).collect();
        assert_eq!(systimes, vec![1000.0, 1001.0, 1002.0]);
        assert_eq!(view.systimes().unwrap(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_replacing_image_only() {
        let mut view = FilterView::new(FrameList::uniform(5, 1.0, 10.0), |_frame: Frame| {
            Filtered::image(DynamicImage::ImageLuma8(GrayImage::new(1, 1)))
        });
        let frames: Vec<Frame> = view.iter_from(3).unwrap().map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].index, 3);
        assert_eq!(frames[1].systime, 14.0);
        assert_eq!(frames[1].width(), 1);
    }
}

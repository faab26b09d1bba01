use std::collections::HashSet;

use crate::models::frame::{Frame, FrameId, FrameOrigin};

/// Ordered frame collection with a single, non-owning selection.
///
/// The selection always names a frame currently in the gallery, or nothing.
/// Ids of removed frames are remembered so they are never admitted again.
#[derive(Debug, Default)]
pub struct Gallery {
    frames: Vec<Frame>,
    selected: Option<FrameId>,
    retired: HashSet<FrameId>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame. It becomes selected only if nothing was selected.
    pub fn add(&mut self, frame: Frame) {
        debug_assert!(!self.has_used(&frame.id), "duplicate frame id {}", frame.id);
        if self.selected.is_none() {
            self.selected = Some(frame.id.clone());
        }
        self.frames.push(frame);
    }

    /// Keep a generation result: prepended and always tagged as generated.
    pub fn import_generated(&mut self, mut frame: Frame) {
        debug_assert!(!self.has_used(&frame.id), "duplicate frame id {}", frame.id);
        frame.origin = FrameOrigin::Generated;
        frame.source_timestamp = None;
        if self.selected.is_none() {
            self.selected = Some(frame.id.clone());
        }
        self.frames.insert(0, frame);
    }

    /// Select a frame by id. Unknown ids are ignored; returns whether the
    /// selection changed to `id`.
    pub fn select(&mut self, id: &FrameId) -> bool {
        if self.get(id).is_none() {
            tracing::debug!(frame_id = %id, "Ignoring selection of unknown frame");
            return false;
        }
        self.selected = Some(id.clone());
        true
    }

    /// Remove a frame. Removing the selected frame clears the selection; no
    /// neighbour is selected in its place.
    pub fn remove(&mut self, id: &FrameId) -> Option<Frame> {
        let index = self.frames.iter().position(|f| &f.id == id)?;
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        self.retired.insert(id.clone());
        Some(self.frames.remove(index))
    }

    /// Whether `id` is in the gallery or was in it before being removed.
    pub fn has_used(&self, id: &FrameId) -> bool {
        self.get(id).is_some() || self.retired.contains(id)
    }

    pub fn get(&self, id: &FrameId) -> Option<&Frame> {
        self.frames.iter().find(|f| &f.id == id)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn selected_id(&self) -> Option<&FrameId> {
        self.selected.as_ref()
    }

    pub fn selected(&self) -> Option<&Frame> {
        self.selected.as_ref().and_then(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::frame::{Dimensions, EncodedImage};

    fn captured(ts: f64) -> Frame {
        Frame::captured(
            EncodedImage::from_bytes("image/jpeg", b"\xff\xd8"),
            ts,
            Dimensions { width: 4, height: 4 },
        )
    }

    fn assert_selection_valid(gallery: &Gallery) {
        if let Some(id) = gallery.selected_id() {
            assert!(gallery.get(id).is_some(), "selection {} is dangling", id);
        }
        let ids: HashSet<_> = gallery.frames().iter().map(|f| f.id.clone()).collect();
        assert_eq!(ids.len(), gallery.len());
    }

    #[test]
    fn test_first_add_selects() {
        let mut gallery = Gallery::new();
        let first = captured(1.0);
        let first_id = first.id.clone();
        gallery.add(first);
        assert_eq!(gallery.selected_id(), Some(&first_id));

        gallery.add(captured(2.0));
        assert_eq!(gallery.selected_id(), Some(&first_id));
        assert_eq!(gallery.len(), 2);
    }

    #[test]
    fn test_remove_selected_clears_selection() {
        let mut gallery = Gallery::new();
        let frames: Vec<Frame> = (0..3).map(|i| captured(i as f64)).collect();
        let middle = frames[1].id.clone();
        for frame in frames {
            gallery.add(frame);
        }

        assert!(gallery.select(&middle));
        let removed = gallery.remove(&middle).unwrap();
        assert_eq!(removed.id, middle);
        assert_eq!(gallery.selected_id(), None);
        assert_eq!(gallery.len(), 2);
    }

    #[test]
    fn test_remove_unselected_keeps_selection() {
        let mut gallery = Gallery::new();
        let a = captured(0.0);
        let b = captured(1.0);
        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        gallery.add(a);
        gallery.add(b);

        gallery.remove(&b_id);
        assert_eq!(gallery.selected_id(), Some(&a_id));
        assert!(gallery.remove(&b_id).is_none());
    }

    #[test]
    fn test_removed_ids_stay_used() {
        let mut gallery = Gallery::new();
        let a = captured(0.0);
        let a_id = a.id.clone();
        gallery.add(a);
        assert!(gallery.has_used(&a_id));

        gallery.remove(&a_id);
        assert!(gallery.get(&a_id).is_none());
        assert!(gallery.has_used(&a_id));
        assert!(!gallery.has_used(&FrameId::from("never-added")));
    }

    #[test]
    fn test_select_unknown_is_ignored() {
        let mut gallery = Gallery::new();
        let a = captured(0.0);
        let a_id = a.id.clone();
        gallery.add(a);

        assert!(!gallery.select(&FrameId::from("missing")));
        assert_eq!(gallery.selected_id(), Some(&a_id));
    }

    #[test]
    fn test_import_generated_prepends_and_tags() {
        let mut gallery = Gallery::new();
        gallery.add(captured(3.0));

        let mut frame = captured(7.0);
        frame.origin = FrameOrigin::Captured;
        let id = frame.id.clone();
        gallery.import_generated(frame);

        let first = &gallery.frames()[0];
        assert_eq!(first.id, id);
        assert_eq!(first.origin, FrameOrigin::Generated);
        assert_eq!(first.source_timestamp, None);
        assert_ne!(gallery.selected_id(), Some(&id));
    }

    #[test]
    fn test_import_generated_into_empty_gallery_selects() {
        let mut gallery = Gallery::new();
        let frame = Frame::generated(EncodedImage::from_bytes("image/png", b"png"));
        let id = frame.id.clone();
        gallery.import_generated(frame);
        assert_eq!(gallery.selected().map(|f| &f.id), Some(&id));
    }

    #[test]
    fn test_selection_never_dangles_across_mixed_operations() {
        let mut gallery = Gallery::new();
        let mut ids = Vec::new();

        // Deterministic interleaving of adds, selects and removes.
        for step in 0..200usize {
            match step % 5 {
                0 | 1 => {
                    let frame = captured(step as f64);
                    ids.push(frame.id.clone());
                    let before = gallery.selected_id().cloned();
                    gallery.add(frame);
                    if before.is_some() {
                        assert_eq!(gallery.selected_id().cloned(), before);
                    }
                }
                2 => {
                    if let Some(id) = ids.get(step * 7 % ids.len().max(1)) {
                        gallery.select(id);
                    }
                }
                _ => {
                    if ids.is_empty() {
                        continue;
                    }
                    let id = ids.remove(step * 3 % ids.len());
                    let was_selected = gallery.selected_id() == Some(&id);
                    gallery.remove(&id);
                    if was_selected {
                        assert_eq!(gallery.selected_id(), None);
                    }
                }
            }
            assert_selection_valid(&gallery);
        }
    }
}

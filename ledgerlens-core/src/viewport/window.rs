//! Visible window arithmetic

use serde::{Deserialize, Serialize};

/// Inputs of the window computation; recomputed on every scroll event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowState {
    pub scroll_offset: f64,
    pub viewport_height: f64,
    pub item_height: f64,
    /// Extra rows rendered on each side of the visible area
    pub buffer_size: usize,
}

/// Half-open index range `[start_index, end_index)` to materialize
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisibleRange {
    pub start_index: usize,
    pub end_index: usize, // exclusive
}

impl VisibleRange {
    pub fn len(&self) -> usize {
        self.end_index.saturating_sub(self.start_index)
    }

    pub fn is_empty(&self) -> bool {
        self.start_index >= self.end_index
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start_index && index < self.end_index
    }
}

impl WindowState {
    pub fn new(viewport_height: f64, item_height: f64, buffer_size: usize) -> Self {
        Self {
            scroll_offset: 0.0,
            viewport_height,
            item_height,
            buffer_size,
        }
    }

    /// Rows that fit in the viewport, rounded up
    pub fn visible_count(&self) -> usize {
        if self.item_height <= 0.0 || self.viewport_height <= 0.0 {
            return 0;
        }
        (self.viewport_height / self.item_height).ceil() as usize
    }

    /// Index of the first row intersecting the viewport
    pub fn first_visible(&self) -> usize {
        if self.item_height <= 0.0 {
            return 0;
        }
        (self.scroll_offset.max(0.0) / self.item_height).floor() as usize
    }

    /// Range to render for a dataset of `len` rows, clipped to `[0, len)`
    pub fn range(&self, len: usize) -> VisibleRange {
        let first = self.first_visible();
        let start_index = first.saturating_sub(self.buffer_size).min(len);
        let end_index = first
            .saturating_add(self.visible_count())
            .saturating_add(self.buffer_size)
            .min(len);

        VisibleRange {
            start_index,
            end_index: end_index.max(start_index),
        }
    }

    /// Scroll height of the full dataset
    pub fn total_height(&self, len: usize) -> f64 {
        len as f64 * self.item_height
    }

    pub fn offset_for_index(&self, index: usize) -> f64 {
        index as f64 * self.item_height
    }

    /// Largest offset at which the viewport is still filled
    pub fn max_offset(&self, len: usize) -> f64 {
        (self.total_height(len) - self.viewport_height).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_at_top() {
        let window = WindowState::new(600.0, 48.0, 10);
        assert_eq!(window.visible_count(), 13);
        assert_eq!(
            window.range(1000),
            VisibleRange {
                start_index: 0,
                end_index: 23
            }
        );
    }

    #[test]
    fn test_window_mid_scroll() {
        let mut window = WindowState::new(600.0, 48.0, 10);
        window.scroll_offset = 4800.0;
        let range = window.range(1000);
        assert_eq!(range.start_index, 90);
        assert_eq!(range.end_index, 123);
        assert_eq!(range.len(), 33);
    }

    #[test]
    fn test_window_clips_to_dataset() {
        let mut window = WindowState::new(600.0, 48.0, 10);
        assert_eq!(window.range(5).end_index, 5);

        window.scroll_offset = 1_000_000.0;
        let range = window.range(100);
        assert!(range.is_empty());
        assert_eq!(range.start_index, 100);

        assert!(window.range(0).is_empty());
    }

    #[test]
    fn test_degenerate_heights() {
        let window = WindowState::new(600.0, 0.0, 10);
        assert_eq!(window.visible_count(), 0);
        assert_eq!(window.range(50).end_index, 10);
    }

    #[test]
    fn test_offsets() {
        let window = WindowState::new(600.0, 48.0, 10);
        assert_eq!(window.total_height(1000), 48_000.0);
        assert_eq!(window.offset_for_index(3), 144.0);
        assert_eq!(window.max_offset(1000), 47_400.0);
        assert_eq!(window.max_offset(2), 0.0);
    }
}

//! Insertion-ordered, deduplicated tag value indices.
//!
//! Each distinct metadata value seen during analysis is assigned a small
//! integer so that grouping can compare files by index equality instead of
//! comparing strings and float vectors repeatedly.

/// An insertion-ordered sequence of unique values with value-to-position lookup.
///
/// Insertion is idempotent: inserting a value equal to an existing entry
/// returns the existing position. Vector-typed values compare per component,
/// exactly.
#[derive(Debug, Clone, Default)]
pub struct TagIndex<T> {
    values: Vec<T>,
}

impl<T: PartialEq> TagIndex<T> {
    pub fn new() -> Self {
        TagIndex { values: Vec::new() }
    }

    /// Returns the position of the first entry equal to `value`, appending it
    /// if no entry matches.
    ///
    /// Linear scan over the distinct values seen so far; distinct-value counts
    /// stay small relative to file counts in real acquisitions.
    pub fn insert(&mut self, value: T) -> usize {
        if let Some(pos) = self.values.iter().position(|v| *v == value) {
            return pos;
        }
        self.values.push(value);
        self.values.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// The six independent tag indices rebuilt on every metadata analysis run.
#[derive(Debug, Clone, Default)]
pub struct TagSets {
    pub series_instance_uids: TagIndex<String>,
    pub content_times: TagIndex<String>,
    pub trigger_times: TagIndex<String>,
    pub diffusion_gradient_orientations: TagIndex<[f32; 3]>,
    pub slice_locations: TagIndex<f32>,
    pub image_orientations: TagIndex<[f32; 6]>,
}

impl TagSets {
    pub fn new() -> Self {
        TagSets::default()
    }

    pub fn clear(&mut self) {
        self.series_instance_uids.clear();
        self.content_times.clear();
        self.trigger_times.clear();
        self.diffusion_gradient_orientations.clear();
        self.slice_locations.clear();
        self.image_orientations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let mut index = TagIndex::new();
        assert_eq!(index.insert("1.2.840.1".to_string()), 0);
        assert_eq!(index.insert("1.2.840.2".to_string()), 1);
        assert_eq!(index.insert("1.2.840.1".to_string()), 0);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn vector_values_compare_per_component() {
        let mut index = TagIndex::new();
        assert_eq!(index.insert([1.0f32, 0.0, 0.0]), 0);
        assert_eq!(index.insert([1.0f32, 0.0, 0.0]), 0);
        assert_eq!(index.insert([1.0f32, 0.0, 1e-7]), 1);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn preserves_insertion_order() {
        let mut index = TagIndex::new();
        index.insert(3.5f32);
        index.insert(-1.0f32);
        index.insert(3.5f32);
        index.insert(0.0f32);
        assert_eq!(index.values(), &[3.5, -1.0, 0.0]);
        assert_eq!(index.get(1), Some(&-1.0));
        assert_eq!(index.get(3), None);
    }

    #[test]
    fn clear_resets_all_sets() {
        let mut sets = TagSets::new();
        sets.series_instance_uids.insert("a".to_string());
        sets.slice_locations.insert(1.0);
        sets.clear();
        assert!(sets.series_instance_uids.is_empty());
        assert!(sets.slice_locations.is_empty());
    }
}

use std::fmt;

/// Number of offsets an element takes up in an [`OffsetVec`]
pub trait Width {
    fn width(&self) -> usize;
}

/// Position in an [`OffsetVec`], counted in widths rather than elements
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

/// Append-only vector addressed by offsets, where every element advances the next offset by its
/// width
///
/// This is the shape of the constant pool: indexing starts at 1, and `Long`/`Double` entries
/// occupy two indices, the second of which addresses nothing.
#[derive(Clone, PartialEq)]
pub struct OffsetVec<T> {
    /// Sorted by offset, since elements are only ever pushed
    entries: Vec<(Offset, T)>,
    next_offset: Offset,
}

impl<T: Width> OffsetVec<T> {
    pub fn starting_at(first: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            next_offset: first,
        }
    }

    /// Number of elements (not offsets)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset the next pushed element will get
    pub fn next_offset(&self) -> Offset {
        self.next_offset
    }

    pub fn push(&mut self, elem: T) -> Offset {
        let offset = self.next_offset;
        self.next_offset.0 += elem.width();
        self.entries.push((offset, elem));
        offset
    }

    /// Element starting exactly at `offset`
    ///
    /// Offsets in the middle of a wide element, before the first element, or past the end find
    /// nothing.
    pub fn get(&self, offset: Offset) -> Option<&T> {
        self.entries
            .binary_search_by_key(&offset, |(off, _)| *off)
            .ok()
            .map(|idx| &self.entries[idx].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Offset, &T)> + '_ {
        self.entries.iter().map(|(offset, elem)| (*offset, elem))
    }
}

impl<T: fmt::Debug> fmt::Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(off, elem)| (off.0, elem)))
            .finish()
    }
}

//! Ordered table of owned strings used to cache the device's SD card
//! listing, so case-insensitive host-side file selection can be mapped back
//! to the exact name the device reported.

/// Grow-on-demand string table with case-insensitive lookup.
///
/// Entries keep the order they were added in; `find_nocase` returns the
/// first match.
#[derive(Debug, Default)]
pub struct StringTable {
    entries: Vec<String>,
}

impl StringTable {
    /// Backing storage grows this many entries at a time.
    const CHUNK: usize = 10;

    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(Self::CHUNK),
        }
    }

    /// Append an owned copy of `s` to the end of the table.
    pub fn add(&mut self, s: &str) {
        if self.entries.len() == self.entries.capacity() {
            self.entries.reserve_exact(Self::CHUNK);
        }
        self.entries.push(s.to_owned());
    }

    /// Remove and return entry `index`, shifting the tail down.
    pub fn remove(&mut self, index: usize) -> Option<String> {
        if index < self.entries.len() {
            Some(self.entries.remove(index))
        } else {
            None
        }
    }

    /// Index of the first entry equal to `needle` ignoring ASCII case.
    pub fn find_nocase(&self, needle: &str) -> Option<usize> {
        self.entries.iter().position(|s| s.eq_ignore_ascii_case(needle))
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry and shrink back to one growth chunk.
    pub fn clear(&mut self) {
        self.entries = Vec::with_capacity(Self::CHUNK);
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

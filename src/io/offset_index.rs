use indexmap::IndexMap;

/// Where a titled record lives in its file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetEntry {
    /// The byte offset the fetcher seeks to
    pub offset: u64,
    /// The 0-based position of the record among all records, titled or not
    pub spectrum_index: usize,
}

/**
Title to byte offset lookup for one spectrum file.

Titles are kept unique as they are inserted: the first record with a title
keeps it and each repeat is stored as `<title>_<n>`, with `n` counting up
from 1 for that title and skipping any suffixed title already present.
Iteration follows insertion order.
*/
#[derive(Default, Debug, Clone, PartialEq)]
pub struct OffsetIndex {
    entries: IndexMap<Box<str>, OffsetEntry>,
    /// How many times each title was inserted after its first occurrence
    repeats: IndexMap<String, usize>,
    /// The last suffix handed out for each repeated title
    suffixes: IndexMap<String, usize>,
}

impl OffsetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entry` under `title`, or under a suffixed form of it if `title`
    /// is taken, and return the title actually used
    pub fn insert_unique(&mut self, title: &str, entry: OffsetEntry) -> String {
        if !self.entries.contains_key(title) {
            self.entries.insert(title.into(), entry);
            return title.to_string();
        }
        *self.repeats.entry(title.to_string()).or_insert(0) += 1;
        let suffix = self.suffixes.entry(title.to_string()).or_insert(0);
        let unique = loop {
            *suffix += 1;
            let candidate = format!("{title}_{suffix}");
            if !self.entries.contains_key(candidate.as_str()) {
                break candidate;
            }
        };
        self.entries.insert(unique.as_str().into(), entry);
        unique
    }

    #[inline]
    pub fn offset_of(&self, title: &str) -> Option<u64> {
        self.entries.get(title).map(|e| e.offset)
    }

    #[inline]
    pub fn spectrum_index_of(&self, title: &str) -> Option<usize> {
        self.entries.get(title).map(|e| e.spectrum_index)
    }

    /// The title and offset at insertion position `position`
    pub fn get_index(&self, position: usize) -> Option<(&str, u64)> {
        self.entries
            .get_index(position)
            .map(|(title, entry)| (title.as_ref(), entry.offset))
    }

    /// The insertion position of `title`
    pub fn position_of(&self, title: &str) -> Option<usize> {
        self.entries.get_index_of(title)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.entries.contains_key(title)
    }

    /// Titles that were inserted more than once, with the number of repeats
    pub fn repeats(&self) -> &IndexMap<String, usize> {
        &self.repeats
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries
            .iter()
            .map(|(title, entry)| (title.as_ref(), entry.offset))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(offset: u64, spectrum_index: usize) -> OffsetEntry {
        OffsetEntry {
            offset,
            spectrum_index,
        }
    }

    #[test]
    fn test_unique_titles() {
        let mut index = OffsetIndex::new();
        assert_eq!(index.insert_unique("A", entry(11, 0)), "A");
        assert_eq!(index.insert_unique("A_1", entry(40, 1)), "A_1");
        assert_eq!(index.insert_unique("A", entry(80, 2)), "A_2");
        assert_eq!(index.repeats().get("A"), Some(&1));
        assert_eq!(index.insert_unique("A", entry(120, 3)), "A_3");
        assert_eq!(index.len(), 4);
        assert_eq!(index.repeats().get("A"), Some(&2));
        assert!(index.repeats().get("A_1").is_none());
        assert_eq!(index.offset_of("A_2"), Some(80));
        assert_eq!(index.spectrum_index_of("A_3"), Some(3));
        assert_eq!(index.get_index(1), Some(("A_1", 40)));
        assert_eq!(index.position_of("A_3"), Some(3));
        assert_eq!(
            index.titles().collect::<Vec<_>>(),
            vec!["A", "A_1", "A_2", "A_3"]
        );
    }
}

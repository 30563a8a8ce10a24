use std::collections::HashSet;

/// URLs already present in the tracking sheet.
///
/// Rebuilt from the sheet at the start of every run and dropped at the end,
/// so the sheet itself stays the only source of truth.
#[derive(Debug, Clone, Default)]
pub struct ProcessedIndex {
    urls: HashSet<String>,
}

impl ProcessedIndex {
    /// Builds the index from the URL column as read from the sheet.
    /// The first cell is the header and is skipped; blank cells are ignored.
    pub fn build<I, S>(column: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls = column
            .into_iter()
            .skip(1)
            .map(|cell| cell.as_ref().trim().to_string())
            .filter(|cell| !cell.is_empty())
            .collect();

        Self { urls }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    /// Marks a URL as known. Returns `true` if it was not known before.
    pub fn insert(&mut self, url: &str) -> bool {
        self.urls.insert(url.to_string())
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }
}

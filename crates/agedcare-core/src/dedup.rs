use std::collections::HashSet;

/// Normalise a telephone number for comparison.
///
/// Strips whitespace, dashes, and parentheses: `"(02) 8388-8000"` → `"0283888000"`.
pub fn normalize_telephone(telephone: &str) -> String {
    telephone
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
        .collect()
}

/// In-memory set of telephone numbers already present in the ledger.
///
/// Rebuilt from the CSV on every start; the ledger is the only durable copy.
#[derive(Debug, Default, Clone)]
pub struct DedupStore {
    seen: HashSet<String>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every telephone from an existing ledger.
    pub fn seed<I, S>(&mut self, telephones: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tel in telephones {
            self.add(tel.as_ref());
        }
    }

    /// Empty numbers are never reported as seen.
    pub fn contains(&self, telephone: &str) -> bool {
        let key = normalize_telephone(telephone);
        !key.is_empty() && self.seen.contains(&key)
    }

    /// Returns false if the number was already known or normalises to nothing.
    pub fn add(&mut self, telephone: &str) -> bool {
        let key = normalize_telephone(telephone);
        if key.is_empty() {
            return false;
        }
        self.seen.insert(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

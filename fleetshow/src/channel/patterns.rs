//! Prompt literal sets for shell-level synchronisation.

use memchr::memmem::Finder;

/// An ordered set of prompt literals.
///
/// Earlier literals win when more than one is present in the searched
/// region.
#[derive(Clone)]
pub struct PromptSet {
    literals: Vec<String>,
    finders: Vec<Finder<'static>>,
}

impl PromptSet {
    /// Build a set from literals, skipping empty ones.
    pub fn new<I, S>(literals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let literals: Vec<String> = literals
            .into_iter()
            .map(Into::into)
            .filter(|l: &String| !l.is_empty())
            .collect();
        let finders = literals
            .iter()
            .map(|l| Finder::new(l.as_bytes()).into_owned())
            .collect();
        Self { literals, finders }
    }

    /// Index of the first literal present in `haystack`.
    pub fn find(&self, haystack: &[u8]) -> Option<usize> {
        self.finders
            .iter()
            .position(|finder| finder.find(haystack).is_some())
    }

    /// Literal at `index`.
    pub fn literal(&self, index: usize) -> Option<&str> {
        self.literals.get(index).map(String::as_str)
    }

    /// All literals, in priority order.
    pub fn literals(&self) -> &[String] {
        &self.literals
    }

    /// Length in bytes of the longest literal.
    pub fn longest(&self) -> usize {
        self.literals.iter().map(String::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }
}

impl std::fmt::Debug for PromptSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PromptSet").field(&self.literals).finish()
    }
}

/// Result of waiting for a prompt.
#[derive(Debug, Clone)]
pub struct PromptMatch {
    /// Everything received while waiting, lossily decoded.
    pub text: String,

    /// The literal that ended the wait, if any.
    pub matched: Option<String>,

    /// Time spent waiting.
    pub elapsed: std::time::Duration,
}

impl PromptMatch {
    /// Whether a prompt was seen before the ceiling.
    pub fn is_matched(&self) -> bool {
        self.matched.is_some()
    }
}

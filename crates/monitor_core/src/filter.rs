use std::collections::BTreeSet;

use crate::{gigabytes_to_bytes, ReleaseEvent};

const CATEGORY_SEPARATOR: &str = "::";

/// Inclusive size window; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeBounds {
    pub min_bytes: Option<u64>,
    pub max_bytes: Option<u64>,
}

impl SizeBounds {
    pub fn from_gigabytes(min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            min_bytes: min.map(gigabytes_to_bytes),
            max_bytes: max.map(gigabytes_to_bytes),
        }
    }

    /// Missing sizes pass: a release is never dropped for lack of metadata.
    pub fn contains(&self, size_bytes: Option<u64>) -> bool {
        let Some(size) = size_bytes else {
            return true;
        };
        self.min_bytes.is_none_or(|min| size >= min) && self.max_bytes.is_none_or(|max| size <= max)
    }

    pub fn is_unbounded(&self) -> bool {
        self.min_bytes.is_none() && self.max_bytes.is_none()
    }
}

/// The user's active filter: a category set plus size bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria {
    categories: BTreeSet<String>,
    bounds: SizeBounds,
}

impl Criteria {
    pub fn new<I, S>(categories: I, bounds: SizeBounds) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let categories = categories
            .into_iter()
            .map(|c| c.as_ref().trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        Self { categories, bounds }
    }

    pub fn matches(&self, event: &ReleaseEvent) -> bool {
        matches(
            event,
            self.categories.iter().map(String::as_str),
            self.bounds.min_bytes,
            self.bounds.max_bytes,
        )
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(String::as_str)
    }

    pub fn bounds(&self) -> SizeBounds {
        self.bounds
    }
}

/// Does `event` satisfy the category set and inclusive size bounds?
///
/// Category comparison is case-insensitive against the announced category or
/// its top-level segment (`TV :: Episodes HD` matches `TV`). An empty set
/// matches everything.
pub fn matches<'a, I>(
    event: &ReleaseEvent,
    categories: I,
    min_bytes: Option<u64>,
    max_bytes: Option<u64>,
) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    let bounds = SizeBounds {
        min_bytes,
        max_bytes,
    };
    bounds.contains(event.size_bytes) && category_matches(&event.category, categories)
}

fn category_matches<'a, I>(announced: &str, wanted: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    let full = announced.trim().to_lowercase();
    let top = full
        .split(CATEGORY_SEPARATOR)
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    let mut wanted = wanted
        .into_iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .peekable();
    if wanted.peek().is_none() {
        return true;
    }
    wanted.any(|c| c == full || c == top)
}

//! Append-only output log and single-shot response parsing.

use crate::session::state::OutputItem;

/// Ordered display log owned by the session controller.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutputLog {
    items: Vec<OutputItem>,
}

impl OutputLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item and return its index.
    pub fn push(&mut self, item: OutputItem) -> usize {
        self.items.push(item);
        self.items.len() - 1
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = OutputItem>) {
        self.items.extend(items);
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&OutputItem> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut OutputItem> {
        self.items.get_mut(index)
    }

    /// Remove the item at `index` when it exists.
    pub fn remove(&mut self, index: usize) -> Option<OutputItem> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn items(&self) -> &[OutputItem] {
        &self.items
    }
}

const IMAGE_PREFIX: &str = "[[image:";
const IMAGE_SUFFIX: &str = "]]";

/// Split a complete backend response into display items.
///
/// Each non-blank line becomes one item; `[[image:NAME]]` lines become
/// [`OutputItem::Image`]. A blank response yields nothing.
#[must_use]
pub fn parse_response_items(response: &str) -> Vec<OutputItem> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match image_reference(line) {
            Some(name) => OutputItem::Image(name.to_owned()),
            None => OutputItem::Text(line.to_owned()),
        })
        .collect()
}

fn image_reference(line: &str) -> Option<&str> {
    let name = line.strip_prefix(IMAGE_PREFIX)?.strip_suffix(IMAGE_SUFFIX)?.trim();
    (!name.is_empty()).then_some(name)
}

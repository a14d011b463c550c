//! Logical field locators

use crate::driver::By;

/// Primary locator plus ranked alternatives for one logical field
///
/// Immutable once built. Its identity is the display form of the primary
/// locator, which keys the shared [`LocatorCache`](super::LocatorCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorSpec {
    primary: By,
    alternatives: Vec<By>,
    description: String,
}

impl LocatorSpec {
    pub fn new(primary: By, description: impl Into<String>) -> Self {
        Self {
            primary,
            alternatives: Vec::new(),
            description: description.into(),
        }
    }

    /// Append an alternative; alternatives are tried in insertion order
    pub fn with_alternative(mut self, by: By) -> Self {
        self.alternatives.push(by);
        self
    }

    pub fn with_alternatives(mut self, alternatives: impl IntoIterator<Item = By>) -> Self {
        self.alternatives.extend(alternatives);
        self
    }

    pub fn primary(&self) -> &By {
        &self.primary
    }

    pub fn alternatives(&self) -> &[By] {
        &self.alternatives
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Cache key
    pub fn identity(&self) -> String {
        self.primary.to_string()
    }

    /// Primary followed by alternatives
    pub fn candidates(&self) -> impl Iterator<Item = &By> {
        std::iter::once(&self.primary).chain(self.alternatives.iter())
    }

    /// Spec for the `position`-th (1-based) match of this field
    pub fn indexed(&self, position: usize) -> LocatorSpec {
        LocatorSpec {
            primary: indexed_locator(&self.primary, position),
            alternatives: self
                .alternatives
                .iter()
                .map(|by| indexed_locator(by, position))
                .collect(),
            description: format!("{} [{}]", self.description, position),
        }
    }
}

impl From<By> for LocatorSpec {
    fn from(by: By) -> Self {
        let description = by.to_string();
        LocatorSpec::new(by, description)
    }
}

/// Wrap `by` in a position predicate selecting its `position`-th (1-based) match
///
/// XPath becomes `(expr)[n]`. CSS-family strategies get `:nth-of-type(n)`.
/// Link-text strategies are rewritten to XPath first.
pub fn indexed_locator(by: &By, position: usize) -> By {
    match by {
        By::XPath(expr) => By::XPath(format!("({})[{}]", expr, position)),
        By::LinkText(text) => By::XPath(format!(
            "(//a[normalize-space(.)={}])[{}]",
            xpath_literal(text),
            position
        )),
        By::PartialLinkText(text) => By::XPath(format!(
            "(//a[contains(., {})])[{}]",
            xpath_literal(text),
            position
        )),
        By::TagName(tag) => By::Css(format!("{}:nth-of-type({})", tag, position)),
        other => {
            let (_, css) = other.to_w3c();
            let indexed: Vec<String> = split_selector_list(&css)
                .into_iter()
                .map(|part| format!("{}:nth-of-type({})", part, position))
                .collect();
            By::Css(indexed.join(", "))
        }
    }
}

/// Split a CSS selector list on its top-level commas
///
/// Commas inside brackets, parentheses or quoted strings belong to the
/// enclosing selector.
fn split_selector_list(css: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in css.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(css[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(css[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}

/// Quote `text` as an XPath string literal
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{}'", text);
    }
    if !text.contains('"') {
        return format!("\"{}\"", text);
    }
    let parts: Vec<String> = text.split('\'').map(|part| format!("'{}'", part)).collect();
    format!("concat({})", parts.join(", \"'\", "))
}

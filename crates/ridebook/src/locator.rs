//! Locators and locator chains.
//!
//! A [`Locator`] is pure data describing how to find elements: a structural
//! CSS path, a text rule applied to the elements a CSS path matches, or an
//! attribute-pattern rule. A [`LocatorChain`] is the ranked list of locators
//! for one semantic target, most reliable first.
//!
//! Drivers decide how to evaluate a locator; the JavaScript rendering used by
//! the CDP driver lives here next to the data so both stay in sync.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::result::{RidebookError, RidebookResult};

/// How a text rule compares element text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextMode {
    /// Trimmed text equals the needle
    Exact,
    /// Trimmed text contains the needle
    Contains,
}

impl TextMode {
    /// Apply the rule to already-trimmed text
    #[must_use]
    pub fn matches(self, text: &str, needle: &str) -> bool {
        match self {
            Self::Exact => text == needle,
            Self::Contains => text.contains(needle),
        }
    }
}

/// Attribute comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrOp {
    /// `[name="value"]`
    Equals,
    /// `[name*="value"]`
    Contains,
    /// `[name^="value"]`
    Prefix,
}

impl AttrOp {
    const fn css_operator(self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::Contains => "*=",
            Self::Prefix => "^=",
        }
    }
}

/// Descriptor for finding elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// Structural CSS path (e.g. `"form select"`)
    Css {
        /// CSS selector
        css: String,
    },
    /// Elements matching `css` whose text satisfies the rule
    Text {
        /// Base CSS selector
        css: String,
        /// Text to look for
        text: String,
        /// Comparison mode
        mode: TextMode,
    },
    /// Elements matching `css` with an attribute pattern
    Attribute {
        /// Base CSS selector
        css: String,
        /// Attribute name
        name: String,
        /// Comparison operator
        op: AttrOp,
        /// Attribute value pattern
        value: String,
    },
}

impl Locator {
    /// Create a structural locator
    #[must_use]
    pub fn css(css: impl Into<String>) -> Self {
        Self::Css { css: css.into() }
    }

    /// Create an exact-text locator
    #[must_use]
    pub fn text_eq(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Text {
            css: css.into(),
            text: text.into(),
            mode: TextMode::Exact,
        }
    }

    /// Create a contains-text locator
    #[must_use]
    pub fn text_contains(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Text {
            css: css.into(),
            text: text.into(),
            mode: TextMode::Contains,
        }
    }

    /// Create an attribute-pattern locator
    #[must_use]
    pub fn attr(
        css: impl Into<String>,
        name: impl Into<String>,
        op: AttrOp,
        value: impl Into<String>,
    ) -> Self {
        Self::Attribute {
            css: css.into(),
            name: name.into(),
            op,
            value: value.into(),
        }
    }

    /// The CSS part a driver queries before any text filtering.
    ///
    /// Attribute rules fold into the selector itself.
    #[must_use]
    pub fn base_css(&self) -> String {
        match self {
            Self::Css { css } | Self::Text { css, .. } => css.clone(),
            Self::Attribute {
                css,
                name,
                op,
                value,
            } => format!("{css}[{name}{}{value:?}]", op.css_operator()),
        }
    }

    /// Text rule, if any
    #[must_use]
    pub fn text_rule(&self) -> Option<(&str, TextMode)> {
        match self {
            Self::Text { text, mode, .. } => Some((text.as_str(), *mode)),
            _ => None,
        }
    }

    /// Reject locators that can never be evaluated
    pub fn validate(&self, chain: &str) -> RidebookResult<()> {
        let css = match self {
            Self::Css { css } | Self::Text { css, .. } | Self::Attribute { css, .. } => css,
        };
        if css.trim().is_empty() {
            return Err(RidebookError::invalid_locator(chain, "empty CSS selector"));
        }
        match self {
            Self::Text { text, .. } if text.trim().is_empty() => Err(
                RidebookError::invalid_locator(chain, format!("empty text rule on {css:?}")),
            ),
            Self::Attribute { name, .. }
                if name.is_empty()
                    || name
                        .chars()
                        .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '[' | ']' | '=')) =>
            {
                Err(RidebookError::invalid_locator(
                    chain,
                    format!("bad attribute name {name:?}"),
                ))
            }
            _ => Ok(()),
        }
    }

    /// JavaScript expression yielding an array of matching elements.
    ///
    /// `scope` is an expression evaluating to the root to search from.
    #[must_use]
    pub fn to_query_all(&self, scope: &str) -> String {
        let css = self.base_css();
        match self.text_rule() {
            None => format!("Array.from(({scope}).querySelectorAll({css:?}))"),
            Some((text, TextMode::Exact)) => format!(
                "Array.from(({scope}).querySelectorAll({css:?})).filter(el => (el.textContent || '').replace(/\\s+/g, ' ').trim() === {text:?})"
            ),
            Some((text, TextMode::Contains)) => format!(
                "Array.from(({scope}).querySelectorAll({css:?})).filter(el => (el.textContent || '').replace(/\\s+/g, ' ').trim().includes({text:?}))"
            ),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css { css } => write!(f, "{css}"),
            Self::Text { css, text, mode } => match mode {
                TextMode::Exact => write!(f, "{css}:text-is({text:?})"),
                TextMode::Contains => write!(f, "{css}:has-text({text:?})"),
            },
            Self::Attribute { .. } => write!(f, "{}", self.base_css()),
        }
    }
}

/// Ranked locators for one semantic target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorChain {
    name: String,
    locators: Vec<Locator>,
}

impl LocatorChain {
    /// Create an empty chain
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locators: Vec::new(),
        }
    }

    /// Append a locator
    #[must_use]
    pub fn with(mut self, locator: Locator) -> Self {
        self.locators.push(locator);
        self
    }

    /// Append a structural locator
    #[must_use]
    pub fn css(self, css: impl Into<String>) -> Self {
        self.with(Locator::css(css))
    }

    /// Append an exact-text locator
    #[must_use]
    pub fn text_eq(self, css: impl Into<String>, text: impl Into<String>) -> Self {
        self.with(Locator::text_eq(css, text))
    }

    /// Append a contains-text locator
    #[must_use]
    pub fn text_contains(self, css: impl Into<String>, text: impl Into<String>) -> Self {
        self.with(Locator::text_contains(css, text))
    }

    /// Append an attribute locator
    #[must_use]
    pub fn attr(
        self,
        css: impl Into<String>,
        name: impl Into<String>,
        op: AttrOp,
        value: impl Into<String>,
    ) -> Self {
        self.with(Locator::attr(css, name, op, value))
    }

    /// Chain name (used in logs)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Locators in evaluation order
    #[must_use]
    pub fn locators(&self) -> &[Locator] {
        &self.locators
    }

    /// Number of locators
    #[must_use]
    pub fn len(&self) -> usize {
        self.locators.len()
    }

    /// Whether the chain has no locators
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }

    /// Validate every locator in the chain
    pub fn validate(&self) -> RidebookResult<()> {
        self.locators.iter().try_for_each(|l| l.validate(&self.name))
    }
}

//! Action parameters: why a request fired, and (for paged sources) which page.
//!
//! `ActionParameter` is an immutable value. Moving the page cursor returns a
//! new parameter, so the snapshot taken by `request()` is the one the cache
//! and throttle keys are derived from.

use serde::{Deserialize, Serialize};

/// The reason a request was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// Nothing loaded yet. Paged sources load the first page.
    Load,
    /// The previous load failed and the user asked again (not a refresh).
    Retry,
    /// Already loaded; load again from the first page.
    Refresh,
    /// Already loaded; reload everything loaded so far.
    AutoRefresh,
    /// Load the next page.
    LoadMore,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Load,
        ActionKind::Retry,
        ActionKind::Refresh,
        ActionKind::AutoRefresh,
        ActionKind::LoadMore,
    ];
}

/// Page cursor for paged sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pages {
    pub page: u32,
    pub size: u32,
}

impl Pages {
    pub const FIRST_PAGE: u32 = 1;
    pub const DEFAULT_SIZE: u32 = 20;

    pub fn first(size: u32) -> Self {
        Self {
            page: Self::FIRST_PAGE,
            size,
        }
    }

    pub fn next(self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            ..self
        }
    }
}

impl Default for Pages {
    fn default() -> Self {
        Self::first(Self::DEFAULT_SIZE)
    }
}

/// Action tag plus optional page cursor, captured at request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionParameter {
    kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pages: Option<Pages>,
}

impl ActionParameter {
    pub fn new(kind: ActionKind) -> Self {
        Self { kind, pages: None }
    }

    pub fn load() -> Self {
        Self::new(ActionKind::Load)
    }

    /// A paged `LOAD` starting at the first page.
    pub fn paged(size: u32) -> Self {
        Self {
            kind: ActionKind::Load,
            pages: Some(Pages::first(size)),
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn pages(&self) -> Option<Pages> {
        self.pages
    }

    pub fn is_paged(&self) -> bool {
        self.pages.is_some()
    }

    pub fn with_kind(self, kind: ActionKind) -> Self {
        Self { kind, ..self }
    }

    pub fn with_pages(self, pages: Pages) -> Self {
        Self {
            pages: Some(pages),
            ..self
        }
    }

    /// `LOAD_MORE` for the page after the current one.
    /// Unpaged parameters stay unpaged.
    pub fn next_page(self) -> Self {
        Self {
            kind: ActionKind::LoadMore,
            pages: self.pages.map(Pages::next),
        }
    }

    /// Same page size, back to the first page, with the given kind.
    pub fn first_page(self, kind: ActionKind) -> Self {
        Self {
            kind,
            pages: self.pages.map(|p| Pages::first(p.size)),
        }
    }
}

impl Default for ActionParameter {
    fn default() -> Self {
        Self::load()
    }
}

//! Ambient head lookup for call sites that cannot receive a [`Head`].
//!
//! The active head is per thread and has an explicit lifecycle: set it when a
//! head is created for a render, clear it when the render ends. Registering
//! with no active head fails fast with [`HeadError::MissingContext`].

use std::cell::RefCell;

use crate::entry::EntryOptions;
use crate::error::{HeadError, Result};
use crate::head::{ActiveHeadEntry, Head};
use crate::input::Input;

thread_local! {
    static ACTIVE_HEAD: RefCell<Option<Head>> = const { RefCell::new(None) };
}

/// Makes `head` the active head for this thread, returning the previous one.
pub fn set_active_head(head: &Head) -> Option<Head> {
    ACTIVE_HEAD.with(|active| active.borrow_mut().replace(head.clone()))
}

/// The active head, if any.
pub fn active_head() -> Option<Head> {
    ACTIVE_HEAD.with(|active| active.borrow().clone())
}

/// Clears the active head, returning it.
pub fn clear_active_head() -> Option<Head> {
    ACTIVE_HEAD.with(|active| active.borrow_mut().take())
}

/// Registers an entry with the active head.
pub fn use_head(input: Input) -> Result<ActiveHeadEntry> {
    use_head_with_options(input, EntryOptions::default())
}

/// Registers an entry with options on the active head.
pub fn use_head_with_options(input: Input, options: EntryOptions) -> Result<ActiveHeadEntry> {
    let head = active_head().ok_or(HeadError::MissingContext)?;
    Ok(head.push_with_options(input, options))
}

/// Registers an entry with the active head through the safe whitelist.
pub fn use_head_safe(input: Input) -> Result<ActiveHeadEntry> {
    let head = active_head().ok_or(HeadError::MissingContext)?;
    Ok(head.push_safe(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_context_fails_fast() {
        clear_active_head();
        let err = use_head(Input::new().with("title", "x")).unwrap_err();
        assert!(matches!(err, HeadError::MissingContext));
        assert!(use_head_safe(Input::new()).is_err());
    }

    #[test]
    fn test_lifecycle() {
        let head = Head::new();
        assert!(set_active_head(&head).is_none());
        let entry = use_head(Input::new().with("title", "x")).unwrap();
        assert_eq!(head.entries().len(), 1);
        assert_eq!(head.entries()[0].id, entry.id());

        let other = Head::new();
        let previous = set_active_head(&other).unwrap();
        use_head(Input::new()).unwrap();
        assert_eq!(previous.entries().len(), 1);
        assert_eq!(other.entries().len(), 1);

        assert!(clear_active_head().is_some());
        assert!(active_head().is_none());
    }
}

//! Headphone deck selector
//!
//! The four-position headphone selector (split / mix / deck A / deck B) is not
//! documented by the vendor. While it rotates it emits several overlapping
//! codes, observed on a Mk2 as:
//!
//! | from   | to     | codes seen (code, value)          |
//! |--------|--------|-----------------------------------|
//! | split  | mix    | (102, 8)                          |
//! | mix    | split  | (103, 4), (100, 1), (101, 2)      |
//! | mix    | deck B | (101, 2)                          |
//! | deck B | mix    | (102, 8)                          |
//! | deck B | deck A | (100, 1)                          |
//! | deck A | deck B | (101, 2)                          |
//!
//! Only (103, 4) is unique, so the selector keeps its own state and guards
//! the ambiguous codes on it.

use super::Side;

/// Code/value reported when the selector lands on "deck A"
pub const DECK_A_CODE: (u16, i32) = (100, 1);
/// Code/value reported when the selector lands on "deck B" (also seen en route to split)
pub const DECK_B_CODE: (u16, i32) = (101, 2);
/// Code/value reported when the selector lands on "mix"
pub const MIX_CODE: (u16, i32) = (102, 8);
/// Code/value reported when the selector lands on "split"
pub const SPLIT_CODE: (u16, i32) = (103, 4);

/// Headphone monitoring mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadphoneSelection {
    /// Both decks muted in the headphones
    Split,
    /// Both decks audible
    Mix,
    /// Left deck only
    DeckA,
    /// Right deck only
    DeckB,
}

impl HeadphoneSelection {
    /// Required (left, right) headphone-enable flags for this mode
    pub fn targets(self) -> (bool, bool) {
        match self {
            HeadphoneSelection::Split => (false, false),
            HeadphoneSelection::Mix => (true, true),
            HeadphoneSelection::DeckA => (true, false),
            HeadphoneSelection::DeckB => (false, true),
        }
    }
}

/// Selector state machine plus the two headphone-enable flags it drives
#[derive(Debug, Clone, Default)]
pub struct HeadphoneDeckSelector {
    selection: Option<HeadphoneSelection>,
    left: bool,
    right: bool,
}

impl HeadphoneDeckSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> Option<HeadphoneSelection> {
        self.selection
    }

    /// Headphone-enable flag for one deck
    pub fn enabled(&self, side: Side) -> bool {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    /// Flip one deck's flag (monitor button press)
    pub fn toggle(&mut self, side: Side) -> bool {
        let flag = match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        };
        *flag = !*flag;
        *flag
    }

    /// Resolve a selector code to the mode it switches to, honoring the guards.
    pub fn target_for(&self, code: u16, value: i32) -> Option<HeadphoneSelection> {
        match (code, value) {
            SPLIT_CODE => Some(HeadphoneSelection::Split),
            MIX_CODE => Some(HeadphoneSelection::Mix),
            // (101, 2) also shows up on the way from mix to split; only trust it
            // when coming from deck A or mix.
            DECK_B_CODE => matches!(
                self.selection,
                Some(HeadphoneSelection::DeckA) | Some(HeadphoneSelection::Mix)
            )
            .then_some(HeadphoneSelection::DeckB),
            DECK_A_CODE => (self.selection == Some(HeadphoneSelection::DeckB))
                .then_some(HeadphoneSelection::DeckA),
            _ => None,
        }
    }

    /// Handle one selector event.
    ///
    /// Returns the decks whose flag was toggled (right deck first), empty for
    /// a no-op. The caller emits one headphone button press per toggled deck.
    pub fn handle(&mut self, code: u16, value: i32) -> Vec<Side> {
        let Some(target) = self.target_for(code, value) else {
            return Vec::new();
        };

        self.selection = Some(target);

        let (want_left, want_right) = target.targets();
        let mut toggled = Vec::with_capacity(2);
        if self.right != want_right {
            self.right = want_right;
            toggled.push(Side::Right);
        }
        if self.left != want_left {
            self.left = want_left;
            toggled.push(Side::Left);
        }
        toggled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_sequence() {
        let mut selector = HeadphoneDeckSelector::new();

        selector.handle(103, 4);
        assert_eq!(selector.selection(), Some(HeadphoneSelection::Split));

        selector.handle(102, 8);
        assert_eq!(selector.selection(), Some(HeadphoneSelection::Mix));

        selector.handle(101, 2);
        assert_eq!(selector.selection(), Some(HeadphoneSelection::DeckB));

        selector.handle(100, 1);
        assert_eq!(selector.selection(), Some(HeadphoneSelection::DeckA));
    }

    #[test]
    fn test_deck_a_requires_deck_b() {
        let mut selector = HeadphoneDeckSelector::new();
        selector.handle(102, 8);

        let toggled = selector.handle(100, 1);
        assert!(toggled.is_empty());
        assert_eq!(selector.selection(), Some(HeadphoneSelection::Mix));
    }

    #[test]
    fn test_deck_b_rejected_from_split_and_unknown() {
        let mut selector = HeadphoneDeckSelector::new();
        assert!(selector.handle(101, 2).is_empty());
        assert_eq!(selector.selection(), None);

        selector.handle(103, 4);
        assert!(selector.handle(101, 2).is_empty());
        assert_eq!(selector.selection(), Some(HeadphoneSelection::Split));
    }

    #[test]
    fn test_deck_b_accepted_from_deck_a() {
        let mut selector = HeadphoneDeckSelector::new();
        selector.handle(102, 8);
        selector.handle(101, 2);
        selector.handle(100, 1);

        assert_eq!(selector.handle(101, 2), vec![Side::Right, Side::Left]);
        assert_eq!(selector.selection(), Some(HeadphoneSelection::DeckB));
        assert!(!selector.enabled(Side::Left));
        assert!(selector.enabled(Side::Right));
    }

    #[test]
    fn test_only_differing_flags_toggle() {
        let mut selector = HeadphoneDeckSelector::new();

        // Split from all-off: nothing to toggle
        assert!(selector.handle(103, 4).is_empty());

        // Mix: both on
        assert_eq!(selector.handle(102, 8), vec![Side::Right, Side::Left]);

        // Deck B from mix: only left goes off
        assert_eq!(selector.handle(101, 2), vec![Side::Left]);

        // Repeating mix re-enables left only
        assert_eq!(selector.handle(102, 8), vec![Side::Left]);
        assert!(selector.enabled(Side::Left) && selector.enabled(Side::Right));
    }

    #[test]
    fn test_unknown_pairs_are_noops() {
        let mut selector = HeadphoneDeckSelector::new();
        selector.handle(102, 8);

        assert!(selector.handle(103, 0).is_empty());
        assert!(selector.handle(102, 1).is_empty());
        assert!(selector.handle(42, 4).is_empty());
        assert_eq!(selector.selection(), Some(HeadphoneSelection::Mix));
    }

    #[test]
    fn test_monitor_toggle_is_tracked() {
        let mut selector = HeadphoneDeckSelector::new();
        assert!(selector.toggle(Side::Left));
        assert!(selector.enabled(Side::Left));

        // Split now has to switch the left deck back off
        assert_eq!(selector.handle(103, 4), vec![Side::Left]);
    }
}

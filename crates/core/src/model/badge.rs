use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::BadgeId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BadgeError {
    #[error("badge name cannot be empty")]
    EmptyName,
}

//
// ─── CATEGORY ──────────────────────────────────────────────────────────────────
//

/// Which progress counter a badge threshold is measured against.
///
/// Declaration order is the catalog order: quiz badges sort before puzzle badges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeCategory {
    Quiz,
    Puzzle,
}

impl BadgeCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BadgeCategory::Quiz => "quiz",
            BadgeCategory::Puzzle => "puzzle",
        }
    }
}

//
// ─── BADGE ─────────────────────────────────────────────────────────────────────
//

/// An achievement with a numeric unlock threshold.
///
/// Everything but `unlocked` is fixed at construction (or replaced wholesale
/// through `BadgePatch`). `unlocked` only ever goes from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    id: BadgeId,
    name: String,
    icon: String,
    description: String,
    required_score: u32,
    category: BadgeCategory,
    unlocked: bool,
}

impl Badge {
    /// Creates a locked badge.
    ///
    /// # Errors
    ///
    /// Returns `BadgeError::EmptyName` if the name is blank.
    pub fn new(
        id: BadgeId,
        name: impl Into<String>,
        icon: impl Into<String>,
        description: impl Into<String>,
        required_score: u32,
        category: BadgeCategory,
    ) -> Result<Self, BadgeError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BadgeError::EmptyName);
        }
        Ok(Self {
            id,
            name: name.trim().to_owned(),
            icon: icon.into().trim().to_owned(),
            description: description.into().trim().to_owned(),
            required_score,
            category,
            unlocked: false,
        })
    }

    /// Rehydrate a badge whose unlock state was stored elsewhere.
    ///
    /// # Errors
    ///
    /// Returns `BadgeError::EmptyName` if the name is blank.
    pub fn from_persisted(
        id: BadgeId,
        name: impl Into<String>,
        icon: impl Into<String>,
        description: impl Into<String>,
        required_score: u32,
        category: BadgeCategory,
        unlocked: bool,
    ) -> Result<Self, BadgeError> {
        let mut badge = Self::new(id, name, icon, description, required_score, category)?;
        badge.unlocked = unlocked;
        Ok(badge)
    }

    /// Built-in catalog entries; names are known to be non-empty.
    pub(crate) fn seeded(
        id: u64,
        name: &str,
        icon: &str,
        description: &str,
        required_score: u32,
        category: BadgeCategory,
    ) -> Self {
        Self {
            id: BadgeId::new(id),
            name: name.to_owned(),
            icon: icon.to_owned(),
            description: description.to_owned(),
            required_score,
            category,
            unlocked: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> BadgeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn icon(&self) -> &str {
        &self.icon
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn required_score(&self) -> u32 {
        self.required_score
    }

    #[must_use]
    pub fn category(&self) -> BadgeCategory {
        self.category
    }

    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// Catalog ordering key.
    #[must_use]
    pub fn sort_key(&self) -> (BadgeCategory, u32) {
        (self.category, self.required_score)
    }

    /// Flip to unlocked. Returns `true` only on the transition.
    pub(crate) fn unlock(&mut self) -> bool {
        if self.unlocked {
            return false;
        }
        self.unlocked = true;
        true
    }

    pub(crate) fn keep_unlocked_from(&mut self, previous: &Badge) {
        self.unlocked |= previous.unlocked;
    }

    /// Apply a definition patch. The unlock flag is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `BadgeError::EmptyName` if the patch blanks the name.
    pub fn apply(&mut self, patch: BadgePatch) -> Result<(), BadgeError> {
        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(BadgeError::EmptyName);
            }
            self.name = name.trim().to_owned();
        }
        if let Some(icon) = patch.icon {
            self.icon = icon.trim().to_owned();
        }
        if let Some(description) = patch.description {
            self.description = description.trim().to_owned();
        }
        if let Some(required_score) = patch.required_score {
            self.required_score = required_score;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        Ok(())
    }
}

/// Partial update for a badge definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BadgePatch {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub required_score: Option<u32>,
    pub category: Option<BadgeCategory>,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_badge_starts_locked_and_trims() {
        let badge = Badge::new(
            BadgeId::new(1),
            "  Quiz Rookie ",
            "🏅",
            " first steps ",
            5,
            BadgeCategory::Quiz,
        )
        .unwrap();
        assert!(!badge.is_unlocked());
        assert_eq!(badge.name(), "Quiz Rookie");
        assert_eq!(badge.description(), "first steps");
    }

    #[test]
    fn new_badge_rejects_blank_name() {
        let err = Badge::new(BadgeId::new(1), "  ", "", "", 1, BadgeCategory::Puzzle).unwrap_err();
        assert_eq!(err, BadgeError::EmptyName);
    }

    #[test]
    fn unlock_reports_transition_once() {
        let mut badge = Badge::new(BadgeId::new(1), "A", "", "", 1, BadgeCategory::Quiz).unwrap();
        assert!(badge.unlock());
        assert!(!badge.unlock());
        assert!(badge.is_unlocked());
    }

    #[test]
    fn patch_keeps_unlock_flag() {
        let mut badge =
            Badge::from_persisted(BadgeId::new(2), "B", "", "", 3, BadgeCategory::Quiz, true)
                .unwrap();
        badge
            .apply(BadgePatch {
                required_score: Some(50),
                category: Some(BadgeCategory::Puzzle),
                ..BadgePatch::default()
            })
            .unwrap();
        assert!(badge.is_unlocked());
        assert_eq!(badge.sort_key(), (BadgeCategory::Puzzle, 50));
    }

    #[test]
    fn patch_rejects_blank_name() {
        let mut badge = Badge::new(BadgeId::new(1), "A", "", "", 1, BadgeCategory::Quiz).unwrap();
        let err = badge
            .apply(BadgePatch {
                name: Some(" ".into()),
                ..BadgePatch::default()
            })
            .unwrap_err();
        assert_eq!(err, BadgeError::EmptyName);
        assert_eq!(badge.name(), "A");
    }

    #[test]
    fn category_order_puts_quiz_first() {
        assert!(BadgeCategory::Quiz < BadgeCategory::Puzzle);
    }

    #[test]
    fn category_uses_lowercase_wire_names() {
        assert_eq!(
            serde_json::to_value(BadgeCategory::Puzzle).unwrap(),
            serde_json::json!("puzzle")
        );
        let quiz: BadgeCategory = serde_json::from_value(serde_json::json!("quiz")).unwrap();
        assert_eq!(quiz, BadgeCategory::Quiz);
        assert_eq!(quiz.as_str(), "quiz");
        assert!(serde_json::from_value::<BadgeCategory>(serde_json::json!("reading")).is_err());
    }
}

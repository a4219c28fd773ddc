use std::collections::BTreeSet;

use crate::model::{Badge, BadgeCategory, BadgeError, BadgeId, BadgePatch, ProgressCounters};

//
// ─── DEFAULT CATALOG ───────────────────────────────────────────────────────────
//

/// Badges every learner starts with, already in catalog order.
#[must_use]
pub fn default_catalog() -> Vec<Badge> {
    use BadgeCategory::{Puzzle, Quiz};
    vec![
        Badge::seeded(1, "First Answer", "🌟", "Answer your first quiz question", 1, Quiz),
        Badge::seeded(2, "Quiz Rookie", "🥉", "Answer 5 quiz questions correctly", 5, Quiz),
        Badge::seeded(3, "Quiz Explorer", "🥈", "Answer 10 quiz questions correctly", 10, Quiz),
        Badge::seeded(4, "Quiz Champion", "🥇", "Answer 25 quiz questions correctly", 25, Quiz),
        Badge::seeded(5, "Quiz Master", "🏆", "Answer 50 quiz questions correctly", 50, Quiz),
        Badge::seeded(6, "Puzzle Starter", "🧩", "Solve your first puzzle", 1, Puzzle),
        Badge::seeded(7, "Puzzle Solver", "🔍", "Solve 5 puzzles", 5, Puzzle),
        Badge::seeded(8, "Puzzle Wizard", "🧙", "Solve 10 puzzles", 10, Puzzle),
        Badge::seeded(9, "Puzzle Legend", "👑", "Solve 20 puzzles", 20, Puzzle),
    ]
}

//
// ─── TRACKER ───────────────────────────────────────────────────────────────────
//

/// Progress counters plus the badge catalog they unlock.
///
/// Invariants held after every public call:
/// - the catalog is sorted by `(category, required_score)`, quiz before puzzle,
///   stable for equal keys;
/// - `unlocked_ids()` is exactly the set of catalog badges with `is_unlocked()`;
/// - a badge whose threshold is reached is unlocked, and stays unlocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressTracker {
    counters: ProgressCounters,
    catalog: Vec<Badge>,
    unlocked: BTreeSet<BadgeId>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(default_catalog())
    }
}

impl ProgressTracker {
    /// Fresh learner with zeroed counters.
    #[must_use]
    pub fn new(catalog: Vec<Badge>) -> Self {
        Self::with_counters(ProgressCounters::new(), catalog)
    }

    /// Rehydrate from stored counters.
    ///
    /// Badges already reached are unlocked immediately; badges that arrive
    /// unlocked stay unlocked. Duplicate ids keep the last definition.
    #[must_use]
    pub fn with_counters(counters: ProgressCounters, catalog: Vec<Badge>) -> Self {
        let mut tracker = Self {
            counters,
            catalog: Vec::with_capacity(catalog.len()),
            unlocked: BTreeSet::new(),
        };
        for badge in catalog {
            tracker.place(badge);
        }
        tracker.evaluate_unlocks();
        tracker
    }

    #[must_use]
    pub fn counters(&self) -> &ProgressCounters {
        &self.counters
    }

    #[must_use]
    pub fn badges(&self) -> &[Badge] {
        &self.catalog
    }

    #[must_use]
    pub fn badge(&self, id: BadgeId) -> Option<&Badge> {
        self.catalog.iter().find(|b| b.id() == id)
    }

    #[must_use]
    pub fn unlocked_ids(&self) -> &BTreeSet<BadgeId> {
        &self.unlocked
    }

    #[must_use]
    pub fn is_unlocked(&self, id: BadgeId) -> bool {
        self.unlocked.contains(&id)
    }

    pub fn unlocked_badges(&self) -> impl Iterator<Item = &Badge> {
        self.catalog.iter().filter(|b| b.is_unlocked())
    }

    // ─── Counter events ────────────────────────────────────────────────────────

    /// Correct quiz answer. Returns badges unlocked by this call.
    pub fn record_quiz_correct(&mut self) -> Vec<Badge> {
        self.counters.bump_quiz();
        self.evaluate(Some(BadgeCategory::Quiz))
    }

    /// Wrong quiz answer: only the streak resets.
    pub fn record_quiz_miss(&mut self) {
        self.counters.reset_streak();
    }

    /// Solved puzzle. Returns puzzle badges unlocked by this call.
    pub fn record_puzzle_completion(&mut self) -> Vec<Badge> {
        self.counters.bump_puzzles();
        self.evaluate(Some(BadgeCategory::Puzzle))
    }

    pub fn record_word_learned(&mut self) {
        self.counters.bump_words();
    }

    pub fn record_book_read(&mut self) {
        self.counters.bump_books();
    }

    /// Unlock every locked badge whose threshold is reached, in catalog order.
    ///
    /// Safe to call repeatedly; returns an empty list when nothing changed.
    pub fn evaluate_unlocks(&mut self) -> Vec<Badge> {
        self.evaluate(None)
    }

    fn evaluate(&mut self, scope: Option<BadgeCategory>) -> Vec<Badge> {
        let counters = self.counters;
        let mut newly = Vec::new();
        for badge in &mut self.catalog {
            if scope.is_some_and(|c| c != badge.category()) || badge.is_unlocked() {
                continue;
            }
            if counters.counter_for(badge.category()) >= badge.required_score() && badge.unlock() {
                self.unlocked.insert(badge.id());
                newly.push(badge.clone());
            }
        }
        newly
    }

    // ─── Queries ───────────────────────────────────────────────────────────────

    /// How many more points `badge` needs; zero once reached.
    #[must_use]
    pub fn remaining_for(&self, badge: &Badge) -> u32 {
        badge
            .required_score()
            .saturating_sub(self.counters.counter_for(badge.category()))
    }

    /// Closest locked badge by remaining distance.
    ///
    /// Equal distances across categories resolve to quiz; within a category
    /// the lower threshold wins.
    #[must_use]
    pub fn next_badge(&self) -> Option<&Badge> {
        let mut best: Option<(&Badge, u32)> = None;
        for badge in self.catalog.iter().filter(|b| !b.is_unlocked()) {
            let distance = self.remaining_for(badge);
            if distance == 0 {
                continue;
            }
            // catalog order already puts quiz first, so strict `<` keeps the tie-break
            if best.is_none_or(|(_, d)| distance < d) {
                best = Some((badge, distance));
            }
        }
        best.map(|(badge, _)| badge)
    }

    // ─── Catalog management ────────────────────────────────────────────────────

    /// Add a badge, or replace the definition with the same id.
    ///
    /// A replaced badge that was unlocked stays unlocked. Returns badges the
    /// new definition unlocks immediately.
    pub fn register_badge(&mut self, badge: Badge) -> Vec<Badge> {
        self.place(badge);
        self.evaluate_unlocks()
    }

    /// Patch a badge definition in place. Unknown ids are a no-op (`Ok(false)`).
    ///
    /// # Errors
    ///
    /// Returns `BadgeError` if the patch is invalid; the catalog is unchanged.
    pub fn update_badge(&mut self, id: BadgeId, patch: BadgePatch) -> Result<bool, BadgeError> {
        let Some(index) = self.catalog.iter().position(|b| b.id() == id) else {
            return Ok(false);
        };
        let mut updated = self.catalog[index].clone();
        updated.apply(patch)?;
        self.catalog.remove(index);
        self.insert_sorted(updated);
        self.evaluate_unlocks();
        Ok(true)
    }

    /// Remove a badge. Returns `false` if the id is unknown.
    pub fn remove_badge(&mut self, id: BadgeId) -> bool {
        let Some(index) = self.catalog.iter().position(|b| b.id() == id) else {
            return false;
        };
        self.catalog.remove(index);
        self.unlocked.remove(&id);
        true
    }

    fn place(&mut self, mut badge: Badge) {
        if let Some(index) = self.catalog.iter().position(|b| b.id() == badge.id()) {
            let previous = self.catalog.remove(index);
            badge.keep_unlocked_from(&previous);
        }
        if badge.is_unlocked() {
            self.unlocked.insert(badge.id());
        }
        self.insert_sorted(badge);
    }

    fn insert_sorted(&mut self, badge: Badge) {
        let key = badge.sort_key();
        let at = self.catalog.partition_point(|b| b.sort_key() <= key);
        self.catalog.insert(at, badge);
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn badge(id: u64, score: u32, category: BadgeCategory) -> Badge {
        Badge::new(BadgeId::new(id), format!("Badge {id}"), "", "", score, category).unwrap()
    }

    fn expected_unlocked(tracker: &ProgressTracker) -> BTreeSet<BadgeId> {
        tracker
            .badges()
            .iter()
            .filter(|b| b.required_score() <= tracker.counters().counter_for(b.category()))
            .map(Badge::id)
            .collect()
    }

    fn assert_sorted(tracker: &ProgressTracker) {
        let keys: Vec<_> = tracker.badges().iter().map(Badge::sort_key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn first_correct_answer_unlocks_first_badge() {
        let mut tracker = ProgressTracker::default();
        let newly = tracker.record_quiz_correct();
        assert_eq!(newly.len(), 1);
        assert_eq!(newly[0].name(), "First Answer");
        assert!(tracker.is_unlocked(BadgeId::new(1)));
        assert_eq!(tracker.counters().quiz_score(), 1);
        assert_eq!(tracker.counters().quiz_streak(), 1);
    }

    #[test]
    fn equal_thresholds_unlock_together() {
        let mut tracker = ProgressTracker::new(vec![
            badge(1, 2, BadgeCategory::Quiz),
            badge(2, 2, BadgeCategory::Quiz),
            badge(3, 2, BadgeCategory::Puzzle),
        ]);
        assert!(tracker.record_quiz_correct().is_empty());
        let newly: Vec<_> = tracker.record_quiz_correct().iter().map(Badge::id).collect();
        assert_eq!(newly, vec![BadgeId::new(1), BadgeId::new(2)]);
        // puzzle badge with the same threshold is independent
        assert!(!tracker.is_unlocked(BadgeId::new(3)));
    }

    #[test]
    fn puzzle_completion_only_touches_puzzle_badges() {
        let mut tracker = ProgressTracker::new(vec![
            badge(1, 1, BadgeCategory::Quiz),
            badge(2, 1, BadgeCategory::Puzzle),
        ]);
        let newly = tracker.record_puzzle_completion();
        assert_eq!(newly.iter().map(Badge::id).collect::<Vec<_>>(), vec![BadgeId::new(2)]);
        assert!(!tracker.is_unlocked(BadgeId::new(1)));
        assert_eq!(tracker.counters().quiz_score(), 0);
    }

    #[test]
    fn miss_only_resets_streak() {
        let mut tracker = ProgressTracker::default();
        for _ in 0..6 {
            tracker.record_quiz_correct();
        }
        tracker.record_puzzle_completion();
        let before = tracker.clone();

        tracker.record_quiz_miss();

        assert_eq!(tracker.counters().quiz_streak(), 0);
        assert_eq!(tracker.counters().quiz_score(), before.counters().quiz_score());
        assert_eq!(
            tracker.counters().puzzle_completions(),
            before.counters().puzzle_completions()
        );
        assert_eq!(tracker.unlocked_ids(), before.unlocked_ids());
        assert_eq!(tracker.badges(), before.badges());
    }

    #[test]
    fn evaluate_is_idempotent() {
        let mut tracker = ProgressTracker::with_counters(
            ProgressCounters::from_persisted(10, 0, 0, 0, 0),
            default_catalog(),
        );
        let snapshot = tracker.clone();
        assert!(tracker.evaluate_unlocks().is_empty());
        assert!(tracker.evaluate_unlocks().is_empty());
        assert_eq!(tracker, snapshot);
    }

    #[test]
    fn rehydrating_unlocks_reached_badges() {
        let tracker = ProgressTracker::with_counters(
            ProgressCounters::from_persisted(10, 3, 5, 0, 0),
            default_catalog(),
        );
        assert_eq!(tracker.unlocked_ids(), &expected_unlocked(&tracker));
        assert!(tracker.is_unlocked(BadgeId::new(3)));
        assert!(tracker.is_unlocked(BadgeId::new(7)));
        assert!(!tracker.is_unlocked(BadgeId::new(8)));
    }

    #[test]
    fn random_sequences_keep_index_exact_and_monotonic() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..50 {
            let mut tracker = ProgressTracker::default();
            let mut seen = BTreeSet::new();
            for _ in 0..80 {
                match rng.random_range(0..4) {
                    0 | 1 => {
                        tracker.record_quiz_correct();
                    }
                    2 => {
                        tracker.record_puzzle_completion();
                    }
                    _ => tracker.record_quiz_miss(),
                }
                assert_eq!(tracker.unlocked_ids(), &expected_unlocked(&tracker));
                let flagged: BTreeSet<_> = tracker.unlocked_badges().map(Badge::id).collect();
                assert_eq!(&flagged, tracker.unlocked_ids());
                assert!(seen.is_subset(tracker.unlocked_ids()));
                seen.clone_from(tracker.unlocked_ids());
            }
        }
    }

    #[test]
    fn next_badge_prefers_quiz_on_tie() {
        let tracker = ProgressTracker::with_counters(
            ProgressCounters::from_persisted(4, 0, 0, 0, 0),
            vec![badge(1, 1, BadgeCategory::Puzzle), badge(2, 5, BadgeCategory::Quiz)],
        );
        // quiz needs 1 more, puzzle needs 1 more
        assert_eq!(tracker.next_badge().map(Badge::id), Some(BadgeId::new(2)));
    }

    #[test]
    fn next_badge_picks_strictly_closer_category() {
        let tracker = ProgressTracker::with_counters(
            ProgressCounters::from_persisted(8, 0, 4, 0, 0),
            vec![badge(1, 10, BadgeCategory::Quiz), badge(2, 5, BadgeCategory::Puzzle)],
        );
        // quiz needs 2, puzzle needs 1
        assert_eq!(tracker.next_badge().map(Badge::id), Some(BadgeId::new(2)));

        let tracker = ProgressTracker::with_counters(
            ProgressCounters::from_persisted(8, 0, 0, 0, 0),
            vec![badge(1, 10, BadgeCategory::Quiz), badge(2, 5, BadgeCategory::Puzzle)],
        );
        // quiz needs 2, puzzle needs 5
        assert_eq!(tracker.next_badge().map(Badge::id), Some(BadgeId::new(1)));
    }

    #[test]
    fn next_badge_is_none_when_everything_unlocked() {
        let tracker = ProgressTracker::with_counters(
            ProgressCounters::from_persisted(100, 0, 100, 0, 0),
            default_catalog(),
        );
        assert!(tracker.next_badge().is_none());
    }

    #[test]
    fn register_keeps_catalog_sorted_and_unlocks_reached() {
        let mut tracker = ProgressTracker::new(vec![
            badge(1, 5, BadgeCategory::Puzzle),
            badge(2, 10, BadgeCategory::Quiz),
        ]);
        tracker.record_quiz_correct();
        tracker.record_quiz_correct();

        let newly = tracker.register_badge(badge(3, 2, BadgeCategory::Quiz));
        assert_eq!(newly.iter().map(Badge::id).collect::<Vec<_>>(), vec![BadgeId::new(3)]);
        tracker.register_badge(badge(4, 1, BadgeCategory::Puzzle));
        assert_sorted(&tracker);
        let order: Vec<_> = tracker.badges().iter().map(|b| b.id().value()).collect();
        assert_eq!(order, vec![3, 2, 4, 1]);
    }

    #[test]
    fn re_registering_never_relocks() {
        let mut tracker = ProgressTracker::new(vec![badge(1, 1, BadgeCategory::Quiz)]);
        tracker.record_quiz_correct();
        tracker.register_badge(badge(1, 99, BadgeCategory::Quiz));
        assert!(tracker.is_unlocked(BadgeId::new(1)));
        assert_eq!(tracker.badges().len(), 1);
        assert_eq!(tracker.badges()[0].required_score(), 99);
    }

    #[test]
    fn update_moves_badge_and_unknown_id_is_noop() {
        let mut tracker = ProgressTracker::default();
        let moved = tracker
            .update_badge(
                BadgeId::new(1),
                BadgePatch {
                    category: Some(BadgeCategory::Puzzle),
                    required_score: Some(30),
                    ..BadgePatch::default()
                },
            )
            .unwrap();
        assert!(moved);
        assert_sorted(&tracker);
        assert_eq!(tracker.badges().last().map(Badge::id), Some(BadgeId::new(1)));

        let snapshot = tracker.clone();
        assert!(!tracker.update_badge(BadgeId::new(404), BadgePatch::default()).unwrap());
        assert_eq!(tracker, snapshot);
    }

    #[test]
    fn update_lowering_threshold_unlocks() {
        let mut tracker = ProgressTracker::default();
        tracker.record_puzzle_completion();
        tracker
            .update_badge(
                BadgeId::new(9),
                BadgePatch {
                    required_score: Some(1),
                    ..BadgePatch::default()
                },
            )
            .unwrap();
        assert!(tracker.is_unlocked(BadgeId::new(9)));
        assert_eq!(tracker.unlocked_ids(), &expected_unlocked(&tracker));
    }

    #[test]
    fn invalid_patch_leaves_catalog_untouched() {
        let mut tracker = ProgressTracker::default();
        let snapshot = tracker.clone();
        let err = tracker
            .update_badge(
                BadgeId::new(2),
                BadgePatch {
                    name: Some(String::new()),
                    required_score: Some(1),
                    ..BadgePatch::default()
                },
            )
            .unwrap_err();
        assert_eq!(err, BadgeError::EmptyName);
        assert_eq!(tracker, snapshot);
    }

    #[test]
    fn remove_drops_badge_and_index_entry() {
        let mut tracker = ProgressTracker::default();
        tracker.record_quiz_correct();
        assert!(tracker.remove_badge(BadgeId::new(1)));
        assert!(!tracker.is_unlocked(BadgeId::new(1)));
        assert!(tracker.badge(BadgeId::new(1)).is_none());
        assert!(!tracker.remove_badge(BadgeId::new(1)));
    }

    #[test]
    fn words_and_books_do_not_unlock_badges() {
        let mut tracker = ProgressTracker::default();
        tracker.record_word_learned();
        tracker.record_book_read();
        assert_eq!(tracker.counters().words_learned(), 1);
        assert_eq!(tracker.counters().books_read(), 1);
        assert!(tracker.unlocked_ids().is_empty());
    }

    #[test]
    fn default_catalog_is_sorted() {
        assert_sorted(&ProgressTracker::default());
    }
}

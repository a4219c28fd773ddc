use std::collections::BTreeMap;

use thiserror::Error;

use crate::model::ids::{BookId, UserId, WordId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContentError {
    #[error("{field} cannot be empty")]
    EmptyField { field: &'static str },

    #[error("age range {min}..={max} is inverted")]
    InvertedAgeRange { min: u8, max: u8 },
}

/// Inclusive age window a word or book is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeRange {
    min: u8,
    max: u8,
}

impl AgeRange {
    /// # Errors
    ///
    /// Returns `ContentError::InvertedAgeRange` if `min > max`.
    pub fn new(min: u8, max: u8) -> Result<Self, ContentError> {
        if min > max {
            return Err(ContentError::InvertedAgeRange { min, max });
        }
        Ok(Self { min, max })
    }

    #[must_use]
    pub fn min(&self) -> u8 {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> u8 {
        self.max
    }

    #[must_use]
    pub fn contains(&self, age: u8) -> bool {
        (self.min..=self.max).contains(&age)
    }
}

/// Who a content row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentOwner {
    Global,
    User(UserId),
}

impl ContentOwner {
    /// Global rows are visible to everyone; owned rows only to their owner.
    #[must_use]
    pub fn visible_to(&self, user: UserId) -> bool {
        match self {
            ContentOwner::Global => true,
            ContentOwner::User(owner) => *owner == user,
        }
    }
}

/// Filter for catalog queries: visible to `user` and suitable for `child_age`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentScope {
    pub user: UserId,
    pub child_age: u8,
}

impl ContentScope {
    #[must_use]
    pub fn admits(&self, owner: ContentOwner, ages: AgeRange) -> bool {
        owner.visible_to(self.user) && ages.contains(self.child_age)
    }
}

fn require(field: &'static str, value: String) -> Result<String, ContentError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ContentError::EmptyField { field });
    }
    Ok(trimmed.to_owned())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Vocabulary entry shown on word cards and used by quizzes.
///
/// `text` is the word in the learner's language, `meaning` its English
/// counterpart; each side may carry its own pronunciation clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    id: WordId,
    text: String,
    meaning: String,
    category: String,
    image: Option<String>,
    text_audio: Option<String>,
    meaning_audio: Option<String>,
    ages: AgeRange,
    owner: ContentOwner,
}

impl Word {
    /// # Errors
    ///
    /// Returns `ContentError::EmptyField` if text, meaning or category is blank.
    pub fn new(
        id: WordId,
        text: impl Into<String>,
        meaning: impl Into<String>,
        category: impl Into<String>,
        image: Option<String>,
        ages: AgeRange,
        owner: ContentOwner,
    ) -> Result<Self, ContentError> {
        Ok(Self {
            id,
            text: require("text", text.into())?,
            meaning: require("meaning", meaning.into())?,
            category: require("category", category.into())?,
            image: optional(image),
            text_audio: None,
            meaning_audio: None,
            ages,
            owner,
        })
    }

    #[must_use]
    pub fn with_audio(mut self, text_audio: Option<String>, meaning_audio: Option<String>) -> Self {
        self.text_audio = optional(text_audio);
        self.meaning_audio = optional(meaning_audio);
        self
    }

    #[must_use]
    pub fn id(&self) -> WordId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn meaning(&self) -> &str {
        &self.meaning
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    #[must_use]
    pub fn text_audio(&self) -> Option<&str> {
        self.text_audio.as_deref()
    }

    #[must_use]
    pub fn meaning_audio(&self) -> Option<&str> {
        self.meaning_audio.as_deref()
    }

    #[must_use]
    pub fn ages(&self) -> AgeRange {
        self.ages
    }

    #[must_use]
    pub fn owner(&self) -> ContentOwner {
        self.owner
    }
}

/// A word a learner adds to their own collection; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordDraft {
    pub text: String,
    pub meaning: String,
    pub category: String,
    pub image: Option<String>,
    pub text_audio: Option<String>,
    pub meaning_audio: Option<String>,
    pub ages: AgeRange,
}

impl WordDraft {
    /// # Errors
    ///
    /// Returns `ContentError::EmptyField` if text, meaning or category is blank.
    pub fn validate(&self) -> Result<(), ContentError> {
        self.clone()
            .into_word(WordId::new(0), ContentOwner::Global)
            .map(|_| ())
    }

    /// # Errors
    ///
    /// Same as [`WordDraft::validate`].
    pub fn into_word(self, id: WordId, owner: ContentOwner) -> Result<Word, ContentError> {
        Ok(
            Word::new(id, self.text, self.meaning, self.category, self.image, self.ages, owner)?
                .with_audio(self.text_audio, self.meaning_audio),
        )
    }
}

/// One illustrated page of a book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookPage {
    image: String,
    audio: Option<String>,
    text: Option<String>,
}

impl BookPage {
    /// # Errors
    ///
    /// Returns `ContentError::EmptyField` if the image is blank.
    pub fn new(
        image: impl Into<String>,
        audio: Option<String>,
        text: Option<String>,
    ) -> Result<Self, ContentError> {
        Ok(Self {
            image: require("page image", image.into())?,
            audio: optional(audio),
            text: optional(text),
        })
    }

    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    #[must_use]
    pub fn audio(&self) -> Option<&str> {
        self.audio.as_deref()
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// A reading book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    id: BookId,
    title: String,
    author: Option<String>,
    cover: Option<String>,
    pages: Vec<BookPage>,
    ages: AgeRange,
    owner: ContentOwner,
}

impl Book {
    /// # Errors
    ///
    /// Returns `ContentError::EmptyField` if the title is blank.
    pub fn new(
        id: BookId,
        title: impl Into<String>,
        author: Option<String>,
        cover: Option<String>,
        ages: AgeRange,
        owner: ContentOwner,
    ) -> Result<Self, ContentError> {
        Ok(Self {
            id,
            title: require("title", title.into())?,
            author: optional(author),
            cover: optional(cover),
            pages: Vec::new(),
            ages,
            owner,
        })
    }

    /// Pages in reading order.
    #[must_use]
    pub fn with_pages(mut self, pages: Vec<BookPage>) -> Self {
        self.pages = pages;
        self
    }

    #[must_use]
    pub fn id(&self) -> BookId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    #[must_use]
    pub fn cover(&self) -> Option<&str> {
        self.cover.as_deref()
    }

    #[must_use]
    pub fn pages(&self) -> &[BookPage] {
        &self.pages
    }

    #[must_use]
    pub fn ages(&self) -> AgeRange {
        self.ages
    }

    #[must_use]
    pub fn owner(&self) -> ContentOwner {
        self.owner
    }
}

/// Groups words by category, categories sorted, words kept in input order.
#[must_use]
pub fn words_by_category(words: &[Word]) -> BTreeMap<String, Vec<Word>> {
    let mut grouped: BTreeMap<String, Vec<Word>> = BTreeMap::new();
    for word in words {
        grouped
            .entry(word.category().to_owned())
            .or_default()
            .push(word.clone());
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(id: u64, text: &str, category: &str) -> Word {
        Word::new(
            WordId::new(id),
            text,
            "meaning",
            category,
            None,
            AgeRange::new(3, 8).unwrap(),
            ContentOwner::Global,
        )
        .unwrap()
    }

    #[test]
    fn age_range_is_inclusive() {
        let range = AgeRange::new(4, 6).unwrap();
        assert!(range.contains(4));
        assert!(range.contains(6));
        assert!(!range.contains(7));
        assert!(AgeRange::new(9, 2).is_err());
    }

    #[test]
    fn scope_respects_owner_and_age() {
        let me = UserId::random();
        let other = UserId::random();
        let scope = ContentScope {
            user: me,
            child_age: 5,
        };
        let ages = AgeRange::new(3, 6).unwrap();
        assert!(scope.admits(ContentOwner::Global, ages));
        assert!(scope.admits(ContentOwner::User(me), ages));
        assert!(!scope.admits(ContentOwner::User(other), ages));
        assert!(!scope.admits(ContentOwner::Global, AgeRange::new(7, 9).unwrap()));
    }

    #[test]
    fn words_group_by_category() {
        let words = vec![
            word(1, "cat", "animals"),
            word(2, "red", "colors"),
            word(3, "dog", "animals"),
        ];
        let grouped = words_by_category(&words);
        let keys: Vec<_> = grouped.keys().cloned().collect();
        assert_eq!(keys, vec!["animals".to_string(), "colors".to_string()]);
        let animals: Vec<_> = grouped["animals"].iter().map(Word::text).collect();
        assert_eq!(animals, vec!["cat", "dog"]);
    }

    #[test]
    fn blank_fields_are_rejected() {
        let err = Word::new(
            WordId::new(1),
            " ",
            "m",
            "c",
            None,
            AgeRange::new(1, 2).unwrap(),
            ContentOwner::Global,
        )
        .unwrap_err();
        assert_eq!(err, ContentError::EmptyField { field: "text" });

        let book = Book::new(
            BookId::new(1),
            "The Fox",
            Some("  ".into()),
            Some(" covers/fox.png ".into()),
            AgeRange::new(1, 2).unwrap(),
            ContentOwner::Global,
        )
        .unwrap();
        assert_eq!(book.author(), None);
        assert_eq!(book.cover(), Some("covers/fox.png"));
        assert!(book.pages().is_empty());
        assert!(BookPage::new("  ", None, None).is_err());
    }

    #[test]
    fn draft_becomes_owned_word_with_audio() {
        let me = UserId::random();
        let draft = WordDraft {
            text: "사과".into(),
            meaning: "apple".into(),
            category: "food".into(),
            image: None,
            text_audio: Some("audio/ko/apple.mp3".into()),
            meaning_audio: Some(" ".into()),
            ages: AgeRange::new(3, 6).unwrap(),
        };
        assert!(draft.validate().is_ok());

        let word = draft.into_word(WordId::new(9), ContentOwner::User(me)).unwrap();
        assert_eq!(word.owner(), ContentOwner::User(me));
        assert_eq!(word.text_audio(), Some("audio/ko/apple.mp3"));
        assert_eq!(word.meaning_audio(), None);
    }

    #[test]
    fn draft_with_blank_category_is_invalid() {
        let draft = WordDraft {
            text: "cat".into(),
            meaning: "cat".into(),
            category: String::new(),
            image: None,
            text_audio: None,
            meaning_audio: None,
            ages: AgeRange::new(3, 6).unwrap(),
        };
        assert_eq!(
            draft.validate(),
            Err(ContentError::EmptyField { field: "category" })
        );
    }
}

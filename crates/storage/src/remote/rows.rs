//! Wire rows for the hosted tables and their conversion into domain types.
//!
//! Every inbound row goes through the domain constructors, so a malformed
//! response surfaces as `StorageError::Serialization` instead of leaking
//! unchecked data inward.

use chrono::{DateTime, Utc};
use learn_core::model::{
    AgeRange, Badge, BadgeCategory, BadgeId, Book, BookId, BookPage, ContentOwner, ProfilePatch,
    ProgressCounters, ProgressPatch, UserId, UserProfile, UserProgress, UserType, Username, Word,
    WordDraft, WordId,
};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::repository::{StorageError, UnlockedBadge};

fn invalid(field: &str, detail: impl std::fmt::Display) -> StorageError {
    StorageError::Serialization(format!("{field}: {detail}"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

/// Catalog keys arrive as JSON numbers or as their decimal text.
fn numeric_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(raw) => raw
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("non-numeric id {raw:?}"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum OwnerType {
    Global,
    User,
}

fn owner_of(owner_type: OwnerType, owner_id: Option<UserId>) -> Result<ContentOwner, StorageError> {
    match (owner_type, owner_id) {
        (OwnerType::Global, _) => Ok(ContentOwner::Global),
        (OwnerType::User, Some(owner)) => Ok(ContentOwner::User(owner)),
        (OwnerType::User, None) => Err(invalid("owner_id", "missing on a user-owned row")),
    }
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ProfileRow {
    pub user_id: UserId,
    pub username: String,
    pub user_type: String,
    pub child_age: i64,
    #[serde(default)]
    pub site_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ProfileRow {
    pub fn from_profile(profile: &UserProfile) -> Self {
        Self {
            user_id: profile.user_id(),
            username: profile.username().as_str().to_owned(),
            user_type: profile.user_type().as_str().to_owned(),
            child_age: i64::from(profile.child_age()),
            site_name: Some(profile.site_name().to_owned()),
            created_at: profile.created_at(),
        }
    }

    pub fn into_profile(self) -> Result<UserProfile, StorageError> {
        let username = Username::parse(self.username).map_err(|e| invalid("username", e))?;
        let user_type = UserType::parse(&self.user_type).map_err(|e| invalid("user_type", e))?;
        let child_age =
            u8::try_from(self.child_age).map_err(|_| invalid("child_age", self.child_age))?;
        UserProfile::new(
            self.user_id,
            username,
            user_type,
            child_age,
            self.site_name,
            self.created_at,
        )
        .map_err(|e| invalid("profile", e))
    }
}

#[derive(Debug, Default, Serialize)]
pub(crate) struct ProfilePatchBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_age: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
}

impl From<&ProfilePatch> for ProfilePatchBody {
    fn from(patch: &ProfilePatch) -> Self {
        Self {
            user_type: patch.user_type.map(UserType::as_str),
            child_age: patch.child_age.map(i64::from),
            site_name: patch.site_name.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ProgressRow {
    pub user_id: UserId,
    pub quiz_score: i64,
    pub quiz_streak: i64,
    pub puzzle_completions: i64,
    pub words_learned: i64,
    pub books_read: i64,
    pub updated_at: DateTime<Utc>,
}

fn counter(field: &str, value: i64) -> Result<u32, StorageError> {
    u32::try_from(value).map_err(|_| invalid(field, value))
}

impl ProgressRow {
    pub fn from_progress(progress: &UserProgress) -> Self {
        let c = progress.counters();
        Self {
            user_id: progress.user_id(),
            quiz_score: i64::from(c.quiz_score()),
            quiz_streak: i64::from(c.quiz_streak()),
            puzzle_completions: i64::from(c.puzzle_completions()),
            words_learned: i64::from(c.words_learned()),
            books_read: i64::from(c.books_read()),
            updated_at: progress.updated_at(),
        }
    }

    pub fn into_progress(self) -> Result<UserProgress, StorageError> {
        let counters = ProgressCounters::from_persisted(
            counter("quiz_score", self.quiz_score)?,
            counter("quiz_streak", self.quiz_streak)?,
            counter("puzzle_completions", self.puzzle_completions)?,
            counter("words_learned", self.words_learned)?,
            counter("books_read", self.books_read)?,
        );
        Ok(UserProgress::from_persisted(
            self.user_id,
            counters,
            self.updated_at,
        ))
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ProgressPatchBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_streak: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub puzzle_completions: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub words_learned: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub books_read: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressPatchBody {
    pub fn new(patch: &ProgressPatch, updated_at: DateTime<Utc>) -> Self {
        Self {
            quiz_score: patch.quiz_score.map(i64::from),
            quiz_streak: patch.quiz_streak.map(i64::from),
            puzzle_completions: patch.puzzle_completions.map(i64::from),
            words_learned: patch.words_learned.map(i64::from),
            books_read: patch.books_read.map(i64::from),
            updated_at,
        }
    }
}

fn ages(min_age: i64, max_age: i64) -> Result<AgeRange, StorageError> {
    let min = u8::try_from(min_age).map_err(|_| invalid("min_age", min_age))?;
    let max = u8::try_from(max_age).map_err(|_| invalid("max_age", max_age))?;
    AgeRange::new(min, max).map_err(|e| invalid("age range", e))
}

#[derive(Debug, Deserialize)]
pub(crate) struct WordRow {
    #[serde(deserialize_with = "numeric_id")]
    pub id: u64,
    pub name: String,
    pub name_en: String,
    pub category: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub audio_ko: Option<String>,
    #[serde(default)]
    pub audio_en: Option<String>,
    pub min_age: i64,
    pub max_age: i64,
    pub owner_type: OwnerType,
    #[serde(default)]
    pub owner_id: Option<UserId>,
}

impl WordRow {
    pub fn into_word(self) -> Result<Word, StorageError> {
        let word = Word::new(
            WordId::new(self.id),
            self.name,
            self.name_en,
            self.category,
            self.image_url,
            ages(self.min_age, self.max_age)?,
            owner_of(self.owner_type, self.owner_id)?,
        )
        .map_err(|e| invalid("word", e))?;
        Ok(word.with_audio(self.audio_ko, self.audio_en))
    }
}

/// Insert body for a learner-owned word.
#[derive(Debug, Serialize)]
pub(crate) struct NewWordRow<'a> {
    pub name: &'a str,
    pub name_en: &'a str,
    pub category: &'a str,
    pub image_url: Option<&'a str>,
    pub audio_ko: Option<&'a str>,
    pub audio_en: Option<&'a str>,
    pub min_age: i64,
    pub max_age: i64,
    pub owner_type: OwnerType,
    pub owner_id: UserId,
}

impl<'a> NewWordRow<'a> {
    pub fn new(owner: UserId, draft: &'a WordDraft) -> Self {
        Self {
            name: draft.text.trim(),
            name_en: draft.meaning.trim(),
            category: draft.category.trim(),
            image_url: trimmed(draft.image.as_deref()),
            audio_ko: trimmed(draft.text_audio.as_deref()),
            audio_en: trimmed(draft.meaning_audio.as_deref()),
            min_age: i64::from(draft.ages.min()),
            max_age: i64::from(draft.ages.max()),
            owner_type: OwnerType::User,
            owner_id: owner,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BookPageRow {
    #[serde(deserialize_with = "numeric_id")]
    pub id: u64,
    #[serde(default)]
    pub page_number: Option<i64>,
    pub image_url: String,
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BookRow {
    #[serde(deserialize_with = "numeric_id")]
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    pub min_age: i64,
    pub max_age: i64,
    pub owner_type: OwnerType,
    #[serde(default)]
    pub owner_id: Option<UserId>,
    #[serde(default)]
    pub book_pages: Option<Vec<BookPageRow>>,
}

impl BookRow {
    pub fn into_book(self) -> Result<Book, StorageError> {
        // Embedded rows come back unordered.
        let mut rows = self.book_pages.unwrap_or_default();
        rows.sort_by_key(|page| (page.page_number, page.id));
        let pages = rows
            .into_iter()
            .map(|page| {
                BookPage::new(page.image_url, page.audio, page.text).map_err(|e| invalid("page", e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let book = Book::new(
            BookId::new(self.id),
            self.title,
            self.author,
            self.cover_image,
            ages(self.min_age, self.max_age)?,
            owner_of(self.owner_type, self.owner_id)?,
        )
        .map_err(|e| invalid("book", e))?;
        Ok(book.with_pages(pages))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BadgeRow {
    #[serde(deserialize_with = "numeric_id")]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
    pub required_score: i64,
    pub category: BadgeCategory,
}

impl BadgeRow {
    pub fn into_badge(self) -> Result<Badge, StorageError> {
        let required_score = counter("required_score", self.required_score)?;
        Badge::new(
            BadgeId::new(self.id),
            self.name,
            self.icon,
            self.description,
            required_score,
            self.category,
        )
        .map_err(|e| invalid("badge", e))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct UserBadgeRow {
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(deserialize_with = "numeric_id")]
    pub badge_id: u64,
    pub unlocked_at: DateTime<Utc>,
}

impl UserBadgeRow {
    pub fn new(user_id: UserId, badge_id: BadgeId, unlocked_at: DateTime<Utc>) -> Self {
        Self {
            user_id: Some(user_id),
            badge_id: badge_id.value(),
            unlocked_at,
        }
    }

    pub fn into_unlocked(self) -> UnlockedBadge {
        UnlockedBadge {
            badge_id: BadgeId::new(self.badge_id),
            unlocked_at: self.unlocked_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_row_rejects_bad_username() {
        let row: ProfileRow = serde_json::from_value(serde_json::json!({
            "user_id": "6f1c2d9e-8b1a-4c5e-9f00-1234567890ab",
            "username": "no spaces allowed",
            "user_type": "parent",
            "child_age": 6,
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(matches!(
            row.into_profile(),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn progress_row_rejects_negative_counter() {
        let row: ProgressRow = serde_json::from_value(serde_json::json!({
            "user_id": "6f1c2d9e-8b1a-4c5e-9f00-1234567890ab",
            "quiz_score": -3,
            "quiz_streak": 0,
            "puzzle_completions": 0,
            "words_learned": 0,
            "books_read": 0,
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(row.into_progress().is_err());
    }

    #[test]
    fn profile_row_is_keyed_by_user_id() {
        let row: ProfileRow = serde_json::from_value(serde_json::json!({
            "id": 31,
            "user_id": "6f1c2d9e-8b1a-4c5e-9f00-1234567890ab",
            "username": "kid_one",
            "user_type": "teacher",
            "child_age": 5,
            "site_name": "유아학습",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-02-01T00:00:00Z"
        }))
        .unwrap();
        let profile = row.into_profile().unwrap();
        assert_eq!(
            profile.user_id().to_string(),
            "6f1c2d9e-8b1a-4c5e-9f00-1234567890ab"
        );
        assert_eq!(profile.site_name(), "유아학습");

        let json = serde_json::to_value(ProfileRow::from_profile(&profile)).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["user_id"], "6f1c2d9e-8b1a-4c5e-9f00-1234567890ab");
    }

    #[test]
    fn global_word_row_decodes_names_and_audio() {
        let row: WordRow = serde_json::from_value(serde_json::json!({
            "id": 4,
            "name": "사과",
            "name_en": "apple",
            "category": "food",
            "image_url": "https://cdn.example/apple.png",
            "audio_ko": "https://cdn.example/ko/apple.mp3",
            "audio_en": null,
            "min_age": 3,
            "max_age": 7,
            "owner_type": "global",
            "owner_id": null,
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        let word = row.into_word().unwrap();
        assert_eq!(word.text(), "사과");
        assert_eq!(word.meaning(), "apple");
        assert_eq!(word.text_audio(), Some("https://cdn.example/ko/apple.mp3"));
        assert_eq!(word.meaning_audio(), None);
        assert_eq!(word.owner(), ContentOwner::Global);
        assert!(word.ages().contains(5));
    }

    #[test]
    fn user_word_row_needs_an_owner_id() {
        let owned = serde_json::json!({
            "id": "12",
            "name": "강아지",
            "name_en": "puppy",
            "category": "animals",
            "min_age": 3,
            "max_age": 7,
            "owner_type": "user",
            "owner_id": "6f1c2d9e-8b1a-4c5e-9f00-1234567890ab"
        });
        let word = serde_json::from_value::<WordRow>(owned.clone())
            .unwrap()
            .into_word()
            .unwrap();
        assert_eq!(word.id(), WordId::new(12));
        assert!(matches!(word.owner(), ContentOwner::User(_)));

        let mut orphan = owned;
        orphan["owner_id"] = serde_json::Value::Null;
        let row: WordRow = serde_json::from_value(orphan).unwrap();
        assert!(matches!(
            row.into_word(),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn new_word_row_is_owned_by_the_author() {
        let me: UserId = "6f1c2d9e-8b1a-4c5e-9f00-1234567890ab".parse().unwrap();
        let draft = WordDraft {
            text: " 고양이 ".into(),
            meaning: "cat".into(),
            category: "animals".into(),
            image: Some("  ".into()),
            text_audio: None,
            meaning_audio: Some("en/cat.mp3".into()),
            ages: AgeRange::new(3, 6).unwrap(),
        };
        let json = serde_json::to_value(NewWordRow::new(me, &draft)).unwrap();
        assert_eq!(json["name"], "고양이");
        assert_eq!(json["owner_type"], "user");
        assert_eq!(json["owner_id"], "6f1c2d9e-8b1a-4c5e-9f00-1234567890ab");
        assert_eq!(json["image_url"], serde_json::Value::Null);
        assert_eq!(json["audio_en"], "en/cat.mp3");
        assert_eq!(json["max_age"], 6);
    }

    #[test]
    fn book_row_embeds_pages_in_reading_order() {
        let row: BookRow = serde_json::from_value(serde_json::json!({
            "id": 2,
            "title": "Little Fox",
            "cover_image": "covers/fox.png",
            "min_age": 3,
            "max_age": 6,
            "owner_type": "global",
            "owner_id": null,
            "created_at": "2024-01-01T00:00:00Z",
            "book_pages": [
                { "id": 21, "book_id": 2, "page_number": 2, "image_url": "p2.png", "audio": "p2.mp3" },
                { "id": 20, "book_id": 2, "page_number": 1, "image_url": "p1.png", "audio": "p1.mp3", "text": "Once" }
            ]
        }))
        .unwrap();
        let book = row.into_book().unwrap();
        assert_eq!(book.cover(), Some("covers/fox.png"));
        let images: Vec<_> = book.pages().iter().map(BookPage::image).collect();
        assert_eq!(images, vec!["p1.png", "p2.png"]);
        assert_eq!(book.pages()[0].text(), Some("Once"));
        assert_eq!(book.pages()[1].audio(), Some("p2.mp3"));
    }

    #[test]
    fn book_row_without_pages_is_empty() {
        let row: BookRow = serde_json::from_value(serde_json::json!({
            "id": 3,
            "title": "Colors",
            "min_age": 3,
            "max_age": 6,
            "owner_type": "global",
            "book_pages": null
        }))
        .unwrap();
        assert!(row.into_book().unwrap().pages().is_empty());
    }

    #[test]
    fn badge_row_decodes_category_with_serde() {
        let row: BadgeRow = serde_json::from_value(serde_json::json!({
            "id": 11,
            "name": "Speller",
            "icon": "🐝",
            "required_score": 15,
            "category": "puzzle",
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        let badge = row.into_badge().unwrap();
        assert_eq!(badge.category(), BadgeCategory::Puzzle);
        assert!(!badge.is_unlocked());

        let unknown = serde_json::from_value::<BadgeRow>(serde_json::json!({
            "id": 12,
            "name": "Reader",
            "required_score": 3,
            "category": "reading"
        }));
        assert!(unknown.is_err());
    }

    #[test]
    fn non_numeric_ids_are_rejected() {
        let row = serde_json::from_value::<BadgeRow>(serde_json::json!({
            "id": "first-answer",
            "name": "First Answer",
            "required_score": 1,
            "category": "quiz"
        }));
        assert!(row.is_err());
    }

    #[test]
    fn user_badge_rows_carry_user_only_outbound() {
        let me = UserId::random();
        let json =
            serde_json::to_value(UserBadgeRow::new(me, BadgeId::new(5), learn_core::time::fixed_now()))
                .unwrap();
        assert_eq!(json["user_id"], me.to_string());
        assert_eq!(json["badge_id"], 5);

        let row: UserBadgeRow = serde_json::from_value(serde_json::json!({
            "badge_id": "5",
            "unlocked_at": "2024-01-01T00:00:00Z",
            "badges": { "id": 5, "name": "Quiz Starter" }
        }))
        .unwrap();
        assert_eq!(row.into_unlocked().badge_id, BadgeId::new(5));
    }

    #[test]
    fn progress_patch_body_skips_absent_fields() {
        let body = ProgressPatchBody::new(
            &ProgressPatch {
                quiz_score: Some(3),
                ..ProgressPatch::default()
            },
            learn_core::time::fixed_now(),
        );
        let json = serde_json::to_value(&body).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["quiz_score"], 3);
    }
}

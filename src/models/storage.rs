use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, IndexModel};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::RwLock;
use thiserror::Error;

use crate::models::book::{Book, BookPatch, NewBook};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{field} must be unique")]
    Duplicate { field: String },
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] mongodb::bson::ser::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_i32(self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

/// Per-request listing descriptor. `limit == 0` means unlimited.
#[derive(Debug, Clone)]
pub struct BookQuery {
    pub genre: Option<String>,
    pub sort_by: String,
    pub order: SortOrder,
    pub limit: i64,
}

impl Default for BookQuery {
    fn default() -> Self {
        Self {
            genre: None,
            sort_by: "createdAt".to_string(),
            order: SortOrder::Descending,
            limit: 0,
        }
    }
}

#[async_trait]
pub trait BookStore {
    async fn create_book(&self, draft: NewBook) -> Result<Book, StoreError>;
    async fn list_books(&self, query: &BookQuery) -> Result<Vec<Book>, StoreError>;
    async fn book_exists(&self, book_id: &str) -> Result<bool, StoreError>;
    async fn get_book(&self, book_id: &str) -> Result<Option<Book>, StoreError>;
    async fn update_book(&self, book_id: &str, patch: BookPatch)
        -> Result<Option<Book>, StoreError>;
    async fn delete_book(&self, book_id: &str) -> Result<(), StoreError>;
    async fn test_connection(&self) -> Result<(), StoreError>;
}

pub struct MongoBackend {
    database: mongodb::Database,
    books: Collection<Book>,
}

impl MongoBackend {
    pub async fn new(mongo_url: &str, db_name: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(mongo_url).await?;
        let database = client.database(db_name);
        let books = database.collection::<Book>("books");

        let isbn_index = IndexModel::builder()
            .keys(doc! { "isbn": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        books.create_index(isbn_index, None).await?;

        Ok(Self { database, books })
    }
}

#[async_trait]
impl BookStore for MongoBackend {
    async fn create_book(&self, draft: NewBook) -> Result<Book, StoreError> {
        let book = draft.into_book();
        match self.books.insert_one(&book, None).await {
            Ok(_) => Ok(book),
            Err(err) => Err(classify_mongo_error(err)),
        }
    }

    async fn list_books(&self, query: &BookQuery) -> Result<Vec<Book>, StoreError> {
        let mut filter = Document::new();
        if let Some(genre) = &query.genre {
            filter.insert("genre", genre.as_str());
        }

        let mut sort = Document::new();
        sort.insert(query.sort_by.as_str(), query.order.as_i32());

        let options = FindOptions::builder()
            .sort(sort)
            .limit((query.limit > 0).then_some(query.limit))
            .build();

        let cursor = self.books.find(filter, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn book_exists(&self, book_id: &str) -> Result<bool, StoreError> {
        let count = self
            .books
            .count_documents(doc! { "_id": book_id }, None)
            .await?;
        Ok(count > 0)
    }

    async fn get_book(&self, book_id: &str) -> Result<Option<Book>, StoreError> {
        Ok(self.books.find_one(doc! { "_id": book_id }, None).await?)
    }

    async fn update_book(
        &self,
        book_id: &str,
        patch: BookPatch,
    ) -> Result<Option<Book>, StoreError> {
        if patch.is_empty() {
            return self.get_book(book_id).await;
        }

        let changes = mongodb::bson::to_document(&patch)?;
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        match self
            .books
            .find_one_and_update(doc! { "_id": book_id }, doc! { "$set": changes }, options)
            .await
        {
            Ok(book) => Ok(book),
            Err(err) => Err(classify_mongo_error(err)),
        }
    }

    async fn delete_book(&self, book_id: &str) -> Result<(), StoreError> {
        self.books.delete_one(doc! { "_id": book_id }, None).await?;
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), StoreError> {
        self.database.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }
}

/// Tags unique-index conflicts at the store boundary so callers never inspect
/// raw driver errors.
fn classify_mongo_error(err: mongodb::error::Error) -> StoreError {
    match duplicate_key_field(&err) {
        Some(field) => StoreError::Duplicate { field },
        None => StoreError::Mongo(err),
    }
}

fn duplicate_key_field(err: &mongodb::error::Error) -> Option<String> {
    use mongodb::error::{ErrorKind, WriteFailure};

    let message = match &*err.kind {
        ErrorKind::Write(WriteFailure::WriteError(write_err)) if write_err.code == 11000 => {
            &write_err.message
        }
        ErrorKind::Command(command_err) if command_err.code == 11000 => &command_err.message,
        _ => return None,
    };

    parse_index_field(message)
}

/// The server reports the offending index as e.g. "index: isbn_1 dup key".
fn parse_index_field(message: &str) -> Option<String> {
    let index_re = Regex::new(r"index: (\w+?)_\d+").unwrap();
    index_re
        .captures(message)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

/// In-process store with the same semantics as the Mongo backend. Used by the
/// test suite and local runs without a database.
#[derive(Default)]
pub struct MemoryBackend {
    books: RwLock<Vec<Book>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookStore for MemoryBackend {
    async fn create_book(&self, draft: NewBook) -> Result<Book, StoreError> {
        let mut books = self.books.write().unwrap();
        if books.iter().any(|b| b.isbn == draft.isbn) {
            return Err(StoreError::Duplicate {
                field: "isbn".to_string(),
            });
        }
        let book = draft.into_book();
        books.push(book.clone());
        Ok(book)
    }

    async fn list_books(&self, query: &BookQuery) -> Result<Vec<Book>, StoreError> {
        let books = self.books.read().unwrap();
        let mut matches: Vec<Book> = books
            .iter()
            .filter(|b| query.genre.as_ref().map_or(true, |g| &b.genre == g))
            .cloned()
            .collect();

        matches.sort_by(|a, b| {
            let ordering = compare_keys(&sort_key(a, &query.sort_by), &sort_key(b, &query.sort_by));
            match query.order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });

        if query.limit > 0 && matches.len() > query.limit as usize {
            matches.truncate(query.limit as usize);
        }

        Ok(matches)
    }

    async fn book_exists(&self, book_id: &str) -> Result<bool, StoreError> {
        Ok(self.books.read().unwrap().iter().any(|b| b.id == book_id))
    }

    async fn get_book(&self, book_id: &str) -> Result<Option<Book>, StoreError> {
        Ok(self
            .books
            .read()
            .unwrap()
            .iter()
            .find(|b| b.id == book_id)
            .cloned())
    }

    async fn update_book(
        &self,
        book_id: &str,
        patch: BookPatch,
    ) -> Result<Option<Book>, StoreError> {
        let mut books = self.books.write().unwrap();

        if let Some(new_isbn) = &patch.isbn {
            if books.iter().any(|b| b.id != book_id && &b.isbn == new_isbn) {
                return Err(StoreError::Duplicate {
                    field: "isbn".to_string(),
                });
            }
        }

        match books.iter_mut().find(|b| b.id == book_id) {
            Some(book) => {
                patch.apply(book);
                Ok(Some(book.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_book(&self, book_id: &str) -> Result<(), StoreError> {
        self.books.write().unwrap().retain(|b| b.id != book_id);
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn sort_key(book: &Book, field: &str) -> Value {
    serde_json::to_value(book)
        .ok()
        .and_then(|v| v.get(field).cloned())
        .unwrap_or(Value::Null)
}

fn compare_keys(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str, genre: &str, isbn: &str, copies: i64) -> NewBook {
        NewBook {
            title: title.to_string(),
            author: "Jane Austen".to_string(),
            genre: genre.to_string(),
            isbn: isbn.to_string(),
            description: None,
            copies,
            available: true,
        }
    }

    #[tokio::test]
    async fn created_book_is_retrievable_by_id() {
        let store = MemoryBackend::new();
        let created = store
            .create_book(draft("Emma", "FICTION", "isbn-1", 3))
            .await
            .unwrap();

        let fetched = store.get_book(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.title, "Emma");
        assert!(store.book_exists(&created.id).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_isbn_is_rejected() {
        let store = MemoryBackend::new();
        store
            .create_book(draft("Emma", "FICTION", "isbn-1", 3))
            .await
            .unwrap();

        let err = store
            .create_book(draft("Persuasion", "FICTION", "isbn-1", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field } if field == "isbn"));
    }

    #[tokio::test]
    async fn list_filters_by_genre() {
        let store = MemoryBackend::new();
        store
            .create_book(draft("Emma", "FICTION", "isbn-1", 3))
            .await
            .unwrap();
        store
            .create_book(draft("Cosmos", "SCIENCE", "isbn-2", 2))
            .await
            .unwrap();

        let query = BookQuery {
            genre: Some("SCIENCE".to_string()),
            ..BookQuery::default()
        };
        let books = store.list_books(&query).await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Cosmos");

        let all = store.list_books(&BookQuery::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn list_sorts_by_requested_field_and_direction() {
        let store = MemoryBackend::new();
        for (title, isbn, copies) in [("Beowulf", "a", 5), ("Carmilla", "b", 1), ("Atlas", "c", 3)]
        {
            store
                .create_book(draft(title, "FICTION", isbn, copies))
                .await
                .unwrap();
        }

        let ascending = BookQuery {
            sort_by: "title".to_string(),
            order: SortOrder::Ascending,
            ..BookQuery::default()
        };
        let books = store.list_books(&ascending).await.unwrap();
        let titles: Vec<&str> = books.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, ["Atlas", "Beowulf", "Carmilla"]);

        let descending = BookQuery {
            sort_by: "copies".to_string(),
            order: SortOrder::Descending,
            ..BookQuery::default()
        };
        let books = store.list_books(&descending).await.unwrap();
        let copies: Vec<i64> = books.iter().map(|b| b.copies).collect();
        assert_eq!(copies, [5, 3, 1]);
    }

    #[tokio::test]
    async fn list_caps_results_when_limit_is_positive() {
        let store = MemoryBackend::new();
        for i in 0..5 {
            store
                .create_book(draft(&format!("Book {}", i), "FICTION", &format!("i-{}", i), i))
                .await
                .unwrap();
        }

        let capped = BookQuery {
            limit: 2,
            ..BookQuery::default()
        };
        assert_eq!(store.list_books(&capped).await.unwrap().len(), 2);

        let unlimited = BookQuery {
            limit: 0,
            ..BookQuery::default()
        };
        assert_eq!(store.list_books(&unlimited).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn update_applies_only_provided_fields() {
        let store = MemoryBackend::new();
        let created = store
            .create_book(draft("Emma", "FICTION", "isbn-1", 3))
            .await
            .unwrap();

        let patch = BookPatch {
            copies: Some(7),
            available: Some(false),
            ..BookPatch::default()
        };
        let updated = store
            .update_book(&created.id, patch)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.title, "Emma");
        assert_eq!(updated.copies, 7);
        assert!(!updated.available);
    }

    #[tokio::test]
    async fn update_missing_book_returns_none() {
        let store = MemoryBackend::new();
        let patch = BookPatch {
            copies: Some(1),
            ..BookPatch::default()
        };
        assert!(store.update_book("missing", patch).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_to_taken_isbn_is_rejected() {
        let store = MemoryBackend::new();
        store
            .create_book(draft("Emma", "FICTION", "isbn-1", 3))
            .await
            .unwrap();
        let other = store
            .create_book(draft("Persuasion", "FICTION", "isbn-2", 1))
            .await
            .unwrap();

        let patch = BookPatch {
            isbn: Some("isbn-1".to_string()),
            ..BookPatch::default()
        };
        let err = store.update_book(&other.id, patch).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field } if field == "isbn"));
    }

    #[tokio::test]
    async fn deleted_book_is_gone() {
        let store = MemoryBackend::new();
        let created = store
            .create_book(draft("Emma", "FICTION", "isbn-1", 3))
            .await
            .unwrap();

        store.delete_book(&created.id).await.unwrap();
        assert!(!store.book_exists(&created.id).await.unwrap());
        assert!(store.get_book(&created.id).await.unwrap().is_none());
    }

    #[test]
    fn duplicate_key_message_yields_field_name() {
        let message =
            "E11000 duplicate key error collection: library_db.books index: isbn_1 dup key: { isbn: \"x\" }";
        assert_eq!(parse_index_field(message).as_deref(), Some("isbn"));
        assert_eq!(parse_index_field("no such marker"), None);
    }
}

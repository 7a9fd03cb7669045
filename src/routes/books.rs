use crate::error::ApiError;
use crate::models::book::Book;
use crate::models::responses::ApiResponse;
use crate::models::storage::{BookQuery, BookStore, SortOrder};
use crate::services::validation;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

type Store = Arc<dyn BookStore + Send + Sync>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub filter: Option<String>,
    pub sort_by: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<i64>,
}

impl ListParams {
    fn into_query(self) -> BookQuery {
        BookQuery {
            genre: self.filter,
            sort_by: self.sort_by.unwrap_or_else(|| "createdAt".to_string()),
            order: if self.sort.as_deref() == Some("asc") {
                SortOrder::Ascending
            } else {
                SortOrder::Descending
            },
            limit: self.limit.unwrap_or(0).max(0),
        }
    }
}

pub async fn create_book(
    State(store): State<Store>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<ApiResponse<Book>>), ApiError> {
    let draft = validation::new_book(&payload)?;

    let created = store
        .create_book(draft)
        .await
        .map_err(|e| ApiError::from_store(e, "Failed to create book"))?;

    info!("Created book {}", created.id);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Book created successfully", created)),
    ))
}

pub async fn get_all_books(
    State(store): State<Store>,
    Query(params): Query<ListParams>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<Book>>>), ApiError> {
    info!("Listing books: {:?}", params);
    let query = params.into_query();

    let books = store
        .list_books(&query)
        .await
        .map_err(|e| ApiError::from_store(e, "Failed to retrieve all books"))?;

    if books.is_empty() {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::missing("No books found")),
        ));
    }

    Ok((
        StatusCode::OK,
        Json(ApiResponse::ok("Books retrieved successfully", books)),
    ))
}

pub async fn get_book_by_id(
    State(store): State<Store>,
    Path(book_id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<Book>>), ApiError> {
    let exists = store
        .book_exists(&book_id)
        .await
        .map_err(|e| ApiError::from_store(e, "Failed to retrieve book"))?;
    if !exists {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::missing("No book found with this ID")),
        ));
    }

    let book = store
        .get_book(&book_id)
        .await
        .map_err(|e| ApiError::from_store(e, "Failed to retrieve book"))?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            message: "Book retrieved successfully".to_string(),
            data: book,
        }),
    ))
}

pub async fn update_book(
    State(store): State<Store>,
    Path(book_id): Path<String>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<ApiResponse<Book>>), ApiError> {
    let exists = store
        .book_exists(&book_id)
        .await
        .map_err(|e| ApiError::from_store(e, "Failed to update book"))?;
    if !exists {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::missing("Book not found")),
        ));
    }

    let patch = validation::book_patch(&payload)?;

    let updated = store
        .update_book(&book_id, patch)
        .await
        .map_err(|e| ApiError::from_store(e, "Failed to update book"))?;

    match updated {
        Some(book) => {
            info!("Updated book {}", book.id);
            Ok((
                StatusCode::OK,
                Json(ApiResponse::ok("Book updated successfully", book)),
            ))
        }
        // The record vanished between the existence check and the update.
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::missing("Book not found")),
        )),
    }
}

pub async fn delete_book(
    State(store): State<Store>,
    Path(book_id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<Book>>), ApiError> {
    let exists = store
        .book_exists(&book_id)
        .await
        .map_err(|e| ApiError::from_store(e, "Failed to delete book"))?;
    if !exists {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::missing("Book not found with this ID")),
        ));
    }

    store
        .delete_book(&book_id)
        .await
        .map_err(|e| ApiError::from_store(e, "Failed to delete book"))?;

    info!("Deleted book {}", book_id);

    Ok((
        StatusCode::OK,
        Json(ApiResponse::ok_empty("Book deleted successfully")),
    ))
}

use serde_json::{Map, Value};

use crate::error::{FieldError, ValidationFailure};
use crate::models::book::{BookPatch, NewBook, GENRES};

/// Validates a creation payload against the book schema. All failures for a
/// payload are collected into one field-keyed result.
pub fn new_book(payload: &Value) -> Result<NewBook, ValidationFailure> {
    let mut errors = ValidationFailure::default();
    let empty = Map::new();
    let map = payload.as_object().unwrap_or(&empty);

    let title = required_string(map, "title", "Title", &mut errors);
    let author = required_string(map, "author", "Author", &mut errors);
    let genre = required_string(map, "genre", "Genre", &mut errors);
    if let Some(value) = &genre {
        check_genre(value, &mut errors);
    }
    let isbn = required_string(map, "isbn", "ISBN", &mut errors);
    let description = optional_string(map, "description", "Description", &mut errors);
    let copies = copies_field(map, true, &mut errors);
    let available = optional_bool(map, "available", "Available", &mut errors);

    match (title, author, genre, isbn, copies) {
        (Some(title), Some(author), Some(genre), Some(isbn), Some(copies))
            if errors.is_empty() =>
        {
            Ok(NewBook {
                title,
                author,
                genre,
                isbn,
                description,
                copies,
                available: available.unwrap_or(true),
            })
        }
        _ => Err(errors),
    }
}

/// Validates a partial update payload. Only fields present in the payload are
/// checked, with the same rules as creation.
pub fn book_patch(payload: &Value) -> Result<BookPatch, ValidationFailure> {
    let mut errors = ValidationFailure::default();
    let empty = Map::new();
    let map = payload.as_object().unwrap_or(&empty);

    let patch = BookPatch {
        title: provided_string(map, "title", "Title", &mut errors),
        author: provided_string(map, "author", "Author", &mut errors),
        genre: provided_string(map, "genre", "Genre", &mut errors),
        isbn: provided_string(map, "isbn", "ISBN", &mut errors),
        description: optional_string(map, "description", "Description", &mut errors),
        copies: copies_field(map, false, &mut errors),
        available: optional_bool(map, "available", "Available", &mut errors),
    };

    if let Some(value) = &patch.genre {
        check_genre(value, &mut errors);
    }

    if errors.is_empty() {
        Ok(patch)
    } else {
        Err(errors)
    }
}

fn check_genre(value: &str, errors: &mut ValidationFailure) {
    if !GENRES.contains(&value) {
        errors.add(
            "genre",
            FieldError::new(
                "enum",
                format!("Genre must be one of {}", GENRES.join(", ")),
            ),
        );
    }
}

fn required_string(
    map: &Map<String, Value>,
    field: &str,
    label: &str,
    errors: &mut ValidationFailure,
) -> Option<String> {
    match map.get(field) {
        None | Some(Value::Null) => {
            errors.add(field, FieldError::new("required", format!("{} is required", label)));
            None
        }
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::String(_)) => {
            errors.add(field, FieldError::new("required", format!("{} is required", label)));
            None
        }
        Some(_) => {
            errors.add(
                field,
                FieldError::new("string", format!("{} must be a string", label)),
            );
            None
        }
    }
}

// Same rules as required_string, except an absent field is not an error.
fn provided_string(
    map: &Map<String, Value>,
    field: &str,
    label: &str,
    errors: &mut ValidationFailure,
) -> Option<String> {
    if map.get(field).is_none() {
        return None;
    }
    required_string(map, field, label, errors)
}

fn optional_string(
    map: &Map<String, Value>,
    field: &str,
    label: &str,
    errors: &mut ValidationFailure,
) -> Option<String> {
    match map.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.add(
                field,
                FieldError::new("string", format!("{} must be a string", label)),
            );
            None
        }
    }
}

fn copies_field(
    map: &Map<String, Value>,
    required: bool,
    errors: &mut ValidationFailure,
) -> Option<i64> {
    match map.get("copies") {
        None | Some(Value::Null) => {
            if required {
                errors.add(
                    "copies",
                    FieldError::new("required", "Copies count is required"),
                );
            }
            None
        }
        Some(Value::Number(n)) => match n.as_i64() {
            Some(v) if v >= 0 => Some(v),
            Some(_) => {
                errors.add(
                    "copies",
                    FieldError::new("min", "Copies must be a non-negative number"),
                );
                None
            }
            None => {
                errors.add("copies", FieldError::new("number", "Copies must be an integer"));
                None
            }
        },
        Some(_) => {
            errors.add("copies", FieldError::new("number", "Copies must be an integer"));
            None
        }
    }
}

fn optional_bool(
    map: &Map<String, Value>,
    field: &str,
    label: &str,
    errors: &mut ValidationFailure,
) -> Option<bool> {
    match map.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(_) => {
            errors.add(
                field,
                FieldError::new("boolean", format!("{} must be a boolean", label)),
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_payload() -> Value {
        json!({
            "title": "Pride and Prejudice",
            "author": "Jane Austen",
            "genre": "FICTION",
            "isbn": "978-0141439518",
            "copies": 3
        })
    }

    #[test]
    fn valid_payload_passes_with_defaults() {
        let draft = new_book(&valid_payload()).unwrap();
        assert_eq!(draft.title, "Pride and Prejudice");
        assert_eq!(draft.copies, 3);
        assert!(draft.available);
        assert!(draft.description.is_none());
    }

    #[test]
    fn missing_required_fields_are_all_reported() {
        let failure = new_book(&json!({})).unwrap_err();
        for field in ["title", "author", "genre", "isbn", "copies"] {
            assert_eq!(failure.errors[field].kind, "required", "field {}", field);
        }
    }

    #[test]
    fn blank_title_counts_as_missing() {
        let mut payload = valid_payload();
        payload["title"] = json!("   ");
        let failure = new_book(&payload).unwrap_err();
        assert_eq!(failure.errors["title"].message, "Title is required");
    }

    #[test]
    fn mistyped_fields_report_cast_errors() {
        let mut payload = valid_payload();
        payload["title"] = json!(5);
        payload["available"] = json!("yes");
        let failure = new_book(&payload).unwrap_err();
        assert_eq!(failure.errors["title"].kind, "string");
        assert_eq!(failure.errors["available"].kind, "boolean");
    }

    #[test]
    fn unknown_genre_is_rejected() {
        let mut payload = valid_payload();
        payload["genre"] = json!("ROMANCE");
        let failure = new_book(&payload).unwrap_err();
        assert_eq!(failure.errors["genre"].kind, "enum");
    }

    #[test]
    fn negative_and_fractional_copies_are_rejected() {
        let mut payload = valid_payload();
        payload["copies"] = json!(-1);
        let failure = new_book(&payload).unwrap_err();
        assert_eq!(failure.errors["copies"].kind, "min");

        payload["copies"] = json!(2.5);
        let failure = new_book(&payload).unwrap_err();
        assert_eq!(failure.errors["copies"].kind, "number");
    }

    #[test]
    fn serialized_failure_has_no_path_or_value_keys() {
        let failure = new_book(&json!({ "copies": -1 })).unwrap_err();
        let value = serde_json::to_value(&failure).unwrap();
        for (_, sub_error) in value["errors"].as_object().unwrap() {
            let sub_error = sub_error.as_object().unwrap();
            assert!(!sub_error.contains_key("path"));
            assert!(!sub_error.contains_key("value"));
            let properties = sub_error["properties"].as_object().unwrap();
            assert!(!properties.contains_key("path"));
            assert!(!properties.contains_key("value"));
        }
    }

    #[test]
    fn empty_patch_is_accepted() {
        let patch = book_patch(&json!({})).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn patch_keeps_only_provided_fields() {
        let patch = book_patch(&json!({ "copies": 7, "available": false })).unwrap();
        assert_eq!(patch.copies, Some(7));
        assert_eq!(patch.available, Some(false));
        assert!(patch.title.is_none());
        assert!(patch.isbn.is_none());
    }

    #[test]
    fn patch_validates_provided_fields() {
        let failure = book_patch(&json!({ "genre": "ROMANCE", "copies": -2 })).unwrap_err();
        assert_eq!(failure.errors["genre"].kind, "enum");
        assert_eq!(failure.errors["copies"].kind, "min");
    }

    #[test]
    fn patch_rejects_nulled_required_fields() {
        let failure = book_patch(&json!({ "title": null })).unwrap_err();
        assert_eq!(failure.errors["title"].kind, "required");
    }
}

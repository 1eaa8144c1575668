use uuid::Uuid;

use crate::db::{now_timestamp, DbPool};
use crate::error::{conflict_on_constraint, AppError, AppResult};
use crate::models::{normalize_email, User};

const USER_COLS: &str = "id, email, name, password_hash, created_at, updated_at";

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn optional(result: rusqlite::Result<User>) -> AppResult<Option<User>> {
    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(AppError::Database(e)),
    }
}

/// Insert a new user. The email is normalized; a duplicate yields `Conflict`.
pub fn create_user(pool: &DbPool, name: &str, email: &str, password_hash: &str) -> AppResult<User> {
    let user = User {
        id: Uuid::new_v4().to_string(),
        email: normalize_email(email),
        name: name.trim().to_string(),
        password_hash: password_hash.to_string(),
        created_at: now_timestamp(),
        updated_at: now_timestamp(),
    };

    let conn = pool.get()?;
    conn.execute(
        &format!("INSERT INTO users ({USER_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
        rusqlite::params![
            user.id,
            user.email,
            user.name,
            user.password_hash,
            user.created_at,
            user.updated_at
        ],
    )
    .map_err(|e| conflict_on_constraint(e, "User already exists with this email"))?;

    Ok(user)
}

pub fn find_by_email(pool: &DbPool, email: &str) -> AppResult<Option<User>> {
    let conn = pool.get()?;
    optional(conn.query_row(
        &format!("SELECT {USER_COLS} FROM users WHERE email = ?1"),
        rusqlite::params![normalize_email(email)],
        row_to_user,
    ))
}

pub fn find_by_id(pool: &DbPool, id: &str) -> AppResult<Option<User>> {
    let conn = pool.get()?;
    optional(conn.query_row(
        &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
        rusqlite::params![id],
        row_to_user,
    ))
}

#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Apply a name/email change. Omitted fields are untouched; a field that is
/// present but blank is a validation error.
pub fn update_profile(pool: &DbPool, existing: User, update: ProfileUpdate) -> AppResult<User> {
    let name = update.name.map(|n| n.trim().to_string());
    let email = update.email.map(|e| normalize_email(&e));

    let mut errors = Vec::new();
    if name.as_deref().is_some_and(str::is_empty) {
        errors.push("Name is required".to_string());
    }
    if email.as_deref().is_some_and(str::is_empty) {
        errors.push("Email is required".to_string());
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let name = name.unwrap_or(existing.name);
    let email = email.unwrap_or(existing.email);
    let now = now_timestamp();

    let conn = pool.get()?;
    let affected = conn
        .execute(
            "UPDATE users SET name = ?1, email = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![name, email, now, existing.id],
        )
        .map_err(|e| conflict_on_constraint(e, "Email already exists"))?;

    if affected == 0 {
        return Err(AppError::NotFound("User not found".into()));
    }

    Ok(User {
        name,
        email,
        updated_at: now,
        ..existing
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    #[test]
    fn create_and_find_user_by_normalized_email() {
        let pool = create_memory_pool();
        let created = create_user(&pool, " Jane ", "Jane@Example.com", "hash").unwrap();
        assert_eq!(created.name, "Jane");
        assert_eq!(created.email, "jane@example.com");

        let found = find_by_email(&pool, "  JANE@example.COM").unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(find_by_id(&pool, &created.id).unwrap().unwrap().email, created.email);
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let pool = create_memory_pool();
        create_user(&pool, "Jane", "jane@example.com", "hash").unwrap();
        let err = create_user(&pool, "Other", "JANE@example.com", "hash").unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn missing_user_is_none() {
        let pool = create_memory_pool();
        assert!(find_by_id(&pool, "nope").unwrap().is_none());
        assert!(find_by_email(&pool, "nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn profile_update_changes_only_given_fields() {
        let pool = create_memory_pool();
        let user = create_user(&pool, "Jane", "jane@example.com", "hash").unwrap();

        let updated = update_profile(
            &pool,
            user.clone(),
            ProfileUpdate {
                name: Some("Janet".into()),
                email: None,
            },
        )
        .unwrap();
        assert_eq!(updated.name, "Janet");
        assert_eq!(updated.email, "jane@example.com");
        assert_eq!(updated.password_hash, "hash");
    }

    #[test]
    fn blank_profile_fields_are_rejected() {
        let pool = create_memory_pool();
        let user = create_user(&pool, "Jane", "jane@example.com", "hash").unwrap();

        let err = update_profile(
            &pool,
            user.clone(),
            ProfileUpdate {
                name: Some("   ".into()),
                email: Some(" ".into()),
            },
        )
        .unwrap_err();
        match err {
            AppError::Validation(errors) => {
                assert_eq!(errors, vec!["Name is required", "Email is required"])
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        let stored = find_by_id(&pool, &user.id).unwrap().unwrap();
        assert_eq!(stored.name, "Jane");
    }

    #[test]
    fn profile_update_to_taken_email_is_a_conflict() {
        let pool = create_memory_pool();
        create_user(&pool, "Jane", "jane@example.com", "hash").unwrap();
        let bob = create_user(&pool, "Bob", "bob@example.com", "hash").unwrap();

        let err = update_profile(
            &pool,
            bob,
            ProfileUpdate {
                name: None,
                email: Some("Jane@Example.com".into()),
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}

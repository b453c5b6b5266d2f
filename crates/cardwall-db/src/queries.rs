use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};

use cardwall_types::models::AssetKind;

use crate::error::is_unique_violation;
use crate::models::UserRow;
use crate::{Database, DbError, Result, now_timestamp};

const USER_COLUMNS: &str =
    "id, login, email, password, profile_image, profile_banner, description, created_at, updated_at";

impl Database {
    // -- Users --

    /// Insert a new user. Fails with `Conflict` when the login or email is taken.
    pub fn create_user(
        &self,
        id: &str,
        login: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<UserRow> {
        let now = now_timestamp();
        let row = UserRow {
            id: id.to_string(),
            login: login.to_string(),
            email: email.to_string(),
            password: password_hash.to_string(),
            profile_image: String::new(),
            profile_banner: String::new(),
            description: String::new(),
            created_at: now.clone(),
            updated_at: now,
        };

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, login, email, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    row.id,
                    row.login,
                    row.email,
                    row.password,
                    row.created_at,
                    row.updated_at
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DbError::Conflict("login or email".into())
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })?;

        Ok(row)
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Look a user up by login or by email. Empty arguments never match.
    pub fn get_user_by_login_or_email(&self, login: &str, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE (?1 <> '' AND login = ?1) OR (?2 <> '' AND email = ?2)
                 LIMIT 1"
            );
            let row = conn
                .query_row(&sql, [login, email], map_user)
                .optional()?;
            Ok(row)
        })
    }

    pub fn update_user_description(&self, id: &str, description: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET description = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![description, now_timestamp(), id],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound);
            }
            Ok(())
        })
    }

    /// Point a user's avatar or banner at `asset_ref`. Returns the reference it replaced.
    pub fn swap_user_image(&self, id: &str, kind: AssetKind, asset_ref: &str) -> Result<String> {
        let column = match kind {
            AssetKind::Profile => "profile_image",
            AssetKind::Banner => "profile_banner",
            AssetKind::Card => {
                return Err(DbError::Validation("card images belong to cards".into()));
            }
        };

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let previous: String = tx
                .query_row(
                    &format!("SELECT {column} FROM users WHERE id = ?1"),
                    [id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(DbError::NotFound)?;

            tx.execute(
                &format!("UPDATE users SET {column} = ?1, updated_at = ?2 WHERE id = ?3"),
                rusqlite::params![asset_ref, now_timestamp(), id],
            )?;
            tx.commit()?;
            Ok(previous)
        })
    }
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    let row = conn.query_row(&sql, [id], map_user).optional()?;
    Ok(row)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        login: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        profile_image: row.get(4)?,
        profile_banner: row.get(5)?,
        description: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

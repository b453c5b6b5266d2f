use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        // Schema and version row land together or not at all.
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                login           TEXT NOT NULL UNIQUE,
                email           TEXT NOT NULL UNIQUE,
                password        TEXT NOT NULL,
                profile_image   TEXT NOT NULL DEFAULT '',
                profile_banner  TEXT NOT NULL DEFAULT '',
                description     TEXT NOT NULL DEFAULT '',
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE cards (
                id           TEXT PRIMARY KEY,
                user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                user_name    TEXT NOT NULL,
                image        TEXT NOT NULL DEFAULT '',
                title        TEXT NOT NULL CHECK (title <> ''),
                description  TEXT NOT NULL DEFAULT '',
                text         TEXT NOT NULL DEFAULT '',
                likes        INTEGER NOT NULL DEFAULT 0 CHECK (likes >= 0),
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            );

            CREATE INDEX idx_cards_created ON cards(created_at DESC, id DESC);
            CREATE INDEX idx_cards_user ON cards(user_id, created_at DESC);

            CREATE TABLE likes (
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                card_id     TEXT NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (user_id, card_id)
            );

            CREATE INDEX idx_likes_card ON likes(card_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
        tx.commit()?;
    }

    info!("Database migrations complete");
    Ok(())
}

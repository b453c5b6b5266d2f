use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;
use uuid::Uuid;

use cardwall_types::models::CardFilter;

use crate::models::{CardDetail, CardPage, CardRow, ListedCard};
use crate::{Database, DbError, Result, now_timestamp};

pub const DEFAULT_PAGE_LIMIT: u32 = 4;
pub const MAX_PAGE_LIMIT: u32 = 100;

const CARD_COLUMNS: &str =
    "c.id, c.user_id, c.user_name, c.image, c.title, c.description, c.text, c.likes, c.created_at, c.updated_at";

/// Normalize raw paging input. Non-positive values fall back to the defaults.
pub fn clamp_paging(page: i64, limit: i64) -> (u32, u32) {
    let page = if page < 1 {
        1
    } else {
        page.min(u32::MAX as i64) as u32
    };
    let limit = if limit < 1 {
        DEFAULT_PAGE_LIMIT
    } else {
        limit.min(MAX_PAGE_LIMIT as i64) as u32
    };
    (page, limit)
}

/// Resolve the page to serve: `(page, total_pages)`. A page past the end serves the last page.
pub fn page_window(total_count: u64, page: u32, limit: u32) -> (u32, u32) {
    let total_pages = total_count.div_ceil(limit as u64) as u32;
    if total_pages > 0 && page > total_pages {
        (total_pages, total_pages)
    } else {
        (page, total_pages)
    }
}

impl Database {
    // -- Cards --

    pub fn create_card(
        &self,
        owner_id: &str,
        owner_name: &str,
        title: &str,
        description: &str,
        text: &str,
        image: &str,
    ) -> Result<CardRow> {
        if title.trim().is_empty() {
            return Err(DbError::Validation("title is required".into()));
        }

        let now = now_timestamp();
        let card = CardRow {
            id: Uuid::new_v4().to_string(),
            user_id: owner_id.to_string(),
            user_name: owner_name.to_string(),
            image: image.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            text: text.to_string(),
            likes: 0,
            created_at: now.clone(),
            updated_at: now,
        };

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO cards (id, user_id, user_name, image, title, description, text, likes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9)",
                rusqlite::params![
                    card.id,
                    card.user_id,
                    card.user_name,
                    card.image,
                    card.title,
                    card.description,
                    card.text,
                    card.created_at,
                    card.updated_at,
                ],
            )?;
            Ok(())
        })?;

        debug!("Card {} created by {}", card.id, card.user_id);
        Ok(card)
    }

    /// Fetch a card with the ids of every user who liked it.
    pub fn get_card(&self, id: &str) -> Result<CardDetail> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let card = query_card(&tx, id)?.ok_or(DbError::NotFound)?;

            let mut stmt =
                tx.prepare("SELECT user_id FROM likes WHERE card_id = ?1 ORDER BY created_at")?;
            let liked_by = stmt
                .query_map([id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            drop(stmt);
            tx.finish()?;

            Ok(CardDetail { card, liked_by })
        })
    }

    /// One page of cards, newest first, annotated with the viewer's like state.
    pub fn list_cards(
        &self,
        filter: &CardFilter,
        page: i64,
        limit: i64,
        viewer_id: Option<&str>,
    ) -> Result<CardPage> {
        let (page, limit) = clamp_paging(page, limit);
        let owner = filter.owner_id.as_deref();

        self.with_conn(|conn| {
            // Count and page read from the same snapshot.
            let tx = conn.unchecked_transaction()?;

            let total_count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM cards WHERE (?1 IS NULL OR user_id = ?1)",
                [owner],
                |row| row.get(0),
            )?;
            let total_count = total_count as u64;
            let (page, total_pages) = page_window(total_count, page, limit);
            let offset = (page as i64 - 1) * limit as i64;

            let sql = format!(
                "SELECT {CARD_COLUMNS},
                        EXISTS(SELECT 1 FROM likes l WHERE l.card_id = c.id AND l.user_id = ?1)
                 FROM cards c
                 WHERE (?2 IS NULL OR c.user_id = ?2)
                 ORDER BY c.created_at DESC, c.id DESC
                 LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = tx.prepare(&sql)?;
            let items = stmt
                .query_map(
                    rusqlite::params![viewer_id, owner, limit as i64, offset],
                    |row| {
                        Ok(ListedCard {
                            card: map_card(row)?,
                            is_liked: row.get(10)?,
                        })
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            drop(stmt);
            tx.finish()?;

            Ok(CardPage {
                items,
                page,
                total_pages,
                total_count,
            })
        })
    }

    /// Overwrite the mutable fields of a card. Likes are left alone.
    ///
    /// `image: None` keeps the stored image. Returns the image reference the card held before
    /// the write, read in the same transaction, so the caller knows exactly which asset lost
    /// its owner.
    pub fn update_card(
        &self,
        id: &str,
        title: &str,
        description: &str,
        text: &str,
        image: Option<&str>,
    ) -> Result<String> {
        if title.trim().is_empty() {
            return Err(DbError::Validation("title is required".into()));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let previous = card_image(&tx, id)?;
            let next = image.unwrap_or(previous.as_str());

            tx.execute(
                "UPDATE cards
                 SET title = ?1, description = ?2, text = ?3, image = ?4, updated_at = ?5
                 WHERE id = ?6",
                rusqlite::params![title, description, text, next, now_timestamp(), id],
            )?;
            tx.commit()?;
            Ok(previous)
        })
    }

    /// Delete a card and all of its likes in one transaction. Returns the deleted card's image.
    pub fn delete_card(&self, id: &str) -> Result<String> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let image = card_image(&tx, id)?;
            let likes_removed = tx.execute("DELETE FROM likes WHERE card_id = ?1", [id])?;
            tx.execute("DELETE FROM cards WHERE id = ?1", [id])?;
            tx.commit()?;

            debug!("Card {} deleted with {} likes", id, likes_removed);
            Ok(image)
        })
    }

    // -- Likes --

    /// Record that `user_id` likes `card_id` and bump the counter, atomically.
    pub fn like_card(&self, card_id: &str, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            ensure_card_exists(&tx, card_id)?;

            if like_exists(&tx, card_id, user_id)? {
                return Err(DbError::AlreadyLiked);
            }

            tx.execute(
                "INSERT INTO likes (user_id, card_id, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, card_id, now_timestamp()],
            )?;
            tx.execute("UPDATE cards SET likes = likes + 1 WHERE id = ?1", [card_id])?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Remove the like of `user_id` on `card_id` and decrement the counter, atomically.
    pub fn unlike_card(&self, card_id: &str, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            ensure_card_exists(&tx, card_id)?;

            if !like_exists(&tx, card_id, user_id)? {
                return Err(DbError::NotLiked);
            }

            tx.execute(
                "DELETE FROM likes WHERE user_id = ?1 AND card_id = ?2",
                [user_id, card_id],
            )?;
            tx.execute("UPDATE cards SET likes = likes - 1 WHERE id = ?1", [card_id])?;
            tx.commit()?;
            Ok(())
        })
    }
}

fn query_card(conn: &Connection, id: &str) -> Result<Option<CardRow>> {
    let sql = format!("SELECT {CARD_COLUMNS} FROM cards c WHERE c.id = ?1");
    let row = conn.query_row(&sql, [id], map_card).optional()?;
    Ok(row)
}

fn card_image(conn: &Connection, id: &str) -> Result<String> {
    conn.query_row("SELECT image FROM cards WHERE id = ?1", [id], |row| row.get(0))
        .optional()?
        .ok_or(DbError::NotFound)
}

fn ensure_card_exists(conn: &Connection, id: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM cards WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    if exists { Ok(()) } else { Err(DbError::NotFound) }
}

fn like_exists(conn: &Connection, card_id: &str, user_id: &str) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM likes WHERE user_id = ?1 AND card_id = ?2)",
        [user_id, card_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn map_card(row: &Row<'_>) -> rusqlite::Result<CardRow> {
    Ok(CardRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        user_name: row.get(2)?,
        image: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        text: row.get(6)?,
        likes: row.get::<_, i64>(7)? as u64,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn seeded(users: &[&str]) -> Database {
        let db = Database::open_in_memory().unwrap();
        for u in users {
            db.create_user(u, u, &format!("{u}@example.com"), "hash").unwrap();
        }
        db
    }

    fn assert_counter_consistent(db: &Database, card_id: &str) {
        let detail = db.get_card(card_id).unwrap();
        assert_eq!(detail.card.likes, detail.liked_by.len() as u64);
    }

    #[test]
    fn new_card_starts_with_no_likes() {
        let db = seeded(&["alice"]);
        let card = db.create_card("alice", "alice", "Hello", "", "", "").unwrap();

        let detail = db.get_card(&card.id).unwrap();
        assert_eq!(detail.card.title, "Hello");
        assert_eq!(detail.card.image, "");
        assert_eq!(detail.card.likes, 0);
        assert!(detail.liked_by.is_empty());
    }

    #[test]
    fn empty_title_is_rejected() {
        let db = seeded(&["alice"]);
        let res = db.create_card("alice", "alice", "   ", "d", "t", "");
        assert!(matches!(res, Err(DbError::Validation(_))));

        let page = db.list_cards(&CardFilter::all(), 1, 10, None).unwrap();
        assert_eq!(page.total_count, 0);
    }

    #[test]
    fn missing_card_is_not_found() {
        let db = seeded(&["alice"]);
        assert!(matches!(db.get_card("nope"), Err(DbError::NotFound)));
        assert!(matches!(
            db.update_card("nope", "t", "", "", None),
            Err(DbError::NotFound)
        ));
        assert!(matches!(db.delete_card("nope"), Err(DbError::NotFound)));
        assert!(matches!(db.like_card("nope", "alice"), Err(DbError::NotFound)));
        assert!(matches!(db.unlike_card("nope", "alice"), Err(DbError::NotFound)));
    }

    #[test]
    fn like_and_unlike_keep_counter_in_sync() {
        let db = seeded(&["alice", "bob", "carol"]);
        let card = db.create_card("alice", "alice", "Hello", "", "", "").unwrap();

        db.like_card(&card.id, "bob").unwrap();
        assert_counter_consistent(&db, &card.id);
        db.like_card(&card.id, "carol").unwrap();
        assert_counter_consistent(&db, &card.id);
        db.unlike_card(&card.id, "bob").unwrap();
        assert_counter_consistent(&db, &card.id);

        let detail = db.get_card(&card.id).unwrap();
        assert_eq!(detail.card.likes, 1);
        assert_eq!(detail.liked_by, vec!["carol".to_string()]);
    }

    #[test]
    fn double_like_and_stray_unlike_leave_counter_unchanged() {
        let db = seeded(&["alice", "bob"]);
        let card = db.create_card("alice", "alice", "Hello", "", "", "").unwrap();

        db.like_card(&card.id, "bob").unwrap();
        assert!(matches!(db.like_card(&card.id, "bob"), Err(DbError::AlreadyLiked)));
        assert_eq!(db.get_card(&card.id).unwrap().card.likes, 1);

        db.unlike_card(&card.id, "bob").unwrap();
        assert!(matches!(db.unlike_card(&card.id, "bob"), Err(DbError::NotLiked)));
        assert_eq!(db.get_card(&card.id).unwrap().card.likes, 0);
        assert_counter_consistent(&db, &card.id);
    }

    #[test]
    fn concurrent_likes_from_distinct_users_all_count() {
        let users = ["alice", "u1", "u2", "u3", "u4", "u5", "u6", "u7", "u8"];
        let db = Arc::new(seeded(&users));
        let card = db.create_card("alice", "alice", "Hello", "", "", "").unwrap();

        let handles: Vec<_> = users[1..]
            .iter()
            .map(|u| {
                let db = db.clone();
                let card_id = card.id.clone();
                let user = u.to_string();
                thread::spawn(move || db.like_card(&card_id, &user))
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }

        let detail = db.get_card(&card.id).unwrap();
        assert_eq!(detail.card.likes, 8);
        for u in &users[1..] {
            assert!(detail.is_liked_by(u));
        }
    }

    #[test]
    fn concurrent_likes_from_same_user_succeed_once() {
        let db = Arc::new(seeded(&["alice", "bob"]));
        let card = db.create_card("alice", "alice", "Hello", "", "", "").unwrap();

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let db = db.clone();
                let card_id = card.id.clone();
                thread::spawn(move || db.like_card(&card_id, "bob"))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let already = results
            .iter()
            .filter(|r| matches!(r, Err(DbError::AlreadyLiked)))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(already, 5);
        assert_eq!(db.get_card(&card.id).unwrap().card.likes, 1);
    }

    #[test]
    fn update_overwrites_fields_but_not_likes() {
        let db = seeded(&["alice", "bob"]);
        let card = db.create_card("alice", "alice", "Hello", "d", "t", "card_a.png").unwrap();
        db.like_card(&card.id, "bob").unwrap();

        let previous = db.update_card(&card.id, "Bye", "d2", "t2", Some("")).unwrap();
        assert_eq!(previous, "card_a.png");
        let detail = db.get_card(&card.id).unwrap();
        assert_eq!(detail.card.title, "Bye");
        assert_eq!(detail.card.description, "d2");
        assert_eq!(detail.card.text, "t2");
        assert_eq!(detail.card.image, "");
        assert_eq!(detail.card.likes, 1);
        assert_eq!(detail.card.user_name, "alice");
        assert!(detail.card.updated_at >= card.updated_at);

        assert!(matches!(
            db.update_card(&card.id, "", "", "", None),
            Err(DbError::Validation(_))
        ));
    }

    #[test]
    fn update_without_image_keeps_current_one() {
        let db = seeded(&["alice"]);
        let card = db.create_card("alice", "alice", "Hello", "", "", "card_a.png").unwrap();

        let previous = db.update_card(&card.id, "Hi", "", "", None).unwrap();
        assert_eq!(previous, "card_a.png");
        assert_eq!(db.get_card(&card.id).unwrap().card.image, "card_a.png");

        let previous = db.update_card(&card.id, "Hi", "", "", Some("card_b.png")).unwrap();
        assert_eq!(previous, "card_a.png");
        let previous = db.update_card(&card.id, "Hi", "", "", Some("card_c.png")).unwrap();
        assert_eq!(previous, "card_b.png");
    }

    #[test]
    fn delete_cascades_to_likes() {
        let db = seeded(&["alice", "u1", "u2", "u3"]);
        let card = db.create_card("alice", "alice", "Hello", "", "", "card_a.png").unwrap();
        for u in ["u1", "u2", "u3"] {
            db.like_card(&card.id, u).unwrap();
        }

        assert_eq!(db.delete_card(&card.id).unwrap(), "card_a.png");

        assert!(matches!(db.get_card(&card.id), Err(DbError::NotFound)));
        let remaining: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM likes WHERE card_id = ?1",
                    [&card.id],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn paging_math() {
        assert_eq!(clamp_paging(0, 0), (1, DEFAULT_PAGE_LIMIT));
        assert_eq!(clamp_paging(-3, -1), (1, DEFAULT_PAGE_LIMIT));
        assert_eq!(clamp_paging(2, 10_000), (2, MAX_PAGE_LIMIT));

        assert_eq!(page_window(0, 1, 4), (1, 0));
        assert_eq!(page_window(0, 7, 4), (7, 0));
        assert_eq!(page_window(8, 2, 4), (2, 2));
        assert_eq!(page_window(9, 2, 4), (2, 3));
        assert_eq!(page_window(9, 9, 4), (3, 3));
    }

    #[test]
    fn listing_is_newest_first_and_clamps_past_the_end() {
        let db = seeded(&["alice"]);
        let mut ids = Vec::new();
        for i in 0..7 {
            let card = db
                .create_card("alice", "alice", &format!("card {i}"), "", "", "")
                .unwrap();
            ids.push(card.id);
            thread::sleep(Duration::from_millis(2));
        }
        ids.reverse();

        let first = db.list_cards(&CardFilter::all(), 1, 3, None).unwrap();
        assert_eq!(first.total_count, 7);
        assert_eq!(first.total_pages, 3);
        let first_ids: Vec<_> = first.items.iter().map(|c| c.card.id.clone()).collect();
        assert_eq!(first_ids, ids[0..3].to_vec());

        let last = db.list_cards(&CardFilter::all(), 3, 3, None).unwrap();
        let beyond = db.list_cards(&CardFilter::all(), 42, 3, None).unwrap();
        assert_eq!(beyond.page, 3);
        let last_ids: Vec<_> = last.items.iter().map(|c| c.card.id.clone()).collect();
        let beyond_ids: Vec<_> = beyond.items.iter().map(|c| c.card.id.clone()).collect();
        assert_eq!(last_ids, beyond_ids);
        assert_eq!(last_ids, ids[6..].to_vec());
    }

    #[test]
    fn listing_filters_by_owner_and_annotates_viewer() {
        let db = seeded(&["alice", "bob"]);
        let a1 = db.create_card("alice", "alice", "a1", "", "", "").unwrap();
        db.create_card("alice", "alice", "a2", "", "", "").unwrap();
        db.create_card("bob", "bob", "b1", "", "", "").unwrap();
        db.like_card(&a1.id, "bob").unwrap();

        let page = db
            .list_cards(&CardFilter::by_owner("alice"), 0, 0, Some("bob"))
            .unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.total_count, 2);
        assert_eq!(page.total_pages, 1);
        for item in &page.items {
            assert_eq!(item.card.user_id, "alice");
            assert_eq!(item.is_liked, item.card.id == a1.id);
        }

        let anonymous = db.list_cards(&CardFilter::all(), 1, 10, None).unwrap();
        assert_eq!(anonymous.total_count, 3);
        assert!(anonymous.items.iter().all(|c| !c.is_liked));
    }

    #[test]
    fn empty_listing_has_zero_pages() {
        let db = seeded(&["alice"]);
        let page = db.list_cards(&CardFilter::all(), 5, 4, None).unwrap();
        assert_eq!(page.total_count, 0);
        assert_eq!(page.total_pages, 0);
        assert!(page.items.is_empty());
    }

    #[test]
    fn file_backed_database_reads_through_reader_pool() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("cards.db")).unwrap();
        db.create_user("alice", "alice", "alice@example.com", "hash").unwrap();
        let card = db.create_card("alice", "alice", "Hello", "", "", "").unwrap();

        for _ in 0..5 {
            assert_eq!(db.get_card(&card.id).unwrap().card.title, "Hello");
        }
    }
}

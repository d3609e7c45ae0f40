//! Place rows and alias resolution.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::helpers::row_to_place;
use super::{ReviewStore, Result};
use crate::identity::canonicalize_url;
use crate::models::Place;
use crate::repository::now_timestamp;

impl ReviewStore {
    /// Insert or refresh a place and return the id callers must use from now on.
    ///
    /// When the canonical form of `resolved_url` already belongs to a
    /// different place, `place_id` is recorded as an alias of that place and
    /// the canonical id is returned instead.
    pub fn upsert_place(
        &self,
        place_id: &str,
        place_name: &str,
        original_url: &str,
        resolved_url: Option<&str>,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<String> {
        let canonical_url = resolved_url
            .map(canonicalize_url)
            .filter(|url| !url.is_empty());

        self.write(|conn| {
            let now = now_timestamp();
            let target = resolve_alias_in(conn, place_id, canonical_url.as_deref(), original_url)?;

            if target != place_id {
                conn.execute(
                    "UPDATE places SET last_scraped = ?1 WHERE place_id = ?2",
                    params![now, target],
                )?;
                return Ok(target);
            }

            conn.execute(
                r#"
                INSERT INTO places (
                    place_id, place_name, original_url, resolved_url,
                    latitude, longitude, first_seen, last_scraped, total_reviews
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 0)
                ON CONFLICT(place_id) DO UPDATE SET
                    place_name = COALESCE(NULLIF(excluded.place_name, ''), places.place_name),
                    resolved_url = COALESCE(excluded.resolved_url, places.resolved_url),
                    latitude = COALESCE(excluded.latitude, places.latitude),
                    longitude = COALESCE(excluded.longitude, places.longitude),
                    last_scraped = excluded.last_scraped
                "#,
                params![
                    place_id,
                    place_name,
                    original_url,
                    canonical_url,
                    latitude,
                    longitude,
                    now
                ],
            )?;
            Ok(place_id.to_string())
        })
    }

    /// Resolve `place_id` to its canonical place, registering an alias when
    /// `resolved_url` matches a different place.
    pub fn resolve_alias(&self, place_id: &str, resolved_url: &str) -> Result<String> {
        let canonical_url = canonicalize_url(resolved_url);
        let canonical_url = (!canonical_url.is_empty()).then_some(canonical_url);
        self.write(|conn| resolve_alias_in(conn, place_id, canonical_url.as_deref(), resolved_url))
    }

    /// Canonical id recorded for an alias, if any.
    pub fn lookup_alias(&self, alias_id: &str) -> Result<Option<String>> {
        lookup_alias_in(&self.conn, alias_id)
    }

    /// Get a place by id. A real place row wins; otherwise the alias table
    /// is followed.
    pub fn get_place(&self, place_id: &str) -> Result<Option<Place>> {
        if let Some(place) = place_row(&self.conn, place_id)? {
            return Ok(Some(place));
        }
        match self.lookup_alias(place_id)? {
            Some(canonical) => place_row(&self.conn, &canonical),
            None => Ok(None),
        }
    }

    /// All places in the order they were first seen.
    pub fn list_places(&self) -> Result<Vec<Place>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM places ORDER BY first_seen, place_id")?;
        let places = stmt
            .query_map([], row_to_place)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(places)
    }
}

fn lookup_alias_in(conn: &Connection, alias_id: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT canonical_id FROM place_aliases WHERE alias_id = ?1",
            params![alias_id],
            |row| row.get(0),
        )
        .optional()?)
}

fn place_row(conn: &Connection, place_id: &str) -> Result<Option<Place>> {
    Ok(conn
        .query_row(
            "SELECT * FROM places WHERE place_id = ?1",
            params![place_id],
            row_to_place,
        )
        .optional()?)
}

fn place_exists(conn: &Connection, place_id: &str) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM places WHERE place_id = ?1",
            params![place_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

/// An existing place keeps its identity: only ids without a place row
/// can become aliases, and they always point at a real place.
fn resolve_alias_in(
    conn: &Connection,
    place_id: &str,
    canonical_url: Option<&str>,
    original_url: &str,
) -> Result<String> {
    if let Some(canonical) = lookup_alias_in(conn, place_id)? {
        return Ok(canonical);
    }
    if place_exists(conn, place_id)? {
        return Ok(place_id.to_string());
    }

    let Some(url) = canonical_url else {
        return Ok(place_id.to_string());
    };

    let matched: Option<String> = conn
        .query_row(
            r#"
            SELECT place_id FROM places
            WHERE resolved_url = ?1 AND place_id != ?2
            ORDER BY first_seen, place_id
            LIMIT 1
            "#,
            params![url, place_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(canonical) = matched else {
        return Ok(place_id.to_string());
    };

    conn.execute(
        r#"
        INSERT OR IGNORE INTO place_aliases (alias_id, canonical_id, original_url, created_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
        params![place_id, canonical, original_url, now_timestamp()],
    )?;

    info!(alias = place_id, canonical = %canonical, "Registered place alias");
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{observation, open_store};
    use crate::models::ScrapeMode;

    const URL: &str = "https://www.google.com/maps/place/Cafe/?utm_source=share&hl=en";
    const SAME_URL: &str = "https://WWW.google.com/maps/place/Cafe?hl=en#reviews";

    #[test]
    fn insert_then_update_keeps_first_seen_and_name() {
        let (_dir, store) = open_store();
        let id = store
            .upsert_place("cid:1", "Cafe", URL, Some(URL), Some(1.5), None)
            .unwrap();
        assert_eq!(id, "cid:1");
        let first = store.get_place("cid:1").unwrap().unwrap();

        store
            .upsert_place("cid:1", "", URL, None, None, Some(2.5))
            .unwrap();
        let second = store.get_place("cid:1").unwrap().unwrap();

        assert_eq!(second.place_name, "Cafe");
        assert_eq!(second.first_seen, first.first_seen);
        assert_eq!(second.latitude, Some(1.5));
        assert_eq!(second.longitude, Some(2.5));
        assert_eq!(
            second.resolved_url.as_deref(),
            Some("https://www.google.com/maps/place/Cafe?hl=en")
        );
    }

    #[test]
    fn matching_resolved_url_creates_alias() {
        let (_dir, store) = open_store();
        store
            .upsert_place("cid:1", "Cafe", URL, Some(URL), None, None)
            .unwrap();

        let id = store
            .upsert_place("short:abc", "Cafe", "https://maps.app.goo.gl/abc", Some(SAME_URL), None, None)
            .unwrap();
        assert_eq!(id, "cid:1");

        // Later scrapes with the alias id resolve without a URL.
        let again = store
            .upsert_place("short:abc", "Cafe", "https://maps.app.goo.gl/abc", None, None, None)
            .unwrap();
        assert_eq!(again, "cid:1");

        let via_alias = store.get_place("short:abc").unwrap().unwrap();
        assert_eq!(via_alias.place_id, "cid:1");
        assert_eq!(store.list_places().unwrap().len(), 1);
    }

    #[test]
    fn existing_place_is_never_turned_into_an_alias() {
        let (_dir, store) = open_store();
        let url_a = "https://example.com/a";
        let url_b = "https://example.com/b";
        store
            .upsert_place("B", "B", url_b, Some(url_b), None, None)
            .unwrap();
        store
            .upsert_place("A", "A", url_a, Some(url_a), None, None)
            .unwrap();
        store
            .upsert_review("A", &observation("a1", "Fine"), None, ScrapeMode::Update)
            .unwrap();

        // A later scrape of A redirects to B's URL.
        let id = store
            .upsert_place("A", "A", url_a, Some(url_b), None, None)
            .unwrap();
        assert_eq!(id, "A");
        assert!(store.lookup_alias("A").unwrap().is_none());
        assert_eq!(store.get_place("A").unwrap().unwrap().place_id, "A");
        assert_eq!(store.count_reviews(&id, false).unwrap(), 1);

        // The explicit form keeps it too.
        assert_eq!(store.resolve_alias("A", url_b).unwrap(), "A");
    }

    #[test]
    fn aliases_point_at_real_places() {
        let (_dir, store) = open_store();
        let url_a = "https://example.com/a";
        store
            .upsert_place("A", "A", url_a, Some(url_a), None, None)
            .unwrap();

        let d = store
            .upsert_place("D", "D", url_a, Some(url_a), None, None)
            .unwrap();
        assert_eq!(d, "A");
        assert!(store.get_place("D").unwrap().is_some());

        // Once aliased, D keeps resolving to A whatever URL it arrives with.
        assert_eq!(
            store.resolve_alias("D", "https://example.com/elsewhere").unwrap(),
            "A"
        );
        assert_eq!(store.get_place("D").unwrap().unwrap().place_id, "A");
    }

    #[test]
    fn unknown_place_is_none() {
        let (_dir, store) = open_store();
        assert!(store.get_place("missing").unwrap().is_none());
    }
}

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::model::{AggregatedStats, StatSeries, StoredMatch};

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS matches (
            match_id TEXT PRIMARY KEY,
            league_id TEXT NOT NULL,
            league_name TEXT NOT NULL,
            match_round_number INTEGER NOT NULL,
            match_date TEXT NOT NULL,
            match_hour TEXT NOT NULL,
            home_team_name TEXT NOT NULL,
            home_team_url TEXT NOT NULL,
            away_team_name TEXT NOT NULL,
            away_team_url TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_matches_league_round
            ON matches(league_id, match_round_number);

        CREATE TABLE IF NOT EXISTS stats (
            match_id TEXT PRIMARY KEY,
            league_id TEXT NOT NULL,
            home_team_name TEXT NOT NULL,
            away_team_name TEXT NOT NULL,
            home_stats_json TEXT NOT NULL,
            away_stats_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            fixtures INTEGER NOT NULL,
            records_saved INTEGER NOT NULL,
            errors_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn upsert_matches(conn: &mut Connection, matches: &[StoredMatch]) -> Result<usize> {
    let tx = conn.transaction().context("begin match import transaction")?;
    let now = Utc::now().to_rfc3339();
    for m in matches {
        tx.execute(
            r#"
            INSERT INTO matches (
                match_id, league_id, league_name, match_round_number, match_date, match_hour,
                home_team_name, home_team_url, away_team_name, away_team_url, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(match_id) DO UPDATE SET
                league_id = excluded.league_id,
                league_name = excluded.league_name,
                match_round_number = excluded.match_round_number,
                match_date = excluded.match_date,
                match_hour = excluded.match_hour,
                home_team_name = excluded.home_team_name,
                home_team_url = excluded.home_team_url,
                away_team_name = excluded.away_team_name,
                away_team_url = excluded.away_team_url,
                updated_at = excluded.updated_at
            "#,
            params![
                m.match_id,
                m.league_id,
                m.league_name,
                m.match_round_number,
                m.match_date,
                m.match_hour,
                m.home_team_name,
                m.home_team_url,
                m.away_team_name,
                m.away_team_url,
                now,
            ],
        )
        .with_context(|| format!("upsert match {}", m.match_id))?;
    }
    tx.commit().context("commit match import transaction")?;
    Ok(matches.len())
}

pub fn load_matches(conn: &Connection) -> Result<Vec<StoredMatch>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                match_id, league_id, league_name, match_round_number, match_date, match_hour,
                home_team_name, home_team_url, away_team_name, away_team_url
            FROM matches
            ORDER BY league_id ASC, match_round_number ASC, match_id ASC
            "#,
        )
        .context("prepare load matches query")?;

    let rows = stmt
        .query_map([], |row| {
            Ok(StoredMatch {
                match_id: row.get(0)?,
                league_id: row.get(1)?,
                league_name: row.get(2)?,
                match_round_number: row.get(3)?,
                match_date: row.get(4)?,
                match_hour: row.get(5)?,
                home_team_name: row.get(6)?,
                home_team_url: row.get(7)?,
                away_team_name: row.get(8)?,
                away_team_url: row.get(9)?,
            })
        })
        .context("query load matches")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode match row")?);
    }
    Ok(out)
}

pub fn upsert_stats(conn: &Connection, stats: &AggregatedStats) -> Result<()> {
    let home_json = serde_json::to_string(stats.home_team_prior_match_stats())
        .context("serialize home prior stats")?;
    let away_json = serde_json::to_string(stats.away_team_prior_match_stats())
        .context("serialize away prior stats")?;
    conn.execute(
        r#"
        INSERT INTO stats (
            match_id, league_id, home_team_name, away_team_name,
            home_stats_json, away_stats_json, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(match_id) DO UPDATE SET
            league_id = excluded.league_id,
            home_team_name = excluded.home_team_name,
            away_team_name = excluded.away_team_name,
            home_stats_json = excluded.home_stats_json,
            away_stats_json = excluded.away_stats_json,
            created_at = excluded.created_at
        "#,
        params![
            stats.match_id(),
            stats.league_id(),
            stats.home_team_name(),
            stats.away_team_name(),
            home_json,
            away_json,
            Utc::now().to_rfc3339(),
        ],
    )
    .with_context(|| format!("upsert stats {}", stats.match_id()))?;
    Ok(())
}

pub fn load_stats(conn: &Connection, match_id: &str) -> Result<Option<AggregatedStats>> {
    let row = conn
        .query_row(
            r#"
            SELECT match_id, league_id, home_team_name, away_team_name,
                   home_stats_json, away_stats_json
            FROM stats
            WHERE match_id = ?1
            "#,
            params![match_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()
        .context("query stats")?;
    let Some((match_id, league_id, home_team_name, away_team_name, home_json, away_json)) = row
    else {
        return Ok(None);
    };
    let home = serde_json::from_str::<StatSeries>(&home_json).context("decode home prior stats")?;
    let away = serde_json::from_str::<StatSeries>(&away_json).context("decode away prior stats")?;
    Ok(Some(AggregatedStats::restore(
        match_id,
        league_id,
        home_team_name,
        away_team_name,
        home,
        away,
    )))
}

pub fn count_stats(conn: &Connection) -> Result<usize> {
    let n = conn
        .query_row("SELECT COUNT(*) FROM stats", [], |row| row.get::<_, i64>(0))
        .context("count stats")?;
    Ok(n as usize)
}

pub fn begin_run(conn: &Connection, fixtures: usize) -> Result<i64> {
    conn.execute(
        "INSERT INTO runs(started_at, finished_at, fixtures, records_saved, errors_json)
         VALUES (?1, NULL, ?2, 0, '[]')",
        params![Utc::now().to_rfc3339(), fixtures as i64],
    )
    .context("insert run")?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_run(
    conn: &Connection,
    run_id: i64,
    records_saved: usize,
    errors: &[String],
) -> Result<()> {
    let errors_json = serde_json::to_string(errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "UPDATE runs SET finished_at = ?1, records_saved = ?2, errors_json = ?3 WHERE run_id = ?4",
        params![
            Utc::now().to_rfc3339(),
            records_saved as i64,
            errors_json,
            run_id
        ],
    )
    .context("update run")?;
    Ok(())
}

/// Reads a camelCase JSON array of match records, as written by the match
/// listing stage.
pub fn read_matches_json(path: &Path) -> Result<Vec<StoredMatch>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read match import {}", path.display()))?;
    serde_json::from_str::<Vec<StoredMatch>>(raw.trim()).context("invalid match import json")
}

#[cfg(test)]
mod tests {
    use super::{
        begin_run, count_stats, finish_run, load_matches, load_stats, open_in_memory,
        upsert_matches, upsert_stats,
    };
    use crate::model::{AggregatedStatsBuilder, PriorMatchRef, Side, StatMap, StoredMatch};

    #[test]
    fn matches_upsert_by_id() {
        let mut conn = open_in_memory().expect("db");
        let mut m = StoredMatch {
            match_id: "m1".to_string(),
            league_id: "L".to_string(),
            league_name: "League".to_string(),
            match_round_number: 4,
            match_date: "12.05.".to_string(),
            match_hour: "20:00".to_string(),
            home_team_name: "Arsenal".to_string(),
            home_team_url: "https://example.com/team/arsenal/".to_string(),
            away_team_name: "Chelsea".to_string(),
            away_team_url: "https://example.com/team/chelsea/".to_string(),
        };
        upsert_matches(&mut conn, std::slice::from_ref(&m)).expect("insert");
        m.match_round_number = 5;
        upsert_matches(&mut conn, std::slice::from_ref(&m)).expect("update");
        let all = load_matches(&conn).expect("load");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].match_round_number, 5);
    }

    #[test]
    fn runs_are_recorded() {
        let conn = open_in_memory().expect("db");
        let run_id = begin_run(&conn, 3).expect("begin");
        finish_run(&conn, run_id, 2, &["boom".to_string()]).expect("finish");
        let (saved, errors): (i64, String) = conn
            .query_row(
                "SELECT records_saved, errors_json FROM runs WHERE run_id = ?1",
                [run_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("row");
        assert_eq!(saved, 2);
        assert_eq!(errors, r#"["boom"]"#);
    }

    #[test]
    fn stats_round_trip_and_replace() {
        let conn = open_in_memory().expect("db");
        let prior = PriorMatchRef {
            match_id: "m9".to_string(),
            league_id: "L".to_string(),
            home_team_name: "Arsenal".to_string(),
            away_team_name: "Chelsea".to_string(),
            home_team_prior_match_ids: vec!["a".to_string()],
            away_team_prior_match_ids: vec!["b".to_string()],
        };
        let mut builder = AggregatedStatsBuilder::new(&prior);
        let home: StatMap = [("Shots", "5"), ("Ball Possession", "61%")].into_iter().collect();
        let away: StatMap = [("Shots", "3")].into_iter().collect();
        builder.merge(Side::Home, &home);
        builder.merge(Side::Away, &away);
        let stats = builder.seal();

        upsert_stats(&conn, &stats).expect("insert");
        upsert_stats(&conn, &stats).expect("replace");
        assert_eq!(count_stats(&conn).expect("count"), 1);

        let back = load_stats(&conn, "m9").expect("load").expect("present");
        assert_eq!(back, stats);
        let names = back
            .home_team_prior_match_stats()
            .iter()
            .map(|(name, _)| name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Shots", "Ball Possession"]);
        assert!(load_stats(&conn, "missing").expect("load").is_none());
    }
}

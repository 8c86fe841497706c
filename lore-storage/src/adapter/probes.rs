//! Capability probes that exercise the engine instead of reading
//! compile-option lists. A build that advertises a module but cannot
//! run it fails these and the store degrades accordingly.

use rusqlite::Connection;

use super::Capabilities;

/// Round-trip a value through a scratch temp table. Proves the
/// connection can actually write and read on this filesystem.
pub fn exercise_round_trip(conn: &Connection) -> Result<bool, rusqlite::Error> {
    conn.execute_batch(
        "CREATE TEMP TABLE _lore_probe(v INTEGER NOT NULL);
         INSERT INTO _lore_probe(v) VALUES (42);",
    )?;
    let v: i64 = conn.query_row("SELECT v FROM _lore_probe", [], |row| row.get(0))?;
    conn.execute_batch("DROP TABLE _lore_probe;")?;
    Ok(v == 42)
}

/// Probe both optional capabilities on an open connection. Probe
/// failures read as "unsupported", never as fatal errors.
pub fn probe_capabilities(conn: &Connection) -> Capabilities {
    Capabilities {
        change_triggers: probe_change_triggers(conn).unwrap_or(false),
        fts5: probe_fts5(conn).unwrap_or(false),
    }
}

/// Create a scratch table pair plus a trigger, fire it, and check the
/// side effect landed. Catches OMIT_TRIGGER builds.
fn probe_change_triggers(conn: &Connection) -> Result<bool, rusqlite::Error> {
    let result = (|| {
        conn.execute_batch(
            "CREATE TEMP TABLE _lore_trg_src(v INTEGER NOT NULL);
             CREATE TEMP TABLE _lore_trg_log(v INTEGER NOT NULL);
             CREATE TEMP TRIGGER _lore_trg AFTER INSERT ON _lore_trg_src
             BEGIN
                 INSERT INTO _lore_trg_log(v) VALUES (new.v);
             END;
             INSERT INTO _lore_trg_src(v) VALUES (7);",
        )?;
        let fired: i64 = conn.query_row(
            "SELECT COUNT(*) FROM _lore_trg_log WHERE v = 7",
            [],
            |row| row.get(0),
        )?;
        Ok(fired == 1)
    })();

    let _ = conn.execute_batch(
        "DROP TRIGGER IF EXISTS _lore_trg;
         DROP TABLE IF EXISTS _lore_trg_src;
         DROP TABLE IF EXISTS _lore_trg_log;",
    );
    result
}

/// Create a scratch FTS5 table and round-trip a match through it.
/// Virtual tables cannot be TEMP, so this briefly touches the main
/// schema and drops the table again.
fn probe_fts5(conn: &Connection) -> Result<bool, rusqlite::Error> {
    let created = conn.execute_batch(
        "CREATE VIRTUAL TABLE _lore_fts_probe USING fts5(body);
         INSERT INTO _lore_fts_probe(body) VALUES ('probe exercise');",
    );
    if created.is_err() {
        let _ = conn.execute_batch("DROP TABLE IF EXISTS _lore_fts_probe;");
        return Ok(false);
    }

    let hits: Result<i64, _> = conn.query_row(
        "SELECT COUNT(*) FROM _lore_fts_probe WHERE _lore_fts_probe MATCH 'probe'",
        [],
        |row| row.get(0),
    );
    let _ = conn.execute_batch("DROP TABLE IF EXISTS _lore_fts_probe;");
    Ok(matches!(hits, Ok(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_exercises_scratch_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(exercise_round_trip(&conn).unwrap());
        // The scratch table must not survive the probe.
        let leftover: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_temp_master WHERE name = '_lore_probe'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(leftover, 0);
    }

    #[test]
    fn bundled_engine_reports_triggers_and_fts5() {
        let conn = Connection::open_in_memory().unwrap();
        let caps = probe_capabilities(&conn);
        assert!(caps.change_triggers);
        assert!(caps.fts5);
    }

    #[test]
    fn probes_leave_no_residue_in_main_schema() {
        let conn = Connection::open_in_memory().unwrap();
        let _ = probe_capabilities(&conn);
        let leftover: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name LIKE '_lore_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(leftover, 0);
    }
}

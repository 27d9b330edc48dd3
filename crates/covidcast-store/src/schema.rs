use rusqlite_migration::{M, Migrations};

pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "CREATE TABLE objects (
                key             TEXT PRIMARY KEY,
                body            BLOB NOT NULL,
                last_modified   INTEGER NOT NULL
            );",
        ),
        M::up(
            "CREATE TABLE revisions (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                comment         TEXT NOT NULL,
                created_at      INTEGER NOT NULL,
                finalized       INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE revision_assets (
                revision_id     INTEGER NOT NULL,
                position        INTEGER NOT NULL,
                batch           INTEGER NOT NULL,
                bucket          TEXT NOT NULL,
                key             TEXT NOT NULL,
                PRIMARY KEY (revision_id, position),
                FOREIGN KEY (revision_id) REFERENCES revisions(id)
            );

            CREATE INDEX idx_revision_assets_key ON revision_assets(key);",
        ),
    ])
}

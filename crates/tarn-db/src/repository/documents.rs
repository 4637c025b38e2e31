//! Document database repository.

use diesel::{dsl::exists, prelude::*};

use crate::{
    models::documents::{Checkpoint, Document, NewCheckpoint, NewDocument},
    schema::documents::{checkpoints, documents},
};

pub struct DocumentRepository;

impl DocumentRepository {
    pub fn find(conn: &mut SqliteConnection, name: &str) -> QueryResult<Option<Document>> {
        documents::table
            .filter(documents::name.eq(name))
            .select(Document::as_select())
            .first(conn)
            .optional()
    }

    /// Inserts a document that must not exist yet.
    pub fn insert(conn: &mut SqliteConnection, document: &NewDocument) -> QueryResult<usize> {
        diesel::insert_into(documents::table)
            .values(document)
            .execute(conn)
    }

    /// Replaces a document only if its stored revision is still `expected_rev`.
    ///
    /// Returns the number of updated rows; `0` means the revision moved on.
    pub fn replace(
        conn: &mut SqliteConnection,
        expected_rev: &str,
        document: &NewDocument,
    ) -> QueryResult<usize> {
        diesel::update(
            documents::table
                .filter(documents::name.eq(document.name))
                .filter(documents::rev.eq(expected_rev)),
        )
        .set((
            documents::rev.eq(document.rev),
            documents::body.eq(document.body),
            documents::updated_at.eq(document.updated_at),
        ))
        .execute(conn)
    }

    pub fn delete(conn: &mut SqliteConnection, name: &str) -> QueryResult<usize> {
        diesel::delete(documents::table.filter(documents::name.eq(name))).execute(conn)
    }

    pub fn exists(conn: &mut SqliteConnection, name: &str) -> QueryResult<bool> {
        diesel::select(exists(documents::table.filter(documents::name.eq(name)))).get_result(conn)
    }

    pub fn count(conn: &mut SqliteConnection) -> QueryResult<i64> {
        documents::table.count().get_result(conn)
    }
}

pub struct CheckpointRepository;

impl CheckpointRepository {
    pub fn get(conn: &mut SqliteConnection, source: &str) -> QueryResult<Option<Checkpoint>> {
        checkpoints::table
            .filter(checkpoints::source.eq(source))
            .select(Checkpoint::as_select())
            .first(conn)
            .optional()
    }

    pub fn upsert(conn: &mut SqliteConnection, checkpoint: &NewCheckpoint) -> QueryResult<usize> {
        diesel::insert_into(checkpoints::table)
            .values(checkpoint)
            .on_conflict(checkpoints::source)
            .do_update()
            .set((
                checkpoints::seq.eq(checkpoint.seq),
                checkpoints::updated_at.eq(checkpoint.updated_at),
            ))
            .execute(conn)
    }
}

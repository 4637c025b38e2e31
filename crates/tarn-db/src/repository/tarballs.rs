//! Tarball database repository.

use diesel::{dsl::exists, prelude::*};

use crate::{
    models::tarballs::{NewTarball, Tarball},
    schema::tarballs::tarballs,
};

pub struct TarballRepository;

impl TarballRepository {
    pub fn find(conn: &mut SqliteConnection, id: &str) -> QueryResult<Option<Tarball>> {
        tarballs::table
            .filter(tarballs::id.eq(id))
            .select(Tarball::as_select())
            .first(conn)
            .optional()
    }

    /// Stores a tarball unless one with the same id already exists.
    ///
    /// Returns `1` when inserted and `0` when the existing record was kept.
    pub fn insert_or_ignore(
        conn: &mut SqliteConnection,
        tarball: &NewTarball,
    ) -> QueryResult<usize> {
        diesel::insert_into(tarballs::table)
            .values(tarball)
            .on_conflict_do_nothing()
            .execute(conn)
    }

    pub fn exists(conn: &mut SqliteConnection, id: &str) -> QueryResult<bool> {
        diesel::select(exists(tarballs::table.filter(tarballs::id.eq(id)))).get_result(conn)
    }

    pub fn count(conn: &mut SqliteConnection) -> QueryResult<i64> {
        tarballs::table.count().get_result(conn)
    }
}

use diesel::prelude::*;

use crate::schema::tarballs::tarballs;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = tarballs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Tarball {
    pub id: String,
    pub data: Vec<u8>,
    pub size: i64,
    pub created_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = tarballs)]
pub struct NewTarball<'a> {
    pub id: &'a str,
    pub data: &'a [u8],
    pub size: i64,
    pub created_at: &'a str,
}

use diesel::prelude::*;

use crate::schema::documents::{checkpoints, documents};

/// A stored package document. `body` is the serialized JSON document.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = documents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Document {
    pub name: String,
    pub rev: String,
    pub body: String,
    pub updated_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument<'a> {
    pub name: &'a str,
    pub rev: &'a str,
    pub body: &'a str,
    pub updated_at: &'a str,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = checkpoints)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Checkpoint {
    pub source: String,
    pub seq: String,
    pub updated_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = checkpoints)]
pub struct NewCheckpoint<'a> {
    pub source: &'a str,
    pub seq: &'a str,
    pub updated_at: &'a str,
}

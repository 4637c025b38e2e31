diesel::table! {
    tarballs (id) {
        id -> Text,
        data -> Binary,
        size -> BigInt,
        created_at -> Text,
    }
}

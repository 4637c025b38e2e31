diesel::table! {
    documents (name) {
        name -> Text,
        rev -> Text,
        body -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    checkpoints (source) {
        source -> Text,
        seq -> Text,
        updated_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(documents, checkpoints,);

diesel::table! {
    orders (id) {
        id -> Uuid,
        user_id -> Varchar,
        amount -> Int8,
        description -> Varchar,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

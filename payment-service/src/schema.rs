diesel::table! {
    accounts (user_id) {
        user_id -> Varchar,
        balance -> Int8,
    }
}

diesel::table! {
    payments (order_id) {
        order_id -> Uuid,
        user_id -> Varchar,
        amount -> Int8,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    accounts,
    payments,
);

diesel::table! {
    users (id) {
        id -> Integer,
        username -> Text,
        email -> Text,
        first_name -> Text,
        last_name -> Text,
        password_hash -> Text,
        is_active -> Bool,
        is_superuser -> Bool,
        date_joined -> Timestamp,
    }
}

diesel::table! {
    profiles (id) {
        id -> Integer,
        user_id -> Integer,
        role -> Text,                // admin | veterinarian | assistant | receptionist
        phone -> Nullable<Text>,
        address -> Nullable<Text>,
        theme -> Text,               // dark | light
    }
}

diesel::table! {
    audit_events (id) {
        id -> Integer,
        user_id -> Nullable<Integer>, // null for anonymous actions
        action -> Text,
        description -> Text,
        target_entity -> Nullable<Text>,
        target_id -> Nullable<Integer>,
        ip_address -> Nullable<Text>,
        user_agent -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    clients (id) {
        id -> Integer,
        last_name -> Text,
        first_name -> Text,
        phone -> Text,
        email -> Text,
    }
}

diesel::table! {
    animals (id) {
        id -> Integer,
        name -> Text,
        species -> Text,
        breed -> Text,
        age -> Integer,
        client_id -> Integer,
    }
}

diesel::table! {
    reservations (id) {
        id -> Integer,
        client_id -> Integer,
        animal_id -> Integer,
        scheduled_at -> Timestamp,
        service -> Text,
        status -> Text,
        note -> Nullable<Text>,
    }
}

diesel::table! {
    categories (id) {
        id -> Integer,
        name -> Text,
    }
}

diesel::table! {
    suppliers (id) {
        id -> Integer,
        name -> Text,
        phone -> Text,
        email -> Text,
        address -> Text,
    }
}

diesel::table! {
    products (id) {
        id -> Integer,
        name -> Text,
        category_id -> Integer,
        quantity -> Integer,
        price -> Double,
        added_on -> Date,
        expires_on -> Date,
        supplier_id -> Integer,
        description -> Nullable<Text>,
    }
}

diesel::table! {
    reports (id) {
        id -> Integer,
        user_id -> Nullable<Integer>,
        subject -> Text,
        message -> Text,
        sent_at -> Timestamp,
        recipient -> Text,
    }
}

diesel::joinable!(profiles -> users (user_id));
diesel::joinable!(audit_events -> users (user_id));
diesel::joinable!(animals -> clients (client_id));
diesel::joinable!(reservations -> clients (client_id));
diesel::joinable!(reservations -> animals (animal_id));
diesel::joinable!(products -> categories (category_id));
diesel::joinable!(products -> suppliers (supplier_id));
diesel::joinable!(reports -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    profiles,
    audit_events,
    clients,
    animals,
    reservations,
    categories,
    suppliers,
    products,
    reports,
);

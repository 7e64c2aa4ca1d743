// Mirrors the DDL in `db::SCHEMA`; the tables are created at runtime, not by diesel CLI.

diesel::table! {
    users (id) {
        id -> Integer,
        username -> Text,
        password_hash -> Text,
    }
}

diesel::table! {
    sensor_data (id) {
        id -> Integer,
        temperature -> Nullable<Double>,
        humidity -> Nullable<Double>,
        bpm -> Nullable<Double>,
        ir -> Nullable<Integer>,
        #[sql_name = "accX"]
        acc_x -> Nullable<Double>,
        #[sql_name = "accY"]
        acc_y -> Nullable<Double>,
        #[sql_name = "accZ"]
        acc_z -> Nullable<Double>,
        #[sql_name = "flameDigital"]
        flame_digital -> Nullable<Integer>,
        #[sql_name = "flameAnalog"]
        flame_analog -> Nullable<Integer>,
        #[sql_name = "gasDigital"]
        gas_digital -> Nullable<Integer>,
        #[sql_name = "gasAnalog"]
        gas_analog -> Nullable<Integer>,
        spo2 -> Nullable<Double>,
        timestamp -> BigInt,
        created_at -> Nullable<Timestamp>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(sensor_data, users);

mod versioned_schema;

pub use versioned_schema::{
    open_in_memory, open_versioned_database, Column, SqlType, Table, VersionedSchema,
    BASE_DB_VERSION,
};

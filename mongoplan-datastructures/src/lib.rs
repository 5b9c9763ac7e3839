pub mod unique_linked_hash_map;

pub use self::unique_linked_hash_map::{DuplicateKeyError, UniqueLinkedHashMap};

/// Hash map used for values and bookkeeping across the crate.
pub type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;

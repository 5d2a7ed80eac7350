//! Short ID allocation.
//!
//! IDs are 4 random bytes rendered as base58. The base58 alphabet leaves out
//! `0`, `O`, `I` and `l`, and contains nothing that needs escaping in a URL or
//! a file name. 32 bits keep IDs between 1 and 6 characters long while the
//! chance of a collision stays negligible for a store of realistic size.

use crate::error::{Result, StoreError};
use crate::index::RecordIndex;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, trace};

/// Number of random bytes behind every ID.
pub const ID_BYTES: usize = 4;

/// How many random IDs are drawn before allocation gives up.
pub const MAX_ID_ATTEMPTS: usize = 32;

/// Renders raw ID bytes as text.
pub fn encode_id(bytes: &[u8; ID_BYTES]) -> String {
    bs58::encode(bytes).into_string()
}

/// Checks whether `id` could have been issued by [`allocate_id`].
///
/// Everything handed to the blob store as a file name goes through this, so
/// strings like `../db` never reach the filesystem.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && bs58::decode(id)
            .into_vec()
            .map(|bytes| bytes.len() == ID_BYTES)
            .unwrap_or(false)
}

/// Draws random IDs until one is not present in `index`.
///
/// Each attempt costs one index read; nothing is written.
pub fn allocate_id(index: &dyn RecordIndex) -> Result<String> {
    allocate_id_with(index, &mut OsRng)
}

/// [`allocate_id`] with a caller-supplied random source.
pub fn allocate_id_with<R: RngCore + ?Sized>(index: &dyn RecordIndex, rng: &mut R) -> Result<String> {
    let mut buf = [0u8; ID_BYTES];

    for attempt in 1..=MAX_ID_ATTEMPTS {
        rng.try_fill_bytes(&mut buf)?;
        let id = encode_id(&buf);

        if index.get(&id)?.is_none() {
            trace!(id = %id, attempt, "Allocated item id");
            return Ok(id);
        }
        debug!(id = %id, attempt, "Drawn id is already in use, retrying");
    }

    Err(StoreError::AllocationExhausted {
        attempts: MAX_ID_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexError, MemoryIndex};
    use crate::item::Item;
    use chrono::{DateTime, Duration, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Index that claims every key is taken.
    #[derive(Default)]
    struct FullIndex {
        probes: AtomicUsize,
    }

    impl RecordIndex for FullIndex {
        fn get(&self, id: &str) -> std::result::Result<Option<Item>, IndexError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            let mut item = Item::expiring_in(Duration::hours(1));
            item.id = id.to_string();
            Ok(Some(item))
        }

        fn insert(&self, _item: &Item) -> std::result::Result<(), IndexError> {
            panic!("allocation must not write");
        }

        fn delete(&self, _id: &str) -> std::result::Result<bool, IndexError> {
            panic!("allocation must not write");
        }

        fn find_expired_before(
            &self,
            _cutoff: DateTime<Utc>,
        ) -> std::result::Result<Vec<Item>, IndexError> {
            Ok(Vec::new())
        }

        fn ids(&self) -> std::result::Result<Vec<String>, IndexError> {
            Ok(Vec::new())
        }

        fn close(&self) -> std::result::Result<(), IndexError> {
            Ok(())
        }
    }

    #[test]
    fn test_encode_id() {
        assert_eq!(encode_id(&[0, 0, 0, 0]), "1111");
        assert_eq!(encode_id(&[0xff, 0xff, 0xff, 0xff]), "7YXq9G");
    }

    #[test]
    fn test_is_valid_id() {
        assert!(is_valid_id(&encode_id(&[1, 2, 3, 4])));
        assert!(is_valid_id("1111"));

        assert!(!is_valid_id(""));
        assert!(!is_valid_id("../db"));
        assert!(!is_valid_id("0OIl"));
        assert!(!is_valid_id("abc")); // Decodes to fewer than 4 bytes
        assert!(!is_valid_id("7YXq9G7YXq9G"));
    }

    #[test]
    fn test_allocate_id_returns_fresh_valid_id() {
        let index = MemoryIndex::new();
        let id = allocate_id(&index).unwrap();

        assert!(is_valid_id(&id));
        assert!(id.len() <= 6);
    }

    #[test]
    fn test_allocate_id_skips_taken_ids() {
        let index = MemoryIndex::new();

        // Same seed, same sequence: the first draw is taken, the second is not
        let mut first = StdRng::seed_from_u64(7);
        let taken = allocate_id_with(&index, &mut first).unwrap();
        let mut item = Item::expiring_in(Duration::hours(1));
        item.id = taken.clone();
        index.insert(&item).unwrap();

        let mut replay = StdRng::seed_from_u64(7);
        let fresh = allocate_id_with(&index, &mut replay).unwrap();
        assert_ne!(fresh, taken);
    }

    #[test]
    fn test_allocate_id_gives_up_after_bound() {
        let index = FullIndex::default();

        let err = allocate_id(&index).unwrap_err();
        assert!(matches!(
            err,
            StoreError::AllocationExhausted { attempts: MAX_ID_ATTEMPTS }
        ));
        assert_eq!(index.probes.load(Ordering::SeqCst), MAX_ID_ATTEMPTS);
    }
}

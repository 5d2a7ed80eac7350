//! The stored Item record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for one stored upload.
///
/// The `id` is assigned by [`Store::put`](crate::Store::put); whatever the
/// caller puts there is overwritten. Items are immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Short ID, primary key in the record index and blob file name
    #[serde(default)]
    pub id: String,

    /// When this item was handed to the store
    pub created: DateTime<Utc>,

    /// After this instant the item is stale
    pub expires: DateTime<Utc>,

    /// Original file name, if the uploader sent one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// MIME type of the payload, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl Item {
    /// Creates an item that expires at the given instant.
    pub fn new(expires: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            created: Utc::now(),
            expires,
            filename: None,
            content_type: None,
        }
    }

    /// Creates an item that expires `ttl` from now.
    ///
    /// # Panics
    ///
    /// Panics if `now + ttl` is outside the range of `DateTime<Utc>`. Use
    /// [`Item::try_expiring_in`] for TTLs that come from user input.
    pub fn expiring_in(ttl: Duration) -> Self {
        Self::new(Utc::now() + ttl)
    }

    /// Creates an item that expires `ttl` from now, or `None` if that instant
    /// cannot be represented.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::Duration;
    /// use keepbox::Item;
    ///
    /// assert!(Item::try_expiring_in(Duration::days(7)).is_some());
    /// let far = Duration::try_days(100_000_000).unwrap();
    /// assert!(Item::try_expiring_in(far).is_none());
    /// ```
    pub fn try_expiring_in(ttl: Duration) -> Option<Self> {
        Utc::now().checked_add_signed(ttl).map(Self::new)
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Checks if this item is stale at `now` (expiry is inclusive).
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }

    /// Checks if this item is stale right now.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

//! Fixed-width minute bucketing

use super::update::SourcedUpdate;
use std::collections::BTreeMap;

/// Something placed on the device minute axis.
pub trait MinuteStamped {
    fn minute(&self) -> i64;
}

impl MinuteStamped for SourcedUpdate {
    fn minute(&self) -> i64 {
        self.timestamp.get() as i64
    }
}

impl<T: MinuteStamped> MinuteStamped for &T {
    fn minute(&self) -> i64 {
        (**self).minute()
    }
}

/// Key of the bucket holding `minute` for the given width.
pub fn bucket_key(minute: i64, minutes_denominator: u32) -> i64 {
    minute.div_euclid(minutes_denominator as i64)
}

/// Group `updates` into buckets of `minutes_denominator` minutes.
///
/// Keys are `floor(minute / minutes_denominator)`. Within a bucket, updates
/// keep their relative order from the input.
///
/// # Panics
///
/// Panics if `minutes_denominator` is zero.
pub fn bucketed<T>(updates: &[T], minutes_denominator: u32) -> BTreeMap<i64, Vec<T>>
where
    T: MinuteStamped + Clone,
{
    assert!(minutes_denominator > 0, "minutes_denominator must be positive");

    let mut buckets: BTreeMap<i64, Vec<T>> = BTreeMap::new();
    for update in updates {
        buckets
            .entry(bucket_key(update.minute(), minutes_denominator))
            .or_default()
            .push(update.clone());
    }
    buckets
}

/// Like [`bucketed`], with buckets kept separate per device.
///
/// # Panics
///
/// Panics if `minutes_denominator` is zero.
pub fn bucketed_by_device(
    updates: &[SourcedUpdate],
    minutes_denominator: u32,
) -> BTreeMap<(u64, i64), Vec<SourcedUpdate>> {
    assert!(minutes_denominator > 0, "minutes_denominator must be positive");

    let mut buckets: BTreeMap<(u64, i64), Vec<SourcedUpdate>> = BTreeMap::new();
    for update in updates {
        let key = (update.mac_address, bucket_key(update.minute(), minutes_denominator));
        buckets.entry(key).or_default().push(*update);
    }
    buckets
}

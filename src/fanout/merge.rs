//! Identity-keyed merging of record lists

use crate::model::PropertyRecord;
use std::collections::HashMap;

/// Merges record lists in the order given, keyed by record identity
///
/// On a collision the later record replaces the earlier one but keeps the
/// position where the identity was first seen. Records without an identity
/// are dropped.
pub fn merge_by_identity<I>(outputs: I) -> Vec<PropertyRecord>
where
    I: IntoIterator<Item = Vec<PropertyRecord>>,
{
    let mut merged: Vec<PropertyRecord> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut anonymous = 0usize;

    for records in outputs {
        for record in records {
            let Some(identity) = record.identity() else {
                anonymous += 1;
                continue;
            };

            match positions.get(&identity) {
                Some(&index) => merged[index] = record,
                None => {
                    positions.insert(identity, merged.len());
                    merged.push(record);
                }
            }
        }
    }

    if anonymous > 0 {
        tracing::debug!("Dropped {} records without an identity", anonymous);
    }

    merged
}

/// Removes duplicate identities from a single list, last occurrence winning
pub fn dedup_by_identity(records: Vec<PropertyRecord>) -> Vec<PropertyRecord> {
    merge_by_identity(std::iter::once(records))
}

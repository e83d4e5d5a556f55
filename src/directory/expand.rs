//! Expansion of user references (`alice`, `@admins`) into concrete
//! usernames. Pure: no locks, no directory access beyond the group map.

use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};

/// Expand a reference list into a sorted, deduplicated list of usernames.
///
/// A reference starting with `@` names a user group and contributes that
/// group's members; anything else is taken as a literal username. Groups
/// resolve exactly one level deep. The output depends only on the set of
/// references, not their order.
pub fn expand(references: &[String], groups: &HashMap<String, Vec<String>>) -> Result<Vec<String>> {
    let mut set = BTreeSet::new();
    for reference in references {
        match reference.strip_prefix('@') {
            Some(group) => {
                let Some(members) = groups.get(group) else {
                    return Err(Error::UnknownGroup { group: group.to_string() });
                };
                set.extend(members.iter().cloned());
            }
            None => {
                set.insert(reference.clone());
            }
        }
    }
    Ok(set.into_iter().collect())
}

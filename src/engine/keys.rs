//! Output key naming: lift the first two characters of the second path segment into their own level.

use anyhow::{Result, bail};

use crate::utils::config::KeyConsts;

/// `first/abcdef/rest` → `first/ab/cdef/rest`.
///
/// Inserts exactly one level and keeps every character of `key`, so the second segment must be
/// longer than the lifted level: `a/bc/d` would leave an empty segment behind (`a/bc//d`) and is
/// rejected like `a/bc`. Also errors when there is no second segment.
pub fn shard_key(key: &str) -> Result<String> {
    let Some((first, rest)) = key.split_once('/') else {
        bail!("key {key:?} has no second path segment");
    };
    let second = rest.split('/').next().unwrap_or_default();
    let level_len = match second.char_indices().nth(KeyConsts::SHARD_LEVEL_CHARS) {
        Some((i, _)) => i,
        None if second.chars().count() == KeyConsts::SHARD_LEVEL_CHARS => second.len(),
        None => bail!(
            "key {key:?}: second segment {second:?} is shorter than {} characters",
            KeyConsts::SHARD_LEVEL_CHARS
        ),
    };
    let (level, remainder) = rest.split_at(level_len);
    if remainder.is_empty() || remainder.starts_with('/') {
        bail!("key {key:?}: second segment {second:?} has nothing left after the {level:?} level");
    }
    Ok(format!("{first}/{level}/{remainder}"))
}

/// Metadata key for a source key: swap the source suffix for the metadata extension, then shard.
pub fn metadata_key(key: &str) -> Result<String> {
    let stem = key.strip_suffix(KeyConsts::SOURCE_SUFFIX).unwrap_or(key);
    shard_key(&format!("{stem}{}", KeyConsts::METADATA_EXT))
}

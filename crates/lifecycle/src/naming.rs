//! Physical resource names
//!
//! Provider-side names are built as `<stack>-<resource>-<short_id>` where the
//! short id is derived from the resource's random uuid, then shortened to the
//! provider's length limit if it has one.

use crate::error::{Error, Result};
use uuid::Uuid;

const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// 12-character lowercase base32 id built from the 60 random bits in the
/// time field of a v4 uuid.
pub fn short_id(source: &Uuid) -> Result<String> {
    let version = source.get_version_num();
    if version != 4 {
        return Err(Error::InvalidName {
            message: format!("Invalid UUID version ({version})"),
        });
    }

    let (time_low, time_mid, time_hi_version, _) = source.as_fields();
    let time = (u64::from(time_hi_version & 0x0fff) << 48)
        | (u64::from(time_mid) << 32)
        | u64::from(time_low);

    Ok((0..12)
        .map(|i| {
            let index = (time >> (55 - 5 * i)) & 0x1f;
            char::from(BASE32_ALPHABET[index as usize])
        })
        .collect())
}

/// Shorten `name` to at most `limit` characters.
///
/// Names that fit are returned untouched. Otherwise the first two characters
/// are kept, followed by `-` and the tail of the name, which carries the
/// unique short id.
pub fn reduce_physical_resource_name(name: &str, limit: usize) -> Result<String> {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= limit {
        return Ok(name.to_string());
    }

    if limit < 4 {
        return Err(Error::InvalidName {
            message: "limit cannot be less than 4".to_string(),
        });
    }

    let postfix_length = limit - 3;
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - postfix_length..].iter().collect();
    Ok(format!("{head}-{tail}"))
}

/// `<stack>-<name>-<short_id>`, reduced to `limit` when given.
pub fn physical_resource_name(
    stack_name: &str,
    name: &str,
    uuid: &Uuid,
    limit: Option<usize>,
) -> Result<String> {
    let full = format!("{stack_name}-{name}-{}", short_id(uuid)?);
    match limit {
        Some(limit) => reduce_physical_resource_name(&full, limit),
        None => Ok(full),
    }
}

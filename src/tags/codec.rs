//! Wire encoding for tag references.
//!
//! A tag is stored as a native Redis SET whose members reference the tagged
//! items. Three kinds of item share that single member value space:
//!
//! - a plain string key: the key bytes, unmodified;
//! - a hash field: `key ++ ":$_->_$:" ++ field`;
//! - a set / sorted-set / geo member: `key ++ ":$_-S>_$:" ++ serialized member`.
//!
//! Decoding locates the first occurrence of the hash separator, then the set
//! separator; absence of both means "plain key". The separators are sentinel
//! byte sequences chosen to be exceedingly unlikely inside a real key name.
//!
//! # Known limitation
//!
//! The separators are byte sequences, not structural delimiters. A key name
//! or serialized member that itself contains a separator sequence will
//! mis-split on decode. Keys must not contain the separator sequences; this
//! is an accepted constraint and is not enforced. The encoding is kept
//! byte-for-byte compatible with existing tag sets using the same scheme.

/// Prefix of every tag set key: `":$_tag_$:" + tag name`.
pub const TAG_KEY_PREFIX: &str = ":$_tag_$:";

/// Separator between key and field in a hash-field reference.
pub const HASH_SEPARATOR: &[u8] = b":$_->_$:";

/// Separator between key and serialized member in a set-member reference.
pub const SET_SEPARATOR: &[u8] = b":$_-S>_$:";

/// A decoded reference to a tagged item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagRef {
    /// A plain string key.
    Key(String),
    /// A field inside a hash key. The field is stored as raw string bytes.
    HashField { key: String, field: String },
    /// A member of a set, sorted set, or geo index. The member is stored as
    /// the serializer's byte output.
    SetMember { key: String, member: Vec<u8> },
}

impl TagRef {
    /// The Redis key this reference points at.
    pub fn key(&self) -> &str {
        match self {
            TagRef::Key(k) => k,
            TagRef::HashField { key, .. } => key,
            TagRef::SetMember { key, .. } => key,
        }
    }

    /// Encode into the single tag-set member value space.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            TagRef::Key(key) => key.as_bytes().to_vec(),
            TagRef::HashField { key, field } => {
                let mut out = Vec::with_capacity(key.len() + HASH_SEPARATOR.len() + field.len());
                out.extend_from_slice(key.as_bytes());
                out.extend_from_slice(HASH_SEPARATOR);
                out.extend_from_slice(field.as_bytes());
                out
            }
            TagRef::SetMember { key, member } => {
                let mut out = Vec::with_capacity(key.len() + SET_SEPARATOR.len() + member.len());
                out.extend_from_slice(key.as_bytes());
                out.extend_from_slice(SET_SEPARATOR);
                out.extend_from_slice(member);
                out
            }
        }
    }

    /// Decode a tag-set member. Pure and infallible: unrecognized bytes are
    /// a plain key reference by definition.
    pub fn decode(bytes: &[u8]) -> TagRef {
        if let Some(pos) = find(bytes, HASH_SEPARATOR) {
            let key = String::from_utf8_lossy(&bytes[..pos]).into_owned();
            let field =
                String::from_utf8_lossy(&bytes[pos + HASH_SEPARATOR.len()..]).into_owned();
            return TagRef::HashField { key, field };
        }
        if let Some(pos) = find(bytes, SET_SEPARATOR) {
            let key = String::from_utf8_lossy(&bytes[..pos]).into_owned();
            let member = bytes[pos + SET_SEPARATOR.len()..].to_vec();
            return TagRef::SetMember { key, member };
        }
        TagRef::Key(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Build the full tag set key for a tag name, honoring the application
/// key prefix.
pub fn tag_set_key(app_prefix: &str, tag_name: &str) -> String {
    format!("{}{}{}", app_prefix, TAG_KEY_PREFIX, tag_name)
}

/// Extract the tag name back out of a tag set key, or `None` if the key is
/// not a tag key under this prefix.
pub fn tag_name_from_key<'a>(app_prefix: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(app_prefix)?.strip_prefix(TAG_KEY_PREFIX)
}

/// First occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub mod logs;
pub mod status;
pub mod sync;

/// Query strings are read as raw pairs so a repeated or unknown key never turns into a rejection.
/// The first occurrence of a key wins.
pub(crate) fn first_value(pairs: &[(String, String)], key: &str) -> Option<String> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
}

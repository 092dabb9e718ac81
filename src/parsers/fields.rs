//! Soft conversions from raw upstream text to typed column values.
//!
//! Every function here fails to `None` instead of erroring: a malformed upstream field must end up
//! as an absent value in the mirror, never as garbage and never as an aborted step.

/// Trimmed text cut to `max_len` characters; empty becomes `None`.
pub fn string(raw: Option<&str>, max_len: usize) -> Option<String> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }
    Some(s.chars().take(max_len).collect())
}

pub fn integer(raw: Option<&str>) -> Option<i64> {
    raw?.trim().parse().ok()
}

/// Record identifier. Upstream writes `0` for an unset id, so zero counts as missing.
pub fn key(raw: Option<&str>) -> Option<i64> {
    integer(raw).filter(|id| *id != 0)
}

/// Upstream monthly planning flags are `1` for a planned month, anything else otherwise.
pub fn flag(raw: Option<&str>) -> bool {
    integer(raw) == Some(1)
}

/// `DD/MM/YYYY` or `YYYYMMDD` to `YYYY-MM-DD`. An input that is already ten characters with a `-`
/// passes through; everything else is rejected.
pub fn date(raw: Option<&str>) -> Option<String> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }

    if s.contains('/') {
        let parts: Vec<&str> = s.split('/').collect();
        return match parts.as_slice() {
            [day, month, year] if is_digits(day, 1, 2) && is_digits(month, 1, 2) && is_digits(year, 4, 4) => {
                Some(format!("{}-{:0>2}-{:0>2}", year, month, day))
            }
            _ => None,
        };
    }

    if let Some(compact) = compact_date(s) {
        return Some(compact);
    }

    if s.chars().count() == 10 && s.contains('-') {
        Some(s.to_string())
    } else {
        None
    }
}

/// `YYYYMMDD` only, as used by the visit-date columns of the supplemental feed.
pub fn compact_date(raw: &str) -> Option<String> {
    let s = raw.trim();
    if !is_digits(s, 8, 8) {
        return None;
    }
    Some(format!("{}-{}-{}", &s[..4], &s[4..6], &s[6..8]))
}

/// `HH:MM[:SS]` to `HH:MM:00`. Upstream seconds are not trusted.
pub fn time(raw: Option<&str>) -> Option<String> {
    let s = raw?.trim();
    let mut parts = s.split(':');
    let (hours, minutes) = (parts.next()?, parts.next()?);
    if !is_digits(hours, 1, 2) || !is_digits(minutes, 1, 2) {
        return None;
    }
    Some(format!("{:0>2}:{:0>2}:00", hours, minutes))
}

fn is_digits(s: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}

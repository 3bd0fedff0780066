// [libs/core/keyspace/src/mask.rs]
/*!
 * Mask combinatorics: computes the base keyspace of a hashcat-style mask
 * string as the product of each position's charset size.
 *
 * Built-in charsets mirror the cracking engine's conventions:
 *   ?l lowercase (26)   ?u uppercase (26)   ?d digits (10)
 *   ?s punctuation (33) ?a = l+u+d+s (95)   ?b all bytes (256)
 * `?1`-`?4` are custom charsets, supplied by the caller (the job config
 * carries them; this crate has no opinion on where they come from).
 */

use crate::errors::KeyspaceError;
use std::collections::HashMap;

fn builtin_charset_size(token: char) -> Option<u128> {
    match token {
        'l' => Some(26),
        'u' => Some(26),
        'd' => Some(10),
        's' => Some(33),
        'a' => Some(95),
        'b' => Some(256),
        _ => None,
    }
}

/// Computes the number of candidate passwords a mask can generate.
///
/// `custom_charsets` maps `'1'..='4'` to the literal charset string the job
/// supplied for that position (e.g. `-1 '?l?d'` style definitions, already
/// expanded to a flat character list by the caller).
pub fn mask_keyspace(
    mask: &str,
    custom_charsets: &HashMap<char, String>,
) -> Result<u128, KeyspaceError> {
    let bytes: Vec<char> = mask.chars().collect();
    let mut total: u128 = 1;
    let mut i = 0;

    while i < bytes.len() {
        let ch = bytes[i];
        if ch == '?' {
            let token = *bytes.get(i + 1).ok_or(KeyspaceError::InvalidMaskToken(i))?;
            let size = if let Some(builtin) = builtin_charset_size(token) {
                builtin
            } else if token.is_ascii_digit() && ('1'..='4').contains(&token) {
                let custom = custom_charsets
                    .get(&token)
                    .ok_or(KeyspaceError::UndefinedCustomCharset(token))?;
                custom.chars().count() as u128
            } else {
                return Err(KeyspaceError::InvalidMaskToken(i));
            };

            total = total.checked_mul(size).ok_or(KeyspaceError::Overflow)?;
            i += 2;
        } else {
            // Literal character: contributes exactly one candidate value per position.
            i += 1;
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_digit_mask() {
        let empty = HashMap::new();
        assert_eq!(mask_keyspace("?d?d?d?d", &empty).unwrap(), 10_000);
    }

    #[test]
    fn mixed_literal_and_charset() {
        let empty = HashMap::new();
        // "password" + 2 digits: literal chars contribute factor 1 each.
        assert_eq!(mask_keyspace("password?d?d", &empty).unwrap(), 100);
    }

    #[test]
    fn all_charset_is_ninety_five() {
        let empty = HashMap::new();
        assert_eq!(mask_keyspace("?a", &empty).unwrap(), 95);
    }

    #[test]
    fn custom_charset_lookup() {
        let mut custom = HashMap::new();
        custom.insert('1', "abc".to_string());
        assert_eq!(mask_keyspace("?1?1", &custom).unwrap(), 9);
    }

    #[test]
    fn missing_custom_charset_errors() {
        let empty = HashMap::new();
        assert_eq!(
            mask_keyspace("?1", &empty).unwrap_err(),
            KeyspaceError::UndefinedCustomCharset('1')
        );
    }

    #[test]
    fn dangling_question_mark_errors() {
        let empty = HashMap::new();
        assert!(matches!(
            mask_keyspace("?d?", &empty),
            Err(KeyspaceError::InvalidMaskToken(_))
        ));
    }
}

// [libs/domain/models/src/hash.rs]
/*!
 * Hash domain model, the target of a crack pipeline. Carries the
 * normalization policy recorded in DESIGN.md's Open Question log:
 * lower-case hex, with `username:` / `domain\` wrapper prefixes stripped
 * before comparison, so a hash stored post-normalization always matches a
 * normalized incoming crack line.
 */

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hash {
    pub id: Uuid,
    pub hash_value: String,
    pub username: Option<String>,
    pub domain: Option<String>,
    pub hash_algorithm_id: u32,
    pub is_cracked: bool,
    pub plaintext: Option<String>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl Hash {
    /// Canonicalizes a raw hash value for matching: lower-cases hex content
    /// and strips a `user:`/`DOMAIN\` wrapper prefix, if present, before the
    /// actual hash material. Hash-format variants (NTLM vs. NetNTLMv2, etc.)
    /// all funnel through this one policy so upload-time storage and
    /// crack-time ingestion agree on a canonical form.
    pub fn normalize(raw: &str) -> String {
        let trimmed = raw.trim();

        // Strip a domain\ prefix (NetNTLM-style) if present.
        let without_domain = match trimmed.rsplit_once('\\') {
            Some((_, rest)) => rest,
            None => trimmed,
        };

        // Strip a user:domain: or user: prefix, keeping the final colon-delimited
        // field, which is always the actual hash material in the supported wire
        // formats (username:hash, username:domain:hash).
        let hash_field = without_domain.rsplit(':').next().unwrap_or(without_domain);

        hash_field.to_ascii_lowercase()
    }

    pub fn matches_normalized(&self, candidate_raw: &str) -> bool {
        Self::normalize(&self.hash_value) == Self::normalize(candidate_raw)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hashlist {
    pub id: Uuid,
    pub name: String,
    pub hash_algorithm_id: u32,
    pub total_count: u64,
    pub cracked_count: u64,
    pub exclude_from_potfile: bool,
}

impl Hashlist {
    pub fn is_fully_cracked(&self) -> bool {
        self.total_count > 0 && self.cracked_count >= self.total_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_hex() {
        assert_eq!(Hash::normalize("DEADBEEF"), "deadbeef");
    }

    #[test]
    fn normalize_strips_username_prefix() {
        assert_eq!(Hash::normalize("admin:DEADBEEF"), "deadbeef");
    }

    #[test]
    fn normalize_strips_domain_and_username_prefix() {
        assert_eq!(Hash::normalize("CORP\\admin:DEADBEEF"), "deadbeef");
    }

    #[test]
    fn matches_normalized_is_case_insensitive() {
        let hash = Hash {
            id: Uuid::new_v4(),
            hash_value: "deadbeef".into(),
            username: None,
            domain: None,
            hash_algorithm_id: 1000,
            is_cracked: false,
            plaintext: None,
            last_updated: chrono::Utc::now(),
        };
        assert!(hash.matches_normalized("admin:DEADBEEF"));
        assert!(!hash.matches_normalized("admin:CAFEBABE"));
    }

    #[test]
    fn fully_cracked_requires_nonzero_total() {
        let hashlist = Hashlist {
            id: Uuid::new_v4(),
            name: "test".into(),
            hash_algorithm_id: 1000,
            total_count: 0,
            cracked_count: 0,
            exclude_from_potfile: false,
        };
        assert!(!hashlist.is_fully_cracked());
    }
}

// [libs/infra/db/src/repositories/hash_repository.rs]
/*!
 * Persistence for hashlists and hashes, including idempotent crack
 * ingestion: a crack line replayed by the at-least-once outbox delivery
 * must not double-count a hashlist's `cracked_count`.
 */

use crate::errors::DbError;
use crate::DbClient;
use libsql::{params, Row};
use prospector_domain_models::hash::{Hash, Hashlist};
use tracing::{info, instrument};
use uuid::Uuid;

pub struct HashRepository {
    client: DbClient,
}

impl HashRepository {
    pub fn new(client: DbClient) -> Self {
        Self { client }
    }

    pub async fn create_hashlist(&self, hashlist: &Hashlist) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        connection
            .execute(
                "INSERT INTO hashlists (id, name, hash_algorithm_id, total_count, cracked_count, exclude_from_potfile)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    hashlist.id.to_string(),
                    hashlist.name.clone(),
                    hashlist.hash_algorithm_id as i64,
                    hashlist.total_count as i64,
                    hashlist.cracked_count as i64,
                    if hashlist.exclude_from_potfile { 1 } else { 0 },
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn fetch_hashlist(&self, id: Uuid) -> Result<Hashlist, DbError> {
        let connection = self.client.connection()?;
        let mut rows = connection.query("SELECT * FROM hashlists WHERE id = ?1", params![id.to_string()]).await?;
        let row = rows.next().await?.ok_or(DbError::MappingError(format!("hashlist {id} not found")))?;
        Ok(Hashlist {
            id,
            name: row.get(1)?,
            hash_algorithm_id: {
                let v: i64 = row.get(2)?;
                v as u32
            },
            total_count: {
                let v: i64 = row.get(3)?;
                v as u64
            },
            cracked_count: {
                let v: i64 = row.get(4)?;
                v as u64
            },
            exclude_from_potfile: row.get(5)?,
        })
    }

    /// Inserts a batch of hashes under a hashlist, skipping any whose
    /// normalized value already exists (the unique index on
    /// `(hashlist_id, normalized_value)` makes this safe to retry).
    #[instrument(skip(self, hashes))]
    pub async fn bulk_insert(&self, hashlist_id: Uuid, hashes: &[Hash]) -> Result<u64, DbError> {
        let connection = self.client.connection()?;
        let mut inserted = 0;
        for hash in hashes {
            let normalized = Hash::normalize(&hash.hash_value);
            let affected = connection
                .execute(
                    "INSERT OR IGNORE INTO hashes (
                        id, hashlist_id, hash_value, normalized_value, username, domain,
                        hash_algorithm_id, is_cracked, plaintext
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        hash.id.to_string(),
                        hashlist_id.to_string(),
                        hash.hash_value.clone(),
                        normalized,
                        hash.username.clone(),
                        hash.domain.clone(),
                        hash.hash_algorithm_id as i64,
                        if hash.is_cracked { 1 } else { 0 },
                        hash.plaintext.clone(),
                    ],
                )
                .await?;
            inserted += affected;
        }
        connection
            .execute(
                "UPDATE hashlists SET total_count = (SELECT COUNT(*) FROM hashes WHERE hashlist_id = ?1) WHERE id = ?1",
                params![hashlist_id.to_string()],
            )
            .await?;
        Ok(inserted)
    }

    /// Idempotent crack recording: a normalized hash is only recorded once,
    /// and the hashlist's `cracked_count` only advances on that first
    /// recording. Replaying the same crack line through at-least-once
    /// delivery is therefore a no-op on the second and later deliveries.
    #[instrument(skip(self, plaintext))]
    pub async fn record_crack(
        &self,
        hashlist_id: Uuid,
        raw_hash: &str,
        plaintext: &str,
        cracked_by_chunk_id: Uuid,
    ) -> Result<bool, DbError> {
        let normalized = Hash::normalize(raw_hash);
        let connection = self.client.connection()?;
        let affected = connection
            .execute(
                "UPDATE hashes
                 SET is_cracked = 1, plaintext = ?3, cracked_by_chunk_id = ?4, last_updated = CURRENT_TIMESTAMP
                 WHERE hashlist_id = ?1 AND normalized_value = ?2 AND is_cracked = 0",
                params![
                    hashlist_id.to_string(),
                    normalized,
                    plaintext,
                    cracked_by_chunk_id.to_string(),
                ],
            )
            .await?;

        if affected > 0 {
            connection
                .execute(
                    "UPDATE hashlists SET cracked_count = cracked_count + 1 WHERE id = ?1",
                    params![hashlist_id.to_string()],
                )
                .await?;
            info!(hashlist_id = %hashlist_id, "hash cracked and recorded");
        }
        Ok(affected > 0)
    }

    pub async fn count_uncracked(&self, hashlist_id: Uuid) -> Result<u64, DbError> {
        let connection = self.client.connection()?;
        let mut rows = connection
            .query(
                "SELECT COUNT(*) FROM hashes WHERE hashlist_id = ?1 AND is_cracked = 0",
                params![hashlist_id.to_string()],
            )
            .await?;
        let row = rows.next().await?.ok_or(DbError::MappingError("count query returned no row".into()))?;
        let count: i64 = row.get(0)?;
        Ok(count as u64)
    }

    pub async fn list_uncracked(&self, hashlist_id: Uuid) -> Result<Vec<Hash>, DbError> {
        let connection = self.client.connection()?;
        let mut rows = connection
            .query(
                "SELECT id, hash_value, username, domain, hash_algorithm_id, is_cracked, plaintext, last_updated
                 FROM hashes WHERE hashlist_id = ?1 AND is_cracked = 0",
                params![hashlist_id.to_string()],
            )
            .await?;
        let mut hashes = Vec::new();
        while let Some(row) = rows.next().await? {
            hashes.push(map_row_to_hash(&row)?);
        }
        Ok(hashes)
    }
}

fn map_row_to_hash(row: &Row) -> Result<Hash, DbError> {
    let id: String = row.get(0)?;
    let hash_value: String = row.get(1)?;
    let username: Option<String> = row.get(2)?;
    let domain: Option<String> = row.get(3)?;
    let hash_algorithm_id: i64 = row.get(4)?;
    let is_cracked: bool = row.get(5)?;
    let plaintext: Option<String> = row.get(6)?;
    let last_updated: String = row.get(7)?;

    Ok(Hash {
        id: Uuid::parse_str(&id).map_err(|e| DbError::MappingError(e.to_string()))?,
        hash_value,
        username,
        domain,
        hash_algorithm_id: hash_algorithm_id as u32,
        is_cracked,
        plaintext,
        last_updated: crate::parse_timestamp(&last_updated)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hashlist() -> Hashlist {
        Hashlist {
            id: Uuid::new_v4(),
            name: "engagement-42".into(),
            hash_algorithm_id: 1000,
            total_count: 0,
            cracked_count: 0,
            exclude_from_potfile: false,
        }
    }

    fn sample_hash() -> Hash {
        Hash {
            id: Uuid::new_v4(),
            hash_value: "DEADBEEF".into(),
            username: Some("admin".into()),
            domain: None,
            hash_algorithm_id: 1000,
            is_cracked: false,
            plaintext: None,
            last_updated: chrono::Utc::now(),
        }
    }

    async fn repo_over_memory() -> HashRepository {
        let client = DbClient::connect(":memory:", None).await.unwrap();
        HashRepository::new(client)
    }

    #[tokio::test]
    async fn recording_a_crack_advances_cracked_count_once() {
        let repo = repo_over_memory().await;
        let hashlist = sample_hashlist();
        repo.create_hashlist(&hashlist).await.unwrap();
        repo.bulk_insert(hashlist.id, &[sample_hash()]).await.unwrap();

        let first = repo.record_crack(hashlist.id, "deadbeef", "hunter2", Uuid::new_v4()).await.unwrap();
        assert!(first);
        let replay = repo.record_crack(hashlist.id, "DEADBEEF", "hunter2", Uuid::new_v4()).await.unwrap();
        assert!(!replay);

        let fetched = repo.fetch_hashlist(hashlist.id).await.unwrap();
        assert_eq!(fetched.cracked_count, 1);
    }

    #[tokio::test]
    async fn bulk_insert_is_idempotent_on_retry() {
        let repo = repo_over_memory().await;
        let hashlist = sample_hashlist();
        repo.create_hashlist(&hashlist).await.unwrap();

        let hash = sample_hash();
        repo.bulk_insert(hashlist.id, &[hash.clone()]).await.unwrap();
        repo.bulk_insert(hashlist.id, &[hash]).await.unwrap();

        let remaining = repo.count_uncracked(hashlist.id).await.unwrap();
        assert_eq!(remaining, 1);
    }
}

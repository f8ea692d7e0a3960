use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::User;

pub const DOWNLINE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Time-boxed downline read cache, keyed by user id.
///
/// The transitive-closure walk behind a dashboard view is O(tree size), so
/// reads are served from here for up to [`DOWNLINE_CACHE_TTL`]. Write paths
/// that change a user's downline (edge creation, team-size write-back) call
/// [`DownlineCache::invalidate`] for every affected key.
pub struct DownlineCache {
    ttl: Duration,
    entries: RwLock<HashMap<Uuid, (Instant, Vec<User>)>>,
}

impl DownlineCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, user_id: &Uuid) -> Option<Vec<User>> {
        let entries = self.entries.read().await;
        match entries.get(user_id) {
            Some((stored_at, users)) if stored_at.elapsed() < self.ttl => Some(users.clone()),
            _ => None,
        }
    }

    pub async fn put(&self, user_id: Uuid, users: Vec<User>) {
        let mut entries = self.entries.write().await;
        entries.insert(user_id, (Instant::now(), users));
    }

    pub async fn invalidate(&self, user_id: &Uuid) {
        let mut entries = self.entries.write().await;
        entries.remove(user_id);
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }
}

impl Default for DownlineCache {
    fn default() -> Self {
        Self::new(DOWNLINE_CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::Utc;

    fn sample_user(id: Uuid) -> User {
        User {
            id,
            name: "Test".to_string(),
            email: format!("{}@example.com", id),
            phone: None,
            referral_code: "ABCDEFGH12345678".to_string(),
            sponsor_id: None,
            direct_referrals: 0,
            total_team_size: 0,
            level_income: BigDecimal::from(0),
            sponsor_income: BigDecimal::from(0),
            profit_share: BigDecimal::from(0),
            is_admin: false,
            status: "active".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn serves_fresh_entries() {
        let cache = DownlineCache::new(Duration::from_secs(60));
        let key = Uuid::new_v4();
        cache.put(key, vec![sample_user(Uuid::new_v4())]).await;

        let hit = cache.get(&key).await;
        assert_eq!(hit.map(|v| v.len()), Some(1));
    }

    #[tokio::test]
    async fn misses_after_ttl() {
        let cache = DownlineCache::new(Duration::from_millis(10));
        let key = Uuid::new_v4();
        cache.put(key, vec![]).await;

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn invalidation_removes_entry() {
        let cache = DownlineCache::new(Duration::from_secs(60));
        let key = Uuid::new_v4();
        cache.put(key, vec![]).await;

        cache.invalidate(&key).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn unknown_key_misses() {
        let cache = DownlineCache::default();
        assert!(cache.get(&Uuid::new_v4()).await.is_none());
    }
}

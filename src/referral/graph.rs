use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{ReferralEdge, User};
use crate::db::queries;
use crate::domain::{UserStatus, generate_referral_code};
use crate::error::AppError;
use crate::referral::cache::DownlineCache;
use crate::referral::retry;
use crate::validation;

const REFERRAL_CODE_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamCounts {
    pub direct: i64,
    pub total: i64,
}

/// In-memory index over the flat parent-pointer edge records.
///
/// The store has no graph capability, so every aggregate pass snapshots the
/// edge set once and walks this index with explicit stacks and visited sets:
/// bounded depth, guaranteed termination on corrupt (cyclic) data, and
/// diamonds counted once even though the one-sponsor invariant should make
/// them impossible.
pub struct AdjacencyIndex {
    children: HashMap<Uuid, Vec<Uuid>>,
    parent: HashMap<Uuid, Uuid>,
}

impl AdjacencyIndex {
    pub fn from_edges(edges: &[(Uuid, Uuid)]) -> Self {
        let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut parent = HashMap::new();

        for &(sponsor_id, referred_id) in edges {
            children.entry(sponsor_id).or_default().push(referred_id);
            parent.insert(referred_id, sponsor_id);
        }

        Self { children, parent }
    }

    pub fn sponsor_of(&self, user_id: Uuid) -> Option<Uuid> {
        self.parent.get(&user_id).copied()
    }

    pub fn direct_count(&self, user_id: Uuid) -> i64 {
        self.children.get(&user_id).map_or(0, |c| c.len() as i64)
    }

    /// Direct-referral count and total transitive downline size.
    ///
    /// total == direct + Σ total(child) on a well-formed tree; computed here
    /// as a reachability count so a revisit (diamond or cycle) contributes
    /// exactly once.
    pub fn team_counts(&self, user_id: Uuid) -> TeamCounts {
        let mut visited = HashSet::new();
        visited.insert(user_id);

        let mut total = 0i64;
        let mut stack = vec![user_id];

        while let Some(current) = stack.pop() {
            if let Some(children) = self.children.get(&current) {
                for &child in children {
                    if visited.insert(child) {
                        total += 1;
                        stack.push(child);
                    }
                }
            }
        }

        TeamCounts {
            direct: self.direct_count(user_id),
            total,
        }
    }

    /// Upward sponsor chain (nearest first), visited-guarded so a corrupt
    /// cycle terminates instead of looping.
    pub fn ancestors(&self, user_id: Uuid) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        seen.insert(user_id);

        let mut chain = Vec::new();
        let mut current = user_id;

        while let Some(sponsor) = self.sponsor_of(current) {
            if !seen.insert(sponsor) {
                tracing::error!("cycle detected in sponsor chain at user {}", sponsor);
                break;
            }
            chain.push(sponsor);
            current = sponsor;
        }

        chain
    }

    pub fn is_ancestor(&self, candidate: Uuid, of: Uuid) -> bool {
        self.ancestors(of).contains(&candidate)
    }
}

/// Maintains the sponsor→referral adjacency relation and the per-user team
/// aggregates derived from it.
pub struct ReferralGraphService {
    pool: PgPool,
    cache: Arc<DownlineCache>,
}

#[derive(Debug, Clone)]
pub struct RegistrationInput {
    /// Issued by the external identity provider; we never mint user ids.
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub sponsor_referral_code: String,
}

impl ReferralGraphService {
    pub fn new(pool: PgPool, cache: Arc<DownlineCache>) -> Self {
        Self { pool, cache }
    }

    /// Register a new user under a sponsor resolved from a referral code.
    ///
    /// The user row, wallet, and referral edge are written in one database
    /// transaction: a failed registration leaves no orphaned user. The
    /// sponsor chain's team sizes are recomputed after commit.
    pub async fn register(&self, input: RegistrationInput) -> Result<User, AppError> {
        let name = validation::sanitize_string(&input.name);
        validation::validate_required("name", &name)?;
        validation::validate_max_len("name", &name, validation::NAME_MAX_LEN)?;
        validation::validate_email(&input.email)?;
        if let Some(phone) = &input.phone {
            validation::validate_phone(phone)?;
        }
        validation::validate_referral_code(&input.sponsor_referral_code)?;

        let sponsor_code = validation::sanitize_string(&input.sponsor_referral_code);
        let sponsor = queries::get_user_by_referral_code(&self.pool, &sponsor_code)
            .await?
            .ok_or_else(|| {
                AppError::Validation("invalid sponsor referral code".to_string())
            })?;

        if sponsor.status == UserStatus::Banned.as_str() {
            return Err(AppError::Validation(
                "invalid sponsor referral code".to_string(),
            ));
        }

        if sponsor.id == input.user_id {
            return Err(AppError::Validation(
                "a user cannot sponsor themselves".to_string(),
            ));
        }

        // A fresh user has no downline, but the edge insert below must never
        // make the registrant its own ancestor if called with recycled ids.
        let edges = queries::fetch_all_edges(&self.pool).await?;
        let index = AdjacencyIndex::from_edges(&edges);
        if index.is_ancestor(input.user_id, sponsor.id) {
            return Err(AppError::Validation(
                "registration would create a referral cycle".to_string(),
            ));
        }

        let referral_code = self.unique_referral_code().await?;
        let now = Utc::now();
        let user = User {
            id: input.user_id,
            name,
            email: validation::sanitize_string(&input.email),
            phone: input.phone.as_deref().map(validation::sanitize_string),
            referral_code,
            sponsor_id: Some(sponsor.id),
            direct_referrals: 0,
            total_team_size: 0,
            level_income: BigDecimal::from(0),
            sponsor_income: BigDecimal::from(0),
            profit_share: BigDecimal::from(0),
            is_admin: false,
            status: UserStatus::Active.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;
        let created = queries::insert_user(&mut tx, &user).await.map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Validation("email already registered".to_string())
            } else {
                AppError::Database(e)
            }
        })?;
        queries::insert_wallet(&mut tx, created.id).await?;
        Self::create_referral(&mut tx, created.id, sponsor.id).await?;
        tx.commit().await?;

        tracing::info!(
            "registered user {} under sponsor {} ({})",
            created.id,
            sponsor.id,
            sponsor.referral_code
        );

        self.recompute_team_size(sponsor.id).await?;

        Ok(created)
    }

    /// Insert the single immutable sponsor→referred edge. The UNIQUE
    /// constraint on referred_id enforces the one-sponsor invariant; a
    /// second edge for the same user surfaces as a validation error.
    async fn create_referral(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        new_user_id: Uuid,
        sponsor_id: Uuid,
    ) -> Result<ReferralEdge, AppError> {
        let edge = ReferralEdge {
            id: Uuid::new_v4(),
            sponsor_id,
            referred_id: new_user_id,
            level: 1,
            created_at: Utc::now(),
        };

        queries::insert_referral_edge(tx, &edge).await.map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Validation("user already has a sponsor".to_string())
            } else {
                AppError::Database(e)
            }
        })
    }

    /// Recompute direct/total team sizes for `user_id` and every ancestor,
    /// from one consistent edge snapshot, writing all counts back in a
    /// single database transaction. Returns the user's total team size.
    ///
    /// Recomputations run one at a time behind an advisory lock. The counts
    /// written back are absolute, so two concurrent recomputes over
    /// overlapping chains would otherwise race under READ COMMITTED: one
    /// could snapshot the edges before the other's edge commits and then
    /// overwrite the fresher counts with stale ones. With the lock, the
    /// recompute that runs last sees every edge committed before it and
    /// leaves the chain correct.
    pub async fn recompute_team_size(&self, user_id: Uuid) -> Result<i64, AppError> {
        let mut tx = self.pool.begin().await?;
        queries::lock_team_recompute(&mut tx).await?;
        let edges = queries::fetch_all_edges_tx(&mut tx).await?;
        let index = AdjacencyIndex::from_edges(&edges);

        let mut chain = vec![user_id];
        chain.extend(index.ancestors(user_id));

        let mut user_total = 0i64;
        for (i, &member) in chain.iter().enumerate() {
            let counts = index.team_counts(member);
            if i == 0 {
                user_total = counts.total;
            }

            let updated =
                queries::update_team_counts(&mut tx, member, counts.direct, counts.total).await?;
            if !updated {
                // Dangling edge: the chain references a user document that
                // no longer resolves. Contribute nothing for it and keep
                // going so one bad edge cannot poison the whole aggregate.
                tracing::error!(
                    "team-size write-back skipped: user {} referenced by an edge is missing",
                    member
                );
            }
        }

        tx.commit().await?;

        for member in &chain {
            self.cache.invalidate(member).await;
        }

        Ok(user_total)
    }

    /// Direct downline, annotated with each member's persisted counts.
    /// Served through the 5-minute cache; on a transient read failure the
    /// fetch retries with exponential backoff before surfacing an error.
    pub async fn direct_downline(&self, user_id: Uuid) -> Result<Vec<User>, AppError> {
        if let Some(hit) = self.cache.get(&user_id).await {
            return Ok(hit);
        }

        let users = retry::with_backoff(
            retry::DEFAULT_ATTEMPTS,
            retry::DEFAULT_BASE_DELAY,
            || queries::direct_downline_users(&self.pool, user_id),
        )
        .await?;

        self.cache.put(user_id, users.clone()).await;
        Ok(users)
    }

    /// Transitive closure of the downline. Breadth-first over the direct
    /// reads (each level served from the same cache), visited set for
    /// termination and against double-counting.
    ///
    /// This enumeration is a read-only projection for display; the
    /// authoritative total team size is the one recomputed and persisted by
    /// [`ReferralGraphService::recompute_team_size`].
    pub async fn all_downline(&self, user_id: Uuid) -> Result<Vec<User>, AppError> {
        let mut visited = HashSet::new();
        visited.insert(user_id);

        let mut queue = VecDeque::new();
        queue.push_back(user_id);

        let mut members = Vec::new();
        while let Some(current) = queue.pop_front() {
            let direct = self.direct_downline(current).await?;
            for member in direct {
                if visited.insert(member.id) {
                    queue.push_back(member.id);
                    members.push(member);
                }
            }
        }

        Ok(members)
    }

    async fn unique_referral_code(&self) -> Result<String, AppError> {
        for _ in 0..REFERRAL_CODE_RETRIES {
            let code = generate_referral_code();
            if queries::get_user_by_referral_code(&self.pool, &code)
                .await?
                .is_none()
            {
                return Ok(code);
            }
        }

        Err(AppError::Internal(
            "could not allocate a unique referral code".to_string(),
        ))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn empty_index_returns_zero_counts() {
        let index = AdjacencyIndex::from_edges(&[]);
        let counts = index.team_counts(Uuid::new_v4());

        assert_eq!(counts, TeamCounts { direct: 0, total: 0 });
    }

    #[test]
    fn leaf_user_has_zero_counts_without_recursing() {
        let u = ids(2);
        let index = AdjacencyIndex::from_edges(&[(u[0], u[1])]);

        assert_eq!(index.team_counts(u[1]), TeamCounts { direct: 0, total: 0 });
    }

    #[test]
    fn counts_match_reference_scenario() {
        // A refers B; B refers C and D.
        let u = ids(4);
        let (a, b, c, d) = (u[0], u[1], u[2], u[3]);
        let index = AdjacencyIndex::from_edges(&[(a, b), (b, c), (b, d)]);

        assert_eq!(index.team_counts(b), TeamCounts { direct: 2, total: 2 });
        assert_eq!(index.team_counts(a), TeamCounts { direct: 1, total: 3 });
        assert_eq!(index.team_counts(c), TeamCounts { direct: 0, total: 0 });
    }

    #[test]
    fn total_equals_direct_plus_child_totals() {
        // Three-level tree with uneven fan-out.
        let u = ids(7);
        let edges = [
            (u[0], u[1]),
            (u[0], u[2]),
            (u[1], u[3]),
            (u[1], u[4]),
            (u[4], u[5]),
            (u[2], u[6]),
        ];
        let index = AdjacencyIndex::from_edges(&edges);

        for &node in &u {
            let counts = index.team_counts(node);
            let child_sum: i64 = edges
                .iter()
                .filter(|(s, _)| *s == node)
                .map(|(_, c)| index.team_counts(*c).total)
                .sum();
            assert_eq!(counts.total, counts.direct + child_sum);
        }
    }

    #[test]
    fn diamond_counted_once() {
        // Two sponsors pointing at the same child should not happen, but the
        // traversal must count the shared node exactly once if it does.
        let u = ids(4);
        let (root, left, right, shared) = (u[0], u[1], u[2], u[3]);
        let index = AdjacencyIndex::from_edges(&[
            (root, left),
            (root, right),
            (left, shared),
            (right, shared),
        ]);

        assert_eq!(index.team_counts(root).total, 3);
    }

    #[test]
    fn cycle_terminates_and_counts_each_node_once() {
        let u = ids(3);
        let index = AdjacencyIndex::from_edges(&[(u[0], u[1]), (u[1], u[2]), (u[2], u[0])]);

        // Reachable set from u0 is {u1, u2}; u0 itself is never re-counted.
        assert_eq!(index.team_counts(u[0]).total, 2);
    }

    #[test]
    fn ancestors_walk_nearest_first() {
        let u = ids(4);
        let index = AdjacencyIndex::from_edges(&[(u[0], u[1]), (u[1], u[2]), (u[2], u[3])]);

        assert_eq!(index.ancestors(u[3]), vec![u[2], u[1], u[0]]);
        assert_eq!(index.ancestors(u[0]), Vec::<Uuid>::new());
    }

    #[test]
    fn ancestors_terminate_on_cycle() {
        let u = ids(2);
        let index = AdjacencyIndex::from_edges(&[(u[0], u[1]), (u[1], u[0])]);

        let chain = index.ancestors(u[0]);
        assert_eq!(chain, vec![u[1]]);
    }

    #[test]
    fn is_ancestor_detects_chain_membership() {
        let u = ids(3);
        let index = AdjacencyIndex::from_edges(&[(u[0], u[1]), (u[1], u[2])]);

        assert!(index.is_ancestor(u[0], u[2]));
        assert!(!index.is_ancestor(u[2], u[0]));
    }
}

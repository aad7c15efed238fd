//! SQLite inventory store
//!
//! Multi-row operations run in one transaction whose first statement is a
//! write (a conditional UPDATE, a guarded INSERT or a DELETE ... RETURNING).
//! That takes SQLite's write lock before anything is read, so two racing
//! claims or trade accepts are strictly ordered: the second one waits for the
//! first to commit and then finds its precondition gone.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::application::ports::outbound::{GrantOutcome, InventoryStorePort, StoreError};
use crate::domain::entities::{
    Asset, AssetDetail, AssetState, Form, FriendRequest, FriendRequests, Species, Sprites,
    TradeProposal, TradeProposals, TradeReceipt, User, UserProfile, UserSummary,
};
use crate::domain::value_objects::{
    AssetId, FriendRequestId, Rarity, SpeciesId, TradeProposalId, UserId,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BLOB PRIMARY KEY,
        external_id TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        next_grant_at TEXT NOT NULL,
        preferred_forms TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS species (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        has_gender_differences INTEGER NOT NULL,
        is_legendary INTEGER NOT NULL,
        is_mythical INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS species_forms (
        species_id INTEGER NOT NULL REFERENCES species(id) ON DELETE CASCADE,
        form_index INTEGER NOT NULL,
        name TEXT NOT NULL,
        types TEXT NOT NULL,
        front_default TEXT NOT NULL,
        front_female TEXT,
        front_shiny TEXT NOT NULL,
        front_shiny_female TEXT,
        PRIMARY KEY (species_id, form_index)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS assets (
        id BLOB PRIMARY KEY,
        species_id INTEGER NOT NULL,
        form_index INTEGER NOT NULL,
        shiny INTEGER NOT NULL,
        state TEXT NOT NULL CHECK (state IN ('catalog', 'pending', 'owned')),
        holder_id BLOB REFERENCES users(id) ON DELETE CASCADE,
        offer_slot INTEGER,
        created_at TEXT NOT NULL,
        CHECK ((state = 'catalog') = (holder_id IS NULL))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_assets_holder ON assets (holder_id, state)",
    r#"
    CREATE TABLE IF NOT EXISTS friendships (
        user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        friend_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL,
        PRIMARY KEY (user_id, friend_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS friend_requests (
        id BLOB PRIMARY KEY,
        requester_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        target_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL,
        UNIQUE (requester_id, target_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS trade_proposals (
        id BLOB PRIMARY KEY,
        proposer_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        proposer_asset_id BLOB NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
        counterpart_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        counterpart_asset_id BLOB NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL,
        UNIQUE (proposer_id, proposer_asset_id, counterpart_id, counterpart_asset_id)
    )
    "#,
];

const ASSET_COLUMNS: &str =
    "a.id, a.species_id, a.form_index, a.shiny, a.state, a.holder_id, a.created_at";

const TRADE_COLUMNS: &str =
    "id, proposer_id, proposer_asset_id, counterpart_id, counterpart_asset_id, created_at";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                StoreError::NotFound(db.message().to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub struct SqliteInventoryStore {
    pool: SqlitePool,
}

impl SqliteInventoryStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_forms(&self, species: SpeciesId) -> Result<Vec<Form>, StoreError> {
        let rows = sqlx::query(
            "SELECT name, types, front_default, front_female, front_shiny, front_shiny_female
             FROM species_forms WHERE species_id = ? ORDER BY form_index",
        )
        .bind(species.value())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|row| form_from_row(row, "name")).collect()
    }
}

async fn user_by_id(conn: &mut SqliteConnection, id: UserId) -> Result<Option<User>, StoreError> {
    let row = sqlx::query("SELECT * FROM users WHERE id = ?")
        .bind(uuid(id))
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(user_from_row).transpose()
}

/// Assets held by `user` in `state`, hydrated with species and form
async fn assets_for(
    conn: &mut SqliteConnection,
    user: UserId,
    state: &str,
) -> Result<Vec<AssetDetail>, StoreError> {
    let sql = format!(
        "SELECT {ASSET_COLUMNS}, s.name AS species_name,
                f.name AS form_name, f.types, f.front_default, f.front_female,
                f.front_shiny, f.front_shiny_female
         FROM assets a
         LEFT JOIN species s ON s.id = a.species_id
         LEFT JOIN species_forms f
            ON f.species_id = a.species_id AND f.form_index = a.form_index
         WHERE a.holder_id = ? AND a.state = ?
         ORDER BY a.offer_slot, a.created_at, a.id"
    );
    let rows = sqlx::query(&sql)
        .bind(uuid(user))
        .bind(state)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(detail_from_row).collect()
}

async fn friends_of(
    conn: &mut SqliteConnection,
    user: UserId,
) -> Result<Vec<UserSummary>, StoreError> {
    let rows = sqlx::query(
        "SELECT u.id, u.display_name FROM friendships f
         JOIN users u ON u.id = f.friend_id
         WHERE f.user_id = ?
         ORDER BY u.display_name",
    )
    .bind(uuid(user))
    .fetch_all(&mut *conn)
    .await?;
    rows.iter()
        .map(|row| -> Result<UserSummary, StoreError> {
            Ok(UserSummary {
                id: UserId::from_uuid(row.try_get("id")?),
                display_name: row.try_get("display_name")?,
            })
        })
        .collect()
}

fn uuid<T: Into<Uuid>>(id: T) -> Uuid {
    id.into()
}

fn user_from_row(row: &SqliteRow) -> Result<User, StoreError> {
    let preferred: String = row.try_get("preferred_forms")?;
    let preferred_forms: BTreeMap<SpeciesId, u32> = serde_json::from_str(&preferred)?;
    Ok(User {
        id: UserId::from_uuid(row.try_get("id")?),
        external_id: row.try_get("external_id")?,
        display_name: row.try_get("display_name")?,
        next_grant_at: row.try_get("next_grant_at")?,
        preferred_forms,
        created_at: row.try_get("created_at")?,
    })
}

fn asset_from_row(row: &SqliteRow) -> Result<Asset, StoreError> {
    let id = AssetId::from_uuid(row.try_get("id")?);
    let holder: Option<Uuid> = row.try_get("holder_id")?;
    let state: String = row.try_get("state")?;
    let state = match (state.as_str(), holder) {
        ("catalog", None) => AssetState::Catalog,
        ("pending", Some(user)) => AssetState::Pending(UserId::from_uuid(user)),
        ("owned", Some(user)) => AssetState::Owned(UserId::from_uuid(user)),
        (other, _) => {
            return Err(StoreError::Serialization(format!(
                "asset {} has inconsistent state '{}'",
                id, other
            )))
        }
    };
    Ok(Asset {
        id,
        species_id: SpeciesId::new(row.try_get("species_id")?),
        form_index: row.try_get("form_index")?,
        rarity: Rarity::from_shiny(row.try_get("shiny")?),
        state,
        created_at: row.try_get("created_at")?,
    })
}

fn form_from_row(row: &SqliteRow, name_column: &str) -> Result<Form, StoreError> {
    let types: String = row.try_get("types")?;
    Ok(Form {
        name: row.try_get(name_column)?,
        types: serde_json::from_str(&types)?,
        sprites: Sprites {
            front_default: row.try_get("front_default")?,
            front_female: row.try_get("front_female")?,
            front_shiny: row.try_get("front_shiny")?,
            front_shiny_female: row.try_get("front_shiny_female")?,
        },
    })
}

fn detail_from_row(row: &SqliteRow) -> Result<AssetDetail, StoreError> {
    let form_name: Option<String> = row.try_get("form_name")?;
    let form = match form_name {
        Some(_) => Some(form_from_row(row, "form_name")?),
        None => None,
    };
    let species_name: Option<String> = row.try_get("species_name")?;
    Ok(AssetDetail {
        asset: asset_from_row(row)?,
        species_name: species_name.unwrap_or_default(),
        form,
    })
}

fn friend_request_from_row(row: &SqliteRow) -> Result<FriendRequest, StoreError> {
    Ok(FriendRequest {
        id: FriendRequestId::from_uuid(row.try_get("id")?),
        requester: UserId::from_uuid(row.try_get("requester_id")?),
        target: UserId::from_uuid(row.try_get("target_id")?),
        created_at: row.try_get("created_at")?,
    })
}

fn trade_proposal_from_row(row: &SqliteRow) -> Result<TradeProposal, StoreError> {
    Ok(TradeProposal {
        id: TradeProposalId::from_uuid(row.try_get("id")?),
        proposer: UserId::from_uuid(row.try_get("proposer_id")?),
        proposer_asset: AssetId::from_uuid(row.try_get("proposer_asset_id")?),
        counterpart: UserId::from_uuid(row.try_get("counterpart_id")?),
        counterpart_asset: AssetId::from_uuid(row.try_get("counterpart_asset_id")?),
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl InventoryStorePort for SqliteInventoryStore {
    async fn upsert_user(&self, user: &User) -> Result<User, StoreError> {
        let preferred = serde_json::to_string(&user.preferred_forms)?;
        sqlx::query(
            "INSERT INTO users (id, external_id, display_name, next_grant_at, preferred_forms, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (external_id) DO NOTHING",
        )
        .bind(uuid(user.id))
        .bind(&user.external_id)
        .bind(&user.display_name)
        .bind(user.next_grant_at)
        .bind(preferred)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM users WHERE external_id = ?")
            .bind(&user.external_id)
            .fetch_one(&self.pool)
            .await?;
        user_from_row(&row)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        user_by_id(&mut conn, id).await
    }

    async fn list_user_ids(&self) -> Result<Vec<UserId>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM users ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(UserId::from_uuid).collect())
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        // Assets, friendships and proposals cascade
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(uuid(id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_preferred_form(
        &self,
        user: UserId,
        species: SpeciesId,
        form_index: u32,
    ) -> Result<(), StoreError> {
        // json_set keys are strings, matching serde_json's map key encoding
        let result = sqlx::query(
            "UPDATE users SET preferred_forms = json_set(preferred_forms, '$.\"' || ? || '\"', ?)
             WHERE id = ?",
        )
        .bind(species.value().to_string())
        .bind(form_index)
        .bind(uuid(user))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {}", user)));
        }
        Ok(())
    }

    async fn load_profile(&self, id: UserId) -> Result<Option<UserProfile>, StoreError> {
        // One read transaction so a concurrent claim or trade is seen either
        // entirely or not at all
        let mut tx = self.pool.begin().await?;
        let Some(user) = user_by_id(&mut tx, id).await? else {
            return Ok(None);
        };
        let owned = assets_for(&mut tx, id, "owned").await?;
        let pending = assets_for(&mut tx, id, "pending").await?;
        let friends = friends_of(&mut tx, id).await?;
        tx.commit().await?;
        Ok(Some(UserProfile {
            user,
            owned,
            pending,
            friends,
        }))
    }

    async fn save_species(&self, species: &Species) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT OR REPLACE INTO species (id, name, has_gender_differences, is_legendary, is_mythical)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(species.id.value())
        .bind(&species.name)
        .bind(species.has_gender_differences)
        .bind(species.is_legendary)
        .bind(species.is_mythical)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM species_forms WHERE species_id = ?")
            .bind(species.id.value())
            .execute(&mut *tx)
            .await?;
        for (index, form) in species.forms.iter().enumerate() {
            sqlx::query(
                "INSERT INTO species_forms
                    (species_id, form_index, name, types, front_default, front_female,
                     front_shiny, front_shiny_female)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(species.id.value())
            .bind(index as u32)
            .bind(&form.name)
            .bind(serde_json::to_string(&form.types)?)
            .bind(&form.sprites.front_default)
            .bind(&form.sprites.front_female)
            .bind(&form.sprites.front_shiny)
            .bind(&form.sprites.front_shiny_female)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_species(&self, id: SpeciesId) -> Result<Option<Species>, StoreError> {
        let row = sqlx::query("SELECT * FROM species WHERE id = ?")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Species {
            id,
            name: row.try_get("name")?,
            has_gender_differences: row.try_get("has_gender_differences")?,
            is_legendary: row.try_get("is_legendary")?,
            is_mythical: row.try_get("is_mythical")?,
            forms: self.load_forms(id).await?,
        }))
    }

    async fn get_asset(&self, id: AssetId) -> Result<Option<Asset>, StoreError> {
        let sql = format!("SELECT {ASSET_COLUMNS} FROM assets a WHERE a.id = ?");
        let row = sqlx::query(&sql)
            .bind(uuid(id))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(asset_from_row).transpose()
    }

    async fn pending_offers(&self, user: UserId) -> Result<Vec<Asset>, StoreError> {
        let sql = format!(
            "SELECT {ASSET_COLUMNS} FROM assets a
             WHERE a.holder_id = ? AND a.state = 'pending'
             ORDER BY a.offer_slot"
        );
        let rows = sqlx::query(&sql)
            .bind(uuid(user))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(asset_from_row).collect()
    }

    async fn insert_offers_if_clear(
        &self,
        user: UserId,
        offers: &[Asset],
    ) -> Result<GrantOutcome, StoreError> {
        if let Some(stray) = offers.iter().find(|a| !a.state.is_pending_for(user)) {
            return Err(StoreError::Conflict(format!(
                "asset {} is not an offer for user {}",
                stray.id, user
            )));
        }
        let Some((first, rest)) = offers.split_first() else {
            return Ok(GrantOutcome::Granted(Vec::new()));
        };

        let mut tx = self.pool.begin().await?;
        // Guarded insert: only lands if the user has no pending offer
        let inserted = sqlx::query(
            "INSERT INTO assets (id, species_id, form_index, shiny, state, holder_id, offer_slot, created_at)
             SELECT ?, ?, ?, ?, 'pending', ?, 0, ?
             WHERE NOT EXISTS (
                SELECT 1 FROM assets WHERE holder_id = ? AND state = 'pending'
             )",
        )
        .bind(uuid(first.id))
        .bind(first.species_id.value())
        .bind(first.form_index)
        .bind(first.rarity.is_shiny())
        .bind(uuid(user))
        .bind(first.created_at)
        .bind(uuid(user))
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            return Ok(GrantOutcome::AlreadyPending);
        }

        for (slot, offer) in rest.iter().enumerate() {
            sqlx::query(
                "INSERT INTO assets (id, species_id, form_index, shiny, state, holder_id, offer_slot, created_at)
                 VALUES (?, ?, ?, ?, 'pending', ?, ?, ?)",
            )
            .bind(uuid(offer.id))
            .bind(offer.species_id.value())
            .bind(offer.form_index)
            .bind(offer.rarity.is_shiny())
            .bind(uuid(user))
            .bind(slot as u32 + 1)
            .bind(offer.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(GrantOutcome::Granted(offers.to_vec()))
    }

    async fn claim_offer(
        &self,
        user: UserId,
        offer: AssetId,
        next_grant_at: DateTime<Utc>,
    ) -> Result<Asset, StoreError> {
        let mut tx = self.pool.begin().await?;
        let claimed = sqlx::query(
            "UPDATE assets SET state = 'owned', offer_slot = NULL
             WHERE id = ? AND state = 'pending' AND holder_id = ?",
        )
        .bind(uuid(offer))
        .bind(uuid(user))
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "offer {} is no longer pending for user {}",
                offer, user
            )));
        }

        sqlx::query("DELETE FROM assets WHERE holder_id = ? AND state = 'pending'")
            .bind(uuid(user))
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE users SET next_grant_at = ? WHERE id = ?")
            .bind(next_grant_at)
            .bind(uuid(user))
            .execute(&mut *tx)
            .await?;

        let sql = format!("SELECT {ASSET_COLUMNS} FROM assets a WHERE a.id = ?");
        let row = sqlx::query(&sql)
            .bind(uuid(offer))
            .fetch_one(&mut *tx)
            .await?;
        let asset = asset_from_row(&row)?;
        tx.commit().await?;
        Ok(asset)
    }

    async fn are_friends(&self, a: UserId, b: UserId) -> Result<bool, StoreError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM friendships WHERE user_id = ? AND friend_id = ?")
                .bind(uuid(a))
                .bind(uuid(b))
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn list_friends(&self, user: UserId) -> Result<Vec<UserSummary>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        friends_of(&mut conn, user).await
    }

    async fn remove_friendship(&self, a: UserId, b: UserId) -> Result<(), StoreError> {
        sqlx::query(
            "DELETE FROM friendships
             WHERE (user_id = ? AND friend_id = ?) OR (user_id = ? AND friend_id = ?)",
        )
        .bind(uuid(a))
        .bind(uuid(b))
        .bind(uuid(b))
        .bind(uuid(a))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_friend_request(&self, request: &FriendRequest) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO friend_requests (id, requester_id, target_id, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(uuid(request.id))
        .bind(uuid(request.requester))
        .bind(uuid(request.target))
        .bind(request.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_friend_request(
        &self,
        requester: UserId,
        target: UserId,
    ) -> Result<Option<FriendRequest>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM friend_requests WHERE requester_id = ? AND target_id = ?",
        )
        .bind(uuid(requester))
        .bind(uuid(target))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(friend_request_from_row).transpose()
    }

    async fn get_friend_request(
        &self,
        id: FriendRequestId,
    ) -> Result<Option<FriendRequest>, StoreError> {
        let row = sqlx::query("SELECT * FROM friend_requests WHERE id = ?")
            .bind(uuid(id))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(friend_request_from_row).transpose()
    }

    async fn list_friend_requests(&self, user: UserId) -> Result<FriendRequests, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM friend_requests
             WHERE requester_id = ? OR target_id = ?
             ORDER BY created_at",
        )
        .bind(uuid(user))
        .bind(uuid(user))
        .fetch_all(&self.pool)
        .await?;

        let mut requests = FriendRequests::default();
        for row in &rows {
            let request = friend_request_from_row(row)?;
            if request.requester == user {
                requests.sent.push(request);
            } else {
                requests.received.push(request);
            }
        }
        Ok(requests)
    }

    async fn accept_friend_request(
        &self,
        id: FriendRequestId,
    ) -> Result<FriendRequest, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("DELETE FROM friend_requests WHERE id = ? RETURNING *")
            .bind(uuid(id))
            .fetch_optional(&mut *tx)
            .await?;
        let request = match row {
            Some(row) => friend_request_from_row(&row)?,
            None => return Err(StoreError::NotFound(format!("friend request {}", id))),
        };

        let now = Utc::now();
        for (from, to) in [
            (request.requester, request.target),
            (request.target, request.requester),
        ] {
            sqlx::query(
                "INSERT OR IGNORE INTO friendships (user_id, friend_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(uuid(from))
            .bind(uuid(to))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("DELETE FROM friend_requests WHERE requester_id = ? AND target_id = ?")
            .bind(uuid(request.target))
            .bind(uuid(request.requester))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(request)
    }

    async fn delete_friend_request(&self, id: FriendRequestId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM friend_requests WHERE id = ?")
            .bind(uuid(id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_trade_proposal(&self, proposal: &TradeProposal) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO trade_proposals
                (id, proposer_id, proposer_asset_id, counterpart_id, counterpart_asset_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid(proposal.id))
        .bind(uuid(proposal.proposer))
        .bind(uuid(proposal.proposer_asset))
        .bind(uuid(proposal.counterpart))
        .bind(uuid(proposal.counterpart_asset))
        .bind(proposal.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_trade_proposal(
        &self,
        terms: &TradeProposal,
    ) -> Result<Option<TradeProposal>, StoreError> {
        let sql = format!(
            "SELECT {TRADE_COLUMNS} FROM trade_proposals
             WHERE proposer_id = ? AND proposer_asset_id = ?
               AND counterpart_id = ? AND counterpart_asset_id = ?"
        );
        let row = sqlx::query(&sql)
            .bind(uuid(terms.proposer))
            .bind(uuid(terms.proposer_asset))
            .bind(uuid(terms.counterpart))
            .bind(uuid(terms.counterpart_asset))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(trade_proposal_from_row).transpose()
    }

    async fn get_trade_proposal(
        &self,
        id: TradeProposalId,
    ) -> Result<Option<TradeProposal>, StoreError> {
        let sql = format!("SELECT {TRADE_COLUMNS} FROM trade_proposals WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(uuid(id))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(trade_proposal_from_row).transpose()
    }

    async fn list_trade_proposals(&self, user: UserId) -> Result<TradeProposals, StoreError> {
        let sql = format!(
            "SELECT {TRADE_COLUMNS} FROM trade_proposals
             WHERE proposer_id = ? OR counterpart_id = ?
             ORDER BY created_at"
        );
        let rows = sqlx::query(&sql)
            .bind(uuid(user))
            .bind(uuid(user))
            .fetch_all(&self.pool)
            .await?;

        let mut proposals = TradeProposals::default();
        for row in &rows {
            let proposal = trade_proposal_from_row(row)?;
            if proposal.proposer == user {
                proposals.sent.push(proposal);
            } else {
                proposals.received.push(proposal);
            }
        }
        Ok(proposals)
    }

    async fn execute_trade(&self, id: TradeProposalId) -> Result<TradeReceipt, StoreError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("DELETE FROM trade_proposals WHERE id = ? RETURNING {TRADE_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(uuid(id))
            .fetch_optional(&mut *tx)
            .await?;
        let proposal = match row {
            Some(row) => trade_proposal_from_row(&row)?,
            None => return Err(StoreError::NotFound(format!("trade proposal {}", id))),
        };
        if proposal.proposer_asset == proposal.counterpart_asset {
            return Err(StoreError::Conflict(
                "a trade needs two distinct assets".to_string(),
            ));
        }

        // Each leg only moves if the asset is still owned by its stated holder
        for (asset, from, to) in [
            (proposal.proposer_asset, proposal.proposer, proposal.counterpart),
            (proposal.counterpart_asset, proposal.counterpart, proposal.proposer),
        ] {
            let moved = sqlx::query(
                "UPDATE assets SET holder_id = ?
                 WHERE id = ? AND state = 'owned' AND holder_id = ?",
            )
            .bind(uuid(to))
            .bind(uuid(asset))
            .bind(uuid(from))
            .execute(&mut *tx)
            .await?;
            if moved.rows_affected() == 0 {
                return Err(StoreError::Conflict(format!(
                    "asset {} is no longer owned by user {}",
                    asset, from
                )));
            }
        }

        let mut invalidated: Vec<TradeProposalId> = sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM trade_proposals
             WHERE proposer_asset_id IN (?, ?) OR counterpart_asset_id IN (?, ?)
             RETURNING id",
        )
        .bind(uuid(proposal.proposer_asset))
        .bind(uuid(proposal.counterpart_asset))
        .bind(uuid(proposal.proposer_asset))
        .bind(uuid(proposal.counterpart_asset))
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(TradeProposalId::from_uuid)
        .collect();
        invalidated.sort();

        tx.commit().await?;
        Ok(TradeReceipt {
            proposal,
            invalidated,
        })
    }

    async fn delete_trade_proposal(&self, id: TradeProposalId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM trade_proposals WHERE id = ?")
            .bind(uuid(id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

    async fn test_store() -> SqliteInventoryStore {
        // One connection: every connection to `sqlite::memory:` is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteInventoryStore::new(pool).await.unwrap();
        for (id, name) in [(1, "bulbasaur"), (7, "squirtle")] {
            let form = Form::new(name).with_type("water").with_sprites(Sprites {
                front_default: format!("{name}.png"),
                front_female: None,
                front_shiny: format!("{name}-shiny.png"),
                front_shiny_female: None,
            });
            store
                .save_species(&Species::new(SpeciesId::new(id), name).with_form(form))
                .await
                .unwrap();
        }
        store
    }

    async fn user(store: &SqliteInventoryStore, name: &str) -> UserId {
        store.upsert_user(&User::new(name, name)).await.unwrap().id
    }

    fn batch(user: UserId) -> Vec<Asset> {
        vec![
            Asset::pending(user, SpeciesId::new(1), 0, Rarity::Standard),
            Asset::pending(user, SpeciesId::new(7), 0, Rarity::Shiny),
            Asset::pending(user, SpeciesId::new(1), 0, Rarity::Standard),
        ]
    }

    async fn owned_asset(store: &SqliteInventoryStore, owner: UserId, species: u32) -> AssetId {
        let offer = Asset::pending(owner, SpeciesId::new(species), 0, Rarity::Standard);
        store.insert_offers_if_clear(owner, &[offer.clone()]).await.unwrap();
        store.claim_offer(owner, offer.id, Utc::now()).await.unwrap();
        offer.id
    }

    #[tokio::test]
    async fn test_user_roundtrip_and_preferred_forms() {
        let store = test_store().await;
        let id = user(&store, "ash").await;

        store.set_preferred_form(id, SpeciesId::new(7), 2).await.unwrap();
        let loaded = store.get_user(id).await.unwrap().unwrap();
        assert_eq!(loaded.display_name, "ash");
        assert_eq!(loaded.preferred_forms.get(&SpeciesId::new(7)), Some(&2));

        let missing = store.set_preferred_form(UserId::new(), SpeciesId::new(7), 0).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_species_roundtrip_keeps_form_order() {
        let store = test_store().await;
        let species = Species::new(SpeciesId::new(201), "unown")
            .with_form(Form::new("unown-a").with_type("psychic"))
            .with_form(Form::new("unown-b").with_type("psychic"));
        store.save_species(&species).await.unwrap();

        let loaded = store.get_species(SpeciesId::new(201)).await.unwrap().unwrap();
        assert_eq!(loaded, species);
        assert!(store.get_species(SpeciesId::new(999)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_grant_is_refused_while_batch_pending() {
        let store = test_store().await;
        let ash = user(&store, "ash").await;

        let offers = batch(ash);
        let outcome = store.insert_offers_if_clear(ash, &offers).await.unwrap();
        assert_eq!(outcome, GrantOutcome::Granted(offers.clone()));

        let again = store.insert_offers_if_clear(ash, &batch(ash)).await.unwrap();
        assert_eq!(again, GrantOutcome::AlreadyPending);

        let pending = store.pending_offers(ash).await.unwrap();
        let ids: Vec<AssetId> = pending.iter().map(|a| a.id).collect();
        assert_eq!(ids, offers.iter().map(|a| a.id).collect::<Vec<_>>());
        assert_eq!(pending[1].rarity, Rarity::Shiny);
    }

    #[tokio::test]
    async fn test_claim_converts_one_and_drops_the_rest() {
        let store = test_store().await;
        let ash = user(&store, "ash").await;
        let offers = batch(ash);
        store.insert_offers_if_clear(ash, &offers).await.unwrap();

        let due = Utc::now() + chrono::Duration::minutes(25);
        let claimed = store.claim_offer(ash, offers[1].id, due).await.unwrap();

        assert_eq!(claimed.id, offers[1].id);
        assert_eq!(claimed.state, AssetState::Owned(ash));
        assert!(store.pending_offers(ash).await.unwrap().is_empty());
        assert!(store.get_asset(offers[0].id).await.unwrap().is_none());
        assert!(store.get_asset(offers[2].id).await.unwrap().is_none());
        let stored_due = store.get_user(ash).await.unwrap().unwrap().next_grant_at;
        assert_eq!(stored_due.timestamp_millis(), due.timestamp_millis());

        let again = store.claim_offer(ash, offers[0].id, due).await;
        assert!(matches!(again, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_profile_is_hydrated() {
        let store = test_store().await;
        let ash = user(&store, "ash").await;
        owned_asset(&store, ash, 7).await;
        store.insert_offers_if_clear(ash, &batch(ash)).await.unwrap();

        let profile = store.load_profile(ash).await.unwrap().unwrap();
        assert_eq!(profile.owned.len(), 1);
        assert_eq!(profile.owned[0].species_name, "squirtle");
        assert_eq!(profile.owned[0].sprite_url(), Some("squirtle.png"));
        assert_eq!(profile.pending.len(), 3);
        assert_eq!(profile.pending[1].sprite_url(), Some("squirtle-shiny.png"));
        assert_eq!(
            profile.pending[0].form.as_ref().map(|f| f.types.clone()),
            Some(vec!["water".to_string()])
        );
    }

    #[tokio::test]
    async fn test_friend_request_accept_is_symmetric() {
        let store = test_store().await;
        let ash = user(&store, "ash").await;
        let misty = user(&store, "misty").await;

        let request = FriendRequest::new(ash, misty);
        store.create_friend_request(&request).await.unwrap();
        let duplicate = store.create_friend_request(&FriendRequest::new(ash, misty)).await;
        assert!(matches!(duplicate, Err(StoreError::Conflict(_))));
        store
            .create_friend_request(&FriendRequest::new(misty, ash))
            .await
            .unwrap();

        store.accept_friend_request(request.id).await.unwrap();
        assert!(store.are_friends(ash, misty).await.unwrap());
        assert!(store.are_friends(misty, ash).await.unwrap());
        // Mirror request is moot once they are friends
        assert!(store.find_friend_request(misty, ash).await.unwrap().is_none());

        store.remove_friendship(misty, ash).await.unwrap();
        assert!(!store.are_friends(ash, misty).await.unwrap());
        assert!(!store.are_friends(misty, ash).await.unwrap());
        store.remove_friendship(misty, ash).await.unwrap();

        let missing = store.accept_friend_request(request.id).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_trade_swaps_and_purges_stale_proposals() {
        let store = test_store().await;
        let a = user(&store, "a").await;
        let b = user(&store, "b").await;
        let c = user(&store, "c").await;
        let metapod = owned_asset(&store, a, 1).await;
        let ivysaur = owned_asset(&store, b, 7).await;
        let charmander = owned_asset(&store, c, 1).await;

        let t1 = TradeProposal::new(a, metapod, b, ivysaur);
        let t2 = TradeProposal::new(c, charmander, b, ivysaur);
        store.create_trade_proposal(&t1).await.unwrap();
        store.create_trade_proposal(&t2).await.unwrap();

        let receipt = store.execute_trade(t1.id).await.unwrap();
        assert_eq!(receipt.invalidated, vec![t2.id]);
        assert!(store.get_asset(metapod).await.unwrap().unwrap().state.is_owned_by(b));
        assert!(store.get_asset(ivysaur).await.unwrap().unwrap().state.is_owned_by(a));
        assert!(store.get_trade_proposal(t1.id).await.unwrap().is_none());
        assert!(store.get_trade_proposal(t2.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_trade_of_asset_no_longer_held_is_rolled_back() {
        let store = test_store().await;
        let a = user(&store, "a").await;
        let b = user(&store, "b").await;
        let mine = owned_asset(&store, a, 1).await;
        let theirs = owned_asset(&store, b, 7).await;

        // Proposal claims b holds `mine`; ownership is only checked on accept
        let bogus = TradeProposal::new(a, theirs, b, mine);
        store.create_trade_proposal(&bogus).await.unwrap();

        let err = store.execute_trade(bogus.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.get_trade_proposal(bogus.id).await.unwrap().is_some());
        assert!(store.get_asset(mine).await.unwrap().unwrap().state.is_owned_by(a));
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let store = test_store().await;
        let a = user(&store, "a").await;
        let b = user(&store, "b").await;
        let mine = owned_asset(&store, a, 1).await;
        let theirs = owned_asset(&store, b, 7).await;
        let proposal = TradeProposal::new(a, mine, b, theirs);
        store.create_trade_proposal(&proposal).await.unwrap();

        assert!(store.delete_user(a).await.unwrap());
        assert!(store.get_asset(mine).await.unwrap().is_none());
        assert!(store.get_trade_proposal(proposal.id).await.unwrap().is_none());
        assert!(store.get_asset(theirs).await.unwrap().is_some());
        assert!(!store.delete_user(a).await.unwrap());
    }

    /// Database file with several pooled connections, as deployed
    async fn file_store() -> (Arc<SqliteInventoryStore>, PathBuf) {
        let path = std::env::temp_dir().join(format!("pokeroll-{}.db", Uuid::new_v4()));
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .unwrap();
        let store = SqliteInventoryStore::new(pool).await.unwrap();
        store
            .save_species(
                &Species::new(SpeciesId::new(1), "bulbasaur").with_form(Form::new("bulbasaur")),
            )
            .await
            .unwrap();
        (Arc::new(store), path)
    }

    async fn remove_file_store(store: Arc<SqliteInventoryStore>, path: PathBuf) {
        store.pool().close().await;
        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_claims_across_connections_have_one_winner() {
        let (store, path) = file_store().await;

        for round in 0..5 {
            let owner = store
                .upsert_user(&User::new(format!("racer-{round}"), "racer"))
                .await
                .unwrap()
                .id;
            let offers: Vec<Asset> = (0..3)
                .map(|_| Asset::pending(owner, SpeciesId::new(1), 0, Rarity::Standard))
                .collect();
            store.insert_offers_if_clear(owner, &offers).await.unwrap();

            let claims: Vec<_> = (0..6)
                .map(|i| {
                    let store = store.clone();
                    let offer = offers[i % offers.len()].id;
                    tokio::spawn(async move { store.claim_offer(owner, offer, Utc::now()).await })
                })
                .collect();
            let profiles: Vec<_> = (0..4)
                .map(|_| {
                    let store = store.clone();
                    tokio::spawn(async move { store.load_profile(owner).await })
                })
                .collect();

            let mut winners = 0;
            for claim in claims {
                match claim.await.unwrap() {
                    Ok(_) => winners += 1,
                    Err(err) => assert!(matches!(err, StoreError::Conflict(_)), "{err:?}"),
                }
            }
            assert_eq!(winners, 1);

            // Every profile read sees the batch either before or after the claim
            for profile in profiles {
                let profile = profile.await.unwrap().unwrap().unwrap();
                let view = (profile.owned.len(), profile.pending.len());
                assert!(view == (0, 3) || view == (1, 0), "torn profile {view:?}");
            }
            let profile = store.load_profile(owner).await.unwrap().unwrap();
            assert_eq!((profile.owned.len(), profile.pending.len()), (1, 0));
        }

        remove_file_store(store, path).await;
    }
}

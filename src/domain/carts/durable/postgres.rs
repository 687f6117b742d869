//! `PostgreSQL` durable tier.
//!
//! Items and summary are stored as JSONB documents next to first-class
//! bookkeeping columns so the abandonment sweep can query them directly.

use async_trait::async_trait;
use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, Postgres, Row, postgres::PgRow, query, query_as, types::Json};

use crate::{
    database::Db,
    domain::{
        carts::{
            durable::CartDurableStore,
            errors::StoreError,
            models::{Cart, CartId, CartItem, CartSummary},
            records::{AbandonmentTotals, PersistedCart},
            saved::{SavedCart, SavedCartOwner, SavedItem},
        },
        tenants::TenantId,
    },
    ids::{IdKind, OpaqueId, SessionId, UserId},
};

const FIND_CART_BY_SESSION_SQL: &str = include_str!("../sql/find_cart_by_session.sql");
const GET_CART_SQL: &str = include_str!("../sql/get_cart.sql");
const INSERT_CART_SQL: &str = include_str!("../sql/insert_cart.sql");
const UPDATE_CART_SQL: &str = include_str!("../sql/update_cart.sql");
const MARK_CONVERTED_SQL: &str = include_str!("../sql/mark_converted.sql");
const FIRST_REMINDER_CANDIDATES_SQL: &str = include_str!("../sql/first_reminder_candidates.sql");
const SECOND_REMINDER_CANDIDATES_SQL: &str =
    include_str!("../sql/second_reminder_candidates.sql");
const MARK_FIRST_REMINDER_SENT_SQL: &str = include_str!("../sql/mark_first_reminder_sent.sql");
const MARK_SECOND_REMINDER_SENT_SQL: &str = include_str!("../sql/mark_second_reminder_sent.sql");
const RESET_ABANDONMENT_SQL: &str = include_str!("../sql/reset_abandonment.sql");
const ABANDONMENT_STATS_SQL: &str = include_str!("../sql/abandonment_stats.sql");
const PURGE_CONVERTED_SQL: &str = include_str!("../sql/purge_converted.sql");
const GET_SAVED_CART_SQL: &str = include_str!("../sql/get_saved_cart.sql");
const UPSERT_SAVED_CART_SQL: &str = include_str!("../sql/upsert_saved_cart.sql");

#[derive(Debug, Clone)]
pub struct PgCartDurableStore {
    db: Db,
}

impl PgCartDurableStore {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn update_flag(
        &self,
        sql: &'static str,
        tenant: &TenantId,
        cart: &CartId,
        at: Option<Timestamp>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let mut statement = query(sql).bind(tenant.as_str()).bind(cart.into_uuid());

        if let Some(at) = at {
            statement = statement.bind(SqlxTimestamp::from(at));
        }

        let rows_affected = statement.execute(&mut *tx).await?.rows_affected();

        tx.commit().await?;

        Ok(rows_affected > 0)
    }

    async fn candidates(
        &self,
        sql: &'static str,
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<PersistedCart>, StoreError> {
        let mut tx = self.db.begin_sweep_transaction().await?;

        let records = query_as::<Postgres, PersistedCart>(sql)
            .bind(SqlxTimestamp::from(cutoff))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(records)
    }
}

#[async_trait]
impl CartDurableStore for PgCartDurableStore {
    async fn find_by_session(
        &self,
        tenant: &TenantId,
        session: &SessionId,
    ) -> Result<Option<PersistedCart>, StoreError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let record = query_as::<Postgres, PersistedCart>(FIND_CART_BY_SESSION_SQL)
            .bind(tenant.as_str())
            .bind(session.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(record)
    }

    async fn get(
        &self,
        tenant: &TenantId,
        cart: &CartId,
    ) -> Result<Option<PersistedCart>, StoreError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let record = query_as::<Postgres, PersistedCart>(GET_CART_SQL)
            .bind(tenant.as_str())
            .bind(cart.into_uuid())
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(record)
    }

    async fn save_cart(&self, cart: &Cart) -> Result<PersistedCart, StoreError> {
        let mut tx = self.db.begin_tenant_transaction(&cart.tenant_id).await?;

        let user_id = cart.user_id.as_ref().map(UserId::as_str);
        let item_count = to_db_int(cart.item_count)?;

        let record = if cart.version == 0 {
            query_as::<Postgres, PersistedCart>(INSERT_CART_SQL)
                .bind(cart.tenant_id.as_str())
                .bind(cart.id.into_uuid())
                .bind(cart.session_id.as_str())
                .bind(user_id)
                .bind(Json(&cart.items))
                .bind(Json(&cart.summary))
                .bind(item_count)
                .bind(1_i64)
                .bind(SqlxTimestamp::from(cart.created_at))
                .bind(SqlxTimestamp::from(cart.updated_at))
                .bind(SqlxTimestamp::from(cart.expires_at))
                .fetch_one(&mut *tx)
                .await?
        } else {
            query_as::<Postgres, PersistedCart>(UPDATE_CART_SQL)
                .bind(cart.tenant_id.as_str())
                .bind(cart.id.into_uuid())
                .bind(cart.session_id.as_str())
                .bind(user_id)
                .bind(Json(&cart.items))
                .bind(Json(&cart.summary))
                .bind(item_count)
                .bind(to_db_int(cart.version)?)
                .bind(SqlxTimestamp::from(cart.updated_at))
                .bind(SqlxTimestamp::from(cart.expires_at))
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::Conflict)?
        };

        tx.commit().await?;

        Ok(record)
    }

    async fn mark_converted(
        &self,
        tenant: &TenantId,
        cart: &CartId,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        self.update_flag(MARK_CONVERTED_SQL, tenant, cart, Some(at))
            .await
    }

    async fn first_reminder_candidates(
        &self,
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<PersistedCart>, StoreError> {
        self.candidates(FIRST_REMINDER_CANDIDATES_SQL, cutoff, limit)
            .await
    }

    async fn second_reminder_candidates(
        &self,
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<PersistedCart>, StoreError> {
        self.candidates(SECOND_REMINDER_CANDIDATES_SQL, cutoff, limit)
            .await
    }

    async fn mark_first_reminder_sent(
        &self,
        tenant: &TenantId,
        cart: &CartId,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        self.update_flag(MARK_FIRST_REMINDER_SENT_SQL, tenant, cart, Some(at))
            .await
    }

    async fn mark_second_reminder_sent(
        &self,
        tenant: &TenantId,
        cart: &CartId,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        self.update_flag(MARK_SECOND_REMINDER_SENT_SQL, tenant, cart, Some(at))
            .await
    }

    async fn reset_abandonment(
        &self,
        tenant: &TenantId,
        cart: &CartId,
    ) -> Result<bool, StoreError> {
        self.update_flag(RESET_ABANDONMENT_SQL, tenant, cart, None)
            .await
    }

    async fn abandonment_stats(
        &self,
        tenant: &TenantId,
        cutoff: Timestamp,
    ) -> Result<AbandonmentTotals, StoreError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let row = query(ABANDONMENT_STATS_SQL)
            .bind(tenant.as_str())
            .bind(SqlxTimestamp::from(cutoff))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(AbandonmentTotals {
            abandoned_carts: try_get_amount(&row, "abandoned_carts")?,
            total_value: try_get_amount(&row, "total_value")?,
            notified_carts: try_get_amount(&row, "notified_carts")?,
        })
    }

    async fn purge_converted(&self, before: Timestamp) -> Result<u64, StoreError> {
        let mut tx = self.db.begin_sweep_transaction().await?;

        let rows_affected = query(PURGE_CONVERTED_SQL)
            .bind(SqlxTimestamp::from(before))
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        Ok(rows_affected)
    }

    async fn get_saved_cart(
        &self,
        tenant: &TenantId,
        owner: &SavedCartOwner,
    ) -> Result<Option<SavedCart>, StoreError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;
        let (kind, id) = owner.parts();

        let saved = query_as::<Postgres, SavedCart>(GET_SAVED_CART_SQL)
            .bind(tenant.as_str())
            .bind(kind)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(saved)
    }

    async fn save_saved_cart(&self, saved: &SavedCart) -> Result<(), StoreError> {
        let mut tx = self.db.begin_tenant_transaction(&saved.tenant_id).await?;
        let (kind, id) = saved.owner.parts();

        query(UPSERT_SAVED_CART_SQL)
            .bind(saved.tenant_id.as_str())
            .bind(kind)
            .bind(id)
            .bind(Json(&saved.items))
            .bind(SqlxTimestamp::from(saved.updated_at))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}

impl<'r> FromRow<'r, PgRow> for PersistedCart {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let Json(items) = row.try_get::<Json<Vec<CartItem>>, _>("items")?;
        let Json(summary) = row.try_get::<Json<CartSummary>, _>("summary")?;

        let user_id = row
            .try_get::<Option<String>, _>("user_id")?
            .map(|raw| parse_id(raw, "user_id"))
            .transpose()?;

        let cart = Cart {
            id: CartId::from_uuid(row.try_get("cart_id")?),
            tenant_id: try_get_id(row, "tenant_id")?,
            session_id: try_get_id(row, "session_id")?,
            user_id,
            items,
            summary,
            item_count: try_get_amount(row, "item_count")?,
            version: try_get_amount(row, "version")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
            expires_at: row.try_get::<SqlxTimestamp, _>("expires_at")?.to_jiff(),
        };

        Ok(Self {
            cart,
            converted: row.try_get("converted")?,
            converted_at: try_get_optional_timestamp(row, "converted_at")?,
            abandonment_notified: row.try_get("abandonment_notified")?,
            abandonment_notified_at: try_get_optional_timestamp(row, "abandonment_notified_at")?,
            second_reminder_sent: row.try_get("second_reminder_sent")?,
            second_reminder_sent_at: try_get_optional_timestamp(row, "second_reminder_sent_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for SavedCart {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let kind: String = row.try_get("owner_kind")?;
        let id: String = row.try_get("owner_id")?;

        let owner = match kind.as_str() {
            "user" => SavedCartOwner::User(parse_id(id, "owner_id")?),
            "session" => SavedCartOwner::Session(parse_id(id, "owner_id")?),
            other => {
                return Err(sqlx::Error::ColumnDecode {
                    index: "owner_kind".to_string(),
                    source: format!("unknown saved cart owner kind {other:?}").into(),
                });
            }
        };

        let Json(items) = row.try_get::<Json<Vec<SavedItem>>, _>("items")?;

        Ok(Self {
            tenant_id: try_get_id(row, "tenant_id")?,
            owner,
            items,
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        })
    }
}

fn parse_id<K: IdKind>(raw: String, col: &str) -> Result<OpaqueId<K>, sqlx::Error> {
    OpaqueId::parse(raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: col.to_string(),
        source: Box::new(e),
    })
}

fn try_get_id<K: IdKind>(row: &PgRow, col: &str) -> Result<OpaqueId<K>, sqlx::Error> {
    parse_id(row.try_get(col)?, col)
}

fn try_get_amount(row: &PgRow, col: &str) -> Result<u64, sqlx::Error> {
    let amount_i64: i64 = row.try_get(col)?;

    u64::try_from(amount_i64).map_err(|e| sqlx::Error::ColumnDecode {
        index: col.to_string(),
        source: Box::new(e),
    })
}

fn try_get_optional_timestamp(row: &PgRow, col: &str) -> Result<Option<Timestamp>, sqlx::Error> {
    Ok(row
        .try_get::<Option<SqlxTimestamp>, _>(col)?
        .map(SqlxTimestamp::to_jiff))
}

fn to_db_int(value: u64) -> Result<i64, sqlx::Error> {
    i64::try_from(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

//! Fund item and movement repository for `PostgreSQL`.
//!
//! Queries are checked at runtime (`query_as` + `FromRow`) so the crate
//! builds without a live database.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use tonerdesk_core::{
    CartridgeTypeId, CatalogRef, CompanyId, FundItemId, FundScope, ItemType, MovementId,
    MovementType, PrinterModelId, TicketId, UserId,
};

use super::{RepositoryError, as_pg_millis};
use crate::config::DatabaseConfig;
use crate::error::FundError;
use crate::models::{
    FundItem, FundItemFilter, FundItemView, ItemHistory, Movement, MovementFilter, NewFundItem,
    OpeningStock, Posted, Posting, ScopeFilter,
};
use crate::store::FundStore;

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for `fund.fund_item` queries.
#[derive(Debug, sqlx::FromRow)]
struct FundItemRow {
    id: i32,
    item_type: ItemType,
    cartridge_type_id: Option<i32>,
    printer_model_id: Option<i32>,
    quantity_available: i32,
    quantity_reserved: i32,
    quantity_actual: Option<i32>,
    last_inventory_date: Option<DateTime<Utc>>,
    company_id: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FundItemRow> for FundItem {
    type Error = RepositoryError;

    fn try_from(row: FundItemRow) -> Result<Self, Self::Error> {
        let catalog_ref = CatalogRef::from_columns(
            row.item_type,
            row.cartridge_type_id.map(CartridgeTypeId::new),
            row.printer_model_id.map(PrinterModelId::new),
        )
        .ok_or_else(|| {
            RepositoryError::DataCorruption(format!(
                "fund item {} has item_type {} with cartridge_type_id {:?} and printer_model_id {:?}",
                row.id, row.item_type, row.cartridge_type_id, row.printer_model_id
            ))
        })?;

        Ok(Self {
            id: FundItemId::new(row.id),
            catalog_ref,
            scope: FundScope::from(row.company_id.map(CompanyId::new)),
            quantity_available: row.quantity_available,
            quantity_reserved: row.quantity_reserved,
            quantity_actual: row.quantity_actual,
            last_inventory_date: row.last_inventory_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Fund item row joined with its catalog display name.
#[derive(Debug, sqlx::FromRow)]
struct FundItemViewRow {
    #[sqlx(flatten)]
    item: FundItemRow,
    item_name: Option<String>,
}

impl TryFrom<FundItemViewRow> for FundItemView {
    type Error = RepositoryError;

    fn try_from(row: FundItemViewRow) -> Result<Self, Self::Error> {
        Ok(Self::new(row.item.try_into()?, row.item_name))
    }
}

/// Internal row type for `fund.movement` queries.
#[derive(Debug, sqlx::FromRow)]
struct MovementRow {
    id: i64,
    fund_item_id: i32,
    movement_type: MovementType,
    ticket_id: Option<i32>,
    quantity: i32,
    quantity_before: Option<i32>,
    quantity_after: Option<i32>,
    comment: Option<String>,
    user_id: i64,
    idempotency_key: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<MovementRow> for Movement {
    fn from(row: MovementRow) -> Self {
        Self {
            id: MovementId::new(row.id),
            fund_item_id: FundItemId::new(row.fund_item_id),
            movement_type: row.movement_type,
            ticket_id: row.ticket_id.map(TicketId::new),
            quantity: row.quantity,
            quantity_before: row.quantity_before,
            quantity_after: row.quantity_after,
            comment: row.comment,
            user_id: UserId::new(row.user_id),
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Fund store backed by `PostgreSQL`, shared by every process that uses the fund.
#[derive(Debug, Clone)]
pub struct PgFundStore {
    pool: PgPool,
    lock_timeout: Duration,
    statement_timeout: Duration,
}

impl PgFundStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool, config: &DatabaseConfig) -> Self {
        Self {
            pool,
            lock_timeout: config.lock_timeout,
            statement_timeout: config.statement_timeout,
        }
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the configured lock and statement timeouts to the current
    /// transaction only.
    async fn set_local_timeouts(&self, conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        sqlx::query(
            "SELECT set_config('lock_timeout', $1, true), set_config('statement_timeout', $2, true)",
        )
        .bind(as_pg_millis(self.lock_timeout))
        .bind(as_pg_millis(self.statement_timeout))
        .execute(conn)
        .await?;
        Ok(())
    }
}

impl FundStore for PgFundStore {
    async fn fetch_item(&self, id: FundItemId) -> Result<Option<FundItem>, RepositoryError> {
        let row = sqlx::query_as::<_, FundItemRow>(
            r"
            SELECT id, item_type, cartridge_type_id, printer_model_id,
                   quantity_available, quantity_reserved, quantity_actual,
                   last_inventory_date, company_id, created_at, updated_at
            FROM fund.fund_item
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn create_item(
        &self,
        new: NewFundItem,
        opening: Option<&OpeningStock>,
    ) -> Result<FundItem, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        self.set_local_timeouts(&mut tx).await?;

        let row = sqlx::query_as::<_, FundItemRow>(
            r"
            INSERT INTO fund.fund_item
                (item_type, cartridge_type_id, printer_model_id, company_id, quantity_available)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, item_type, cartridge_type_id, printer_model_id,
                      quantity_available, quantity_reserved, quantity_actual,
                      last_inventory_date, company_id, created_at, updated_at
            ",
        )
        .bind(new.catalog_ref.item_type())
        .bind(new.catalog_ref.cartridge_type_id())
        .bind(new.catalog_ref.printer_model_id())
        .bind(new.scope.company_id())
        .bind(opening.map_or(0, |o| o.quantity))
        .fetch_one(&mut *tx)
        .await?;
        let item = FundItem::try_from(row)?;

        if let Some(opening) = opening {
            let movement = opening.movement();
            sqlx::query(
                r"
                INSERT INTO fund.movement
                    (fund_item_id, movement_type, ticket_id, quantity, comment, user_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(item.id)
            .bind(movement.movement_type)
            .bind(movement.ticket_id)
            .bind(movement.quantity)
            .bind(movement.comment)
            .bind(movement.user_id)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(item)
    }

    async fn post<D>(
        &self,
        fund_item_id: FundItemId,
        idempotency_key: Option<Uuid>,
        decide: &D,
    ) -> Result<Posted, FundError>
    where
        D: Fn(&FundItem, DateTime<Utc>) -> Result<Posting, FundError> + Sync,
    {
        // Dropping `tx` on any early return rolls the transaction back.
        let mut tx = self.pool.begin().await?;
        self.set_local_timeouts(&mut tx).await?;

        let row = sqlx::query_as::<_, FundItemRow>(
            r"
            SELECT id, item_type, cartridge_type_id, printer_model_id,
                   quantity_available, quantity_reserved, quantity_actual,
                   last_inventory_date, company_id, created_at, updated_at
            FROM fund.fund_item
            WHERE id = $1
            FOR UPDATE
            ",
        )
        .bind(fund_item_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(FundError::NotFound(fund_item_id))?;
        let current = FundItem::try_from(row)?;

        if let Some(key) = idempotency_key {
            let earlier = sqlx::query_as::<_, MovementRow>(
                r"
                SELECT id, fund_item_id, movement_type, ticket_id, quantity,
                       quantity_before, quantity_after, comment, user_id,
                       idempotency_key, created_at
                FROM fund.movement
                WHERE idempotency_key = $1
                ",
            )
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = earlier {
                let movement = Movement::from(row);
                if movement.fund_item_id != fund_item_id {
                    return Err(FundError::Conflict(format!(
                        "idempotency key {key} was used for fund item {}",
                        movement.fund_item_id
                    )));
                }
                return Ok(Posted {
                    item: current,
                    movement,
                    replayed: true,
                });
            }
        }

        // Read after the lock so per-item order follows commit order.
        let now: DateTime<Utc> = sqlx::query_scalar("SELECT clock_timestamp()")
            .fetch_one(&mut *tx)
            .await?;

        let Posting { update, movement } = decide(&current, now)?;

        let row = sqlx::query_as::<_, FundItemRow>(
            r"
            UPDATE fund.fund_item
            SET quantity_available = $2,
                quantity_reserved = $3,
                quantity_actual = $4,
                last_inventory_date = $5,
                updated_at = $6
            WHERE id = $1
            RETURNING id, item_type, cartridge_type_id, printer_model_id,
                      quantity_available, quantity_reserved, quantity_actual,
                      last_inventory_date, company_id, created_at, updated_at
            ",
        )
        .bind(fund_item_id)
        .bind(update.quantity_available)
        .bind(update.quantity_reserved)
        .bind(update.quantity_actual)
        .bind(update.last_inventory_date)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        let item = FundItem::try_from(row)?;

        let row = sqlx::query_as::<_, MovementRow>(
            r"
            INSERT INTO fund.movement
                (fund_item_id, movement_type, ticket_id, quantity, quantity_before,
                 quantity_after, comment, user_id, idempotency_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, fund_item_id, movement_type, ticket_id, quantity,
                      quantity_before, quantity_after, comment, user_id,
                      idempotency_key, created_at
            ",
        )
        .bind(fund_item_id)
        .bind(movement.movement_type)
        .bind(movement.ticket_id)
        .bind(movement.quantity)
        .bind(movement.quantity_before)
        .bind(movement.quantity_after)
        .bind(movement.comment)
        .bind(movement.user_id)
        .bind(idempotency_key)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| match RepositoryError::from(err) {
            // Same key raced in on another item.
            RepositoryError::Conflict(msg) => FundError::Conflict(msg),
            other => FundError::Storage(other),
        })?;

        tx.commit().await?;

        Ok(Posted {
            item,
            movement: row.into(),
            replayed: false,
        })
    }

    async fn list_items(&self, filter: &FundItemFilter) -> Result<Vec<FundItemView>, RepositoryError> {
        let (all_scopes, company_id) = match filter.scope {
            ScopeFilter::All => (true, None),
            ScopeFilter::Global => (false, None),
            ScopeFilter::Company(id) => (false, Some(id)),
        };

        let rows = sqlx::query_as::<_, FundItemViewRow>(
            r"
            SELECT f.id, f.item_type, f.cartridge_type_id, f.printer_model_id,
                   f.quantity_available, f.quantity_reserved, f.quantity_actual,
                   f.last_inventory_date, f.company_id, f.created_at, f.updated_at,
                   COALESCE(ct.name, pm.model) AS item_name
            FROM fund.fund_item f
            LEFT JOIN catalog.cartridge_type ct ON ct.id = f.cartridge_type_id
            LEFT JOIN catalog.printer_model pm ON pm.id = f.printer_model_id
            WHERE ($1 OR f.company_id IS NOT DISTINCT FROM $2)
              AND ($3::fund.item_type IS NULL OR f.item_type = $3)
              AND (NOT $4 OR (f.quantity_actual IS NOT NULL
                              AND f.quantity_actual <> f.quantity_available))
            ORDER BY f.id
            ",
        )
        .bind(all_scopes)
        .bind(company_id)
        .bind(filter.item_type)
        .bind(filter.discrepancies_only)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_movements(
        &self,
        filter: &MovementFilter,
        limit: u32,
    ) -> Result<Vec<Movement>, RepositoryError> {
        let rows = sqlx::query_as::<_, MovementRow>(
            r"
            SELECT id, fund_item_id, movement_type, ticket_id, quantity,
                   quantity_before, quantity_after, comment, user_id,
                   idempotency_key, created_at
            FROM fund.movement
            WHERE ($1::INTEGER IS NULL OR fund_item_id = $1)
              AND ($2::fund.movement_type IS NULL OR movement_type = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            ",
        )
        .bind(filter.fund_item_id)
        .bind(filter.movement_type)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn item_history(&self, fund_item_id: FundItemId) -> Result<Option<ItemHistory>, RepositoryError> {
        // Both reads see the same snapshot, so a concurrent posting is either
        // in the item and the log or in neither.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let Some(row) = sqlx::query_as::<_, FundItemRow>(
            r"
            SELECT id, item_type, cartridge_type_id, printer_model_id,
                   quantity_available, quantity_reserved, quantity_actual,
                   last_inventory_date, company_id, created_at, updated_at
            FROM fund.fund_item
            WHERE id = $1
            ",
        )
        .bind(fund_item_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };
        let item = FundItem::try_from(row)?;

        let rows = sqlx::query_as::<_, MovementRow>(
            r"
            SELECT id, fund_item_id, movement_type, ticket_id, quantity,
                   quantity_before, quantity_after, comment, user_id,
                   idempotency_key, created_at
            FROM fund.movement
            WHERE fund_item_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(fund_item_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(ItemHistory {
            item,
            movements: rows.into_iter().map(Into::into).collect(),
        }))
    }
}

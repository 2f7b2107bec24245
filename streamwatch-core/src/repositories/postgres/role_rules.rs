// streamwatch-core/src/repositories/postgres/role_rules.rs
//
// Managed role rules live in `managed_role_rules`. The assignment is kept as
// `kind` + JSONB `params`; interpretation happens in the model so a malformed
// row still loads.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use streamwatch_common::error::Error;
use streamwatch_common::models::role_rule::{AssignmentKind, ManagedRoleRule};
use streamwatch_common::traits::repository_traits::RoleRuleRepository;

#[derive(Clone)]
pub struct PostgresRoleRuleRepository {
    pool: Pool<Postgres>,
}

impl PostgresRoleRuleRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn from_row(r: &PgRow) -> Result<ManagedRoleRule, Error> {
        Ok(ManagedRoleRule {
            rule_id:    r.try_get("rule_id")?,
            guild_id:   r.try_get("guild_id")?,
            role_id:    r.try_get("role_id")?,
            kind:       r.try_get("kind")?,
            params:     r.try_get("params")?,
            created_at: r.try_get("created_at")?,
        })
    }

    fn from_rows(rows: Vec<PgRow>) -> Result<Vec<ManagedRoleRule>, Error> {
        rows.iter().map(Self::from_row).collect()
    }
}

#[async_trait]
impl RoleRuleRepository for PostgresRoleRuleRepository {
    async fn insert_rule(&self, rule: &ManagedRoleRule) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO managed_role_rules (rule_id, guild_id, role_id, kind, params, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
            .bind(rule.rule_id)
            .bind(&rule.guild_id)
            .bind(&rule.role_id)
            .bind(&rule.kind)
            .bind(&rule.params)
            .bind(rule.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_rule(&self, rule_id: Uuid) -> Result<Option<ManagedRoleRule>, Error> {
        let row_opt = sqlx::query(
            r#"
            SELECT rule_id, guild_id, role_id, kind, params, created_at
            FROM managed_role_rules
            WHERE rule_id = $1
            "#,
        )
            .bind(rule_id)
            .fetch_optional(&self.pool)
            .await?;
        row_opt.as_ref().map(Self::from_row).transpose()
    }

    async fn list_rules_for_role(&self, guild_id: &str, role_id: &str) -> Result<Vec<ManagedRoleRule>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT rule_id, guild_id, role_id, kind, params, created_at
            FROM managed_role_rules
            WHERE guild_id = $1 AND role_id = $2
            ORDER BY created_at
            "#,
        )
            .bind(guild_id)
            .bind(role_id)
            .fetch_all(&self.pool)
            .await?;
        Self::from_rows(rows)
    }

    async fn list_rules_for_guild(&self, guild_id: &str) -> Result<Vec<ManagedRoleRule>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT rule_id, guild_id, role_id, kind, params, created_at
            FROM managed_role_rules
            WHERE guild_id = $1
            ORDER BY created_at
            "#,
        )
            .bind(guild_id)
            .fetch_all(&self.pool)
            .await?;
        Self::from_rows(rows)
    }

    async fn find_reaction_rules(
        &self,
        guild_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<Vec<ManagedRoleRule>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT rule_id, guild_id, role_id, kind, params, created_at
            FROM managed_role_rules
            WHERE guild_id = $1
              AND kind = $2
              AND params->>'message_id' = $3
              AND params->>'emoji' = $4
            ORDER BY created_at
            "#,
        )
            .bind(guild_id)
            .bind(AssignmentKind::Reaction.as_str())
            .bind(message_id)
            .bind(emoji)
            .fetch_all(&self.pool)
            .await?;
        Self::from_rows(rows)
    }

    async fn list_live_stream_rules(&self, guild_id: &str) -> Result<Vec<ManagedRoleRule>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT rule_id, guild_id, role_id, kind, params, created_at
            FROM managed_role_rules
            WHERE guild_id = $1 AND kind = $2
            ORDER BY created_at
            "#,
        )
            .bind(guild_id)
            .bind(AssignmentKind::LiveStream.as_str())
            .fetch_all(&self.pool)
            .await?;
        Self::from_rows(rows)
    }

    async fn list_initial_react_rules(&self, guild_id: &str) -> Result<Vec<ManagedRoleRule>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT rule_id, guild_id, role_id, kind, params, created_at
            FROM managed_role_rules
            WHERE guild_id = $1
              AND kind = $2
              AND COALESCE((params->>'initial_react')::BOOLEAN, FALSE)
            ORDER BY created_at
            "#,
        )
            .bind(guild_id)
            .bind(AssignmentKind::Reaction.as_str())
            .fetch_all(&self.pool)
            .await?;
        Self::from_rows(rows)
    }

    async fn delete_rule(&self, rule_id: Uuid) -> Result<(), Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM managed_role_rules
            WHERE rule_id = $1
            "#,
        )
            .bind(rule_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("role rule {}", rule_id)));
        }
        Ok(())
    }

    async fn is_managed_role(&self, guild_id: &str, role_id: &str) -> Result<bool, Error> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM managed_role_rules
                WHERE guild_id = $1 AND role_id = $2
            ) AS managed
            "#,
        )
            .bind(guild_id)
            .bind(role_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("managed")?)
    }
}

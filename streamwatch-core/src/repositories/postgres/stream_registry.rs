// streamwatch-core/src/repositories/postgres/stream_registry.rs
//
// Guild configuration, member links and per-broadcaster stream state in the
// `guilds`, `member_links`, `streams` and `alert_posts` tables.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Pool, Postgres, Row};

use streamwatch_common::error::Error;
use streamwatch_common::models::guild::GuildConfig;
use streamwatch_common::models::member::{LinkSwap, MemberLink};
use streamwatch_common::models::stream::{AlertPost, BroadcasterId, StreamState};
use streamwatch_common::traits::repository_traits::StreamRegistry;

#[derive(Clone)]
pub struct PostgresStreamRegistry {
    pool: Pool<Postgres>,
}

impl PostgresStreamRegistry {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn guild_from_row(r: &PgRow) -> Result<GuildConfig, Error> {
        Ok(GuildConfig {
            guild_id:                    r.try_get("guild_id")?,
            admin_roles:                 r.try_get("admin_roles")?,
            stream_notification_channel: r.try_get("stream_notification_channel")?,
            created_at:                  r.try_get("created_at")?,
            updated_at:                  r.try_get("updated_at")?,
        })
    }

    fn link_from_row(r: &PgRow) -> Result<MemberLink, Error> {
        let broadcaster_id: String = r.try_get("broadcaster_id")?;
        Ok(MemberLink {
            guild_id:       r.try_get("guild_id")?,
            user_id:        r.try_get("user_id")?,
            broadcaster_id: BroadcasterId::new(broadcaster_id),
            linked_at:      r.try_get("linked_at")?,
        })
    }

    /// Loads a stream row plus its alert posts on one connection, so the
    /// link swap can read inside its transaction.
    async fn load_stream(conn: &mut PgConnection, broadcaster_id: &BroadcasterId) -> Result<Option<StreamState>, Error> {
        let row_opt = sqlx::query(
            r#"
            SELECT broadcaster_id, is_live, live_since
            FROM streams
            WHERE broadcaster_id = $1
            "#,
        )
            .bind(broadcaster_id.as_str())
            .fetch_optional(&mut *conn)
            .await?;

        let Some(row) = row_opt else {
            return Ok(None);
        };

        let posts = sqlx::query(
            r#"
            SELECT guild_id, channel_id, message_id
            FROM alert_posts
            WHERE broadcaster_id = $1
            "#,
        )
            .bind(broadcaster_id.as_str())
            .fetch_all(&mut *conn)
            .await?;

        let mut alert_posts = HashSet::new();
        for p in posts {
            alert_posts.insert(AlertPost {
                guild_id:   p.try_get("guild_id")?,
                channel_id: p.try_get("channel_id")?,
                message_id: p.try_get("message_id")?,
            });
        }

        Ok(Some(StreamState {
            broadcaster_id: broadcaster_id.clone(),
            is_live:        row.try_get("is_live")?,
            live_since:     row.try_get("live_since")?,
            alert_posts,
        }))
    }

    fn posts_from_rows(rows: Vec<PgRow>) -> Result<Vec<AlertPost>, Error> {
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(AlertPost {
                guild_id:   r.try_get("guild_id")?,
                channel_id: r.try_get("channel_id")?,
                message_id: r.try_get("message_id")?,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl StreamRegistry for PostgresStreamRegistry {
    async fn get_or_create_guild(&self, guild_id: &str) -> Result<GuildConfig, Error> {
        // DO UPDATE (a no-op write) so RETURNING always yields the row.
        let row = sqlx::query(
            r#"
            INSERT INTO guilds (guild_id)
            VALUES ($1)
            ON CONFLICT (guild_id)
            DO UPDATE SET guild_id = EXCLUDED.guild_id
            RETURNING guild_id, admin_roles, stream_notification_channel, created_at, updated_at
            "#,
        )
            .bind(guild_id)
            .fetch_one(&self.pool)
            .await?;
        Self::guild_from_row(&row)
    }

    async fn add_admin_role(&self, guild_id: &str, role_id: &str) -> Result<bool, Error> {
        self.get_or_create_guild(guild_id).await?;
        let result = sqlx::query(
            r#"
            UPDATE guilds
            SET admin_roles = array_append(admin_roles, $2),
                updated_at = now()
            WHERE guild_id = $1
              AND NOT ($2 = ANY(admin_roles))
            "#,
        )
            .bind(guild_id)
            .bind(role_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_stream_notification_channel(&self, guild_id: &str, channel_id: Option<&str>) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO guilds (guild_id, stream_notification_channel)
            VALUES ($1, $2)
            ON CONFLICT (guild_id)
            DO UPDATE SET stream_notification_channel = EXCLUDED.stream_notification_channel,
                          updated_at = now()
            "#,
        )
            .bind(guild_id)
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn swap_member_link(
        &self,
        guild_id: &str,
        user_id: &str,
        broadcaster_id: &BroadcasterId,
    ) -> Result<LinkSwap, Error> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<String> = sqlx::query(
            r#"
            SELECT broadcaster_id
            FROM member_links
            WHERE guild_id = $1 AND user_id = $2
            FOR UPDATE
            "#,
        )
            .bind(guild_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(|r| r.try_get("broadcaster_id"))
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO streams (broadcaster_id)
            VALUES ($1)
            ON CONFLICT (broadcaster_id) DO NOTHING
            "#,
        )
            .bind(broadcaster_id.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO member_links (guild_id, user_id, broadcaster_id, linked_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (guild_id, user_id)
            DO UPDATE SET broadcaster_id = EXCLUDED.broadcaster_id,
                          linked_at = EXCLUDED.linked_at
            "#,
        )
            .bind(guild_id)
            .bind(user_id)
            .bind(broadcaster_id.as_str())
            .execute(&mut *tx)
            .await?;

        let stream = Self::load_stream(&mut *tx, broadcaster_id)
            .await?
            .ok_or_else(|| Error::InvariantViolation(format!("stream {} vanished during link swap", broadcaster_id)))?;

        tx.commit().await?;

        Ok(LinkSwap {
            previous: previous.map(BroadcasterId::new),
            stream,
        })
    }

    async fn remove_member_link(&self, guild_id: &str, user_id: &str) -> Result<Option<BroadcasterId>, Error> {
        let row_opt = sqlx::query(
            r#"
            DELETE FROM member_links
            WHERE guild_id = $1 AND user_id = $2
            RETURNING broadcaster_id
            "#,
        )
            .bind(guild_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row_opt {
            Some(r) => {
                let id: String = r.try_get("broadcaster_id")?;
                Ok(Some(BroadcasterId::new(id)))
            }
            None => Ok(None),
        }
    }

    async fn get_member_link(&self, guild_id: &str, user_id: &str) -> Result<Option<MemberLink>, Error> {
        let row_opt = sqlx::query(
            r#"
            SELECT guild_id, user_id, broadcaster_id, linked_at
            FROM member_links
            WHERE guild_id = $1 AND user_id = $2
            "#,
        )
            .bind(guild_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row_opt.as_ref().map(Self::link_from_row).transpose()
    }

    async fn list_linked_broadcasters(&self) -> Result<Vec<BroadcasterId>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT broadcaster_id
            FROM member_links
            ORDER BY broadcaster_id
            "#,
        )
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let id: String = r.try_get("broadcaster_id")?;
            out.push(BroadcasterId::new(id));
        }
        Ok(out)
    }

    async fn list_links_for_broadcaster(
        &self,
        broadcaster_id: &BroadcasterId,
        guild_id: Option<&str>,
    ) -> Result<Vec<MemberLink>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT guild_id, user_id, broadcaster_id, linked_at
            FROM member_links
            WHERE broadcaster_id = $1
              AND ($2::TEXT IS NULL OR guild_id = $2)
            ORDER BY guild_id, user_id
            "#,
        )
            .bind(broadcaster_id.as_str())
            .bind(guild_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::link_from_row).collect()
    }

    async fn get_or_create_stream(&self, broadcaster_id: &BroadcasterId) -> Result<StreamState, Error> {
        sqlx::query(
            r#"
            INSERT INTO streams (broadcaster_id)
            VALUES ($1)
            ON CONFLICT (broadcaster_id) DO NOTHING
            "#,
        )
            .bind(broadcaster_id.as_str())
            .execute(&self.pool)
            .await?;

        let mut conn = self.pool.acquire().await?;
        Self::load_stream(&mut conn, broadcaster_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("stream {}", broadcaster_id)))
    }

    async fn get_stream(&self, broadcaster_id: &BroadcasterId) -> Result<Option<StreamState>, Error> {
        let mut conn = self.pool.acquire().await?;
        Self::load_stream(&mut conn, broadcaster_id).await
    }

    async fn set_stream_live(
        &self,
        broadcaster_id: &BroadcasterId,
        is_live: bool,
        live_since: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        let result = sqlx::query(
            r#"
            UPDATE streams
            SET is_live = $2,
                live_since = $3,
                updated_at = now()
            WHERE broadcaster_id = $1
            "#,
        )
            .bind(broadcaster_id.as_str())
            .bind(is_live)
            .bind(live_since)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("stream {}", broadcaster_id)));
        }
        Ok(())
    }

    async fn add_alert_post(&self, broadcaster_id: &BroadcasterId, post: &AlertPost) -> Result<AlertPost, Error> {
        sqlx::query(
            r#"
            INSERT INTO alert_posts (broadcaster_id, guild_id, channel_id, message_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (broadcaster_id, guild_id) DO NOTHING
            "#,
        )
            .bind(broadcaster_id.as_str())
            .bind(&post.guild_id)
            .bind(&post.channel_id)
            .bind(&post.message_id)
            .execute(&self.pool)
            .await?;

        let row = sqlx::query(
            r#"
            SELECT guild_id, channel_id, message_id
            FROM alert_posts
            WHERE broadcaster_id = $1 AND guild_id = $2
            "#,
        )
            .bind(broadcaster_id.as_str())
            .bind(&post.guild_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("stream {}", broadcaster_id)))?;

        Ok(AlertPost {
            guild_id:   row.try_get("guild_id")?,
            channel_id: row.try_get("channel_id")?,
            message_id: row.try_get("message_id")?,
        })
    }

    async fn remove_alert_posts_for_guild(
        &self,
        broadcaster_id: &BroadcasterId,
        guild_id: &str,
    ) -> Result<Vec<AlertPost>, Error> {
        let rows = sqlx::query(
            r#"
            DELETE FROM alert_posts
            WHERE broadcaster_id = $1 AND guild_id = $2
            RETURNING guild_id, channel_id, message_id
            "#,
        )
            .bind(broadcaster_id.as_str())
            .bind(guild_id)
            .fetch_all(&self.pool)
            .await?;
        Self::posts_from_rows(rows)
    }

    async fn clear_alert_posts(&self, broadcaster_id: &BroadcasterId) -> Result<Vec<AlertPost>, Error> {
        let rows = sqlx::query(
            r#"
            DELETE FROM alert_posts
            WHERE broadcaster_id = $1
            RETURNING guild_id, channel_id, message_id
            "#,
        )
            .bind(broadcaster_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        Self::posts_from_rows(rows)
    }

    async fn delete_stream(&self, broadcaster_id: &BroadcasterId) -> Result<(), Error> {
        sqlx::query(
            r#"
            DELETE FROM streams
            WHERE broadcaster_id = $1
            "#,
        )
            .bind(broadcaster_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

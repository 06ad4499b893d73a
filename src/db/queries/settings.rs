use sqlx::SqlitePool;

use crate::db::models::SettingRow;

/// Fetch a raw setting.
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<SettingRow>, sqlx::Error> {
    sqlx::query_as::<_, SettingRow>("SELECT key, value, updated_at FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
}

/// Insert or overwrite a setting.
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, datetime('now')) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_setting(pool: &SqlitePool, key: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::{create_pool, run_migrations};

    async fn pool() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let pool = pool().await;
        assert!(get_setting(&pool, "k").await.unwrap().is_none());

        set_setting(&pool, "k", "1").await.unwrap();
        set_setting(&pool, "k", "2").await.unwrap();
        let row = get_setting(&pool, "k").await.unwrap().unwrap();
        assert_eq!(row.value, "2");

        assert!(delete_setting(&pool, "k").await.unwrap());
        assert!(!delete_setting(&pool, "k").await.unwrap());
    }
}

use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::SqlitePool;
use tracing::warn;

use crate::engine::mute_filter::{MuteFlags, MuteSettings, MutedKeyword};

use super::settings::{delete_setting, get_setting, set_setting};

pub const MUTED_KEYWORDS_KEY: &str = "muted_comment_keywords";
pub const MUTED_USER_IDS_KEY: &str = "muted_user_ids";
pub const MUTE_FLAGS_KEY: &str = "mute_flags";

/// Load the persisted mute lists. Missing or unreadable entries fall back to empty.
pub async fn load_mute_settings(pool: &SqlitePool) -> Result<MuteSettings, sqlx::Error> {
    let keywords: Vec<MutedKeyword> = load_json(pool, MUTED_KEYWORDS_KEY).await?;
    let user_ids: Vec<String> = load_json(pool, MUTED_USER_IDS_KEY).await?;
    let flags: MuteFlags = load_json(pool, MUTE_FLAGS_KEY).await?;

    Ok(MuteSettings {
        keywords: keywords.into_iter().filter(|k| !k.pattern.is_empty()).collect(),
        user_ids,
        flags,
    })
}

/// Persist the mute lists. Keywords with an empty pattern are never written,
/// and an entry that is back to its empty default is removed.
pub async fn save_mute_settings(pool: &SqlitePool, settings: &MuteSettings) -> Result<(), sqlx::Error> {
    let settings = settings.persistable();
    save_json(pool, MUTED_KEYWORDS_KEY, &settings.keywords).await?;
    save_json(pool, MUTED_USER_IDS_KEY, &settings.user_ids).await?;
    save_json(pool, MUTE_FLAGS_KEY, &settings.flags).await?;
    Ok(())
}

async fn load_json<T: DeserializeOwned + Default>(pool: &SqlitePool, key: &str) -> Result<T, sqlx::Error> {
    let Some(row) = get_setting(pool, key).await? else {
        return Ok(T::default());
    };
    match serde_json::from_str(&row.value) {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(%key, error = %e, "ignoring unreadable setting");
            Ok(T::default())
        }
    }
}

async fn save_json<T: Serialize + Default + PartialEq>(
    pool: &SqlitePool,
    key: &str,
    value: &T,
) -> Result<(), sqlx::Error> {
    if *value == T::default() {
        delete_setting(pool, key).await?;
        return Ok(());
    }
    let json = serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    set_setting(pool, key, &json).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::{create_pool, run_migrations};
    use crate::engine::mute_filter::MatchMode;

    async fn pool() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_empty_database_loads_defaults() {
        let pool = pool().await;
        assert_eq!(load_mute_settings(&pool).await.unwrap(), MuteSettings::default());
    }

    #[tokio::test]
    async fn test_save_skips_empty_patterns() {
        let pool = pool().await;
        let settings = MuteSettings {
            keywords: vec![
                MutedKeyword::new("spam", MatchMode::Partial),
                MutedKeyword::new("", MatchMode::Exact),
            ],
            user_ids: vec!["troll".into()],
            flags: MuteFlags::COLORED,
        };
        save_mute_settings(&pool, &settings).await.unwrap();

        let loaded = load_mute_settings(&pool).await.unwrap();
        assert_eq!(loaded.keywords, vec![MutedKeyword::new("spam", MatchMode::Partial)]);
        assert_eq!(loaded.user_ids, vec!["troll".to_string()]);
        assert_eq!(loaded.flags, MuteFlags::COLORED);
    }

    #[tokio::test]
    async fn test_emptied_lists_are_removed() {
        let pool = pool().await;
        let mut settings = MuteSettings {
            keywords: vec![MutedKeyword::new("spam", MatchMode::Partial)],
            user_ids: vec!["troll".into()],
            flags: MuteFlags::BIG_SIZE,
        };
        save_mute_settings(&pool, &settings).await.unwrap();
        assert!(get_setting(&pool, MUTED_USER_IDS_KEY).await.unwrap().is_some());

        settings.user_ids.clear();
        settings.flags = MuteFlags::empty();
        save_mute_settings(&pool, &settings).await.unwrap();
        assert!(get_setting(&pool, MUTED_USER_IDS_KEY).await.unwrap().is_none());
        assert!(get_setting(&pool, MUTE_FLAGS_KEY).await.unwrap().is_none());
        assert!(get_setting(&pool, MUTED_KEYWORDS_KEY).await.unwrap().is_some());

        let loaded = load_mute_settings(&pool).await.unwrap();
        assert!(loaded.user_ids.is_empty());
        assert_eq!(loaded.keywords.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_value_falls_back() {
        let pool = pool().await;
        set_setting(&pool, MUTED_USER_IDS_KEY, "not json").await.unwrap();
        let loaded = load_mute_settings(&pool).await.unwrap();
        assert!(loaded.user_ids.is_empty());
    }
}

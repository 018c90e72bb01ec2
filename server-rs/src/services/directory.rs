use crate::cache::Cache;
use crate::error::AppResult;
use crate::models::club::Club;
use crate::store::ClubStore;

const DIRECTORY_KEY: &str = "clubs:directory";

/// Active clubs for the public directory, served from cache when possible.
pub async fn active_clubs(
    store: &dyn ClubStore,
    cache: &Cache,
    ttl_secs: u64,
) -> AppResult<Vec<Club>> {
    if let Some(clubs) = cache.get_json::<Vec<Club>>(DIRECTORY_KEY).await {
        return Ok(clubs);
    }

    let clubs = store.list_clubs(true).await?;
    cache.set_json(DIRECTORY_KEY, &clubs, ttl_secs).await;
    Ok(clubs)
}

/// Drops the cached directory after any change to a club's public fields.
pub async fn invalidate(cache: &Cache) {
    cache.del(DIRECTORY_KEY).await;
}

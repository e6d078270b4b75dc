use anyhow::Context;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub signed_up_for_newsletter: bool,
    pub fav_stocks: Vec<String>,
    pub profile_data: serde_json::Value,
}

type ProfileRow = (
    i64,
    String,
    String,
    bool,
    Option<Vec<String>>,
    Option<serde_json::Value>,
);

pub async fn get_user_profile(
    pool: &sqlx::PgPool,
    user_id: i64,
) -> anyhow::Result<Option<UserProfile>> {
    let row = sqlx::query_as::<_, ProfileRow>(
        "SELECT id, username, email, signed_up_for_newsletter, fav_stocks, profile_data \
         FROM users \
         WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("select user profile failed (id={user_id})"))?;

    Ok(row.map(
        |(id, username, email, signed_up_for_newsletter, fav_stocks, profile_data)| UserProfile {
            id,
            username,
            email,
            signed_up_for_newsletter,
            fav_stocks: fav_stocks.unwrap_or_default(),
            profile_data: profile_data.unwrap_or_else(|| serde_json::json!({})),
        },
    ))
}

/// Returns `false` when no such user exists.
pub async fn update_newsletter_preference(
    pool: &sqlx::PgPool,
    user_id: i64,
    signed_up: bool,
) -> anyhow::Result<bool> {
    let res = sqlx::query("UPDATE users SET signed_up_for_newsletter = $1 WHERE id = $2")
        .bind(signed_up)
        .bind(user_id)
        .execute(pool)
        .await
        .with_context(|| format!("update newsletter preference failed (id={user_id})"))?;
    Ok(res.rows_affected() > 0)
}

/// Stores the normalized list and returns it, or `None` when no such user exists.
pub async fn update_favorite_stocks(
    pool: &sqlx::PgPool,
    user_id: i64,
    fav_stocks: &[String],
) -> anyhow::Result<Option<Vec<String>>> {
    let normalized = normalize_tickers(fav_stocks.iter().map(String::as_str));
    let res = sqlx::query("UPDATE users SET fav_stocks = $1 WHERE id = $2")
        .bind(&normalized)
        .bind(user_id)
        .execute(pool)
        .await
        .with_context(|| format!("update favorite stocks failed (id={user_id})"))?;
    Ok((res.rows_affected() > 0).then_some(normalized))
}

/// Trims and upper-cases symbols, dropping blanks and later duplicates.
pub fn normalize_tickers<'a>(raw: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for t in raw {
        let t = t.trim().to_ascii_uppercase();
        if t.is_empty() || out.contains(&t) {
            continue;
        }
        out.push(t);
    }
    out
}

/// Splits the comma-separated form used by profile forms ("AAPL, msft,GOOGL").
pub fn parse_ticker_list(s: &str) -> Vec<String> {
    normalize_tickers(s.split(','))
}
